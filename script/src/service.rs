use std::sync::Arc;
use tracing::info;

use crate::aggregator::{Aggregator, JupiterClient};
use crate::client::{ChainRpc, SolanaRpc};
use crate::config::RelayConfig;
use crate::dispatch::{
    DepositDispatcher, FileProcessedStore, MemoryProcessedStore, OnChainVaultRegistry,
    ProcessedStore, StaticVaultRegistry, VaultRegistry,
};
use crate::error::RelayError;
use crate::pipeline::SwapPipeline;

/// Everything the binaries need, wired from one [`RelayConfig`].
pub struct RelayService {
    pub config: RelayConfig,
    pub rpc: Arc<dyn ChainRpc>,
    pub aggregator: Arc<dyn Aggregator>,
    pub pipeline: Arc<SwapPipeline>,
}

impl RelayService {
    pub fn from_config(config: RelayConfig) -> Result<Self, RelayError> {
        let rpc: Arc<dyn ChainRpc> =
            Arc::new(SolanaRpc::new(config.rpc_url.clone(), config.stage_timeout));
        let aggregator: Arc<dyn Aggregator> = Arc::new(JupiterClient::new(
            &config.aggregator_url,
            config.max_route_accounts,
            config.stage_timeout,
        )?);
        let pipeline = Arc::new(SwapPipeline::new(
            rpc.clone(),
            aggregator.clone(),
            config.relay_keypair.clone(),
            config.pipeline_settings(),
            config.submit_policy(),
        ));

        info!(
            target: "relay",
            relayer = %pipeline.relayer(),
            rpc = %config.rpc_url,
            settlement_mint = %config.settlement_mint,
            dry_run = config.dry_run,
            "relay service configured"
        );
        Ok(Self {
            config,
            rpc,
            aggregator,
            pipeline,
        })
    }

    pub fn registry(&self) -> Arc<dyn VaultRegistry> {
        if self.config.vault_owners.is_empty() {
            info!(target: "relay", "vault registry: on-chain lookup");
            Arc::new(OnChainVaultRegistry::new(
                self.rpc.clone(),
                self.config.vault_program,
                self.config.stage_timeout,
            ))
        } else {
            let registry = StaticVaultRegistry::new(
                &self.config.vault_owners,
                &self.config.vault_program,
                &self.config.settlement_mint,
            );
            info!(target: "relay", vaults = registry.len(), "vault registry: static index");
            Arc::new(registry)
        }
    }

    pub async fn processed_store(&self) -> Result<Arc<dyn ProcessedStore>, RelayError> {
        match &self.config.processed_store {
            Some(path) => {
                let store = FileProcessedStore::open(path).await?;
                info!(target: "relay", path = %path.display(), claimed = store.len(), "processed store: journal");
                Ok(Arc::new(store))
            }
            None => Ok(Arc::new(MemoryProcessedStore::default())),
        }
    }

    pub async fn dispatcher(&self) -> Result<DepositDispatcher, RelayError> {
        Ok(DepositDispatcher::new(
            self.pipeline.clone(),
            self.registry(),
            self.processed_store().await?,
            self.config.max_concurrent_vaults,
        ))
    }
}
