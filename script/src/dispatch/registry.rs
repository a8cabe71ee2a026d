use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

use vault_swap_lib::{associated_token_address, find_vault_address, VaultAccount};

use crate::client::ChainRpc;
use crate::error::{RelayError, Stage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VaultRecord {
    pub address: Pubkey,
    pub owner: Pubkey,
    pub settlement_account: Pubkey,
}

/// Answers "is this address a vault, and whose?".
#[async_trait]
pub trait VaultRegistry: Send + Sync {
    async fn resolve(&self, address: &Pubkey) -> Result<Option<VaultRecord>, RelayError>;
}

/// Index built from known owners. Addresses are derived, never stored by hand.
pub struct StaticVaultRegistry {
    vaults: HashMap<Pubkey, VaultRecord>,
}

impl StaticVaultRegistry {
    pub fn new(owners: &[Pubkey], program_id: &Pubkey, settlement_mint: &Pubkey) -> Self {
        let vaults = owners
            .iter()
            .map(|owner| {
                let (address, _) = find_vault_address(owner, program_id);
                let record = VaultRecord {
                    address,
                    owner: *owner,
                    settlement_account: associated_token_address(&address, settlement_mint),
                };
                (address, record)
            })
            .collect();
        Self { vaults }
    }

    pub fn len(&self) -> usize {
        self.vaults.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vaults.is_empty()
    }
}

#[async_trait]
impl VaultRegistry for StaticVaultRegistry {
    async fn resolve(&self, address: &Pubkey) -> Result<Option<VaultRecord>, RelayError> {
        Ok(self.vaults.get(address).copied())
    }
}

/// Reverse lookup through the vault account itself.
pub struct OnChainVaultRegistry {
    rpc: Arc<dyn ChainRpc>,
    program_id: Pubkey,
    stage_timeout: Duration,
}

impl OnChainVaultRegistry {
    pub fn new(rpc: Arc<dyn ChainRpc>, program_id: Pubkey, stage_timeout: Duration) -> Self {
        Self {
            rpc,
            program_id,
            stage_timeout,
        }
    }
}

#[async_trait]
impl VaultRegistry for OnChainVaultRegistry {
    async fn resolve(&self, address: &Pubkey) -> Result<Option<VaultRecord>, RelayError> {
        let account = timeout(self.stage_timeout, self.rpc.account(address))
            .await
            .map_err(|_| RelayError::Timeout {
                stage: Stage::AccountRead,
                after: self.stage_timeout,
            })??;
        let Some(account) = account else {
            return Ok(None);
        };
        if account.owner != self.program_id {
            return Ok(None);
        }

        let vault = match VaultAccount::try_from_bytes(&account.data) {
            Ok(vault) => vault,
            Err(e) => {
                debug!(target: "dispatch", address = %address, error = %e, "not a vault account");
                return Ok(None);
            }
        };
        if !vault.matches_address(address, &self.program_id) {
            debug!(target: "dispatch", address = %address, owner = %vault.owner, "vault address does not re-derive");
            return Ok(None);
        }

        Ok(Some(VaultRecord {
            address: *address,
            owner: vault.owner,
            settlement_account: vault.settlement_account,
        }))
    }
}
