use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature};
use std::future::Future;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, info};

use vault_swap_lib::constants::NATIVE_MINT;
use vault_swap_lib::{
    associated_token_address, CoverFeeAccounts, SwapArgs, SwapFeeToNativeAccounts,
    SwapToSettlementAccounts, VaultCall,
};

use super::assembler::SwapTransactionAssembler;
use super::fee::{FeeEstimate, FeeEstimator};
use super::relay::{RelaySubmitter, SubmitPolicy};
use super::PipelineSettings;
use crate::aggregator::{Aggregator, Quote, QuoteRequest, RouteInstructionExtractor};
use crate::client::ChainRpc;
use crate::error::{RelayError, Stage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegKind {
    /// Deposited asset into the settlement asset.
    Settlement,
    /// Collected fee into native currency, split between admin and vault.
    FeeToNative,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegRequest {
    pub kind: LegKind,
    pub vault: Pubkey,
    pub owner: Pubkey,
    pub settlement_account: Pubkey,
    pub input_mint: Pubkey,
    pub amount: u64,
}

#[derive(Debug, Clone)]
pub struct LegOutcome {
    pub kind: LegKind,
    /// `None` on a dry run.
    pub signature: Option<Signature>,
    pub amount_in: u64,
    pub quoted_out: u64,
    pub min_amount_out: u64,
    pub fee: FeeEstimate,
    pub size: usize,
}

/// One swap leg end to end, with every stage failing into a typed error.
pub struct SwapPipeline {
    rpc: Arc<dyn ChainRpc>,
    aggregator: Arc<dyn Aggregator>,
    extractor: RouteInstructionExtractor,
    estimator: FeeEstimator,
    assembler: SwapTransactionAssembler,
    submitter: RelaySubmitter,
    settings: PipelineSettings,
}

impl SwapPipeline {
    pub fn new(
        rpc: Arc<dyn ChainRpc>,
        aggregator: Arc<dyn Aggregator>,
        signer: Arc<Keypair>,
        settings: PipelineSettings,
        policy: SubmitPolicy,
    ) -> Self {
        let submitter = RelaySubmitter::new(rpc.clone(), signer, policy);
        let relayer = submitter.pubkey();
        Self {
            extractor: RouteInstructionExtractor::new(
                aggregator.clone(),
                rpc.clone(),
                settings.aggregator_program,
                settings.stage_timeout,
            ),
            estimator: FeeEstimator::new(
                rpc.clone(),
                relayer,
                settings.fallback_fee_lamports,
                settings.stage_timeout,
            ),
            assembler: SwapTransactionAssembler::new(relayer, settings.vault_program),
            submitter,
            rpc,
            aggregator,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn relayer(&self) -> Pubkey {
        self.submitter.pubkey()
    }

    pub async fn run_leg(&self, request: &LegRequest) -> Result<LegOutcome, RelayError> {
        self.check_vault_balance(&request.vault).await?;
        self.check_token_accounts(request).await?;

        let output_mint = match request.kind {
            LegKind::Settlement => self.settings.settlement_mint,
            LegKind::FeeToNative => NATIVE_MINT,
        };
        let wrap_native = match request.kind {
            LegKind::Settlement => false,
            LegKind::FeeToNative => self.settings.wrap_native_fee_leg,
        };
        let quote_request = QuoteRequest {
            input_mint: request.input_mint,
            output_mint,
            amount: request.amount,
            slippage_bps: self.settings.slippage_bps,
        };

        let mut quote = self.fetch_quote(&quote_request).await?;
        let mut route = self.extractor.extract(&quote, &request.vault, wrap_native).await?;
        if quote.is_stale(self.settings.quote_ttl) {
            debug!(target: "pipeline", vault = %request.vault, "quote went stale, re-fetching");
            quote = self.fetch_quote(&quote_request).await?;
            route = self.extractor.extract(&quote, &request.vault, wrap_native).await?;
        }

        let swap = self.encode_swap(request, &quote, route)?;
        let estimate = self
            .estimator
            .probe(&swap)
            .await?
            .estimate(self.settings.fee_margin_lamports);
        let transaction = self.assembler.build_final(
            estimate,
            CoverFeeAccounts {
                vault: request.vault,
                owner: request.owner,
                relayer: self.relayer(),
            },
            swap,
        )?;
        let size = transaction.serialized_size()?;

        let signature = if self.settings.dry_run {
            info!(
                target: "pipeline",
                vault = %request.vault,
                kind = ?request.kind,
                amount_in = request.amount,
                fee = estimate.total,
                size,
                "dry run, not broadcasting"
            );
            None
        } else {
            Some(self.submitter.submit(transaction).await?)
        };

        Ok(LegOutcome {
            kind: request.kind,
            signature,
            amount_in: request.amount,
            quoted_out: quote.amount_out,
            min_amount_out: quote.min_amount_out,
            fee: estimate,
            size,
        })
    }

    async fn check_vault_balance(&self, vault: &Pubkey) -> Result<(), RelayError> {
        let available = self
            .with_timeout(Stage::AccountRead, self.rpc.balance(vault))
            .await??;
        if available < self.settings.min_vault_balance {
            return Err(RelayError::InsufficientVaultBalance {
                vault: *vault,
                required: self.settings.min_vault_balance,
                available,
            });
        }
        Ok(())
    }

    async fn check_token_accounts(&self, request: &LegRequest) -> Result<(), RelayError> {
        let vault_input = associated_token_address(&request.vault, &request.input_mint);
        let mut required = vec![("vault input", vault_input)];
        if request.kind == LegKind::Settlement {
            required.push(("vault settlement", request.settlement_account));
            required.push((
                "fee recipient",
                associated_token_address(&self.settings.fee_recipient, &request.input_mint),
            ));
        }

        for (role, account) in required {
            let found = self
                .with_timeout(Stage::AccountRead, self.rpc.account(&account))
                .await??;
            if found.is_none() {
                return Err(RelayError::MissingTokenAccount { role, account });
            }
        }
        Ok(())
    }

    async fn fetch_quote(&self, request: &QuoteRequest) -> Result<Quote, RelayError> {
        self.with_timeout(Stage::Quote, self.aggregator.quote(request))
            .await?
    }

    fn encode_swap(
        &self,
        request: &LegRequest,
        quote: &Quote,
        route: Instruction,
    ) -> Result<Instruction, RelayError> {
        let args = SwapArgs {
            amount_in: request.amount,
            min_amount_out: quote.min_amount_out,
            route: route.data,
        };
        let (call, accounts) = match request.kind {
            LegKind::Settlement => {
                let accounts = SwapToSettlementAccounts::resolve(
                    request.vault,
                    request.owner,
                    request.input_mint,
                    self.settings.settlement_mint,
                    request.settlement_account,
                    self.settings.fee_recipient,
                    self.settings.aggregator_program,
                );
                (
                    VaultCall::SwapToSettlement(args),
                    accounts.to_account_metas(&route.accounts),
                )
            }
            LegKind::FeeToNative => {
                let accounts = SwapFeeToNativeAccounts::resolve(
                    request.vault,
                    request.owner,
                    request.input_mint,
                    self.settings.admin_recipient,
                    self.settings.aggregator_program,
                );
                (
                    VaultCall::SwapFeeToNative(args),
                    accounts.to_account_metas(&route.accounts),
                )
            }
        };
        Ok(call.into_instruction(self.settings.vault_program, accounts)?)
    }

    async fn with_timeout<T, F>(&self, stage: Stage, fut: F) -> Result<T, RelayError>
    where
        F: Future<Output = T>,
    {
        let after = self.settings.stage_timeout;
        timeout(after, fut)
            .await
            .map_err(|_| RelayError::Timeout { stage, after })
    }
}
