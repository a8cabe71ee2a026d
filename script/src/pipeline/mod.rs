//! quote → route → encode → probe → assemble → submit.

pub mod assembler;
pub mod fee;
pub mod fee_split;
pub mod relay;
pub mod swap;

use solana_sdk::pubkey::Pubkey;
use std::time::Duration;

pub use assembler::{SwapTransaction, SwapTransactionAssembler, PACKET_DATA_SIZE};
pub use fee::{FeeEstimate, FeeEstimator, FeeProbe, FeeSource};
pub use fee_split::{FeeLegOutcome, FeeSplitPipeline};
pub use relay::{RelaySubmitter, SubmitPolicy};
pub use swap::{LegKind, LegOutcome, LegRequest, SwapPipeline};

/// Knobs for one swap leg, independent of the signer and transports.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub vault_program: Pubkey,
    pub aggregator_program: Pubkey,
    pub settlement_mint: Pubkey,
    pub admin_recipient: Pubkey,
    pub fee_recipient: Pubkey,
    pub min_vault_balance: u64,
    pub slippage_bps: u16,
    pub fee_margin_lamports: u64,
    pub fallback_fee_lamports: u64,
    pub stage_timeout: Duration,
    pub quote_ttl: Duration,
    pub wrap_native_fee_leg: bool,
    pub dry_run: bool,
}
