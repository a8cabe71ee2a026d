use serde::Serialize;
use solana_sdk::hash::Hash;
use solana_sdk::instruction::Instruction;
use solana_sdk::message::Message;
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::warn;

use crate::client::ChainRpc;
use crate::error::{RelayError, Stage};
use crate::retry::retry_async;

pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const CHECKPOINT_ATTEMPTS: usize = 3;
const CHECKPOINT_BACKOFF: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FeeSource {
    Network,
    Fallback,
}

/// First pass: the price of the swap instruction alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeProbe {
    pub checkpoint: Hash,
    pub base_fee: u64,
    pub source: FeeSource,
}

impl FeeProbe {
    /// Second pass: the amount the vault reimburses through `coverFee`.
    pub fn estimate(&self, margin: u64) -> FeeEstimate {
        FeeEstimate {
            checkpoint: self.checkpoint,
            base_fee: self.base_fee,
            margin,
            total: self.base_fee.saturating_add(margin),
            source: self.source,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeEstimate {
    pub checkpoint: Hash,
    pub base_fee: u64,
    pub margin: u64,
    pub total: u64,
    pub source: FeeSource,
}

pub struct FeeEstimator {
    rpc: Arc<dyn ChainRpc>,
    fee_payer: Pubkey,
    fallback_fee: u64,
    probe_timeout: Duration,
    checkpoint_timeout: Duration,
}

impl FeeEstimator {
    pub fn new(
        rpc: Arc<dyn ChainRpc>,
        fee_payer: Pubkey,
        fallback_fee: u64,
        checkpoint_timeout: Duration,
    ) -> Self {
        Self {
            rpc,
            fee_payer,
            fallback_fee,
            probe_timeout: PROBE_TIMEOUT.min(checkpoint_timeout),
            checkpoint_timeout,
        }
    }

    /// Prices a transaction holding only `swap`, paid by the relay.
    ///
    /// A missing checkpoint is an error; a failed price falls back to the
    /// configured constant.
    pub async fn probe(&self, swap: &Instruction) -> Result<FeeProbe, RelayError> {
        let checkpoint = fetch_checkpoint(self.rpc.as_ref(), self.checkpoint_timeout).await?;
        let message =
            Message::new_with_blockhash(std::slice::from_ref(swap), Some(&self.fee_payer), &checkpoint);

        let priced = timeout(self.probe_timeout, self.rpc.fee_for_message(&message)).await;
        let (base_fee, source) = match priced {
            Ok(Ok(fee)) => (fee, FeeSource::Network),
            Ok(Err(e)) => {
                warn!(target: "pipeline", error = %e, fallback = self.fallback_fee, "fee probe failed");
                (self.fallback_fee, FeeSource::Fallback)
            }
            Err(_) => {
                warn!(target: "pipeline", fallback = self.fallback_fee, "fee probe timed out");
                (self.fallback_fee, FeeSource::Fallback)
            }
        };

        Ok(FeeProbe {
            checkpoint,
            base_fee,
            source,
        })
    }
}

/// Latest checkpoint with a per-attempt timeout and bounded retries.
pub async fn fetch_checkpoint(
    rpc: &dyn ChainRpc,
    per_attempt: Duration,
) -> Result<Hash, RelayError> {
    retry_async(
        |_| async move {
            match timeout(per_attempt, rpc.latest_checkpoint()).await {
                Ok(result) => result.map_err(RelayError::from),
                Err(_) => Err(RelayError::Timeout {
                    stage: Stage::Checkpoint,
                    after: per_attempt,
                }),
            }
        },
        CHECKPOINT_ATTEMPTS,
        CHECKPOINT_BACKOFF,
        |e| matches!(e, RelayError::Rpc(_) | RelayError::Timeout { .. }),
    )
    .await
}
