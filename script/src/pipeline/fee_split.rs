use std::sync::Arc;
use tracing::{error, info};

use vault_swap_lib::FeeSplit;

use super::swap::{LegKind, LegOutcome, LegRequest, SwapPipeline};
use crate::error::RelayError;

#[derive(Debug)]
pub enum FeeLegOutcome {
    /// The fee rounded down to zero.
    NotRequired,
    Completed(LegOutcome),
    /// Left for manual reconciliation; the primary swap stands.
    Failed(RelayError),
}

impl FeeLegOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, FeeLegOutcome::Failed(_))
    }

    pub fn summary(&self) -> String {
        match self {
            FeeLegOutcome::NotRequired => "not required".to_string(),
            FeeLegOutcome::Completed(leg) => match leg.signature {
                Some(signature) => format!("{} swapped in {signature}", leg.amount_in),
                None => format!("{} built (dry run)", leg.amount_in),
            },
            FeeLegOutcome::Failed(err) => format!("failed ({}): {err}", err.kind()),
        }
    }
}

/// Converts the vault's share of the protocol fee into native currency after
/// a primary swap.
pub struct FeeSplitPipeline {
    pipeline: Arc<SwapPipeline>,
}

impl FeeSplitPipeline {
    pub fn new(pipeline: Arc<SwapPipeline>) -> Self {
        Self { pipeline }
    }

    pub fn plan(primary: &LegRequest) -> Option<LegRequest> {
        let split = FeeSplit::from_amount_in(primary.amount);
        split.requires_fee_leg().then(|| LegRequest {
            kind: LegKind::FeeToNative,
            amount: split.fee_to_vault,
            ..primary.clone()
        })
    }

    pub async fn run(&self, primary: &LegRequest) -> FeeLegOutcome {
        let Some(request) = Self::plan(primary) else {
            return FeeLegOutcome::NotRequired;
        };

        match self.pipeline.run_leg(&request).await {
            Ok(outcome) => {
                info!(
                    target: "pipeline",
                    vault = %request.vault,
                    amount = request.amount,
                    signature = ?outcome.signature,
                    "fee leg completed"
                );
                FeeLegOutcome::Completed(outcome)
            }
            Err(err) => {
                error!(
                    target: "reconcile",
                    owner = %request.owner,
                    vault = %request.vault,
                    asset = %request.input_mint,
                    amount = request.amount,
                    kind = %err.kind(),
                    unknown_outcome = err.is_unknown_outcome(),
                    error = %err,
                    "fee leg failed, needs manual reconciliation"
                );
                FeeLegOutcome::Failed(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::pubkey::Pubkey;

    fn primary(amount: u64) -> LegRequest {
        LegRequest {
            kind: LegKind::Settlement,
            vault: Pubkey::new_unique(),
            owner: Pubkey::new_unique(),
            settlement_account: Pubkey::new_unique(),
            input_mint: Pubkey::new_unique(),
            amount,
        }
    }

    #[test]
    fn plans_fee_leg_from_amount_in() {
        let primary = primary(2_000_000);
        let fee_leg = FeeSplitPipeline::plan(&primary).unwrap();
        assert_eq!(fee_leg.kind, LegKind::FeeToNative);
        assert_eq!(fee_leg.amount, 8_000);
        assert_eq!(fee_leg.input_mint, primary.input_mint);
        assert_eq!(fee_leg.vault, primary.vault);
    }

    #[test]
    fn dust_needs_no_fee_leg() {
        assert!(FeeSplitPipeline::plan(&primary(299)).is_none());
        assert_eq!(FeeSplitPipeline::plan(&primary(300)).unwrap().amount, 1);
    }
}
