use futures::stream::{self, StreamExt};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::events::Deposit;
use super::processed::ProcessedStore;
use super::registry::{VaultRecord, VaultRegistry};
use crate::error::{FailureKind, RelayError};
use crate::pipeline::{FeeLegOutcome, FeeSplitPipeline, LegKind, LegRequest, SwapPipeline};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotAVault,
    SettlementAsset,
    ZeroAmount,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SkipReason::NotAVault => "destination is not a vault",
            SkipReason::SettlementAsset => "already the settlement asset",
            SkipReason::ZeroAmount => "zero amount",
        })
    }
}

#[derive(Debug)]
pub enum DepositOutcome {
    Skipped(SkipReason),
    /// Already claimed by an earlier delivery.
    Duplicate,
    Swapped {
        /// `None` on a dry run.
        signature: Option<Signature>,
        fee_leg: FeeLegOutcome,
    },
    Failed {
        kind: FailureKind,
        error: RelayError,
    },
}

#[derive(Debug)]
pub struct DepositReport {
    pub deposit: Deposit,
    pub outcome: DepositOutcome,
}

/// Per-deposit results in input order. A batch never fails as a whole.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub results: Vec<DepositReport>,
}

impl BatchReport {
    pub fn swapped(&self) -> usize {
        self.count(|o| matches!(o, DepositOutcome::Swapped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, DepositOutcome::Failed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, DepositOutcome::Skipped(_)))
    }

    pub fn duplicates(&self) -> usize {
        self.count(|o| matches!(o, DepositOutcome::Duplicate))
    }

    pub fn signatures(&self) -> Vec<Signature> {
        self.results
            .iter()
            .filter_map(|r| match &r.outcome {
                DepositOutcome::Swapped {
                    signature: Some(signature),
                    ..
                } => Some(*signature),
                _ => None,
            })
            .collect()
    }

    fn count(&self, pred: impl Fn(&DepositOutcome) -> bool) -> usize {
        self.results.iter().filter(|r| pred(&r.outcome)).count()
    }
}

pub struct DepositDispatcher {
    pipeline: Arc<SwapPipeline>,
    fee_split: FeeSplitPipeline,
    registry: Arc<dyn VaultRegistry>,
    store: Arc<dyn ProcessedStore>,
    max_concurrent_vaults: usize,
}

impl DepositDispatcher {
    pub fn new(
        pipeline: Arc<SwapPipeline>,
        registry: Arc<dyn VaultRegistry>,
        store: Arc<dyn ProcessedStore>,
        max_concurrent_vaults: usize,
    ) -> Self {
        Self {
            fee_split: FeeSplitPipeline::new(pipeline.clone()),
            pipeline,
            registry,
            store,
            max_concurrent_vaults: max_concurrent_vaults.max(1),
        }
    }

    /// Deposits to one vault run in order; vaults run concurrently.
    pub async fn dispatch_batch(&self, deposits: Vec<Deposit>) -> BatchReport {
        let mut groups: Vec<Vec<(usize, Deposit)>> = Vec::new();
        let mut by_vault: HashMap<Pubkey, usize> = HashMap::new();
        for (index, deposit) in deposits.into_iter().enumerate() {
            let slot = *by_vault.entry(deposit.destination).or_insert_with(|| {
                groups.push(Vec::new());
                groups.len() - 1
            });
            groups[slot].push((index, deposit));
        }

        let mut results: Vec<(usize, DepositReport)> = stream::iter(groups)
            .map(|group| self.process_group(group))
            .buffer_unordered(self.max_concurrent_vaults)
            .flat_map(stream::iter)
            .collect()
            .await;
        results.sort_by_key(|(index, _)| *index);

        let report = BatchReport {
            results: results.into_iter().map(|(_, report)| report).collect(),
        };
        info!(
            target: "dispatch",
            swapped = report.swapped(),
            failed = report.failed(),
            skipped = report.skipped(),
            duplicates = report.duplicates(),
            "batch processed"
        );
        report
    }

    async fn process_group(&self, group: Vec<(usize, Deposit)>) -> Vec<(usize, DepositReport)> {
        let mut reports = Vec::with_capacity(group.len());
        for (index, deposit) in group {
            let outcome = self.process(&deposit).await;
            reports.push((index, DepositReport { deposit, outcome }));
        }
        reports
    }

    async fn process(&self, deposit: &Deposit) -> DepositOutcome {
        if deposit.amount == 0 {
            return DepositOutcome::Skipped(SkipReason::ZeroAmount);
        }
        if deposit.asset == self.pipeline.settings().settlement_mint {
            return DepositOutcome::Skipped(SkipReason::SettlementAsset);
        }

        let record = match self.registry.resolve(&deposit.destination).await {
            Ok(Some(record)) => record,
            Ok(None) => return DepositOutcome::Skipped(SkipReason::NotAVault),
            Err(error) => return self.failed(deposit, error),
        };

        let key = deposit.key();
        match self.store.claim(&key).await {
            Ok(true) => {}
            Ok(false) => {
                info!(target: "dispatch", key = %key, "duplicate deposit skipped");
                return DepositOutcome::Duplicate;
            }
            Err(error) => return self.failed(deposit, error),
        }

        let outcome = self.swap(deposit, &record).await;
        let keep_claim = match &outcome {
            DepositOutcome::Swapped { .. } => !self.pipeline.settings().dry_run,
            DepositOutcome::Failed { error, .. } => error.is_unknown_outcome(),
            _ => true,
        };
        if !keep_claim {
            if let Err(e) = self.store.release(&key).await {
                warn!(target: "dispatch", key = %key, error = %e, "failed to release deposit claim");
            }
        }
        outcome
    }

    async fn swap(&self, deposit: &Deposit, record: &VaultRecord) -> DepositOutcome {
        let primary = LegRequest {
            kind: LegKind::Settlement,
            vault: record.address,
            owner: record.owner,
            settlement_account: record.settlement_account,
            input_mint: deposit.asset,
            amount: deposit.amount,
        };

        match self.pipeline.run_leg(&primary).await {
            Ok(leg) => {
                info!(
                    target: "dispatch",
                    vault = %record.address,
                    asset = %deposit.asset,
                    amount = deposit.amount,
                    signature = ?leg.signature,
                    "deposit swapped"
                );
                let fee_leg = self.fee_split.run(&primary).await;
                DepositOutcome::Swapped {
                    signature: leg.signature,
                    fee_leg,
                }
            }
            Err(error) => self.failed(deposit, error),
        }
    }

    fn failed(&self, deposit: &Deposit, error: RelayError) -> DepositOutcome {
        let kind = error.kind();
        error!(
            target: "dispatch",
            signature = %deposit.signature,
            vault = %deposit.destination,
            asset = %deposit.asset,
            amount = deposit.amount,
            kind = %kind,
            unknown_outcome = error.is_unknown_outcome(),
            error = %error,
            "deposit failed"
        );
        DepositOutcome::Failed { kind, error }
    }
}
