use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature};
use solana_sdk::signer::Signer;
use solana_sdk::transaction::Transaction;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use super::assembler::SwapTransaction;
use super::fee::fetch_checkpoint;
use crate::client::{ChainRpc, RpcFailure, SignatureState};
use crate::error::RelayError;

#[derive(Debug, Clone)]
pub struct SubmitPolicy {
    pub broadcast_attempts: usize,
    pub initial_backoff: Duration,
    pub confirm_timeout: Duration,
    pub poll_interval: Duration,
    pub checkpoint_timeout: Duration,
}

impl Default for SubmitPolicy {
    fn default() -> Self {
        Self {
            broadcast_attempts: 3,
            initial_backoff: Duration::from_millis(250),
            confirm_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_secs(1),
            checkpoint_timeout: Duration::from_secs(10),
        }
    }
}

/// Signs as fee payer only, broadcasts, and waits for confirmation.
///
/// Checkpoint fetch, signing and broadcast run under one lock per relay
/// identity. Confirmation polling runs outside it.
pub struct RelaySubmitter {
    rpc: Arc<dyn ChainRpc>,
    signer: Arc<Keypair>,
    signing_lock: Mutex<()>,
    policy: SubmitPolicy,
}

impl RelaySubmitter {
    pub fn new(rpc: Arc<dyn ChainRpc>, signer: Arc<Keypair>, policy: SubmitPolicy) -> Self {
        Self {
            rpc,
            signer,
            signing_lock: Mutex::new(()),
            policy,
        }
    }

    pub fn pubkey(&self) -> Pubkey {
        self.signer.pubkey()
    }

    pub async fn submit(&self, mut transaction: SwapTransaction) -> Result<Signature, RelayError> {
        let signature = {
            let _guard = self.signing_lock.lock().await;
            self.sign_and_broadcast(&mut transaction).await?
        };
        info!(target: "relay", signature = %signature, fee = transaction.fee().total, "broadcast accepted");
        self.await_confirmation(signature).await
    }

    async fn sign_and_broadcast(
        &self,
        transaction: &mut SwapTransaction,
    ) -> Result<Signature, RelayError> {
        let checkpoint = match transaction.checkpoint() {
            Some(checkpoint) => checkpoint,
            None => {
                let checkpoint = self.fresh_checkpoint().await?;
                transaction.set_checkpoint(checkpoint);
                checkpoint
            }
        };
        let mut signed = self.sign(transaction, checkpoint)?;

        let attempts = self.policy.broadcast_attempts.max(1);
        let mut delay = self.policy.initial_backoff;
        let mut last_reason = String::new();
        for attempt in 1..=attempts {
            match self.rpc.send_transaction(&signed).await {
                Ok(signature) => return Ok(signature),
                Err(RpcFailure::Rejected(reason)) => {
                    return Err(RelayError::RejectedByNetwork(reason));
                }
                // An earlier send of these exact bytes landed.
                Err(RpcFailure::AlreadyProcessed) => {
                    info!(target: "relay", attempt, "transaction already processed");
                    return signed.signatures.first().copied().ok_or_else(|| {
                        RelayError::Signing("signed transaction carries no signature".to_string())
                    });
                }
                Err(RpcFailure::BlockhashExpired) => {
                    warn!(target: "relay", attempt, "checkpoint expired, re-signing");
                    last_reason = RpcFailure::BlockhashExpired.to_string();
                    let checkpoint = self.fresh_checkpoint().await?;
                    transaction.set_checkpoint(checkpoint);
                    signed = self.sign(transaction, checkpoint)?;
                    continue;
                }
                Err(RpcFailure::Transient(reason)) => {
                    warn!(target: "relay", attempt, error = %reason, "broadcast failed");
                    last_reason = reason;
                }
            }
            if attempt < attempts {
                sleep(delay).await;
                delay = delay.saturating_mul(2);
            }
        }

        Err(RelayError::Broadcast {
            attempts,
            reason: last_reason,
        })
    }

    fn sign(
        &self,
        transaction: &SwapTransaction,
        checkpoint: Hash,
    ) -> Result<Transaction, RelayError> {
        let mut signed = Transaction::new_unsigned(transaction.message(&checkpoint));
        signed
            .try_sign(&[self.signer.as_ref()], checkpoint)
            .map_err(|e| RelayError::Signing(e.to_string()))?;
        Ok(signed)
    }

    async fn fresh_checkpoint(&self) -> Result<Hash, RelayError> {
        fetch_checkpoint(self.rpc.as_ref(), self.policy.checkpoint_timeout).await
    }

    async fn await_confirmation(&self, signature: Signature) -> Result<Signature, RelayError> {
        let after = self.policy.confirm_timeout;
        timeout(after, self.poll_until_final(&signature))
            .await
            .map_err(|_| RelayError::ConfirmationTimeout { signature, after })??;
        Ok(signature)
    }

    async fn poll_until_final(&self, signature: &Signature) -> Result<(), RelayError> {
        loop {
            match self.rpc.signature_status(signature).await {
                Ok(SignatureState::Confirmed) => return Ok(()),
                Ok(SignatureState::Failed(reason)) => {
                    return Err(RelayError::RejectedByNetwork(reason));
                }
                Ok(SignatureState::Pending) => {}
                Err(e) => debug!(target: "relay", signature = %signature, error = %e, "status poll failed"),
            }
            sleep(self.policy.poll_interval).await;
        }
    }
}
