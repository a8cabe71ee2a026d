use async_trait::async_trait;
use solana_sdk::hash::Hash;
use solana_sdk::message::Message;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::Transaction;
use thiserror::Error;

use crate::error::RelayError;

/// Failure at the network boundary, classified for the submitter's retry policy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RpcFailure {
    /// Connection or node trouble; the same request may succeed later.
    #[error("transient RPC failure: {0}")]
    Transient(String),

    /// The transaction references a checkpoint the cluster no longer knows.
    #[error("blockhash not found")]
    BlockhashExpired,

    /// The cluster already holds this exact signed transaction.
    #[error("transaction already processed")]
    AlreadyProcessed,

    /// Simulation or execution failed.
    #[error("{0}")]
    Rejected(String),
}

impl From<RpcFailure> for RelayError {
    fn from(failure: RpcFailure) -> Self {
        match failure {
            RpcFailure::Transient(reason) => RelayError::Rpc(reason),
            RpcFailure::BlockhashExpired => RelayError::Rpc("blockhash not found".to_string()),
            RpcFailure::AlreadyProcessed => {
                RelayError::Rpc("transaction already processed".to_string())
            }
            RpcFailure::Rejected(reason) => RelayError::RejectedByNetwork(reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSnapshot {
    pub owner: Pubkey,
    pub lamports: u64,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureState {
    Pending,
    Confirmed,
    Failed(String),
}

/// Everything the relay needs from the chain.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    async fn latest_checkpoint(&self) -> Result<Hash, RpcFailure>;

    /// Fee the cluster would charge for `message`.
    async fn fee_for_message(&self, message: &Message) -> Result<u64, RpcFailure>;

    async fn balance(&self, address: &Pubkey) -> Result<u64, RpcFailure>;

    async fn account(&self, address: &Pubkey) -> Result<Option<AccountSnapshot>, RpcFailure>;

    async fn send_transaction(&self, transaction: &Transaction) -> Result<Signature, RpcFailure>;

    async fn signature_status(&self, signature: &Signature) -> Result<SignatureState, RpcFailure>;
}
