use super::chain_client::{AccountSnapshot, ChainRpc, RpcFailure, SignatureState};
use async_trait::async_trait;
use solana_client::client_error::{ClientError, ClientErrorKind};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcSendTransactionConfig;
use solana_sdk::{
    commitment_config::CommitmentConfig,
    hash::Hash,
    message::Message,
    pubkey::Pubkey,
    signature::Signature,
    transaction::{Transaction, TransactionError},
};
use std::time::Duration;

/// [`ChainRpc`] over the nonblocking JSON-RPC client at `confirmed` commitment.
pub struct SolanaRpc {
    rpc_client: RpcClient,
    commitment: CommitmentConfig,
}

impl SolanaRpc {
    pub fn new(rpc_url: String, request_timeout: Duration) -> Self {
        let commitment = CommitmentConfig::confirmed();
        Self {
            rpc_client: RpcClient::new_with_timeout_and_commitment(
                rpc_url,
                request_timeout,
                commitment,
            ),
            commitment,
        }
    }

    pub fn url(&self) -> String {
        self.rpc_client.url()
    }
}

fn classify(err: ClientError) -> RpcFailure {
    if let Some(tx_err) = err.get_transaction_error() {
        return match tx_err {
            TransactionError::BlockhashNotFound => RpcFailure::BlockhashExpired,
            TransactionError::AlreadyProcessed => RpcFailure::AlreadyProcessed,
            other => RpcFailure::Rejected(other.to_string()),
        };
    }
    match err.kind() {
        ClientErrorKind::Io(_) | ClientErrorKind::Reqwest(_) => {
            RpcFailure::Transient(err.to_string())
        }
        _ => {
            let message = err.to_string();
            if message.contains("Blockhash not found") {
                RpcFailure::BlockhashExpired
            } else if message.contains("already been processed") {
                RpcFailure::AlreadyProcessed
            } else {
                RpcFailure::Transient(message)
            }
        }
    }
}

#[async_trait]
impl ChainRpc for SolanaRpc {
    async fn latest_checkpoint(&self) -> Result<Hash, RpcFailure> {
        self.rpc_client
            .get_latest_blockhash()
            .await
            .map_err(classify)
    }

    async fn fee_for_message(&self, message: &Message) -> Result<u64, RpcFailure> {
        self.rpc_client
            .get_fee_for_message(message)
            .await
            .map_err(classify)
    }

    async fn balance(&self, address: &Pubkey) -> Result<u64, RpcFailure> {
        self.rpc_client.get_balance(address).await.map_err(classify)
    }

    async fn account(&self, address: &Pubkey) -> Result<Option<AccountSnapshot>, RpcFailure> {
        let response = self
            .rpc_client
            .get_account_with_commitment(address, self.commitment)
            .await
            .map_err(classify)?;
        Ok(response.value.map(|account| AccountSnapshot {
            owner: account.owner,
            lamports: account.lamports,
            data: account.data,
        }))
    }

    async fn send_transaction(&self, transaction: &Transaction) -> Result<Signature, RpcFailure> {
        let config = RpcSendTransactionConfig {
            skip_preflight: false,
            preflight_commitment: Some(self.commitment.commitment),
            max_retries: Some(0),
            ..RpcSendTransactionConfig::default()
        };
        self.rpc_client
            .send_transaction_with_config(transaction, config)
            .await
            .map_err(classify)
    }

    async fn signature_status(&self, signature: &Signature) -> Result<SignatureState, RpcFailure> {
        let response = self
            .rpc_client
            .get_signature_statuses(&[*signature])
            .await
            .map_err(classify)?;
        let status = response.value.into_iter().next().flatten();
        Ok(match status {
            Some(status) => match status.err {
                Some(err) => SignatureState::Failed(err.to_string()),
                None if status.satisfies_commitment(self.commitment) => SignatureState::Confirmed,
                None => SignatureState::Pending,
            },
            None => SignatureState::Pending,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blockhash_and_duplicate_errors_are_not_transient() {
        let err = ClientError::from(TransactionError::BlockhashNotFound);
        assert_eq!(classify(err), RpcFailure::BlockhashExpired);

        let err = ClientError::from(TransactionError::AlreadyProcessed);
        assert_eq!(classify(err), RpcFailure::AlreadyProcessed);

        let err = ClientError::from(TransactionError::InsufficientFundsForFee);
        assert!(matches!(classify(err), RpcFailure::Rejected(_)));
    }

    #[test]
    fn io_errors_are_transient() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert!(matches!(
            classify(ClientError::from(io)),
            RpcFailure::Transient(_)
        ));
    }
}
