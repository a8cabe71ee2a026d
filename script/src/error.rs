use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use vault_swap_lib::EncodingError;

/// Pipeline stage that carried an explicit timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Quote,
    RouteInstruction,
    AccountRead,
    Checkpoint,
    FeeProbe,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Quote => "quote",
            Stage::RouteInstruction => "route instruction",
            Stage::AccountRead => "account read",
            Stage::Checkpoint => "checkpoint fetch",
            Stage::FeeProbe => "fee probe",
        };
        f.write_str(name)
    }
}

/// Coarse classification that decides how a caller reacts to a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Aggregator or chain reads failed; nothing was submitted.
    Upstream,
    /// Refused locally before any submission.
    LocalPrecondition,
    /// Broadcast or confirmation trouble; the transaction may have landed.
    NetworkSubmission,
    /// The network executed or simulated the transaction and rejected it.
    RemoteRejection,
    Internal,
}

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No route from {input} to {output}")]
    NoRoute { input: Pubkey, output: Pubkey },

    #[error("Aggregator unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Unexpected aggregator response: {0}")]
    UnexpectedResponse(String),

    #[error("Route transaction carries no instruction for program {0}")]
    InstructionNotFound(Pubkey),

    #[error("Insufficient vault balance for {vault}. Required: {required}, Available: {available}")]
    InsufficientVaultBalance {
        vault: Pubkey,
        required: u64,
        available: u64,
    },

    #[error("Missing {role} token account {account}")]
    MissingTokenAccount { role: &'static str, account: Pubkey },

    #[error("Transaction of {size} bytes exceeds the {max} byte limit")]
    TransactionTooLarge { size: usize, max: usize },

    #[error("{stage} timed out after {after:?}")]
    Timeout { stage: Stage, after: Duration },

    #[error("RPC request failed: {0}")]
    Rpc(String),

    #[error("Broadcast failed after {attempts} attempts: {reason}")]
    Broadcast { attempts: usize, reason: String },

    #[error("Transaction {signature} not confirmed within {after:?}; outcome unknown")]
    ConfirmationTimeout { signature: Signature, after: Duration },

    #[error("Rejected by network: {0}")]
    RejectedByNetwork(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error(transparent)]
    Encoding(#[from] EncodingError),

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl RelayError {
    pub fn kind(&self) -> FailureKind {
        match self {
            RelayError::NoRoute { .. }
            | RelayError::UpstreamUnavailable(_)
            | RelayError::UnexpectedResponse(_)
            | RelayError::InstructionNotFound(_)
            | RelayError::Rpc(_)
            | RelayError::Timeout { .. } => FailureKind::Upstream,
            RelayError::InsufficientVaultBalance { .. }
            | RelayError::MissingTokenAccount { .. }
            | RelayError::TransactionTooLarge { .. } => FailureKind::LocalPrecondition,
            RelayError::Broadcast { .. } | RelayError::ConfirmationTimeout { .. } => {
                FailureKind::NetworkSubmission
            }
            RelayError::RejectedByNetwork(_) => FailureKind::RemoteRejection,
            RelayError::Config(_)
            | RelayError::Signing(_)
            | RelayError::Encoding(_)
            | RelayError::Io(_) => FailureKind::Internal,
        }
    }

    /// The transaction may have executed. Query its status before retrying.
    pub fn is_unknown_outcome(&self) -> bool {
        matches!(
            self,
            RelayError::ConfirmationTimeout { .. } | RelayError::Broadcast { .. }
        )
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Upstream => "upstream",
            FailureKind::LocalPrecondition => "local_precondition",
            FailureKind::NetworkSubmission => "network_submission",
            FailureKind::RemoteRejection => "remote_rejection",
            FailureKind::Internal => "internal",
        };
        f.write_str(name)
    }
}
