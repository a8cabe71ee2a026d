pub mod dispatcher;
pub mod events;
pub mod processed;
pub mod registry;
pub mod webhook;

pub use dispatcher::{BatchReport, DepositDispatcher, DepositOutcome, DepositReport, SkipReason};
pub use events::{normalize_batch, normalize_event, Deposit};
pub use processed::{FileProcessedStore, MemoryProcessedStore, ProcessedStore};
pub use registry::{OnChainVaultRegistry, StaticVaultRegistry, VaultRecord, VaultRegistry};
pub use webhook::{WebhookListener, WebhookReply};
