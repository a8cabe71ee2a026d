pub mod aggregator;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod retry;
pub mod service;

pub use error::{FailureKind, RelayError, Stage};
