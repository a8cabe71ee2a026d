pub mod chain_client;
pub mod solana_client;

pub use chain_client::{AccountSnapshot, ChainRpc, RpcFailure, SignatureState};
pub use solana_client::SolanaRpc;
