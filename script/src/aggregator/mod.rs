//! Swap aggregator boundary: quotes and ready-made route transactions.

pub mod jupiter;
pub mod route;

use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;
use std::time::{Duration, Instant};

use crate::error::RelayError;

pub use jupiter::JupiterClient;
pub use route::{ensure_vault_signer, extract_from_message, RouteInstructionExtractor};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteRequest {
    pub input_mint: Pubkey,
    pub output_mint: Pubkey,
    /// Smallest units of the input asset.
    pub amount: u64,
    pub slippage_bps: u16,
}

/// An aggregator quote. Immutable once fetched; see [`Quote::is_stale`].
#[derive(Debug, Clone)]
pub struct Quote {
    pub input_mint: Pubkey,
    pub output_mint: Pubkey,
    pub amount_in: u64,
    pub amount_out: u64,
    pub min_amount_out: u64,
    pub slippage_bps: u16,
    /// Opaque route descriptor handed back to the aggregator unchanged.
    pub route: serde_json::Value,
    pub fetched_at: Instant,
}

impl Quote {
    pub fn is_stale(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() > ttl
    }
}

/// `amount_out` reduced by `slippage_bps`, rounded down.
pub fn slippage_floor(amount_out: u64, slippage_bps: u16) -> u64 {
    let keep = 10_000u128.saturating_sub(u128::from(slippage_bps));
    (u128::from(amount_out) * keep / 10_000) as u64
}

#[async_trait]
pub trait Aggregator: Send + Sync {
    async fn quote(&self, request: &QuoteRequest) -> Result<Quote, RelayError>;

    /// Serialized transaction executing `quote` with `signer` as the user.
    async fn swap_transaction(
        &self,
        quote: &Quote,
        signer: &Pubkey,
        wrap_native: bool,
    ) -> Result<Vec<u8>, RelayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slippage_floor_rounds_down() {
        assert_eq!(slippage_floor(10_000, 50), 9_950);
        assert_eq!(slippage_floor(199, 50), 198);
        assert_eq!(slippage_floor(u64::MAX, 0), u64::MAX);
        assert_eq!(slippage_floor(1_000, 10_000), 0);
    }
}
