use serde::Serialize;

use crate::constants::{
    ADMIN_SHARE_NUMERATOR, BPS_DENOMINATOR, FEE_BPS, SHARE_DENOMINATOR, VAULT_SHARE_NUMERATOR,
};

/// Protocol fee taken on a primary swap, computed from `amount_in`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeeSplit {
    pub amount_in: u64,
    pub total_fee: u64,
    /// Portion converted to native currency by the fee leg.
    pub fee_to_vault: u64,
    pub admin_share: u64,
}

impl FeeSplit {
    pub fn from_amount_in(amount_in: u64) -> Self {
        let total_fee = mul_div(amount_in, FEE_BPS, BPS_DENOMINATOR);
        let fee_to_vault = mul_div(total_fee, VAULT_SHARE_NUMERATOR, SHARE_DENOMINATOR);
        Self {
            amount_in,
            total_fee,
            fee_to_vault,
            admin_share: total_fee - fee_to_vault,
        }
    }

    pub fn requires_fee_leg(&self) -> bool {
        self.fee_to_vault > 0
    }
}

/// How the program divides native proceeds of the fee leg: `(admin, vault)`.
pub fn split_native_proceeds(received: u64) -> (u64, u64) {
    let admin = mul_div(received, ADMIN_SHARE_NUMERATOR, SHARE_DENOMINATOR);
    (admin, received - admin)
}

// Result never exceeds `value` because every caller passes `numerator <= denominator`.
fn mul_div(value: u64, numerator: u64, denominator: u64) -> u64 {
    (u128::from(value) * u128::from(numerator) / u128::from(denominator)) as u64
}
