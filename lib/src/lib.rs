//! Network-free core of the vault swap relay: program constants, vault
//! address derivation, instruction encoding and fee-split arithmetic.

pub mod accounts;
pub mod constants;
pub mod encoding;
pub mod fee_split;
pub mod vault;

pub use accounts::{CoverFeeAccounts, SwapFeeToNativeAccounts, SwapToSettlementAccounts};
pub use encoding::{get_discriminator, EncodingError, SwapArgs, VaultCall};
pub use fee_split::{split_native_proceeds, FeeSplit};
pub use vault::{associated_token_address, find_vault_address, VaultAccount};
