use solana_program::pubkey;
use solana_program::pubkey::Pubkey;

/// Vault program that owns every vault PDA.
pub const VAULT_PROGRAM_ID: Pubkey = pubkey!("8FaCEp8fDiBwSiqqg2vmNABvTjVfoe65qZLKT9SNGfhA");

/// Jupiter V6 aggregator program.
pub const JUPITER_V6_PROGRAM_ID: Pubkey = pubkey!("JUP6LkbZbjS1jKKwapdHNy74zcZ3tLUZoi5QNyVTaV4");

/// cbBTC, the default settlement asset.
pub const CBBTC_MINT: Pubkey = pubkey!("cbbtcf3aa214zXHbiAZQwf4122FBYbraNdFqgw4iMij");

/// Wrapped SOL mint, used by the aggregator to denote native output.
pub const NATIVE_MINT: Pubkey = pubkey!("So11111111111111111111111111111111111111112");

pub const TOKEN_PROGRAM_ID: Pubkey = pubkey!("TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA");
pub const ASSOCIATED_TOKEN_PROGRAM_ID: Pubkey =
    pubkey!("ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL");
pub const SYSTEM_PROGRAM_ID: Pubkey = solana_program::system_program::ID;

/// Administrative recipient of the 60% fee share.
pub const ADMIN_RECIPIENT: Pubkey = pubkey!("GongV8jcP3FEP4FejLaXbwuUVewtRLCVY2Uiw8bHVeGC");

pub const VAULT_SEED: &[u8] = b"vault";

pub const FEE_BPS: u64 = 100;
pub const BPS_DENOMINATOR: u64 = 10_000;
pub const VAULT_SHARE_NUMERATOR: u64 = 4;
pub const ADMIN_SHARE_NUMERATOR: u64 = 6;
pub const SHARE_DENOMINATOR: u64 = 10;

/// Lamports a vault must hold before the relay will submit on its behalf.
pub const DEFAULT_MIN_VAULT_BALANCE: u64 = 100_000;
