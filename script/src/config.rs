use clap::Args;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Keypair;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use vault_swap_lib::constants::{
    ADMIN_RECIPIENT, CBBTC_MINT, DEFAULT_MIN_VAULT_BALANCE, JUPITER_V6_PROGRAM_ID,
    VAULT_PROGRAM_ID,
};

use crate::error::RelayError;
use crate::pipeline::{PipelineSettings, SubmitPolicy};

pub const DEFAULT_AGGREGATOR_URL: &str = "https://quote-api.jup.ag/v6";

/// Relay settings shared by every binary. Each flag falls back to an env var.
#[derive(Args, Debug, Clone)]
pub struct RelayArgs {
    /// Solana JSON-RPC endpoint
    #[arg(long, env = "SOLANA_RPC_URL")]
    pub rpc_url: String,

    /// Relay keypair: JSON byte array, base58 string or keypair file path
    #[arg(long, env = "RELAY_PRIVATE_KEY", hide_env_values = true)]
    pub relay_key: String,

    #[arg(long, env = "SETTLEMENT_MINT", default_value_t = CBBTC_MINT.to_string())]
    pub settlement_mint: String,

    #[arg(long, env = "VAULT_PROGRAM_ID", default_value_t = VAULT_PROGRAM_ID.to_string())]
    pub vault_program: String,

    #[arg(long, env = "AGGREGATOR_PROGRAM_ID", default_value_t = JUPITER_V6_PROGRAM_ID.to_string())]
    pub aggregator_program: String,

    #[arg(long, env = "AGGREGATOR_URL", default_value = DEFAULT_AGGREGATOR_URL)]
    pub aggregator_url: String,

    /// Receives 60% of the native proceeds of the fee leg
    #[arg(long, env = "ADMIN_RECIPIENT", default_value_t = ADMIN_RECIPIENT.to_string())]
    pub admin_recipient: String,

    /// Owner of the token accounts that collect the input-asset fee (defaults to the admin)
    #[arg(long, env = "FEE_RECIPIENT")]
    pub fee_recipient: Option<String>,

    /// Minimum vault lamports before the relay submits on its behalf
    #[arg(long, env = "MIN_VAULT_BALANCE", default_value_t = DEFAULT_MIN_VAULT_BALANCE)]
    pub min_vault_balance: u64,

    #[arg(long, env = "SLIPPAGE_BPS", default_value_t = 50)]
    pub slippage_bps: u16,

    #[arg(long, env = "MAX_ROUTE_ACCOUNTS", default_value_t = 20)]
    pub max_route_accounts: usize,

    #[arg(long = "fee-margin", env = "FEE_MARGIN_LAMPORTS", default_value_t = 5_000)]
    pub fee_margin_lamports: u64,

    #[arg(long = "fallback-fee", env = "FALLBACK_FEE_LAMPORTS", default_value_t = 10_000)]
    pub fallback_fee_lamports: u64,

    #[arg(long, env = "BROADCAST_ATTEMPTS", default_value_t = 3)]
    pub broadcast_attempts: usize,

    #[arg(long, env = "CONFIRM_TIMEOUT_SECS", default_value_t = 60)]
    pub confirm_timeout_secs: u64,

    #[arg(long, env = "POLL_INTERVAL_MS", default_value_t = 1_000)]
    pub poll_interval_ms: u64,

    /// Timeout applied to quote, route, account-read and checkpoint requests
    #[arg(long, env = "STAGE_TIMEOUT_SECS", default_value_t = 10)]
    pub stage_timeout_secs: u64,

    #[arg(long, env = "QUOTE_TTL_SECS", default_value_t = 20)]
    pub quote_ttl_secs: u64,

    /// Ask the aggregator to wrap/unwrap SOL on the fee leg
    #[arg(
        long,
        env = "WRAP_NATIVE_FEE_LEG",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub wrap_native_fee_leg: bool,

    /// Comma-separated vault owners; empty means on-chain vault lookup
    #[arg(long, env = "VAULT_OWNERS", value_delimiter = ',')]
    pub vault_owners: Vec<String>,

    /// Journal of processed deposits; empty means in-memory only
    #[arg(long, env = "PROCESSED_STORE")]
    pub processed_store: Option<PathBuf>,

    #[arg(long, env = "MAX_CONCURRENT_VAULTS", default_value_t = 8)]
    pub max_concurrent_vaults: usize,

    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,

    #[arg(long, env = "LOG_JSON")]
    pub log_json: bool,

    /// Build and price transactions without broadcasting
    #[arg(long)]
    pub dry_run: bool,
}

/// Validated configuration. Built once at startup from [`RelayArgs`].
pub struct RelayConfig {
    pub rpc_url: String,
    pub relay_keypair: Arc<Keypair>,
    pub settlement_mint: Pubkey,
    pub vault_program: Pubkey,
    pub aggregator_program: Pubkey,
    pub aggregator_url: String,
    pub admin_recipient: Pubkey,
    pub fee_recipient: Pubkey,
    pub min_vault_balance: u64,
    pub slippage_bps: u16,
    pub max_route_accounts: usize,
    pub fee_margin_lamports: u64,
    pub fallback_fee_lamports: u64,
    pub broadcast_attempts: usize,
    pub confirm_timeout: Duration,
    pub poll_interval: Duration,
    pub stage_timeout: Duration,
    pub quote_ttl: Duration,
    pub wrap_native_fee_leg: bool,
    pub vault_owners: Vec<Pubkey>,
    pub processed_store: Option<PathBuf>,
    pub max_concurrent_vaults: usize,
    pub dry_run: bool,
}

impl RelayConfig {
    pub fn from_args(args: &RelayArgs) -> Result<Self, RelayError> {
        let relay_keypair = load_relay_keypair(&args.relay_key)?;
        let admin_recipient = parse_pubkey("ADMIN_RECIPIENT", &args.admin_recipient)?;
        let fee_recipient = match args.fee_recipient.as_deref() {
            Some(value) if !value.trim().is_empty() => parse_pubkey("FEE_RECIPIENT", value)?,
            _ => admin_recipient,
        };

        if args.broadcast_attempts == 0 {
            return Err(RelayError::Config(
                "BROADCAST_ATTEMPTS must be at least 1".to_string(),
            ));
        }
        if args.max_concurrent_vaults == 0 {
            return Err(RelayError::Config(
                "MAX_CONCURRENT_VAULTS must be at least 1".to_string(),
            ));
        }
        if args.slippage_bps > 10_000 {
            return Err(RelayError::Config(format!(
                "SLIPPAGE_BPS must be at most 10000, got {}",
                args.slippage_bps
            )));
        }

        let vault_owners = args
            .vault_owners
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| parse_pubkey("VAULT_OWNERS", s))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            rpc_url: args.rpc_url.clone(),
            relay_keypair: Arc::new(relay_keypair),
            settlement_mint: parse_pubkey("SETTLEMENT_MINT", &args.settlement_mint)?,
            vault_program: parse_pubkey("VAULT_PROGRAM_ID", &args.vault_program)?,
            aggregator_program: parse_pubkey("AGGREGATOR_PROGRAM_ID", &args.aggregator_program)?,
            aggregator_url: args.aggregator_url.trim_end_matches('/').to_string(),
            admin_recipient,
            fee_recipient,
            min_vault_balance: args.min_vault_balance,
            slippage_bps: args.slippage_bps,
            max_route_accounts: args.max_route_accounts,
            fee_margin_lamports: args.fee_margin_lamports,
            fallback_fee_lamports: args.fallback_fee_lamports,
            broadcast_attempts: args.broadcast_attempts,
            confirm_timeout: Duration::from_secs(args.confirm_timeout_secs),
            poll_interval: Duration::from_millis(args.poll_interval_ms.max(1)),
            stage_timeout: Duration::from_secs(args.stage_timeout_secs.max(1)),
            quote_ttl: Duration::from_secs(args.quote_ttl_secs),
            wrap_native_fee_leg: args.wrap_native_fee_leg,
            vault_owners,
            processed_store: args
                .processed_store
                .clone()
                .filter(|p| !p.as_os_str().is_empty()),
            max_concurrent_vaults: args.max_concurrent_vaults,
            dry_run: args.dry_run,
        })
    }

    pub fn submit_policy(&self) -> SubmitPolicy {
        SubmitPolicy {
            broadcast_attempts: self.broadcast_attempts,
            confirm_timeout: self.confirm_timeout,
            poll_interval: self.poll_interval,
            checkpoint_timeout: self.stage_timeout,
            ..SubmitPolicy::default()
        }
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            vault_program: self.vault_program,
            aggregator_program: self.aggregator_program,
            settlement_mint: self.settlement_mint,
            admin_recipient: self.admin_recipient,
            fee_recipient: self.fee_recipient,
            min_vault_balance: self.min_vault_balance,
            slippage_bps: self.slippage_bps,
            fee_margin_lamports: self.fee_margin_lamports,
            fallback_fee_lamports: self.fallback_fee_lamports,
            stage_timeout: self.stage_timeout,
            quote_ttl: self.quote_ttl,
            wrap_native_fee_leg: self.wrap_native_fee_leg,
            dry_run: self.dry_run,
        }
    }
}

fn parse_pubkey(name: &str, value: &str) -> Result<Pubkey, RelayError> {
    Pubkey::from_str(value.trim())
        .map_err(|e| RelayError::Config(format!("{name}: invalid public key {value:?}: {e}")))
}

/// Accepts a JSON byte array, a base58 secret key, or a path to a keypair file.
pub fn load_relay_keypair(private_key_str: &str) -> Result<Keypair, RelayError> {
    let trimmed = private_key_str.trim();
    if trimmed.starts_with('[') {
        return keypair_from_json(trimmed, "Relay keypair");
    }

    if let Ok(bytes) = bs58::decode(trimmed).into_vec() {
        if bytes.len() == 64 {
            return keypair_from_bytes(&bytes);
        }
    }

    if let Ok(contents) = fs::read_to_string(trimmed) {
        return keypair_from_json(contents.trim(), "Relay keypair file");
    }

    Err(RelayError::Config(
        "Invalid relay private key format. Expected JSON array, base58 string, or file path"
            .to_string(),
    ))
}

fn keypair_from_json(json: &str, what: &str) -> Result<Keypair, RelayError> {
    let bytes: Vec<u8> = serde_json::from_str(json)
        .map_err(|e| RelayError::Config(format!("{what} is not a JSON byte array: {e}")))?;
    if bytes.len() != 64 {
        return Err(RelayError::Config(format!(
            "{what} must contain 64 bytes, got {}",
            bytes.len()
        )));
    }
    keypair_from_bytes(&bytes)
}

fn keypair_from_bytes(bytes: &[u8]) -> Result<Keypair, RelayError> {
    Keypair::from_bytes(bytes).map_err(|e| RelayError::Config(format!("Invalid keypair: {e}")))
}
