use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;

use vault_swap_lib::{
    associated_token_address, find_vault_address, FeeSplit, VaultAccount, VaultCall,
};
use vault_swap_relay::aggregator::{Aggregator, QuoteRequest};
use vault_swap_relay::client::ChainRpc;
use vault_swap_relay::config::{RelayArgs, RelayConfig};
use vault_swap_relay::logging::setup_logging;
use vault_swap_relay::pipeline::{FeeLegOutcome, FeeSplitPipeline, LegKind, LegRequest};
use vault_swap_relay::service::RelayService;

#[derive(Parser, Debug)]
#[command(name = "vault-cli")]
#[command(about = "Operator tooling for vault auto-swaps", long_about = None)]
struct Cli {
    #[command(flatten)]
    relay: RelayArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show a vault's address, balance and on-chain state
    Vault {
        /// Vault owner
        owner: String,
    },
    /// Quote a swap into the settlement asset and show the fee split
    Quote {
        #[arg(long)]
        input_mint: String,
        /// Amount in the input asset's smallest unit
        #[arg(long)]
        amount: u64,
    },
    /// Swap a vault's deposit now, followed by the fee leg
    Swap {
        /// Vault owner
        owner: String,
        #[arg(long)]
        input_mint: String,
        #[arg(long)]
        amount: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    setup_logging(&cli.relay.log_level, cli.relay.log_json);

    let config = RelayConfig::from_args(&cli.relay)?;
    let service = RelayService::from_config(config)?;
    let program_id = service.config.vault_program;

    match &cli.command {
        Commands::Vault { owner } => {
            let owner = parse_pubkey(owner)?;
            let (vault, bump) = find_vault_address(&owner, &program_id);
            println!("🏦 Vault for {owner}\n");
            println!("   Address: {vault}");
            println!("   Bump: {bump}");

            let balance = service.rpc.balance(&vault).await?;
            println!("   Balance: {balance} lamports");
            if balance < service.config.min_vault_balance {
                println!(
                    "   ⚠️  Below the {} lamport minimum; the relay will refuse to submit",
                    service.config.min_vault_balance
                );
            }

            match service.rpc.account(&vault).await? {
                Some(account) if account.owner == program_id => {
                    let state = VaultAccount::try_from_bytes(&account.data)?;
                    if !state.matches_address(&vault, &program_id) {
                        bail!("account at {vault} does not re-derive from its stored owner");
                    }
                    println!("   Settlement account: {}", state.settlement_account);
                }
                Some(account) => {
                    println!("   ❌ Account is owned by {}, not the vault program", account.owner);
                }
                None => println!("   ❌ Vault has not been initialized"),
            }
        }
        Commands::Quote { input_mint, amount } => {
            let input_mint = parse_pubkey(input_mint)?;
            let request = QuoteRequest {
                input_mint,
                output_mint: service.config.settlement_mint,
                amount: *amount,
                slippage_bps: service.config.slippage_bps,
            };
            println!("💱 Quoting {amount} of {input_mint}...\n");
            let quote = service.aggregator.quote(&request).await?;
            let split = FeeSplit::from_amount_in(*amount);

            println!("   Out amount: {}", quote.amount_out);
            println!("   Min out ({} bps): {}", quote.slippage_bps, quote.min_amount_out);
            println!("   Total fee: {}", split.total_fee);
            println!("   Fee to vault (fee leg): {}", split.fee_to_vault);
            println!("   Admin share: {}", split.admin_share);
        }
        Commands::Swap {
            owner,
            input_mint,
            amount,
        } => {
            let owner = parse_pubkey(owner)?;
            let input_mint = parse_pubkey(input_mint)?;
            let (vault, _) = find_vault_address(&owner, &program_id);
            let settlement_account = match service.rpc.account(&vault).await? {
                Some(account) if account.owner == program_id => {
                    VaultAccount::try_from_bytes(&account.data)?.settlement_account
                }
                _ => associated_token_address(&vault, &service.config.settlement_mint),
            };

            let request = LegRequest {
                kind: LegKind::Settlement,
                vault,
                owner,
                settlement_account,
                input_mint,
                amount: *amount,
            };

            println!("📝 Swapping {amount} of {input_mint} for vault {vault}...\n");
            println!("👤 Relayer: {}", service.pipeline.relayer());
            let leg = service
                .pipeline
                .run_leg(&request)
                .await
                .context("primary swap failed")?;
            println!("   Quoted out: {}", leg.quoted_out);
            println!(
                "   Fee covered: {} lamports ({} + {} margin, {:?})",
                leg.fee.total, leg.fee.base_fee, leg.fee.margin, leg.fee.source
            );
            println!("   Transaction size: {} bytes", leg.size);
            match leg.signature {
                Some(signature) => println!("   Tx signature: {signature}"),
                None => {
                    let call = VaultCall::CoverFee {
                        fee_amount: leg.fee.total,
                    };
                    println!("   coverFee data: {}", hex::encode(call.encode()?));
                    println!("\n✅ Dry run mode - transaction prepared successfully but not sent");
                }
            }

            println!("\n🔀 Fee leg...");
            let fee_leg = FeeSplitPipeline::new(service.pipeline.clone())
                .run(&request)
                .await;
            println!("   {}", fee_leg.summary());
            if let FeeLegOutcome::Failed(_) = fee_leg {
                println!("   ⚠️  Primary swap stands; reconcile the fee leg manually");
            }
        }
    }

    Ok(())
}

fn parse_pubkey(value: &str) -> anyhow::Result<Pubkey> {
    Pubkey::from_str(value).with_context(|| format!("invalid public key {value:?}"))
}
