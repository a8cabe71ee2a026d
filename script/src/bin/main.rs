//! Long-running relay: receives deposit notifications and swaps vault deposits
//! into the settlement asset.
//!
//! ```shell
//! RUST_LOG=info cargo run --release --bin vault-relay -- serve --listen 0.0.0.0:8080
//! ```
//! or, for a one-off batch:
//! ```shell
//! cargo run --bin vault-relay -- --dry-run dispatch --events events.json
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use vault_swap_relay::config::{RelayArgs, RelayConfig};
use vault_swap_relay::dispatch::{normalize_batch, DepositOutcome, WebhookListener};
use vault_swap_relay::logging::setup_logging;
use vault_swap_relay::service::RelayService;

#[derive(Parser, Debug)]
#[command(name = "vault-relay")]
#[command(about = "Relay that swaps vault deposits into the settlement asset", long_about = None)]
struct Cli {
    #[command(flatten)]
    relay: RelayArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Listen for deposit notification webhooks
    Serve {
        #[arg(long, env = "WEBHOOK_LISTEN", default_value = "0.0.0.0:8080")]
        listen: SocketAddr,

        /// Expected Authorization header value
        #[arg(long, env = "WEBHOOK_AUTH_TOKEN", hide_env_values = true)]
        auth_token: Option<String>,
    },
    /// Process a JSON file of notification events once
    Dispatch {
        #[arg(short, long)]
        events: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    setup_logging(&cli.relay.log_level, cli.relay.log_json);

    let config = RelayConfig::from_args(&cli.relay)?;
    let service = RelayService::from_config(config)?;
    let dispatcher = Arc::new(service.dispatcher().await?);

    match cli.command {
        Commands::Serve { listen, auth_token } => {
            let listener = WebhookListener::bind(listen, dispatcher, auth_token).await?;
            listener
                .run(async {
                    tokio::signal::ctrl_c().await.ok();
                    info!(target: "relay", "shutting down");
                })
                .await?;
        }
        Commands::Dispatch { events } => {
            let raw = tokio::fs::read_to_string(&events)
                .await
                .with_context(|| format!("reading {}", events.display()))?;
            let payload: serde_json::Value =
                serde_json::from_str(&raw).context("events file is not JSON")?;
            let deposits = normalize_batch(&payload);
            println!("📥 {} deposit(s) in {}\n", deposits.len(), events.display());

            let report = dispatcher.dispatch_batch(deposits).await;
            for result in &report.results {
                let deposit = &result.deposit;
                match &result.outcome {
                    DepositOutcome::Skipped(reason) => {
                        println!("⏭️  {deposit}: skipped, {reason}");
                    }
                    DepositOutcome::Duplicate => println!("🔁 {deposit}: already processed"),
                    DepositOutcome::Swapped { signature, fee_leg } => {
                        match signature {
                            Some(signature) => println!("✅ {deposit}: swapped in {signature}"),
                            None => println!("🔍 {deposit}: dry run, transaction built"),
                        }
                        println!("   Fee leg: {}", fee_leg.summary());
                    }
                    DepositOutcome::Failed { kind, error } => {
                        println!("❌ {deposit}: {kind} failure: {error}");
                    }
                }
            }
            println!(
                "\n📊 swapped {}, failed {}, skipped {}, duplicate {}",
                report.swapped(),
                report.failed(),
                report.skipped(),
                report.duplicates()
            );
        }
    }

    Ok(())
}
