//! $TREATZ client CLI
//!
//! Thin front over the orchestration engine: place a coin-flip bet, buy
//! raffle tickets, or inspect the connected wallet. Signing uses a local
//! keypair provider configured in `config.toml`.

#![deny(unused_imports)]
#![deny(unused_mut)]
#![warn(unused_must_use)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use treatz_client::config::Config;
use treatz_client::provider::KeypairProvider;
use treatz_client::{BetSide, Engine, SettlementEvent, SubmitOutcome};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Place a coin-flip bet and wait for settlement
    Bet {
        /// Wager in smallest token units
        amount: u64,
        /// TRICK or TREAT
        side: BetSide,
    },
    /// Buy raffle tickets for the current round
    Buy {
        /// Number of tickets
        tickets: u64,
    },
    /// Show the connected wallet's balance
    Balance,
    /// Show the current raffle round
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose)?;

    let config = load_config(&args.config)?;
    let engine = Arc::new(Engine::new(&config)?);

    let keypair_path = config
        .wallet
        .keypair_path
        .as_deref()
        .context("wallet.keypair_path must be set in the config file")?;
    let provider = Arc::new(KeypairProvider::from_file(keypair_path)?);
    engine.registry().register(provider).await;

    let identity = engine.registry().ensure_connected().await?;
    info!(%identity, "wallet connected");

    match args.command {
        Command::Bet { amount, side } => {
            let mut events = engine
                .take_events()
                .await
                .context("event stream already taken")?;
            match engine.place_bet(amount, side).await? {
                SubmitOutcome::Submitted(receipt) => {
                    println!("bet {} submitted, signature {}", receipt.remote_id, receipt.signature);
                    if let Some(hash) = &receipt.commit_hash {
                        println!("fairness commitment: {hash}");
                    }
                    wait_for_settlement(&engine, &mut events).await;
                }
                SubmitOutcome::Ignored => warn!("a bet is already in flight"),
            }
        }
        Command::Buy { tickets } => {
            let mut events = engine
                .take_events()
                .await
                .context("event stream already taken")?;
            match engine.buy_tickets(tickets).await? {
                SubmitOutcome::Submitted(receipt) => {
                    println!(
                        "{tickets} ticket(s) for round {} submitted, signature {}",
                        receipt.remote_id, receipt.signature
                    );
                    wait_for_settlement(&engine, &mut events).await;
                }
                SubmitOutcome::Ignored => warn!("a ticket purchase is already in flight"),
            }
        }
        Command::Balance => match engine.refresh_balance().await? {
            Some(balance) => println!("{identity}: {balance} TREATZ"),
            None => println!("no wallet connected"),
        },
        Command::Status => {
            let remote = engine.remote_config().await?;
            let round = engine.api().current_round().await?;
            println!("round {} ({})", round.round_id, round.status);
            println!(
                "pot: {} base units, ticket price: {} base units",
                round.pot, remote.ticket_price
            );
        }
    }

    engine.shutdown().await;
    Ok(())
}

/// Block until the action settles, times out, or the user interrupts
async fn wait_for_settlement(
    engine: &Engine,
    events: &mut tokio::sync::mpsc::Receiver<SettlementEvent>,
) {
    tokio::select! {
        event = events.recv() => match event {
            Some(SettlementEvent::Settled { outcome, .. }) => {
                println!("settled: {outcome:?}");
            }
            Some(SettlementEvent::TimedOut { action_id }) => {
                println!("{action_id} not settled within the polling budget; check the site later");
            }
            None => warn!("event stream closed before settlement"),
        },
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted; the deposit may still settle server-side");
            engine.shutdown().await;
        }
    }
}

fn init_logging(verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        "treatz_client=debug,info"
    } else {
        "treatz_client=info,warn,error"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    Ok(())
}

/// Load configuration from file with fallback to defaults
fn load_config(path: &str) -> Result<Config> {
    if std::path::Path::new(path).exists() {
        Config::from_file_with_env(path)
            .with_context(|| format!("Failed to load config from {}", path))
    } else {
        warn!("Config file '{}' not found, using defaults", path);
        Ok(Config::default())
    }
}
