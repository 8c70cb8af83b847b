//! strack: confidential solar usage tracker
//!
//! drives the sync engine against a ledger gateway and a confidential
//! computation relayer: submit a daily kWh value, reveal your running
//! total, browse the leaderboard and your activity calendar.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::warn;

use solartrack_client::{
    Badge, DeploymentRegistry, GatewayConfig, HttpLedgerClient, HttpRelayerClient, LocalSigner,
    MemoryStorage, SessionKey, SyncEngine, WalletSigner,
};

#[derive(Parser)]
#[command(name = "strack")]
#[command(about = "Confidential solar usage tracker")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// named network (localhost, sepolia)
    #[arg(long, default_value = "localhost")]
    network: String,

    /// override the ledger gateway endpoint
    #[arg(long)]
    ledger: Option<String>,

    /// override the relayer endpoint
    #[arg(long)]
    relayer: Option<String>,

    /// deployments artifact
    #[arg(long, default_value = "deployments.json")]
    deployments: PathBuf,

    /// signer key file (32-byte hex secret, created if missing)
    #[arg(long, default_value = ".strack-key")]
    key: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the current session state
    Status,

    /// Submit today's usage value
    Submit {
        /// kWh produced today
        kwh: u64,

        /// optional note reference (e.g. an IPFS CID)
        #[arg(long, default_value = "")]
        note: String,
    },

    /// Reveal your running total
    Decrypt,

    /// Top contributors by public submission count
    Leaderboard,

    /// Trailing 35-day activity window and longest streak
    Calendar,

    /// List badges, optionally claiming one by id
    Badges {
        #[arg(long)]
        claim: Option<u8>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "strack=info,solartrack_client=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let engine = build_engine(&cli)?;

    match &cli.command {
        Commands::Status => handle_status(&engine).await,
        Commands::Submit { kwh, note } => handle_submit(&engine, *kwh, note).await,
        Commands::Decrypt => handle_decrypt(&engine).await,
        Commands::Leaderboard => handle_leaderboard(&engine).await,
        Commands::Calendar => handle_calendar(&engine).await,
        Commands::Badges { claim } => handle_badges(&engine, *claim).await,
    }
}

fn build_engine(cli: &Cli) -> anyhow::Result<SyncEngine> {
    let mut config = GatewayConfig::named(&cli.network)
        .with_context(|| format!("unknown network {:?}", cli.network))?;
    if let Some(ledger) = &cli.ledger {
        config.ledger_endpoint = ledger.clone();
    }
    if let Some(relayer) = &cli.relayer {
        config.relayer_endpoint = relayer.clone();
    }

    let contract = match DeploymentRegistry::from_file(&cli.deployments) {
        Ok(registry) => registry.resolve(config.chain_id).map(|r| r.address.clone()),
        Err(e) => {
            warn!("deployments artifact unavailable: {e}");
            None
        }
    };

    let signer = load_or_generate_signer(&cli.key)?;
    let account = signer.address();

    let ledger = HttpLedgerClient::new(
        config.ledger_endpoint.clone(),
        contract.clone().unwrap_or_default(),
        account.clone(),
        config.timeout_secs,
    )?;
    let relayer = HttpRelayerClient::new(config.relayer_endpoint.clone(), config.timeout_secs)?;

    Ok(SyncEngine::new(
        SessionKey { account, chain_id: config.chain_id },
        contract,
        Arc::new(ledger),
        Arc::new(relayer),
        Some(Arc::new(signer)),
        Arc::new(MemoryStorage::new()),
    ))
}

fn load_or_generate_signer(path: &PathBuf) -> anyhow::Result<LocalSigner> {
    if path.exists() {
        let hex = std::fs::read_to_string(path)
            .with_context(|| format!("reading key file {}", path.display()))?;
        return Ok(LocalSigner::from_hex(&hex)?);
    }

    let signer = LocalSigner::generate();
    std::fs::write(path, signer.secret_hex())
        .with_context(|| format!("writing key file {}", path.display()))?;
    println!("generated new key for {}", signer.address());
    Ok(signer)
}

async fn handle_status(engine: &SyncEngine) -> anyhow::Result<()> {
    engine.refresh_all().await;
    let state = engine.state().await;
    let session = engine.session().await;

    println!("account:          {}", session.account);
    println!("chain:            {}", session.chain_id);
    println!(
        "contract:         {}",
        engine.contract_address().await.unwrap_or_else(|| "not deployed".into())
    );
    println!("total users:      {}", state.total_users);
    println!("logged today:     {}", state.has_logged_today);
    println!(
        "your handle:      {}",
        state
            .user_total_handle
            .map(|h| h.to_hex())
            .unwrap_or_else(|| "-".into())
    );
    match state.current_clear_user_total() {
        Some(clear) => println!("your total:       {} kWh", clear.clear),
        None => println!("your total:       *** (run `strack decrypt`)"),
    }
    if !state.message.is_empty() {
        println!("status:           {}", state.message);
    }
    Ok(())
}

async fn handle_submit(engine: &SyncEngine, kwh: u64, note: &str) -> anyhow::Result<()> {
    engine.submit_usage(kwh, note).await;
    let state = engine.state().await;
    println!("{}", state.message);
    Ok(())
}

async fn handle_decrypt(engine: &SyncEngine) -> anyhow::Result<()> {
    engine.refresh_user_total_handle().await;
    engine.decrypt_user_total().await;

    let state = engine.state().await;
    match state.current_clear_user_total() {
        Some(clear) => println!("your total: {} kWh", clear.clear),
        None => println!("{}", state.message),
    }
    Ok(())
}

async fn handle_leaderboard(engine: &SyncEngine) -> anyhow::Result<()> {
    let entries = engine.load_leaderboard().await?;
    if entries.is_empty() {
        println!("no contributors yet");
        return Ok(());
    }

    let own_total = engine.own_decrypted_total().await;
    for entry in entries {
        let total = if entry.is_current_user {
            // only your own row may show a decrypted magnitude
            own_total
                .map(|t| format!("{t} kWh"))
                .unwrap_or_else(|| "***".into())
        } else {
            "***".into()
        };
        let marker = if entry.is_current_user { " (you)" } else { "" };
        println!(
            "#{:<4} {}  logs: {:<5} total: {}{}",
            entry.rank, entry.address, entry.log_count, total, marker
        );
    }
    Ok(())
}

async fn handle_calendar(engine: &SyncEngine) -> anyhow::Result<()> {
    let days = engine.load_calendar().await?;
    if days.is_empty() {
        println!("no activity data");
        return Ok(());
    }

    for week in days.chunks(7) {
        let row: String = week
            .iter()
            .map(|d| if d.has_record { " #" } else { " ." })
            .collect();
        println!("{row}");
    }
    println!("longest streak: {} days", solartrack_client::longest_streak(&days));
    Ok(())
}

async fn handle_badges(engine: &SyncEngine, claim: Option<u8>) -> anyhow::Result<()> {
    if let Some(id) = claim {
        let badge = Badge::from_id(id).with_context(|| format!("unknown badge id {id}"))?;
        let receipt = engine.claim_badge(badge).await?;
        println!("claimed {} in tx {}", badge.name(), receipt.tx_hash);
        return Ok(());
    }

    let facts = engine.achievement_facts().await?;
    for badge in Badge::ALL {
        let claimed = engine.has_badge(badge).await.unwrap_or(false);
        let status = if claimed {
            "claimed"
        } else if solartrack_client::eligible(badge, &facts) {
            "earned, unclaimed"
        } else {
            "locked"
        };
        println!("[{}] {:<16} {}", badge.id(), badge.name(), status);
    }
    Ok(())
}
