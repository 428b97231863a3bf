use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use eth1_mock_rpc::chain::{self, keystore};
use eth1_mock_rpc::config::AppConfig;
use eth1_mock_rpc::context::AppContext;
use eth1_mock_rpc::core::{ControlLoop, Readiness, load_deposits, spawn_stdin_reader};
use eth1_mock_rpc::logging::{self, LogConfig};
use eth1_mock_rpc::web::MockServer;
use serde::Serialize;
use tracing::info;

#[derive(Parser)]
#[command(name = "eth1-mock-rpc")]
#[command(about = "Mock eth1 JSON-RPC node for beacon chain testing", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP and WebSocket JSON-RPC listeners
    Serve(ServeArgs),
    /// Write a synthetic validator keystore
    Keygen(KeygenArgs),
}

#[derive(Args, Serialize)]
struct ServeArgs {
    /// Path to a validator keystore directory
    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    keystore_path: Option<PathBuf>,

    /// Password unlocking the validator keystore directory
    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    password: Option<String>,

    /// Port on which to serve HTTP listeners
    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    http_port: Option<u16>,

    /// Port on which to serve WebSocket listeners
    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    ws_port: Option<u16>,

    /// Recalculate deposits into the cache from the keystore
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    #[arg(long)]
    invalidate_cache: bool,

    /// Number of deposits to read from the keystore to trigger the genesis event
    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    genesis_deposits: Option<usize>,

    /// Logging verbosity (trace, debug, info, warn, error)
    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    verbosity: Option<String>,

    /// Emit logs as JSON
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    #[arg(long)]
    json_logs: bool,

    /// Seconds between chain heads pushed to subscribers
    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    tick_interval_secs: Option<u64>,

    /// Location of the deposit cache
    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    cache_path: Option<PathBuf>,
}

#[derive(Args)]
struct KeygenArgs {
    /// Directory to write key files into
    #[arg(long)]
    keystore_path: PathBuf,

    /// Password to encrypt the key files with
    #[arg(long)]
    password: String,

    /// Number of validators to generate
    #[arg(long, default_value_t = 64)]
    count: usize,

    /// PBKDF2 iterations used to stretch the password
    #[arg(long, default_value_t = keystore::DEFAULT_PBKDF2_ROUNDS)]
    kdf_rounds: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => {
            let config = AppConfig::new(Some(&args)).context("Invalid configuration")?;
            logging::init(LogConfig::from_verbosity(&config.verbosity, config.json_logs)?);
            run_server(config).await.context("Failed to run mock server")?
        }
        Commands::Keygen(args) => {
            logging::init(LogConfig::default());
            run_keygen(args).await.context("Failed to generate keystore")?
        }
    }

    Ok(())
}

async fn run_server(config: AppConfig) -> Result<()> {
    config.validate()?;

    let deposits = load_deposits(&config.load_options()).await?;
    info!(count = deposits.len(), "Successfully loaded deposit keys");

    if config.genesis_deposits > deposits.len() {
        bail!(
            "Number of --genesis-deposits {} > number of deposits found in keystore directory {}",
            config.genesis_deposits,
            deposits.len()
        );
    }

    let logs = chain::deposit_event_logs(&deposits);
    let readiness = Readiness::new(deposits, logs, config.genesis_deposits)?;
    let ctx = AppContext::new(config, readiness);
    info!(genesis_time = ctx.genesis_time, "Synthetic genesis time set");

    let server = MockServer::bind(ctx.clone()).await?;

    let control = ControlLoop::new(ctx.readiness.clone());
    let lines = spawn_stdin_reader();
    tokio::spawn(async move { control.run(lines).await });

    let shutdown = server.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received interrupt, shutting down");
            shutdown.cancel();
        }
    });

    server.start().await
}

async fn run_keygen(args: KeygenArgs) -> Result<()> {
    let KeygenArgs {
        keystore_path,
        password,
        count,
        kdf_rounds,
    } = args;

    let dir = keystore_path.clone();
    let paths = tokio::task::spawn_blocking(move || {
        keystore::create_keystore(&dir, &password, count, kdf_rounds)
    })
    .await??;

    info!(count = paths.len(), path = %keystore_path.display(), "Wrote keystore");
    Ok(())
}
