//! Hyperbot - Hybrid Maker/Taker Trading Engine
//!
//! CLI surface: `start` runs the engine, `check-config` validates a settings
//! bundle. Exit codes: 0 normal, 1 config invalid, 2 unrecoverable runtime,
//! 130 on SIGINT after graceful close.

use clap::{Parser, Subcommand};
use dotenv::dotenv;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use hyperbot_backend::config::Config;
use hyperbot_backend::engine::TradingEngine;
use hyperbot_backend::error::EngineError;
use hyperbot_backend::market_data::MarketDataStore;
use hyperbot_backend::storage::TradeRecorder;
use hyperbot_backend::transport::{ExecutionTransport, PaperTransport};

const EXIT_CONFIG_INVALID: u8 = 1;
const EXIT_RUNTIME_ERROR: u8 = 2;
const EXIT_SIGINT: u8 = 130;

#[derive(Parser)]
#[command(name = "hyperbot", about = "Hybrid maker/taker trading engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the trading engine.
    Start {
        /// Path to the TOML settings bundle.
        #[arg(long, default_value = "config/engine.toml", env = "HYPERBOT_CONFIG")]
        config: String,
        /// Paper-trading mode: simulated venue, no live orders.
        #[arg(long)]
        paper: bool,
    },
    /// Validate a settings bundle and exit.
    CheckConfig {
        #[arg(long, default_value = "config/engine.toml", env = "HYPERBOT_CONFIG")]
        config: String,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::CheckConfig { config } => check_config(&config),
        Command::Start { config, paper } => start(&config, paper).await,
    }
}

fn check_config(path: &str) -> ExitCode {
    let config = match Config::load(path) {
        Ok(config) => config,
        Err(err) => {
            error!(path, error = %err, "config load failed");
            return ExitCode::from(EXIT_CONFIG_INVALID);
        }
    };
    match config.validate() {
        Ok(()) => {
            info!(path, symbols = ?config.venue.symbols, "config valid");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(path, error = %err, "config invalid");
            ExitCode::from(EXIT_CONFIG_INVALID)
        }
    }
}

async fn start(config_path: &str, paper: bool) -> ExitCode {
    let config = match Config::load(config_path).and_then(|config| {
        config.validate().map_err(anyhow::Error::from)?;
        Ok(config)
    }) {
        Ok(config) => config,
        Err(err) => {
            error!(path = config_path, error = %err, "invalid configuration");
            return ExitCode::from(EXIT_CONFIG_INVALID);
        }
    };

    info!(
        network = if config.venue.use_mainnet { "mainnet" } else { "testnet" },
        symbols = ?config.venue.symbols,
        paper,
        "hyperbot starting"
    );

    if !paper {
        // The live venue adapter plugs in behind ExecutionTransport; this
        // build ships the paper venue only.
        warn!("live transport not configured in this build, running paper venue");
    }
    let transport: Arc<dyn ExecutionTransport> = Arc::new(PaperTransport::new());

    let store = Arc::new(MarketDataStore::new());
    let recorder = match TradeRecorder::open(&config.storage.db_path) {
        Ok(recorder) => Some(recorder),
        Err(err) => {
            warn!(error = %err, "trade recorder unavailable, continuing without persistence");
            None
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut engine = match TradingEngine::new(config, transport, store, recorder, shutdown_rx) {
        Ok(engine) => engine,
        Err(err) => {
            error!(error = %err, "engine construction failed");
            return ExitCode::from(EXIT_CONFIG_INVALID);
        }
    };

    let interrupted = Arc::new(std::sync::atomic::AtomicBool::new(false));
    {
        let interrupted = interrupted.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown signal received");
                interrupted.store(true, std::sync::atomic::Ordering::SeqCst);
                let _ = shutdown_tx.send(true);
            }
        });
    }

    let run_result = engine.run().await;
    match run_result {
        Ok(()) => {
            info!("engine shut down cleanly");
            if interrupted.load(std::sync::atomic::Ordering::SeqCst) {
                ExitCode::from(EXIT_SIGINT)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(EngineError::BreachLatched(reason)) => {
            error!(reason = %reason, "engine stopped on risk breach");
            ExitCode::from(EXIT_RUNTIME_ERROR)
        }
        Err(err) => {
            error!(error = %err, "engine failed");
            ExitCode::from(EXIT_RUNTIME_ERROR)
        }
    }
}
