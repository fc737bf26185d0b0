//! Launch Bundler command line
//!
//! ## Commands
//!
//! - **launch**: create the token and bundle the first-block buys
//! - **gather**: sell and sweep every persisted wallet into the treasury
//! - **sell**: sell one wallet's positions in place
//! - **volume**: start the volume tool on the last launched mint
//!
//! Secrets come from the environment (or a `.env` file) under the variable
//! names configured in `[wallet]`.

// Compiler warning configuration
#![deny(unused_imports)]
#![deny(unused_mut)]
#![deny(unused_variables)]
#![warn(unused_must_use)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use std::sync::Arc;

use launch_bundler::config::Config;
use launch_bundler::launch::TokioProcessRunner;
use launch_bundler::metrics::metrics;
use launch_bundler::wallet::{decode_base58_keypair, WalletManager};
use launch_bundler::{LaunchContext, LaunchOrchestrator};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "launch.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the token and submit the launch bundle
    Launch,
    /// Sweep persisted wallets into the treasury
    Gather {
        /// Also sweep the wallet held in the extra-wallet variable
        #[arg(long)]
        include_extra: bool,
    },
    /// Sell the extra wallet's positions without moving its lamports
    Sell,
    /// Start the volume tool on the most recently launched mint
    Volume,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose)?;

    info!("Launch bundler v{}", env!("CARGO_PKG_VERSION"));
    info!("Loading configuration from: {}", args.config);
    let config = load_config(&args.config)?;
    config.validate().context("Invalid configuration")?;

    let wallet_env = config.wallet.clone();
    let runner = Arc::new(TokioProcessRunner::new());
    let ctx = LaunchContext::production(config, runner.clone()).context("Failed to wire services")?;
    let orchestrator = LaunchOrchestrator::new(ctx);
    info!(context_id = orchestrator.logger().context_id(), "Orchestrator ready");

    match args.command {
        Command::Launch => {
            let treasury = secret_from_env(&wallet_env.treasury_env)?;
            let creator = secret_from_env(&wallet_env.creator_env)?;
            info!(treasury = %treasury.pubkey(), creator = %creator.pubkey(), "Wallets loaded");

            let mut rng = StdRng::from_entropy();
            let report = orchestrator
                .launch(treasury.keypair(), creator.keypair(), &mut rng)
                .await
                .context("Launch failed")?;
            info!(
                mint = %report.mint,
                registry = %report.registry,
                bundle_id = %report.bundle_id,
                bundled = report.wallets_bundled,
                skipped = report.wallets_skipped,
                lamports = report.lamports_distributed,
                "Launch report"
            );
        }
        Command::Gather { include_extra } => {
            let treasury = secret_from_env(&wallet_env.treasury_env)?;
            let extra = if include_extra {
                let secret = std::env::var(&wallet_env.extra_wallet_env)
                    .with_context(|| format!("{} is not set", wallet_env.extra_wallet_env))?;
                Some(decode_base58_keypair(&secret).context("Extra wallet secret is invalid")?)
            } else {
                None
            };
            let report = orchestrator
                .gather(treasury.keypair(), extra)
                .await
                .context("Gather failed")?;
            info!(?report, "Gather report");
        }
        Command::Sell => {
            let wallet = secret_from_env(&wallet_env.extra_wallet_env)?;
            let report = orchestrator.sell(wallet.keypair()).await;
            info!(?report, "Sell report");
        }
        Command::Volume => {
            orchestrator.volume().await.context("Volume tool handoff failed")?;
        }
    }

    // Child processes are killed when the runtime exits, so let them run out
    info!("Waiting for external processes to finish");
    runner.join_all().await;

    debug!("Metrics:\n{}", metrics().render());
    Ok(())
}

/// Initialize logging subsystem
fn init_logging(verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        "launch_bundler=debug,info"
    } else {
        "launch_bundler=info,warn"
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
        dotenvy::dotenv().ok();
        Ok(Config::default())
    }
}

fn secret_from_env(var: &str) -> Result<WalletManager> {
    let secret = std::env::var(var).with_context(|| format!("{} is not set", var))?;
    WalletManager::from_base58(secret.trim()).with_context(|| format!("{} is not a valid secret", var))
}
