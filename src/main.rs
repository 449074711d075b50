//! swapguard - autonomous swap execution and position risk engine
//!
//! # WARNING
//! - This bot trades with real money. Only use funds you can afford to lose.
//! - Stop-loss and take-profit are best-effort: fast moves can gap through
//!   a level between polling cycles.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{error, info, warn};

use swapguard::config::Config;
use swapguard::engine::{CommandHandle, NoEntry, TradeEngine};
use swapguard::feed::HttpMarketFeed;
use swapguard::notify::LogAlertSink;
use swapguard::swap::jupiter::SwapApi;
use swapguard::swap::{JupiterClient, RpcBroadcaster, SwapExecutor};
use swapguard::wallet::{LocalWallet, TxSigner};

/// Autonomous swap execution and position risk engine
#[derive(Parser)]
#[command(name = "swapguard")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the trading engine
    Start {
        /// Run without broadcasting transactions
        #[arg(long)]
        dry_run: bool,
    },

    /// Show current configuration (secrets masked)
    Config,

    /// Fetch and print a quote (debugging aid)
    Quote {
        /// Input mint address
        input_mint: String,

        /// Output mint address
        output_mint: String,

        /// Input amount in atomic units
        amount: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("swapguard=info".parse().unwrap()),
        )
        .with_target(true)
        .init();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    match cli.command {
        Commands::Start { dry_run } => start(config, dry_run).await,
        Commands::Config => {
            println!("{}", config.masked_display());
            Ok(())
        }
        Commands::Quote {
            input_mint,
            output_mint,
            amount,
        } => quote(config, &input_mint, &output_mint, amount).await,
    }
}

/// Start the engine and run until interrupted
async fn start(config: Config, dry_run: bool) -> Result<()> {
    if dry_run {
        warn!("Running in DRY-RUN mode - no transactions will be broadcast");
    }

    info!(
        "Starting engine: {} watch token(s), cycle every {}s",
        config.engine.watch_tokens.len(),
        config.engine.cycle_interval_secs
    );

    let wallet = Arc::new(LocalWallet::load(&config.wallet)?);
    info!("Wallet: {}", wallet.pubkey());

    let api = Arc::new(JupiterClient::new(&config.aggregator)?);
    let broadcaster = Arc::new(RpcBroadcaster::new(&config.rpc, config.swap.skip_preflight)?);
    let feed = Arc::new(HttpMarketFeed::new(&config.feed)?);

    let executor = SwapExecutor::new(
        api,
        broadcaster.clone(),
        wallet.clone(),
        &config.swap,
        dry_run,
    );

    let wallet_pubkey = wallet.pubkey();
    let mut engine = TradeEngine::new(
        config,
        executor,
        broadcaster,
        feed,
        Arc::new(LogAlertSink),
        Arc::new(NoEntry),
        wallet_pubkey,
        dry_run,
    );

    // The handle is where a command frontend (Telegram, HTTP, ...) would
    // plug in; keeping it alive keeps the engine running.
    let (_handle, cmd_rx) = CommandHandle::channel(32);

    tokio::select! {
        _ = engine.run(cmd_rx) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    Ok(())
}

/// Fetch a single quote and print it
async fn quote(config: Config, input_mint: &str, output_mint: &str, amount: u64) -> Result<()> {
    let api = JupiterClient::new(&config.aggregator)?;
    let quote = api
        .get_quote(input_mint, output_mint, amount, config.swap.slippage_bps)
        .await?;

    println!("Quote: {} -> {}", quote.input_mint, quote.output_mint);
    println!("  in:  {}", quote.in_amount);
    println!("  out: {}", quote.out_amount);
    println!("  slippage: {}bps", quote.slippage_bps);
    println!("  price impact: {:.4}%", quote.price_impact_pct);

    Ok(())
}
