use anyhow::{bail, Context, Result};
use clap::Parser;
use spreadbot::api::{ApiOutcome, ExchangeClient};
use spreadbot::execution::OrderTracker;
use spreadbot::models::AccountIds;
use spreadbot::settings::Settings;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "spreadbot=info";

/// Buys a single product at a random discount and sells each fill at a fixed markup.
#[derive(Debug, Parser)]
#[command(name = "spreadbot", version)]
struct Args {
    /// TOML settings file (defaults to ./spreadbot.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// tracing filter, used when RUST_LOG is unset
    #[arg(long, default_value = DEFAULT_LOG_FILTER)]
    log_filter: String,

    /// Run a single acquisition + resolution cycle and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    setup_logging(&args.log_filter);

    let settings = Settings::load(args.config.as_deref()).context("Failed to load settings")?;
    let product_id = settings.exchange.product_id();

    tracing::info!("🚀 spreadbot starting for {}", product_id);
    log_configuration(&settings);

    let client = ExchangeClient::from_settings(&settings).context("Failed to build exchange client")?;
    let accounts = resolve_accounts(&client, &settings).await?;

    let mut tracker = OrderTracker::new(client, settings.strategy.clone(), accounts);
    tracker.adopt_open_buys().await;

    if args.once {
        let report = tracker.run_cycle().await;
        tracing::info!(
            buys = report.buys_placed,
            sells = report.sells_placed,
            pending = report.pending,
            "Single cycle finished"
        );
        return Ok(());
    }

    tracing::info!("🔄 Trading loop running, press Ctrl+C to stop");

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
            }
            tracing::info!("⚠️  Received Ctrl+C, shutting down...");
        }
        _ = tracker.run() => {
            tracing::error!("Trading loop exited unexpectedly");
        }
    }

    let unsold = tracker.pending().len();
    if unsold > 0 {
        tracing::warn!(
            "{} buy orders still awaiting a sell; they are re-adopted from open orders on next start",
            unsold
        );
    }
    tracing::info!("👋 spreadbot stopped");
    Ok(())
}

// ============================================================================
// Initialization Functions
// ============================================================================

fn setup_logging(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn log_configuration(settings: &Settings) {
    let strategy = &settings.strategy;
    let resilience = &settings.resilience;

    tracing::info!("📊 Configuration:");
    tracing::info!("  Exchange: {}", settings.exchange.base_url);
    tracing::info!("  Trade amount: {} {}", strategy.trade_amount, settings.exchange.quote_currency);
    tracing::info!(
        "  Buy discount: {} - {}",
        strategy.min_decrease,
        strategy.max_decrease
    );
    tracing::info!("  Sell markup: {}", strategy.markup);
    tracing::info!(
        "  Rate limit: {} calls / {:?}",
        resilience.rate_limit_calls,
        resilience.rate_limit_period()
    );
}

/// Account ids are fixed for the life of the process; without them there is
/// nothing to trade, so failing here stops the bot.
async fn resolve_accounts(client: &ExchangeClient, settings: &Settings) -> Result<AccountIds> {
    let base = &settings.exchange.base_currency;
    let quote = &settings.exchange.quote_currency;

    match client.resolve_account_ids(base, quote).await {
        ApiOutcome::Success(accounts) => {
            tracing::info!(base = %accounts.base, quote = %accounts.quote, "Resolved account ids");
            Ok(accounts)
        }
        ApiOutcome::Empty => bail!("No {} / {} accounts found on the exchange", base, quote),
        ApiOutcome::TransientError(message) => {
            bail!("Could not reach the exchange to list accounts: {}", message)
        }
        ApiOutcome::PermanentError { status, message } => {
            bail!("Listing accounts failed (status {:?}): {}", status, message)
        }
    }
}
