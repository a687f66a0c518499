use anyhow::{bail, Result};
use clap::{Parser, Subcommand, ValueEnum};
use market_config::ConfigManager;
use market_core::{
    engine::SnapshotCollector, MarketConfig, MemorySnapshotStore, SnapshotStore,
    SqliteSnapshotStore,
};
use market_indicators::CoinStrengthAnalyzer;
use market_scraper::CoinScraper;
use serde_json::json;
use std::{path::PathBuf, sync::Arc};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Ignore the configuration file and read only COIN_MONITOR__* variables
    #[arg(long, conflicts_with = "config")]
    no_config_file: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Keep snapshots in memory instead of the configured database
    #[arg(long)]
    memory: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Collect snapshots until interrupted
    Run,
    /// Scrape the listing once and print the quotes
    Fetch,
    /// Print stored snapshots, optionally for one coin
    History { coin: Option<String> },
    /// Print the full strength analysis for a coin
    Analyze { coin: String },
    /// Print a single indicator for a coin
    Tool {
        indicator: Indicator,
        coin: String,
        #[arg(long)]
        period: Option<usize>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Indicator {
    Rsi,
    Macd,
    Momentum,
    Volatility,
    Spread,
    Ema,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.debug);

    let manager = if args.no_config_file {
        ConfigManager::from_env()?
    } else {
        ConfigManager::from_file(&args.config)?
    };
    manager.validate()?;
    let config = manager.get_config().clone();

    match args.command {
        Command::Run => {
            let store = init_store(&config, args.memory).await?;
            run_collector(&config, store).await?;
        }
        Command::Fetch => {
            let scraper = CoinScraper::new(&config.scraper)?;
            let coins = scraper.fetch_coin_list().await?;
            print_json(&coins)?;
        }
        Command::History { coin } => {
            let store = init_store(&config, args.memory).await?;
            let snapshots = match coin {
                Some(code) => store.query_code(&code.to_uppercase()).await?,
                None => store.query_all().await?,
            };
            print_json(&snapshots)?;
        }
        Command::Analyze { coin } => {
            let store = init_store(&config, args.memory).await?;
            let analyzer = CoinStrengthAnalyzer::new(store, config.analysis.clone());
            let result = analyzer.evaluate(&coin.to_uppercase()).await?;
            print_json(&result)?;
        }
        Command::Tool {
            indicator,
            coin,
            period,
        } => {
            let store = init_store(&config, args.memory).await?;
            let analyzer = CoinStrengthAnalyzer::new(store, config.analysis.clone());
            let output =
                run_tool(&analyzer, &config, indicator, &coin.to_uppercase(), period).await?;
            print_json(&output)?;
        }
    }

    Ok(())
}

fn init_logging(debug: bool) {
    let env_filter = if debug { "debug" } else { "info" };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn init_store(config: &MarketConfig, memory: bool) -> Result<Arc<dyn SnapshotStore>> {
    if memory {
        info!("Using in-memory snapshot store");
        return Ok(Arc::new(MemorySnapshotStore::new()));
    }

    let store =
        SqliteSnapshotStore::connect(&config.database.url, config.database.max_connections).await?;
    store.run_migrations().await?;

    info!("Database initialized at {}", config.database.url);
    Ok(Arc::new(store))
}

async fn run_collector(config: &MarketConfig, store: Arc<dyn SnapshotStore>) -> Result<()> {
    let scraper = Arc::new(CoinScraper::new(&config.scraper)?);
    let collector = Arc::new(SnapshotCollector::new(
        scraper,
        store,
        config.collector.clone(),
    ));

    let cancel = CancellationToken::new();
    let handle = tokio::spawn({
        let collector = collector.clone();
        let cancel = cancel.clone();
        async move { collector.run(cancel).await }
    });

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            info!("Received terminate signal, shutting down...");
        }
    }

    cancel.cancel();
    handle.await?;

    let status = collector.status();
    info!(
        "Collector stopped after {} successful and {} failed cycles",
        status.cycles_ok, status.cycles_failed
    );
    Ok(())
}

async fn run_tool(
    analyzer: &CoinStrengthAnalyzer,
    config: &MarketConfig,
    indicator: Indicator,
    coin: &str,
    period: Option<usize>,
) -> Result<serde_json::Value> {
    let output = match indicator {
        Indicator::Rsi => {
            let period = period.unwrap_or(config.analysis.rsi_period);
            let rsi = analyzer.rsi(coin, period).await?;
            json!({ "coin": coin, "rsi": rsi, "period": period })
        }
        Indicator::Macd => {
            let (macd, signal) = analyzer.macd(coin).await?;
            json!({ "coin": coin, "macd": macd, "signal": signal })
        }
        Indicator::Momentum => {
            json!({ "coin": coin, "momentum": analyzer.momentum(coin).await? })
        }
        Indicator::Volatility => {
            json!({ "coin": coin, "volatility": analyzer.volatility(coin).await? })
        }
        Indicator::Spread => {
            json!({ "coin": coin, "spread": analyzer.spread(coin).await? })
        }
        Indicator::Ema => {
            let Some(period) = period else {
                bail!("--period is required for the ema tool");
            };
            let ema = analyzer.ema(coin, period).await?;
            json!({ "coin": coin, "period": period, "ema": ema })
        }
    };

    Ok(output)
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
