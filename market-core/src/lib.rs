pub mod engine;
pub mod model;
pub mod storage;

pub use model::{CoinQuote, CoinSnapshot};
pub use storage::{MemorySnapshotStore, SnapshotStore, SqliteSnapshotStore};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MarketError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Fetch timed out after {0:?}")]
    FetchTimeout(Duration),

    #[error("Decode error: {0}")]
    Decode(String),
}

pub type Result<T> = std::result::Result<T, MarketError>;

/// Anything that can produce the current list of coin quotes.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn fetch_quotes(&self) -> Result<Vec<CoinQuote>>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    pub scraper: ScraperConfig,
    pub collector: CollectorConfig,
    pub database: DatabaseConfig,
    pub analysis: AnalysisConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    pub url: String,
    pub origin: String,
    pub user_agent: String,
    pub request_timeout_secs: u64,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            url: "https://www.coinspot.com.au/tradecoins".to_string(),
            origin: "https://www.coinspot.com.au".to_string(),
            user_agent: "Mozilla/5.0".to_string(),
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    pub interval_secs: u64,
    pub fetch_timeout_secs: u64,
}

impl CollectorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            interval_secs: 5 * 60,
            fetch_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://marketdata.db".to_string(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Number of most recent snapshots read per analysis.
    pub window_size: usize,
    pub rsi_period: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            window_size: 50,
            rsi_period: 14,
        }
    }
}
