use config::{Config, Environment, File};
use market_core::{MarketConfig, MarketError, Result};
use std::path::Path;
use tracing::info;

/// Environment variables override file values, e.g.
/// `COIN_MONITOR__COLLECTOR__INTERVAL_SECS=60`.
pub const ENV_PREFIX: &str = "COIN_MONITOR";

pub struct ConfigManager {
    config: Config,
    market_config: MarketConfig,
}

impl ConfigManager {
    /// Loads `path` if it exists, then applies environment overrides. Missing
    /// keys fall back to their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()).required(false))
            .add_source(environment())
            .build()
            .map_err(|e| MarketError::Configuration(e.to_string()))?;

        let market_config: MarketConfig = config
            .clone()
            .try_deserialize()
            .map_err(|e| MarketError::Configuration(e.to_string()))?;

        info!("Configuration loaded from {}", path.as_ref().display());

        Ok(Self {
            config,
            market_config,
        })
    }

    /// Defaults plus environment overrides, ignoring any file on disk.
    pub fn from_env() -> Result<Self> {
        let config = Config::builder()
            .add_source(environment())
            .build()
            .map_err(|e| MarketError::Configuration(e.to_string()))?;

        let market_config: MarketConfig = config
            .clone()
            .try_deserialize()
            .map_err(|e| MarketError::Configuration(e.to_string()))?;

        info!("Configuration loaded from environment");

        Ok(Self {
            config,
            market_config,
        })
    }

    pub fn get_config(&self) -> &MarketConfig {
        &self.market_config
    }

    pub fn get_config_mut(&mut self) -> &mut MarketConfig {
        &mut self.market_config
    }

    /// Discards in-memory edits and re-reads the loaded sources.
    pub fn reload(&mut self) -> Result<()> {
        self.market_config = self
            .config
            .clone()
            .try_deserialize()
            .map_err(|e| MarketError::Configuration(e.to_string()))?;

        info!("Configuration reloaded");
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let config = &self.market_config;

        if config.scraper.url.is_empty() {
            return Err(MarketError::Configuration(
                "Scraper URL not configured".to_string(),
            ));
        }

        if config.scraper.origin.is_empty() {
            return Err(MarketError::Configuration(
                "Scraper origin not configured".to_string(),
            ));
        }

        if config.scraper.request_timeout_secs == 0 || config.collector.fetch_timeout_secs == 0 {
            return Err(MarketError::Configuration(
                "Fetch timeouts must be greater than zero".to_string(),
            ));
        }

        if config.collector.interval_secs == 0 {
            return Err(MarketError::Configuration(
                "Collector interval must be greater than zero".to_string(),
            ));
        }

        if config.database.url.is_empty() {
            return Err(MarketError::Configuration(
                "Database URL not configured".to_string(),
            ));
        }

        if config.analysis.window_size < 2 {
            return Err(MarketError::Configuration(
                "Analysis window must hold at least 2 snapshots".to_string(),
            ));
        }

        info!("Configuration validation passed");
        Ok(())
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(&self.market_config)
            .map_err(|e| MarketError::Configuration(e.to_string()))?;

        std::fs::write(path, yaml).map_err(|e| MarketError::Configuration(e.to_string()))?;

        info!("Configuration saved to file");
        Ok(())
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .try_parsing(true)
}
