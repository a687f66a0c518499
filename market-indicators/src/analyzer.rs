use crate::{
    metrics::{self, round2},
    AnalysisResult, Candle,
};
use market_core::{AnalysisConfig, Result, SnapshotStore};
use std::sync::Arc;
use tracing::debug;

/// Reads the recent window for one coin and derives its strength indicators.
/// Never writes to the store.
pub struct CoinStrengthAnalyzer {
    store: Arc<dyn SnapshotStore>,
    config: AnalysisConfig,
}

impl CoinStrengthAnalyzer {
    pub fn new(store: Arc<dyn SnapshotStore>, config: AnalysisConfig) -> Self {
        Self { store, config }
    }

    /// Most recent `window_size` candles for `code`, newest first.
    pub async fn raw_history(&self, code: &str) -> Result<Vec<Candle>> {
        let snapshots = self.store.query_recent(code, self.config.window_size).await?;
        debug!("Loaded {} snapshots for {}", snapshots.len(), code);

        Ok(snapshots.iter().map(Candle::from_snapshot).collect())
    }

    pub async fn evaluate(&self, code: &str) -> Result<AnalysisResult> {
        let data = self.raw_history(code).await?;
        Ok(self.evaluate_window(code, &data))
    }

    pub fn evaluate_window(&self, code: &str, data: &[Candle]) -> AnalysisResult {
        let momentum = metrics::momentum(data);
        let volatility = metrics::volatility(data);
        let spread = metrics::average_spread(data);
        let rsi = metrics::rsi(data, self.config.rsi_period);
        let (macd, signal) = metrics::macd(data);
        let strength = metrics::strength_score(momentum, volatility, spread);
        let strategy = metrics::derive_strategy(strength, momentum, rsi, macd, signal);

        AnalysisResult {
            coin: code.to_string(),
            momentum: round2(momentum),
            volatility: round2(volatility),
            spread: round2(spread),
            rsi: round2(rsi),
            macd: round2(macd),
            signal: round2(signal),
            strength: round2(strength),
            strategy,
        }
    }

    pub async fn rsi(&self, code: &str, period: usize) -> Result<f64> {
        Ok(metrics::rsi(&self.raw_history(code).await?, period))
    }

    pub async fn macd(&self, code: &str) -> Result<(f64, f64)> {
        Ok(metrics::macd(&self.raw_history(code).await?))
    }

    pub async fn momentum(&self, code: &str) -> Result<f64> {
        Ok(metrics::momentum(&self.raw_history(code).await?))
    }

    pub async fn volatility(&self, code: &str) -> Result<f64> {
        Ok(metrics::volatility(&self.raw_history(code).await?))
    }

    pub async fn spread(&self, code: &str) -> Result<f64> {
        Ok(metrics::average_spread(&self.raw_history(code).await?))
    }

    pub async fn ema(&self, code: &str, period: usize) -> Result<f64> {
        Ok(metrics::ema(&self.raw_history(code).await?, period))
    }
}
