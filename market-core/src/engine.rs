use crate::{
    CoinSnapshot, CollectorConfig, MarketError, QuoteSource, Result, SnapshotStore,
};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CollectorState {
    Idle,
    Fetching,
    Mapping,
    Persisting,
    Sleeping,
    Stopped,
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectorStatus {
    pub state: CollectorState,
    pub cycles_ok: u64,
    pub cycles_failed: u64,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl Default for CollectorStatus {
    fn default() -> Self {
        Self {
            state: CollectorState::Idle,
            cycles_ok: 0,
            cycles_failed: 0,
            last_success_at: None,
            last_error: None,
        }
    }
}

/// Background loop that scrapes quotes on a fixed delay and appends them to
/// the snapshot store. A failed cycle is logged and the loop carries on.
pub struct SnapshotCollector {
    source: Arc<dyn QuoteSource>,
    store: Arc<dyn SnapshotStore>,
    config: CollectorConfig,
    status: Arc<RwLock<CollectorStatus>>,
}

impl SnapshotCollector {
    pub fn new(
        source: Arc<dyn QuoteSource>,
        store: Arc<dyn SnapshotStore>,
        config: CollectorConfig,
    ) -> Self {
        Self {
            source,
            store,
            config,
            status: Arc::new(RwLock::new(CollectorStatus::default())),
        }
    }

    pub fn status(&self) -> CollectorStatus {
        self.status.read().clone()
    }

    fn transition(&self, state: CollectorState) {
        debug!("Collector state -> {:?}", state);
        self.status.write().state = state;
    }

    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            "Snapshot collector started (interval {:?}, fetch timeout {:?})",
            self.config.interval(),
            self.config.fetch_timeout()
        );

        while !cancel.is_cancelled() {
            let outcome = tokio::select! {
                _ = cancel.cancelled() => break,
                outcome = self.run_cycle() => outcome,
            };

            match outcome {
                Ok(saved) => {
                    let now = Utc::now();
                    let mut status = self.status.write();
                    status.cycles_ok += 1;
                    status.last_success_at = Some(now);
                    info!("[{}] Saved {} snapshots", now.to_rfc3339(), saved);
                }
                Err(e) => {
                    let now = Utc::now();
                    let mut status = self.status.write();
                    status.cycles_failed += 1;
                    status.last_error = Some(e.to_string());
                    error!("[{}] Snapshot collection cycle failed: {}", now.to_rfc3339(), e);
                }
            }

            self.transition(CollectorState::Sleeping);

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.interval()) => {}
            }
        }

        self.transition(CollectorState::Stopped);
        info!("Snapshot collector stopped");
    }

    /// Fetch, map and persist one batch. Returns the number of snapshots written.
    pub async fn run_cycle(&self) -> Result<usize> {
        self.transition(CollectorState::Fetching);
        let timeout = self.config.fetch_timeout();
        let quotes = tokio::time::timeout(timeout, self.source.fetch_quotes())
            .await
            .map_err(|_| MarketError::FetchTimeout(timeout))??;

        self.transition(CollectorState::Mapping);
        let captured_at = Utc::now();
        let snapshots: Vec<CoinSnapshot> = quotes
            .iter()
            .map(|quote| CoinSnapshot::from_quote(quote, captured_at))
            .collect();

        self.transition(CollectorState::Persisting);
        self.store.append(&snapshots).await?;

        Ok(snapshots.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CoinQuote, MemorySnapshotStore};
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn btc_quote() -> CoinQuote {
        CoinQuote {
            code: "BTC".to_string(),
            name: "Bitcoin".to_string(),
            price: Some(Decimal::from(100)),
            price_aud: None,
            market_cap: None,
            volume: None,
            change: None,
            icon: None,
        }
    }

    /// Fails the first `failures` fetches, then succeeds.
    struct FlakySource {
        failures: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl QuoteSource for FlakySource {
        async fn fetch_quotes(&self) -> Result<Vec<CoinQuote>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(MarketError::Fetch(format!("connection reset (call {call})")));
            }
            Ok(vec![btc_quote()])
        }
    }

    struct StalledSource;

    #[async_trait]
    impl QuoteSource for StalledSource {
        async fn fetch_quotes(&self) -> Result<Vec<CoinQuote>> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_cycles_do_not_stop_the_loop() {
        let source = Arc::new(FlakySource {
            failures: 2,
            calls: AtomicUsize::new(0),
        });
        let store = Arc::new(MemorySnapshotStore::new());
        let config = CollectorConfig::default();
        let collector = Arc::new(SnapshotCollector::new(
            source.clone(),
            store.clone(),
            config.clone(),
        ));

        let cancel = CancellationToken::new();
        let handle = {
            let collector = collector.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { collector.run(cancel).await })
        };

        // Cycles run at t=0, t=interval and t=2*interval.
        tokio::time::sleep(config.interval() * 2 + Duration::from_secs(1)).await;

        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
        assert_eq!(store.len(), 1);
        let status = collector.status();
        assert_eq!(status.cycles_failed, 2);
        assert_eq!(status.cycles_ok, 1);
        assert_eq!(status.state, CollectorState::Sleeping);

        cancel.cancel();
        handle.await.unwrap();
        assert_eq!(collector.status().state, CollectorState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_fetch_times_out() {
        let store = Arc::new(MemorySnapshotStore::new());
        let collector =
            SnapshotCollector::new(Arc::new(StalledSource), store.clone(), CollectorConfig::default());

        let err = collector.run_cycle().await.unwrap_err();
        assert!(matches!(err, MarketError::FetchTimeout(_)));
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_sleep_exits_promptly() {
        let source = Arc::new(FlakySource {
            failures: 0,
            calls: AtomicUsize::new(0),
        });
        let store = Arc::new(MemorySnapshotStore::new());
        let collector = Arc::new(SnapshotCollector::new(
            source.clone(),
            store.clone(),
            CollectorConfig::default(),
        ));

        let cancel = CancellationToken::new();
        let handle = {
            let collector = collector.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { collector.run(cancel).await })
        };

        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(collector.status().state, CollectorState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_fetch_writes_nothing() {
        let store = Arc::new(MemorySnapshotStore::new());
        let collector = Arc::new(SnapshotCollector::new(
            Arc::new(StalledSource),
            store.clone(),
            CollectorConfig::default(),
        ));

        let cancel = CancellationToken::new();
        let handle = {
            let collector = collector.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { collector.run(cancel).await })
        };

        // Well inside the fetch timeout, so the fetch is still pending.
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(collector.status().state, CollectorState::Fetching);

        cancel.cancel();
        handle.await.unwrap();

        assert!(store.is_empty());
        let status = collector.status();
        assert_eq!(status.state, CollectorState::Stopped);
        assert_eq!(status.cycles_ok, 0);
        assert_eq!(status.cycles_failed, 0);
    }

    #[tokio::test]
    async fn test_cycle_stamps_one_time_per_batch() {
        struct TwoCoins;

        #[async_trait]
        impl QuoteSource for TwoCoins {
            async fn fetch_quotes(&self) -> Result<Vec<CoinQuote>> {
                let mut eth = btc_quote();
                eth.code = "ETH".to_string();
                eth.name = "Ethereum".to_string();
                Ok(vec![btc_quote(), eth])
            }
        }

        let store = Arc::new(MemorySnapshotStore::new());
        let collector =
            SnapshotCollector::new(Arc::new(TwoCoins), store.clone(), CollectorConfig::default());

        assert_eq!(collector.run_cycle().await.unwrap(), 2);
        let all = store.query_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].captured_at, all[1].captured_at);
    }
}
