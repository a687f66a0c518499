use chrono::{Duration, Utc};
use market_core::{
    AnalysisConfig, CoinQuote, CoinSnapshot, MemorySnapshotStore, SnapshotStore,
    SqliteSnapshotStore,
};
use market_indicators::CoinStrengthAnalyzer;
use rust_decimal::Decimal;
use std::sync::Arc;

fn quote(code: &str, price: i64) -> CoinQuote {
    CoinQuote {
        code: code.to_string(),
        name: code.to_string(),
        price: Some(Decimal::from(price)),
        price_aud: None,
        market_cap: None,
        volume: None,
        change: None,
        icon: None,
    }
}

/// BTC at 100, 105, 110 captured oldest to newest, one cycle apart.
async fn seed_btc(store: &dyn SnapshotStore) {
    let start = Utc::now() - Duration::minutes(15);
    for (i, price) in [100, 105, 110].into_iter().enumerate() {
        let at = start + Duration::minutes(5 * i as i64);
        let batch = vec![
            CoinSnapshot::from_quote(&quote("BTC", price), at),
            CoinSnapshot::from_quote(&quote("ETH", 1), at),
        ];
        store.append(&batch).await.unwrap();
    }
}

async fn assert_btc_analysis(store: Arc<dyn SnapshotStore>) {
    seed_btc(store.as_ref()).await;
    let analyzer = CoinStrengthAnalyzer::new(store, AnalysisConfig::default());

    let history = analyzer.raw_history("BTC").await.unwrap();
    let prices: Vec<f64> = history.iter().map(|c| c.last).collect();
    assert_eq!(prices, vec![110.0, 105.0, 100.0]);

    let result = analyzer.evaluate("BTC").await.unwrap();
    assert_eq!(result.coin, "BTC");
    assert_eq!(result.momentum, 10.0);
    assert_eq!(result.volatility, 4.08);
    assert_eq!(result.spread, 1.01);
    // Both steps are rises, which the RSI books as losses.
    assert_eq!(result.rsi, 0.0);
    assert!(!result.strategy.is_empty());

    assert_eq!(analyzer.momentum("BTC").await.unwrap(), 10.0);
    assert_eq!(analyzer.ema("BTC", 1).await.unwrap(), 100.0);
    let (macd, signal) = analyzer.macd("BTC").await.unwrap();
    assert!((macd - signal).abs() < 1e-9);
}

#[tokio::test]
async fn test_memory_store_end_to_end() {
    assert_btc_analysis(Arc::new(MemorySnapshotStore::new())).await;
}

#[tokio::test]
async fn test_sqlite_store_end_to_end() {
    let store = SqliteSnapshotStore::connect("sqlite::memory:", 1).await.unwrap();
    store.run_migrations().await.unwrap();
    assert_btc_analysis(Arc::new(store)).await;
}
