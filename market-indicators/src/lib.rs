pub mod analyzer;
pub mod metrics;

pub use analyzer::CoinStrengthAnalyzer;

use market_core::CoinSnapshot;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Single analysis point. The listing has no order book, so bid and ask are
/// synthesized at 0.5% either side of the last price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub last: f64,
    pub bid: f64,
    pub ask: f64,
}

impl Candle {
    pub fn from_price(price: Decimal) -> Self {
        let last = price.to_f64().unwrap_or(0.0);
        let bid = price
            .checked_mul(Decimal::new(995, 3))
            .and_then(|bid| bid.to_f64())
            .unwrap_or(last * 0.995);
        let ask = price
            .checked_mul(Decimal::new(1005, 3))
            .and_then(|ask| ask.to_f64())
            .unwrap_or(last * 1.005);

        Self { last, bid, ask }
    }

    pub fn from_snapshot(snapshot: &CoinSnapshot) -> Self {
        Self::from_price(snapshot.price)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub coin: String,
    pub momentum: f64,
    pub volatility: f64,
    pub spread: f64,
    pub rsi: f64,
    pub macd: f64,
    pub signal: f64,
    pub strength: f64,
    pub strategy: Vec<String>,
}
