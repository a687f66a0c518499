use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One row of the market listing, as scraped. Only `code` and `name` are
/// guaranteed; every numeric cell may have failed to parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinQuote {
    pub code: String,
    pub name: String,
    pub price: Option<Decimal>,
    pub price_aud: Option<Decimal>,
    pub market_cap: Option<Decimal>,
    pub volume: Option<Decimal>,
    pub change: Option<Decimal>,
    pub icon: Option<String>,
}

/// Persisted, immutable price record for one coin at one collection cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinSnapshot {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub price: Decimal,
    pub price_aud: Decimal,
    pub market_cap: Decimal,
    pub volume: Decimal,
    pub change: Decimal,
    pub icon: Option<String>,
    pub captured_at: DateTime<Utc>,
}

impl CoinSnapshot {
    /// Absent quote values are stored as zero.
    pub fn from_quote(quote: &CoinQuote, captured_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            code: quote.code.clone(),
            name: quote.name.clone(),
            price: quote.price.unwrap_or_default(),
            price_aud: quote.price_aud.unwrap_or_default(),
            market_cap: quote.market_cap.unwrap_or_default(),
            volume: quote.volume.unwrap_or_default(),
            change: quote.change.unwrap_or_default(),
            icon: quote.icon.clone(),
            captured_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_values_default_to_zero() {
        let quote = CoinQuote {
            code: "BTC".to_string(),
            name: "Bitcoin".to_string(),
            price: Some(Decimal::new(10150, 2)),
            price_aud: None,
            market_cap: None,
            volume: Some(Decimal::from(42)),
            change: None,
            icon: None,
        };

        let now = Utc::now();
        let snapshot = CoinSnapshot::from_quote(&quote, now);

        assert_eq!(snapshot.code, "BTC");
        assert_eq!(snapshot.price, Decimal::new(10150, 2));
        assert_eq!(snapshot.price_aud, Decimal::ZERO);
        assert_eq!(snapshot.market_cap, Decimal::ZERO);
        assert_eq!(snapshot.volume, Decimal::from(42));
        assert_eq!(snapshot.change, Decimal::ZERO);
        assert_eq!(snapshot.captured_at, now);
    }
}
