use crate::{CoinSnapshot, MarketError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow},
    Row,
};
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

/// Append-only time series of snapshots. Every query returns newest first;
/// snapshots sharing a timestamp come back in reverse insertion order.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Appends the whole batch or nothing.
    async fn append(&self, batch: &[CoinSnapshot]) -> Result<()>;

    async fn query_recent(&self, code: &str, limit: usize) -> Result<Vec<CoinSnapshot>>;

    async fn query_code(&self, code: &str) -> Result<Vec<CoinSnapshot>>;

    async fn query_all(&self) -> Result<Vec<CoinSnapshot>>;
}

#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    snapshots: RwLock<Vec<CoinSnapshot>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.snapshots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.read().is_empty()
    }

    fn newest_first<F>(&self, filter: F, limit: Option<usize>) -> Vec<CoinSnapshot>
    where
        F: Fn(&CoinSnapshot) -> bool,
    {
        let snapshots = self.snapshots.read();

        // Reverse insertion order first so the stable sort keeps later inserts ahead on ties.
        let mut matching: Vec<CoinSnapshot> = snapshots
            .iter()
            .rev()
            .filter(|s| filter(s))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.captured_at.cmp(&a.captured_at));

        if let Some(limit) = limit {
            matching.truncate(limit);
        }
        matching
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn append(&self, batch: &[CoinSnapshot]) -> Result<()> {
        self.snapshots.write().extend_from_slice(batch);
        debug!("Appended {} snapshots to memory store", batch.len());
        Ok(())
    }

    async fn query_recent(&self, code: &str, limit: usize) -> Result<Vec<CoinSnapshot>> {
        Ok(self.newest_first(|s| s.code == code, Some(limit)))
    }

    async fn query_code(&self, code: &str) -> Result<Vec<CoinSnapshot>> {
        Ok(self.newest_first(|s| s.code == code, None))
    }

    async fn query_all(&self) -> Result<Vec<CoinSnapshot>> {
        Ok(self.newest_first(|_| true, None))
    }
}

const SELECT_COLUMNS: &str = "SELECT id, code, name, price, price_aud, market_cap, volume, \
     change_pct, icon, captured_at FROM coin_snapshots";

pub struct SqliteSnapshotStore {
    pool: SqlitePool,
}

impl SqliteSnapshotStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        info!("Database connection established");

        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;

        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for SqliteSnapshotStore {
    async fn append(&self, batch: &[CoinSnapshot]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for snapshot in batch {
            sqlx::query(
                "INSERT INTO coin_snapshots \
                 (id, code, name, price, price_aud, market_cap, volume, change_pct, icon, captured_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(snapshot.id.to_string())
            .bind(&snapshot.code)
            .bind(&snapshot.name)
            .bind(snapshot.price.to_string())
            .bind(snapshot.price_aud.to_string())
            .bind(snapshot.market_cap.to_string())
            .bind(snapshot.volume.to_string())
            .bind(snapshot.change.to_string())
            .bind(snapshot.icon.as_deref())
            .bind(snapshot.captured_at.timestamp_micros())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!("Committed {} snapshots", batch.len());
        Ok(())
    }

    async fn query_recent(&self, code: &str, limit: usize) -> Result<Vec<CoinSnapshot>> {
        let sql = format!(
            "{SELECT_COLUMNS} WHERE code = ? ORDER BY captured_at DESC, seq DESC LIMIT ?"
        );
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        sqlx::query(&sql)
            .bind(code)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(row_to_snapshot)
            .collect()
    }

    async fn query_code(&self, code: &str) -> Result<Vec<CoinSnapshot>> {
        let sql = format!("{SELECT_COLUMNS} WHERE code = ? ORDER BY captured_at DESC, seq DESC");

        sqlx::query(&sql)
            .bind(code)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(row_to_snapshot)
            .collect()
    }

    async fn query_all(&self) -> Result<Vec<CoinSnapshot>> {
        let sql = format!("{SELECT_COLUMNS} ORDER BY captured_at DESC, seq DESC");

        sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(row_to_snapshot)
            .collect()
    }
}

fn row_to_snapshot(row: &SqliteRow) -> Result<CoinSnapshot> {
    let id: String = row.try_get("id")?;
    let id = Uuid::parse_str(&id).map_err(|e| MarketError::Decode(format!("id: {e}")))?;

    Ok(CoinSnapshot {
        id,
        code: row.try_get("code")?,
        name: row.try_get("name")?,
        price: decimal_column(row, "price")?,
        price_aud: decimal_column(row, "price_aud")?,
        market_cap: decimal_column(row, "market_cap")?,
        volume: decimal_column(row, "volume")?,
        change: decimal_column(row, "change_pct")?,
        icon: row.try_get("icon")?,
        captured_at: micros_to_datetime(row.try_get("captured_at")?)?,
    })
}

fn decimal_column(row: &SqliteRow, column: &str) -> Result<Decimal> {
    let raw: String = row.try_get(column)?;
    Decimal::from_str(&raw).map_err(|e| MarketError::Decode(format!("{column}: {e}")))
}

fn micros_to_datetime(micros: i64) -> Result<DateTime<Utc>> {
    let secs = micros.div_euclid(1_000_000);
    let nanos = (micros.rem_euclid(1_000_000) * 1_000) as u32;
    DateTime::from_timestamp(secs, nanos)
        .ok_or_else(|| MarketError::Decode(format!("captured_at out of range: {micros}")))
}
