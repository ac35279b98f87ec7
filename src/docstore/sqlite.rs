//! SQLite-backed document store. Schema shape (WAL mode, `WITHOUT ROWID`
//! tables, a JSON-blob payload column alongside indexed scalar columns) is
//! taken directly from `signals/db_storage.rs`'s `SCHEMA_SQL` in the teacher
//! repo and generalised across every collection named in §6.
//!
//! The admin/migration runner is an out-of-core collaborator (§1); this
//! store applies its own idempotent `CREATE TABLE IF NOT EXISTS` migrations
//! at startup instead of shelling out to one, recording what it applied in
//! `_migrations`.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use crate::domain::{AnalysisDocument, MarketSnapshot, PriceUpdate, Signal};
use crate::error::{PipelineError, Result};

use super::DocumentStore;

fn db_err(operation: &str, collection: &str, message: String) -> anyhow::Error {
    anyhow::Error::new(PipelineError::Database {
        message,
        operation: operation.to_string(),
        collection: Some(collection.to_string()),
    })
}

/// Runs `f` on the blocking pool, tagging any failure (query error or a
/// panicked/cancelled task) as `PipelineError::Database` for `operation` on
/// `collection`.
async fn run_blocking<T, F>(operation: &'static str, collection: &'static str, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(db_err(operation, collection, err.to_string())),
        Err(join_err) => Err(db_err(operation, collection, format!("task join failed: {join_err}"))),
    }
}

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS market_data (
    id TEXT PRIMARY KEY,
    timestamp INTEGER NOT NULL,
    data_json TEXT NOT NULL
) WITHOUT ROWID;
CREATE INDEX IF NOT EXISTS idx_market_data_ts ON market_data(timestamp DESC);

CREATE TABLE IF NOT EXISTS analysis (
    id TEXT PRIMARY KEY,
    timestamp INTEGER NOT NULL,
    data_json TEXT NOT NULL
) WITHOUT ROWID;
CREATE INDEX IF NOT EXISTS idx_analysis_ts ON analysis(timestamp DESC);

CREATE TABLE IF NOT EXISTS signals (
    signal_id TEXT PRIMARY KEY,
    timestamp INTEGER NOT NULL,
    asset TEXT NOT NULL,
    data_json TEXT NOT NULL
) WITHOUT ROWID;
CREATE INDEX IF NOT EXISTS idx_signals_ts ON signals(timestamp DESC);

CREATE TABLE IF NOT EXISTS price_updates (
    id TEXT PRIMARY KEY,
    timestamp INTEGER NOT NULL,
    data_json TEXT NOT NULL
) WITHOUT ROWID;
CREATE INDEX IF NOT EXISTS idx_price_updates_ts ON price_updates(timestamp DESC);

CREATE TABLE IF NOT EXISTS logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp INTEGER NOT NULL,
    service TEXT NOT NULL,
    level TEXT NOT NULL,
    message TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_logs_ts ON logs(timestamp DESC);

CREATE TABLE IF NOT EXISTS _migrations (
    version INTEGER PRIMARY KEY,
    applied_at INTEGER NOT NULL
);
"#;

const SCHEMA_VERSION: i64 = 1;

pub struct SqliteDocumentStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteDocumentStore {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA_SQL)?;
        conn.execute(
            "INSERT OR IGNORE INTO _migrations (version, applied_at) VALUES (?1, strftime('%s','now'))",
            params![SCHEMA_VERSION],
        )?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn insert_snapshot(&self, snapshot: &MarketSnapshot) -> Result<()> {
        let conn = self.conn.clone();
        let id = snapshot.id.clone();
        let timestamp = snapshot.timestamp;
        let data_json = serde_json::to_string(snapshot)?;
        run_blocking("insert_snapshot", "market_data", move || {
            let conn = conn.lock();
            conn.execute(
                "INSERT OR REPLACE INTO market_data (id, timestamp, data_json) VALUES (?1, ?2, ?3)",
                params![id, timestamp, data_json],
            )?;
            Ok(())
        })
        .await
    }

    async fn latest_snapshot(&self) -> Result<Option<MarketSnapshot>> {
        let conn = self.conn.clone();
        run_blocking("latest_snapshot", "market_data", move || {
            let conn = conn.lock();
            let data_json: Option<String> = conn
                .query_row(
                    "SELECT data_json FROM market_data ORDER BY timestamp DESC LIMIT 1",
                    [],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(data_json.map(|s| serde_json::from_str(&s)).transpose()?)
        })
        .await
    }

    async fn insert_analysis(&self, doc: &AnalysisDocument) -> Result<()> {
        let conn = self.conn.clone();
        let id = doc.id.clone();
        let timestamp = doc.timestamp;
        let data_json = serde_json::to_string(doc)?;
        run_blocking("insert_analysis", "analysis", move || {
            let conn = conn.lock();
            conn.execute(
                "INSERT OR REPLACE INTO analysis (id, timestamp, data_json) VALUES (?1, ?2, ?3)",
                params![id, timestamp, data_json],
            )?;
            Ok(())
        })
        .await
    }

    async fn latest_analysis(&self) -> Result<Option<AnalysisDocument>> {
        let conn = self.conn.clone();
        run_blocking("latest_analysis", "analysis", move || {
            let conn = conn.lock();
            let data_json: Option<String> = conn
                .query_row(
                    "SELECT data_json FROM analysis ORDER BY timestamp DESC LIMIT 1",
                    [],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(data_json.map(|s| serde_json::from_str(&s)).transpose()?)
        })
        .await
    }

    async fn insert_signal(&self, signal: &Signal) -> Result<bool> {
        let conn = self.conn.clone();
        let signal_id = signal.signal_id.clone();
        let timestamp = signal.timestamp;
        let asset = signal.asset.clone();
        let data_json = serde_json::to_string(signal)?;
        run_blocking("insert_signal", "signals", move || {
            let conn = conn.lock();
            let rows = conn.execute(
                "INSERT OR IGNORE INTO signals (signal_id, timestamp, asset, data_json) VALUES (?1, ?2, ?3, ?4)",
                params![signal_id, timestamp, asset, data_json],
            )?;
            Ok(rows > 0)
        })
        .await
    }

    async fn insert_price_update(&self, update: &PriceUpdate) -> Result<()> {
        let conn = self.conn.clone();
        let id = format!("price_{}", update.timestamp);
        let timestamp = update.timestamp;
        let data_json = serde_json::to_string(update)?;
        run_blocking("insert_price_update", "price_updates", move || {
            let conn = conn.lock();
            conn.execute(
                "INSERT OR REPLACE INTO price_updates (id, timestamp, data_json) VALUES (?1, ?2, ?3)",
                params![id, timestamp, data_json],
            )?;
            Ok(())
        })
        .await
    }

    async fn log(&self, service: &str, level: &str, message: &str) -> Result<()> {
        let conn = self.conn.clone();
        let service = service.to_string();
        let level = level.to_string();
        let message = message.to_string();
        let timestamp = chrono::Utc::now().timestamp();
        run_blocking("log", "logs", move || {
            let conn = conn.lock();
            conn.execute(
                "INSERT INTO logs (timestamp, service, level, message) VALUES (?1, ?2, ?3, ?4)",
                params![timestamp, service, level, message],
            )?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[tokio::test]
    async fn signal_insert_is_deduplicated_by_signal_id() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let signal = crate::domain::Signal {
            signal_id: "sig-1".into(),
            timestamp: 1,
            asset: "BTCUSDT".into(),
            direction: crate::domain::SignalDirection::Long,
            score: 80.0,
            confidence: crate::domain::Confidence::High,
            entry_range: crate::domain::EntryRange { min: 1.0, max: 2.0 },
            take_profit: vec![3.0],
            stop_loss: 0.5,
            reasons: HashMap::new(),
            timeframe_alignment: crate::domain::TimeframeAlignment {
                primary: crate::domain::Trend::Bullish,
                secondary: crate::domain::Trend::Bullish,
                minor: crate::domain::Trend::Bullish,
            },
            liquidity_note: "ok".into(),
            funding_note: "ok".into(),
        };
        assert!(store.insert_signal(&signal).await.unwrap());
        assert!(!store.insert_signal(&signal).await.unwrap());
    }

    #[tokio::test]
    async fn latest_snapshot_picks_most_recent_timestamp() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let mut s1 = MarketSnapshot::new("s1".into(), 100);
        s1.prices.insert("BTCUSDT".into(), 50000.0);
        let mut s2 = MarketSnapshot::new("s2".into(), 200);
        s2.prices.insert("BTCUSDT".into(), 51000.0);
        store.insert_snapshot(&s1).await.unwrap();
        store.insert_snapshot(&s2).await.unwrap();
        let latest = store.latest_snapshot().await.unwrap().unwrap();
        assert_eq!(latest.id, "s2");
    }
}
