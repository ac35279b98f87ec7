//! Document Store (§4.B / §6): persistent collections for market snapshots,
//! analyses, signals, price updates, and service logs.

pub mod sqlite;

use async_trait::async_trait;

use crate::domain::{AnalysisDocument, MarketSnapshot, PriceUpdate, Signal};
use crate::error::Result;

pub use sqlite::SqliteDocumentStore;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert_snapshot(&self, snapshot: &MarketSnapshot) -> Result<()>;
    async fn latest_snapshot(&self) -> Result<Option<MarketSnapshot>>;

    async fn insert_analysis(&self, doc: &AnalysisDocument) -> Result<()>;
    async fn latest_analysis(&self) -> Result<Option<AnalysisDocument>>;

    /// Returns `true` if the signal was newly inserted, `false` if
    /// `signal_id` already existed (dedup by unique index, §3).
    async fn insert_signal(&self, signal: &Signal) -> Result<bool>;

    async fn insert_price_update(&self, update: &PriceUpdate) -> Result<()>;

    async fn log(&self, service: &str, level: &str, message: &str) -> Result<()>;
}
