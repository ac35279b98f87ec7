use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Envelope carried on every stream (§3, §6). `correlation_id` propagates
/// through every downstream emission originating from one ingest cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_name: String,
    pub event_timestamp: i64,
    pub payload: Value,
    pub correlation_id: String,
}

pub const STREAM_MARKET_DATA_UPDATED: &str = "market_data_updated";
pub const STREAM_MARKET_ANALYSIS_COMPLETED: &str = "market_analysis_completed";
pub const STREAM_PRICE_UPDATE_READY: &str = "price_update_ready";
pub const STREAM_SIGNAL_GENERATED: &str = "signal_generated";
