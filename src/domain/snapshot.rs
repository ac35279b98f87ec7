use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::candle::Candle;

/// Macro-market metrics gathered alongside prices each ingest cycle.
///
/// `total2_market_cap`/`total3_market_cap` are declared but never populated
/// by the Ingestor (§9 open question #4) — they stay `None` in practice.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketMetrics {
    pub btc_dominance: Option<f64>,
    pub usdt_dominance: Option<f64>,
    pub total_market_cap: Option<f64>,
    pub btc_volatility: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total2_market_cap: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total3_market_cap: Option<f64>,
}

/// One ingest cycle's worth of market data.
///
/// Invariant: every field is independently nullable; a snapshot is valid iff
/// `prices` is non-empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub id: String,
    pub timestamp: i64,
    pub prices: HashMap<String, f64>,
    /// symbol -> interval -> ordered candles (oldest first)
    pub candlesticks: HashMap<String, HashMap<String, Vec<Candle>>>,
    pub metrics: MarketMetrics,
}

impl MarketSnapshot {
    pub fn new(id: String, timestamp: i64) -> Self {
        Self {
            id,
            timestamp,
            prices: HashMap::new(),
            candlesticks: HashMap::new(),
            metrics: MarketMetrics::default(),
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.prices.is_empty()
    }

    pub fn candles_for(&self, symbol: &str, interval: &str) -> Option<&[Candle]> {
        self.candlesticks
            .get(symbol)
            .and_then(|by_interval| by_interval.get(interval))
            .map(|v| v.as_slice())
    }
}
