use serde::{Deserialize, Serialize};

/// OHLCV bar over a fixed interval. Immutable once closed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn new(open_time: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self { open_time, open, high, low, close, volume }
    }
}

/// The fixed timeframe set the pipeline analyzes across (§6).
pub const TIMEFRAMES: [&str; 8] = ["1m", "15m", "1h", "4h", "8h", "1d", "3d", "1w"];
