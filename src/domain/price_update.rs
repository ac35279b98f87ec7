use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolatilityKind {
    Pump,
    Dump,
    BtcMovement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolatilityTimeframe {
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolatilityEvent {
    #[serde(rename = "type")]
    pub kind: VolatilityKind,
    pub symbol: String,
    pub change_pct: f64,
    pub timeframe: VolatilityTimeframe,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceUpdate {
    pub timestamp: i64,
    pub prices: HashMap<String, f64>,
    pub volatilities: Vec<VolatilityEvent>,
    pub message: String,
}
