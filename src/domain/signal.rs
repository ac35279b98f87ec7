use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalDirection {
    Long,
    Short,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Confidence {
    High,
    Medium,
}

impl Confidence {
    /// confidence=HIGH ⇔ score ≥ 75 (§3 invariant)
    pub fn from_score(score: f64) -> Self {
        if score >= 75.0 {
            Confidence::High
        } else {
            Confidence::Medium
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EntryRange {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeframeAlignment {
    pub primary: Trend,
    pub secondary: Trend,
    pub minor: Trend,
}

use super::analysis::Trend;

/// Core output of the Scorer (§3). `score` is always in [60, 100]; a score
/// below 60 means "no signal" and is never constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub signal_id: String,
    pub timestamp: i64,
    pub asset: String,
    #[serde(rename = "type")]
    pub direction: SignalDirection,
    pub score: f64,
    pub confidence: Confidence,
    pub entry_range: EntryRange,
    pub take_profit: Vec<f64>,
    pub stop_loss: f64,
    pub reasons: HashMap<String, Vec<String>>,
    pub timeframe_alignment: TimeframeAlignment,
    pub liquidity_note: String,
    pub funding_note: String,
}

impl Signal {
    pub fn new_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }
}
