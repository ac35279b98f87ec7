use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// §9 design note: tagged variants per theory result instead of a
/// duck-typed dict, so missing-field semantics (e.g. "macd signal absent for
/// short history") are explicit rather than implicit.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Bullish,
    Bearish,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WyckoffPhase {
    Accumulation,
    Markup,
    Distribution,
    Markdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DowResult {
    pub trend: Trend,
    pub bos_up: bool,
    pub bos_down: bool,
    pub swing_high_count: usize,
    pub swing_low_count: usize,
    pub volume_confirmation: bool,
    pub trend_strength: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WyckoffResult {
    pub phase: Option<WyckoffPhase>,
    pub spring: bool,
    pub upthrust: bool,
    pub sos: bool,
    pub sow: bool,
    pub price_position: f64,
    pub volume_ratio: f64,
    pub strength: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GannResult {
    pub slope: f64,
    pub deviation: f64,
    pub reversal_window: bool,
    pub pivot_high: f64,
    pub pivot_low: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MacdResult {
    pub line: f64,
    pub signal: Option<f64>,
    pub histogram: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorSet {
    pub ema20: Option<f64>,
    pub ema50: Option<f64>,
    pub ema200: Option<f64>,
    pub rsi: Option<f64>,
    pub macd: Option<MacdResult>,
    pub volume_spike: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeframeAnalysis {
    pub interval: String,
    pub dow: DowResult,
    pub wyckoff: Option<WyckoffResult>,
    pub gann: Option<GannResult>,
    pub indicators: IndicatorSet,
    pub current_price: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BtcDomInterpretation {
    RisingMoneyIntoBtcAltsWeaken,
    FallingGoodForAlts,
    StableOrNeutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsdtDomInterpretation {
    RisingRiskOffShortsFavored,
    StableOrFalling,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DominanceInterpretation {
    pub btc_dom: BtcDomInterpretation,
    pub usdt_dom: UsdtDomInterpretation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DominanceAnalysis {
    pub btc_dominance: Option<f64>,
    pub usdt_dominance: Option<f64>,
    pub interpretation: DominanceInterpretation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisDocument {
    pub id: String,
    pub timestamp: i64,
    pub source_snapshot_timestamp: i64,
    /// symbol -> interval -> analysis
    pub symbol_analyses: HashMap<String, HashMap<String, TimeframeAnalysis>>,
    pub dominance_analysis: DominanceAnalysis,
    pub sentiment: Trend,
    pub trend_strength: f64,
    pub sentiment_details: Vec<String>,
}

impl AnalysisDocument {
    pub fn analysis_for<'a>(
        &'a self,
        symbol: &str,
        interval: &str,
    ) -> Option<&'a TimeframeAnalysis> {
        self.symbol_analyses.get(symbol)?.get(interval)
    }
}
