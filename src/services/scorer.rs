//! Signal Scorer (§4.H), the critical subsystem. Consumes
//! `market_analysis_completed`; for each symbol and each candidate
//! direction, applies the guardrails then the weighted multi-factor
//! scoring table, emitting `signal_generated` for anything scoring ≥ 60.

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::{
    BtcDomInterpretation, Confidence, DominanceAnalysis, EntryRange, EventEnvelope, Signal,
    SignalDirection, TimeframeAlignment, TimeframeAnalysis, Trend, UsdtDomInterpretation,
    WyckoffPhase, STREAM_MARKET_ANALYSIS_COMPLETED, STREAM_SIGNAL_GENERATED,
};
use crate::error::Result;
use crate::kernel::ServiceKernel;

const CONSUMER_GROUP: &str = "signal_scorer";

const PRIMARY_INTERVALS: [&str; 3] = ["1d", "3d", "1w"];
const SECONDARY_INTERVALS: [&str; 2] = ["4h", "8h"];
const MINOR_INTERVAL: &str = "1h";

/// §3/§4.H invariant: no signal below this is ever constructed.
const MIN_SCORE: f64 = 60.0;

/// §4.H item "Safety" — not currently verified; the hook stays in place so
/// a future implementer can swap in a real funding/OI/liquidity check
/// without touching the scoring table's shape.
trait SafetyCheck {
    fn check(&self) -> (f64, String);
}

struct ConstantSafetyCheck;

impl SafetyCheck for ConstantSafetyCheck {
    fn check(&self) -> (f64, String) {
        (10.0, "basic checks: funding/OI/liquidity not currently verified".to_string())
    }
}

pub async fn run(kernel: Arc<ServiceKernel>) -> Result<()> {
    let kernel_for_handler = kernel.clone();
    let handler: crate::eventbus::Handler = Arc::new(move |_event_name, payload| {
        let kernel = kernel_for_handler.clone();
        Box::pin(async move { handle_event(&kernel, payload).await })
    });

    kernel
        .event_bus
        .subscribe(
            &[STREAM_MARKET_ANALYSIS_COMPLETED],
            CONSUMER_GROUP,
            "scorer-1",
            handler,
            kernel.running.clone(),
        )
        .await
}

async fn handle_event(kernel: &ServiceKernel, _payload: serde_json::Value) -> Result<()> {
    let Some(analysis) = kernel.docstore.latest_analysis().await? else {
        tracing::warn!("market_analysis_completed received but no analysis persisted yet");
        return Ok(());
    };

    let safety = ConstantSafetyCheck;
    for (symbol, by_interval) in &analysis.symbol_analyses {
        for direction in [SignalDirection::Long, SignalDirection::Short] {
            if guardrail_blocks(direction, symbol, &analysis.dominance_analysis) {
                continue;
            }
            let Some(signal) = score_candidate(symbol, by_interval, direction, &analysis.dominance_analysis, &safety)
            else {
                continue;
            };
            emit_signal(kernel, signal).await;
        }
    }
    Ok(())
}

fn guardrail_blocks(direction: SignalDirection, symbol: &str, dominance: &DominanceAnalysis) -> bool {
    if direction != SignalDirection::Long {
        return false;
    }
    if dominance.interpretation.usdt_dom == UsdtDomInterpretation::RisingRiskOffShortsFavored {
        return true;
    }
    if symbol != "BTCUSDT" && dominance.interpretation.btc_dom == BtcDomInterpretation::RisingMoneyIntoBtcAltsWeaken {
        return true;
    }
    false
}

fn trend_matches(trend: Trend, direction: SignalDirection, allow_neutral: bool) -> bool {
    match direction {
        SignalDirection::Long => trend == Trend::Bullish || (allow_neutral && trend == Trend::Neutral),
        SignalDirection::Short => trend == Trend::Bearish || (allow_neutral && trend == Trend::Neutral),
    }
}

fn majority_trend<'a>(analyses: impl Iterator<Item = &'a TimeframeAnalysis>) -> Trend {
    let (mut bullish, mut bearish, mut neutral) = (0, 0, 0);
    for a in analyses {
        match a.dow.trend {
            Trend::Bullish => bullish += 1,
            Trend::Bearish => bearish += 1,
            Trend::Neutral => neutral += 1,
        }
    }
    if bullish > bearish && bullish > neutral {
        Trend::Bullish
    } else if bearish > bullish && bearish > neutral {
        Trend::Bearish
    } else {
        Trend::Neutral
    }
}

fn score_candidate(
    symbol: &str,
    by_interval: &HashMap<String, TimeframeAnalysis>,
    direction: SignalDirection,
    dominance: &DominanceAnalysis,
    safety: &dyn SafetyCheck,
) -> Option<Signal> {
    let mut reasons: HashMap<String, Vec<String>> = HashMap::new();
    let mut score = 0.0;

    // Multi-timeframe trend (30).
    let primary: Vec<&TimeframeAnalysis> =
        PRIMARY_INTERVALS.iter().filter_map(|i| by_interval.get(*i)).collect();
    let primary_matches = primary.iter().filter(|a| trend_matches(a.dow.trend, direction, false)).count();
    let primary_score = if primary.is_empty() { 0.0 } else { 15.0 * primary_matches as f64 / primary.len() as f64 };

    let secondary: Vec<&TimeframeAnalysis> =
        SECONDARY_INTERVALS.iter().filter_map(|i| by_interval.get(*i)).collect();
    let secondary_matches = secondary.iter().filter(|a| trend_matches(a.dow.trend, direction, true)).count();
    let secondary_score =
        if secondary.is_empty() { 0.0 } else { 10.0 * secondary_matches as f64 / secondary.len() as f64 };

    let minor_score = match by_interval.get(MINOR_INTERVAL) {
        Some(a) => {
            let bos_in_direction = match direction {
                SignalDirection::Long => a.dow.bos_up,
                SignalDirection::Short => a.dow.bos_down,
            };
            if trend_matches(a.dow.trend, direction, false) || bos_in_direction { 5.0 } else { 0.0 }
        }
        None => 0.0,
    };
    let trend_score = primary_score + secondary_score + minor_score;
    score += trend_score;
    reasons.entry("trend".into()).or_default().push(format!(
        "primary={primary_score:.1}/15 secondary={secondary_score:.1}/10 minor={minor_score:.1}/5"
    ));

    // Wyckoff (15), evaluated on 4h.
    let wyckoff_score = by_interval
        .get("4h")
        .and_then(|a| a.wyckoff.as_ref())
        .map(|w| {
            let matches = match direction {
                SignalDirection::Long => {
                    matches!(w.phase, Some(WyckoffPhase::Accumulation) | Some(WyckoffPhase::Markup))
                        || w.sos
                        || w.spring
                }
                SignalDirection::Short => {
                    matches!(w.phase, Some(WyckoffPhase::Distribution) | Some(WyckoffPhase::Markdown))
                        || w.sow
                        || w.upthrust
                }
            };
            if matches { 15.0 } else { 0.0 }
        })
        .unwrap_or(0.0);
    score += wyckoff_score;
    reasons.entry("wyckoff".into()).or_default().push(format!("{wyckoff_score:.0}/15"));

    // Indicators (20), evaluated on 4h.
    let indicator_score = by_interval
        .get("4h")
        .map(|a| {
            let mut s = 0.0;
            if let Some(rsi) = a.indicators.rsi {
                s += match direction {
                    SignalDirection::Long if rsi > 55.0 => 7.0,
                    SignalDirection::Long if rsi > 50.0 => 4.0,
                    SignalDirection::Short if rsi < 45.0 => 7.0,
                    SignalDirection::Short if rsi < 50.0 => 4.0,
                    _ => 0.0,
                };
            }
            if let Some(macd) = &a.indicators.macd {
                if let Some(histogram) = macd.histogram {
                    let matches = match direction {
                        SignalDirection::Long => histogram > 0.0,
                        SignalDirection::Short => histogram < 0.0,
                    };
                    if matches {
                        s += 7.0;
                    }
                }
            }
            if let (Some(ema20), Some(ema50)) = (a.indicators.ema20, a.indicators.ema50) {
                let aligned = match direction {
                    SignalDirection::Long => a.current_price > ema20 && ema20 > ema50,
                    SignalDirection::Short => a.current_price < ema20 && ema20 < ema50,
                };
                if aligned {
                    s += 6.0;
                }
            }
            s
        })
        .unwrap_or(0.0);
    score += indicator_score;
    reasons.entry("indicators".into()).or_default().push(format!("{indicator_score:.1}/20"));

    // Volume (10), evaluated on 4h.
    let volume_score = by_interval.get("4h").map(|a| if a.indicators.volume_spike { 10.0 } else { 0.0 }).unwrap_or(0.0);
    score += volume_score;
    reasons.entry("volume".into()).or_default().push(format!("{volume_score:.0}/10"));

    // Dominance (15).
    let is_btc = symbol == "BTCUSDT";
    let dominance_score = match (is_btc, direction) {
        (true, SignalDirection::Long) => {
            let mut s = 0.0;
            if dominance.interpretation.btc_dom == BtcDomInterpretation::FallingGoodForAlts {
                s += 5.0;
            }
            if dominance.interpretation.usdt_dom == UsdtDomInterpretation::StableOrFalling {
                s += 5.0;
            }
            s
        }
        (true, SignalDirection::Short) => {
            let mut s = 0.0;
            if dominance.interpretation.btc_dom == BtcDomInterpretation::RisingMoneyIntoBtcAltsWeaken {
                s += 5.0;
            }
            if dominance.interpretation.usdt_dom == UsdtDomInterpretation::RisingRiskOffShortsFavored {
                s += 5.0;
            }
            s
        }
        (false, SignalDirection::Long) => {
            let mut s = 0.0;
            if dominance.interpretation.btc_dom == BtcDomInterpretation::FallingGoodForAlts {
                s += 10.0;
            }
            if dominance.interpretation.usdt_dom != UsdtDomInterpretation::RisingRiskOffShortsFavored {
                s += 5.0;
            }
            s
        }
        (false, SignalDirection::Short) => {
            let mut s = 0.0;
            if dominance.interpretation.btc_dom == BtcDomInterpretation::RisingMoneyIntoBtcAltsWeaken {
                s += 8.0;
            }
            if dominance.interpretation.usdt_dom == UsdtDomInterpretation::RisingRiskOffShortsFavored {
                s += 7.0;
            }
            s
        }
    };
    score += dominance_score;
    reasons.entry("dominance".into()).or_default().push(format!("{dominance_score:.1}/15"));

    // Safety (10) — hook preserved even though the body is constant.
    let (safety_score, safety_note) = safety.check();
    score += safety_score;
    reasons.entry("safety".into()).or_default().push(safety_note.clone());

    if score < MIN_SCORE {
        return None;
    }

    let current_price = by_interval
        .get("4h")
        .map(|a| a.current_price)
        .or_else(|| by_interval.get("1h").map(|a| a.current_price))?;
    if current_price <= 0.0 {
        return None;
    }

    let (entry_range, take_profit, stop_loss) = match direction {
        SignalDirection::Long => (
            EntryRange { min: 0.995 * current_price, max: 1.005 * current_price },
            vec![1.02 * current_price, 1.05 * current_price],
            0.98 * current_price,
        ),
        SignalDirection::Short => (
            EntryRange { min: 0.995 * current_price, max: 1.005 * current_price },
            vec![0.98 * current_price, 0.95 * current_price],
            1.02 * current_price,
        ),
    };

    let timeframe_alignment = TimeframeAlignment {
        primary: majority_trend(primary.into_iter()),
        secondary: majority_trend(secondary.into_iter()),
        minor: by_interval.get(MINOR_INTERVAL).map(|a| a.dow.trend).unwrap_or(Trend::Neutral),
    };

    Some(Signal {
        signal_id: Signal::new_id(),
        timestamp: chrono::Utc::now().timestamp(),
        asset: symbol.to_string(),
        direction,
        score,
        confidence: Confidence::from_score(score),
        entry_range,
        take_profit,
        stop_loss,
        reasons,
        timeframe_alignment,
        liquidity_note: "liquidity not independently verified".to_string(),
        funding_note: safety_note,
    })
}

async fn emit_signal(kernel: &ServiceKernel, signal: Signal) {
    let inserted = match kernel.docstore.insert_signal(&signal).await {
        Ok(inserted) => inserted,
        Err(err) => {
            tracing::error!(error = %err, "failed to persist signal");
            kernel.metrics.error("database");
            return;
        }
    };
    if !inserted {
        return;
    }

    let payload = match serde_json::to_value(&signal) {
        Ok(v) => v,
        Err(err) => {
            tracing::error!(error = %err, "failed to serialise signal");
            return;
        }
    };
    if let Err(err) = kernel
        .event_bus
        .publish(
            STREAM_SIGNAL_GENERATED,
            EventEnvelope {
                event_name: STREAM_SIGNAL_GENERATED.to_string(),
                event_timestamp: signal.timestamp,
                payload,
                correlation_id: uuid::Uuid::new_v4().to_string(),
            },
        )
        .await
    {
        tracing::error!(error = %err, "failed to publish signal_generated");
        kernel.metrics.error("event_publish");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_blocked_when_usdt_dom_rising() {
        let dominance = DominanceAnalysis {
            btc_dominance: None,
            usdt_dominance: Some(8.0),
            interpretation: crate::domain::DominanceInterpretation {
                btc_dom: BtcDomInterpretation::StableOrNeutral,
                usdt_dom: UsdtDomInterpretation::RisingRiskOffShortsFavored,
            },
        };
        assert!(guardrail_blocks(SignalDirection::Long, "ETHUSDT", &dominance));
    }

    #[test]
    fn long_blocked_on_alt_when_btc_dom_rising() {
        let dominance = DominanceAnalysis {
            btc_dominance: Some(60.0),
            usdt_dominance: None,
            interpretation: crate::domain::DominanceInterpretation {
                btc_dom: BtcDomInterpretation::RisingMoneyIntoBtcAltsWeaken,
                usdt_dom: UsdtDomInterpretation::StableOrFalling,
            },
        };
        assert!(guardrail_blocks(SignalDirection::Long, "ETHUSDT", &dominance));
        assert!(!guardrail_blocks(SignalDirection::Long, "BTCUSDT", &dominance));
    }

    #[test]
    fn short_never_blocked_by_guardrails() {
        let dominance = DominanceAnalysis {
            btc_dominance: Some(60.0),
            usdt_dominance: Some(8.0),
            interpretation: crate::domain::DominanceInterpretation {
                btc_dom: BtcDomInterpretation::RisingMoneyIntoBtcAltsWeaken,
                usdt_dom: UsdtDomInterpretation::RisingRiskOffShortsFavored,
            },
        };
        assert!(!guardrail_blocks(SignalDirection::Short, "ETHUSDT", &dominance));
    }

    #[test]
    fn confidence_matches_score_invariant() {
        assert_eq!(Confidence::from_score(75.0), Confidence::High);
        assert_eq!(Confidence::from_score(74.9), Confidence::Medium);
    }

    fn bullish_timeframe(current_price: f64) -> TimeframeAnalysis {
        TimeframeAnalysis {
            interval: "x".into(),
            dow: crate::domain::DowResult {
                trend: Trend::Bullish,
                bos_up: false,
                bos_down: false,
                swing_high_count: 0,
                swing_low_count: 0,
                trend_strength: 0.0,
                volume_confirmation: false,
            },
            wyckoff: None,
            gann: None,
            indicators: crate::domain::IndicatorSet {
                ema20: None,
                ema50: None,
                ema200: None,
                rsi: None,
                macd: None,
                volume_spike: false,
            },
            current_price,
        }
    }

    /// Full weighted-sum scenario (§8): all six categories contribute, and
    /// the total is checked against the worked arithmetic rather than just
    /// "above threshold".
    #[test]
    fn score_candidate_full_breakdown_matches_worked_arithmetic() {
        let mut by_interval = HashMap::new();
        for interval in ["1d", "3d", "1w", "8h"] {
            by_interval.insert(interval.to_string(), bullish_timeframe(50_000.0));
        }

        let mut minor = bullish_timeframe(50_000.0);
        minor.interval = "1h".into();
        by_interval.insert("1h".to_string(), minor);

        let mut four_hour = bullish_timeframe(50_000.0);
        four_hour.interval = "4h".into();
        four_hour.wyckoff = Some(crate::domain::WyckoffResult {
            phase: Some(WyckoffPhase::Accumulation),
            spring: false,
            upthrust: false,
            sos: false,
            sow: false,
            price_position: 0.0,
            volume_ratio: 0.0,
            strength: 0.0,
        });
        four_hour.indicators = crate::domain::IndicatorSet {
            ema20: Some(49_000.0),
            ema50: Some(48_000.0),
            ema200: None,
            rsi: Some(60.0),
            macd: Some(crate::domain::MacdResult { line: 0.0, signal: Some(0.0), histogram: Some(1.0) }),
            volume_spike: true,
        };
        by_interval.insert("4h".to_string(), four_hour);

        let dominance = DominanceAnalysis {
            btc_dominance: Some(40.0),
            usdt_dominance: Some(3.0),
            interpretation: crate::domain::DominanceInterpretation {
                btc_dom: BtcDomInterpretation::FallingGoodForAlts,
                usdt_dom: UsdtDomInterpretation::StableOrFalling,
            },
        };

        let signal = score_candidate("BTCUSDT", &by_interval, SignalDirection::Long, &dominance, &ConstantSafetyCheck)
            .expect("score above MIN_SCORE should produce a signal");

        // trend 30 (primary 15 + secondary 10 + minor 5) + wyckoff 15 +
        // indicators 20 (rsi 7 + macd 7 + ema stack 6) + volume 10 +
        // dominance 10 (btc falling 5 + usdt stable 5, BTC-long table) +
        // safety 10 = 95.
        assert_eq!(signal.score, 95.0);
        assert_eq!(signal.confidence, Confidence::High);
        assert_eq!(signal.reasons["trend"][0], "primary=15.0/15 secondary=10.0/10 minor=5.0/5");
        assert_eq!(signal.reasons["wyckoff"][0], "15/15");
        assert_eq!(signal.reasons["indicators"][0], "20.0/20");
        assert_eq!(signal.reasons["volume"][0], "10/10");
        assert_eq!(signal.reasons["dominance"][0], "10.0/15");
        assert!((signal.entry_range.min - 49_750.0).abs() < 1e-6);
        assert!((signal.entry_range.max - 50_250.0).abs() < 1e-6);
        assert!((signal.take_profit[0] - 51_000.0).abs() < 1e-6);
        assert!((signal.take_profit[1] - 52_500.0).abs() < 1e-6);
        assert!((signal.stop_loss - 49_000.0).abs() < 1e-6);
    }
}
