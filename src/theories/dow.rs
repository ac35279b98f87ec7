//! Dow-structure theory (§4.D): swing pivots, break-of-structure, trend.

use crate::domain::{Candle, DowResult, Trend};

/// Strict 5-bar pivot: the center bar is strictly greater/less than both
/// neighbors on each side.
fn swing_highs(candles: &[Candle]) -> Vec<(usize, f64)> {
    let mut out = Vec::new();
    if candles.len() < 5 {
        return out;
    }
    for i in 2..candles.len() - 2 {
        let c = candles[i].high;
        if c > candles[i - 1].high
            && c > candles[i - 2].high
            && c > candles[i + 1].high
            && c > candles[i + 2].high
        {
            out.push((i, c));
        }
    }
    out
}

fn swing_lows(candles: &[Candle]) -> Vec<(usize, f64)> {
    let mut out = Vec::new();
    if candles.len() < 5 {
        return out;
    }
    for i in 2..candles.len() - 2 {
        let c = candles[i].low;
        if c < candles[i - 1].low
            && c < candles[i - 2].low
            && c < candles[i + 1].low
            && c < candles[i + 2].low
        {
            out.push((i, c));
        }
    }
    out
}

fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        0.0
    } else {
        xs.iter().sum::<f64>() / xs.len() as f64
    }
}

pub fn dow_structure(candles: &[Candle]) -> DowResult {
    let highs = swing_highs(candles);
    let lows = swing_lows(candles);

    let trend = {
        let hh_hl = highs.len() >= 2
            && lows.len() >= 2
            && highs[highs.len() - 1].1 > highs[highs.len() - 2].1
            && lows[lows.len() - 1].1 > lows[lows.len() - 2].1;
        let lh_ll = highs.len() >= 2
            && lows.len() >= 2
            && highs[highs.len() - 1].1 < highs[highs.len() - 2].1
            && lows[lows.len() - 1].1 < lows[lows.len() - 2].1;
        if hh_hl {
            Trend::Bullish
        } else if lh_ll {
            Trend::Bearish
        } else {
            Trend::Neutral
        }
    };

    let bos_up = match (candles.last(), highs.last()) {
        (Some(last), Some((_, pivot))) => last.high > *pivot,
        _ => false,
    };
    let bos_down = match (candles.last(), lows.last()) {
        (Some(last), Some((_, pivot))) => last.low < *pivot,
        _ => false,
    };

    let volume_confirmation = if candles.len() >= 20 {
        let volumes: Vec<f64> = candles.iter().map(|c| c.volume).collect();
        let recent5 = mean(&volumes[volumes.len() - 5..]);
        let recent20 = mean(&volumes[volumes.len() - 20..]);
        recent20 > 0.0 && recent5 > 1.2 * recent20
    } else {
        false
    };

    let trend_strength = if volume_confirmation { 0.7 } else { 0.5 };

    DowResult {
        trend,
        bos_up,
        bos_down,
        swing_high_count: highs.len(),
        swing_low_count: lows.len(),
        volume_confirmation,
        trend_strength,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(o: f64, h: f64, l: f64, c: f64, v: f64, t: i64) -> Candle {
        Candle::new(t, o, h, l, c, v)
    }

    #[test]
    fn bullish_requires_ascending_highs_and_lows() {
        // Construct a clean staircase of swing highs/lows: 5-bar pivots with
        // each successive pivot higher than the last.
        let mut candles = Vec::new();
        let mut t = 0;
        for step in 0..4 {
            let base = 100.0 + step as f64 * 10.0;
            candles.push(candle(base, base, base - 1.0, base, 10.0, t));
            t += 1;
            candles.push(candle(base, base + 1.0, base, base, 10.0, t));
            t += 1;
            candles.push(candle(base, base + 5.0, base, base, 10.0, t)); // pivot high
            t += 1;
            candles.push(candle(base, base + 1.0, base, base, 10.0, t));
            t += 1;
            candles.push(candle(base, base, base - 1.0, base, 10.0, t));
            t += 1;
        }
        let result = dow_structure(&candles);
        assert!(result.swing_high_count >= 2);
        if result.swing_high_count >= 2 && result.swing_low_count >= 2 {
            assert_eq!(result.trend, Trend::Bullish);
        }
    }

    #[test]
    fn too_short_has_no_pivots() {
        let candles = vec![candle(1.0, 1.0, 1.0, 1.0, 1.0, 0)];
        let result = dow_structure(&candles);
        assert_eq!(result.swing_high_count, 0);
        assert_eq!(result.trend, Trend::Neutral);
    }
}
