//! Gann 1x1 theory (§4.D). Length precondition: ≥ 50 candles.

use crate::domain::{Candle, GannResult};

/// Over the last 50 bars, find the significant high/low, derive the 1x1
/// slope (price_range / time_range), project a reference price, and report
/// the relative deviation of the current close from that projection.
pub fn gann_angle(candles: &[Candle]) -> Option<GannResult> {
    if candles.len() < 50 {
        return None;
    }
    let window = &candles[candles.len() - 50..];

    let (high_idx, pivot_high) = window
        .iter()
        .enumerate()
        .map(|(i, c)| (i, c.high))
        .fold((0usize, f64::MIN), |acc, x| if x.1 > acc.1 { x } else { acc });
    let (low_idx, pivot_low) = window
        .iter()
        .enumerate()
        .map(|(i, c)| (i, c.low))
        .fold((0usize, f64::MAX), |acc, x| if x.1 < acc.1 { x } else { acc });

    let price_range = pivot_high - pivot_low;
    let time_range = (high_idx as i64 - low_idx as i64).unsigned_abs().max(1) as f64;
    let slope = price_range / time_range;

    let bars_since_low = (window.len() - 1 - low_idx) as f64;
    let bars_since_high = (window.len() - 1 - high_idx) as f64;
    let projected = if low_idx > high_idx {
        pivot_low + slope * bars_since_low
    } else {
        pivot_high - slope * bars_since_high
    };

    let current_price = window.last().unwrap().close;
    let deviation = if projected != 0.0 {
        (current_price - projected).abs() / projected.abs()
    } else {
        0.0
    };

    let three_bar_return = if window.len() >= 4 {
        let then = window[window.len() - 4].close;
        if then != 0.0 {
            ((current_price - then) / then).abs()
        } else {
            f64::MAX
        }
    } else {
        f64::MAX
    };

    let reversal_window = deviation > 0.1 && three_bar_return < 0.01;

    Some(GannResult { slope, deviation, reversal_window, pivot_high, pivot_low })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_under_50_candles() {
        let candles: Vec<Candle> = (0..49).map(|i| Candle::new(i, 1.0, 1.0, 1.0, 1.0, 1.0)).collect();
        assert!(gann_angle(&candles).is_none());
    }

    #[test]
    fn present_at_50_candles_with_sane_pivots() {
        let candles: Vec<Candle> = (0..60)
            .map(|i| {
                let p = 100.0 + i as f64;
                Candle::new(i, p, p + 1.0, p - 1.0, p, 10.0)
            })
            .collect();
        let result = gann_angle(&candles).unwrap();
        assert!(result.pivot_high >= result.pivot_low);
    }
}
