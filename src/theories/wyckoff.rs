//! Wyckoff-phase theory (§4.D). Length precondition: ≥ 50 candles.

use crate::domain::{Candle, WyckoffPhase, WyckoffResult};

fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        0.0
    } else {
        xs.iter().sum::<f64>() / xs.len() as f64
    }
}

/// Returns `None` when fewer than 50 candles are available.
pub fn wyckoff_phase(candles: &[Candle]) -> Option<WyckoffResult> {
    if candles.len() < 50 {
        return None;
    }

    let last20 = &candles[candles.len() - 20..];
    let range_high = last20.iter().map(|c| c.high).fold(f64::MIN, f64::max);
    let range_low = last20.iter().map(|c| c.low).fold(f64::MAX, f64::min);
    let current_close = candles.last().unwrap().close;
    let price_position = if range_high > range_low {
        ((current_close - range_low) / (range_high - range_low)).clamp(0.0, 1.0)
    } else {
        0.5
    };

    let volumes: Vec<f64> = candles.iter().map(|c| c.volume).collect();
    let recent5_vol = mean(&volumes[volumes.len() - 5..]);
    let recent20_vol = mean(&volumes[volumes.len() - 20..]);
    let volume_ratio = if recent20_vol > 0.0 { recent5_vol / recent20_vol } else { 0.0 };

    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let short_ma = mean(&closes[closes.len() - 10..]);
    let long_ma = mean(&closes[closes.len() - 30..]);

    let last = candles[candles.len() - 1];
    let prior = candles[candles.len() - 2];

    let spring = price_position < 0.3 && last.low < prior.low && last.close > prior.low;
    let upthrust = price_position > 0.7 && last.high > prior.high && last.close < prior.high;

    let one_bar_return = if prior.close != 0.0 { (last.close - prior.close) / prior.close } else { 0.0 };
    let sos = one_bar_return > 0.02 && volume_ratio > 1.3;
    let sow = one_bar_return < -0.02 && volume_ratio > 1.3;

    let close_rising_5bar = closes[closes.len() - 1] > closes[closes.len() - 6];
    let close_falling_5bar = closes[closes.len() - 1] < closes[closes.len() - 6];

    let phase = if price_position < 0.3
        && short_ma < long_ma
        && (spring || (volume_ratio > 1.2 && close_rising_5bar))
    {
        Some(WyckoffPhase::Accumulation)
    } else if price_position >= 0.3 && short_ma > long_ma && volume_ratio > 1.1 {
        Some(WyckoffPhase::Markup)
    } else if price_position > 0.7
        && short_ma > long_ma
        && (upthrust || (volume_ratio < 0.9 && close_falling_5bar))
    {
        Some(WyckoffPhase::Distribution)
    } else if price_position <= 0.7 && short_ma < long_ma && volume_ratio > 1.1 {
        Some(WyckoffPhase::Markdown)
    } else {
        None
    };

    let strength = if sos || spring {
        0.8
    } else if phase.is_some() {
        0.6
    } else {
        0.3
    };

    Some(WyckoffResult {
        phase,
        spring,
        upthrust,
        sos,
        sow,
        price_position,
        volume_ratio,
        strength,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_candles(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| Candle::new(i as i64, 100.0, 101.0, 99.0, 100.0, 10.0))
            .collect()
    }

    #[test]
    fn absent_under_50_candles() {
        assert!(wyckoff_phase(&flat_candles(49)).is_none());
    }

    #[test]
    fn present_at_50_candles() {
        assert!(wyckoff_phase(&flat_candles(50)).is_some());
    }

    #[test]
    fn price_position_is_clamped() {
        let result = wyckoff_phase(&flat_candles(60)).unwrap();
        assert!((0.0..=1.0).contains(&result.price_position));
    }
}
