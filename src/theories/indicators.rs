//! Classical indicators (§4.D). All take a price series ordered oldest-first.

use crate::domain::MacdResult;

/// Classical exponential moving average. For `len < period`, falls back to
/// the simple mean of the whole series.
pub fn ema(prices: &[f64], period: usize) -> Option<f64> {
    if prices.is_empty() || period == 0 {
        return None;
    }
    if prices.len() < period {
        return Some(prices.iter().sum::<f64>() / prices.len() as f64);
    }
    let alpha = 2.0 / (period as f64 + 1.0);
    let seed = prices[..period].iter().sum::<f64>() / period as f64;
    let mut value = seed;
    for price in &prices[period..] {
        value = (price - value) * alpha + value;
    }
    Some(value)
}

/// Classical gain/loss average RSI. Returns 100 when avg_loss is 0.
/// Absent (`None`) when `len < period + 1`.
pub fn rsi(prices: &[f64], period: usize) -> Option<f64> {
    if prices.len() < period + 1 {
        return None;
    }
    let deltas: Vec<f64> = prices.windows(2).map(|w| w[1] - w[0]).collect();
    let window = &deltas[deltas.len() - period..];
    let avg_gain: f64 =
        window.iter().map(|d| if *d > 0.0 { *d } else { 0.0 }).sum::<f64>() / period as f64;
    let avg_loss: f64 =
        window.iter().map(|d| if *d < 0.0 { -*d } else { 0.0 }).sum::<f64>() / period as f64;
    if avg_loss == 0.0 {
        return Some(100.0);
    }
    let rs = avg_gain / avg_loss;
    Some(100.0 - (100.0 / (1.0 + rs)))
}

/// MACD(12, 26, 9). Signal/histogram absent when there isn't enough history
/// to build the 9-period EMA of the MACD line.
pub fn macd(prices: &[f64], fast: usize, slow: usize, signal_period: usize) -> Option<MacdResult> {
    if prices.len() < slow {
        return None;
    }
    // Build the MACD line series so we can EMA it for the signal line.
    let mut macd_line_series = Vec::with_capacity(prices.len() - slow + 1);
    for end in slow..=prices.len() {
        let window = &prices[..end];
        let fast_ema = ema(window, fast)?;
        let slow_ema = ema(window, slow)?;
        macd_line_series.push(fast_ema - slow_ema);
    }
    let line = *macd_line_series.last()?;
    if macd_line_series.len() < signal_period {
        return Some(MacdResult { line, signal: None, histogram: None });
    }
    let signal = ema(&macd_line_series, signal_period)?;
    Some(MacdResult { line, signal: Some(signal), histogram: Some(line - signal) })
}

#[derive(Debug, Clone, Copy)]
pub struct BollingerBands {
    pub mean: f64,
    pub upper: f64,
    pub lower: f64,
}

/// Mean ± `k` standard deviations over the last `period` closes.
pub fn bollinger(prices: &[f64], period: usize, k: f64) -> Option<BollingerBands> {
    if prices.len() < period {
        return None;
    }
    let window = &prices[prices.len() - period..];
    let mean = window.iter().sum::<f64>() / period as f64;
    let variance = window.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / period as f64;
    let stdev = variance.sqrt();
    Some(BollingerBands { mean, upper: mean + k * stdev, lower: mean - k * stdev })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ema_falls_back_to_mean_under_period() {
        let v = ema(&[1.0, 2.0, 3.0], 10).unwrap();
        assert!((v - 2.0).abs() < 1e-9);
    }

    #[test]
    fn rsi_is_bounded() {
        let prices: Vec<f64> = (0..30).map(|i| 100.0 + (i as f64 * 0.37).sin() * 5.0).collect();
        let v = rsi(&prices, 14).unwrap();
        assert!((0.0..=100.0).contains(&v));
    }

    #[test]
    fn rsi_all_gains_is_100() {
        let prices: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        let v = rsi(&prices, 14).unwrap();
        assert_eq!(v, 100.0);
    }

    #[test]
    fn rsi_absent_when_short() {
        assert!(rsi(&[1.0, 2.0, 3.0], 14).is_none());
    }

    #[test]
    fn macd_absent_when_short() {
        assert!(macd(&[1.0, 2.0, 3.0], 12, 26, 9).is_none());
    }
}
