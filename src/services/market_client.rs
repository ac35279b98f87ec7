//! External market-data client: Binance spot price/klines and a macro
//! (dominance/market-cap) provider, each behind its own circuit breaker and
//! the generic retry wrapper (§4.E item 1-3). REST/JSON call shape follows
//! `scrapers/polymarket_gamma.rs`'s `reqwest::Client` + `error_for_status` +
//! `Context` idiom in the teacher.


use anyhow::Context;
use serde::Deserialize;

use crate::config::Config;
use crate::domain::Candle;
use crate::error::{is_retryable_anyhow, PipelineError, Result};
use crate::resilience::{retry_with_backoff, CallError, CircuitBreaker, RetryPolicy};

/// Wraps a `reqwest` failure (connection, status, or body decode) as a
/// `PipelineError::ExternalApi` so retry/circuit-breaker policy and callers
/// downcasting on error kind see a real status code rather than a string.
fn external_api_err(api_name: &str, context: &str, err: reqwest::Error) -> anyhow::Error {
    anyhow::Error::new(PipelineError::ExternalApi {
        message: format!("{context}: {err}"),
        api_name: api_name.to_string(),
        status_code: err.status().map(|s| s.as_u16()),
    })
}

pub struct MarketClient {
    http: reqwest::Client,
    binance_api_url: String,
    cmc_api_key: Option<String>,
    retry_policy: RetryPolicy,
    price_breaker: CircuitBreaker,
    macro_breaker: CircuitBreaker,
}

#[derive(Debug, Deserialize)]
struct BinanceTickerPrice {
    price: String,
}

impl MarketClient {
    pub fn new(config: &Config) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.default_timeout)
            .build()
            .expect("failed to build http client");
        Self {
            http,
            binance_api_url: config.binance_api_url.clone(),
            cmc_api_key: config.cmc_api_key.clone(),
            retry_policy: RetryPolicy { timeout: config.default_timeout, ..RetryPolicy::from(&config.retry) },
            price_breaker: CircuitBreaker::new(
                "binance_price",
                config.circuit_breaker.failure_threshold,
                config.circuit_breaker.recovery_timeout,
                config.circuit_breaker.failure_window,
            ),
            macro_breaker: CircuitBreaker::new(
                "macro_metrics",
                config.circuit_breaker.failure_threshold,
                config.circuit_breaker.recovery_timeout,
                config.circuit_breaker.failure_window,
            ),
        }
    }

    /// Fetches a single symbol's spot price. Returns `None` (never an error)
    /// on any failure after retries are exhausted — "absent" per §4.E/§7.
    pub async fn fetch_price(&self, symbol: &str) -> Option<f64> {
        let result = self
            .price_breaker
            .call(|| {
                retry_with_backoff(
                    self.retry_policy,
                    "binance_price",
                    || self.fetch_price_once(symbol),
                    is_retryable_anyhow,
                )
            })
            .await;
        match result {
            Ok(price) => Some(price),
            Err(CallError::CircuitOpen(err)) => {
                tracing::warn!(symbol, error = %err, "price fetch skipped, breaker open");
                None
            }
            Err(CallError::Inner(err)) => {
                tracing::warn!(symbol, error = %err, "price fetch failed after retries");
                None
            }
        }
    }

    async fn fetch_price_once(&self, symbol: &str) -> Result<f64> {
        let url = format!("{}/api/v3/ticker/price", self.binance_api_url);
        let resp = self
            .http
            .get(&url)
            .query(&[("symbol", symbol)])
            .send()
            .await
            .map_err(|e| external_api_err("binance_price", "ticker request failed", e))?
            .error_for_status()
            .map_err(|e| external_api_err("binance_price", "ticker status", e))?;
        let body: BinanceTickerPrice =
            resp.json().await.map_err(|e| external_api_err("binance_price", "ticker json", e))?;
        body.price.parse::<f64>().context("binance ticker price parse")
    }

    /// Up to 500 recent candles for `symbol`/`interval`. `None` on failure.
    pub async fn fetch_candles(&self, symbol: &str, interval: &str, limit: u32) -> Option<Vec<Candle>> {
        let result = self
            .price_breaker
            .call(|| {
                retry_with_backoff(
                    self.retry_policy,
                    "binance_klines",
                    || self.fetch_candles_once(symbol, interval, limit),
                    is_retryable_anyhow,
                )
            })
            .await;
        match result {
            Ok(candles) => Some(candles),
            Err(err) => {
                tracing::warn!(symbol, interval, "candle fetch failed: {err:?}");
                None
            }
        }
    }

    async fn fetch_candles_once(&self, symbol: &str, interval: &str, limit: u32) -> Result<Vec<Candle>> {
        let url = format!("{}/api/v3/klines", self.binance_api_url);
        let resp = self
            .http
            .get(&url)
            .query(&[
                ("symbol", symbol.to_string()),
                ("interval", interval.to_string()),
                ("limit", limit.to_string()),
            ])
            .send()
            .await
            .map_err(|e| external_api_err("binance_klines", "klines request failed", e))?
            .error_for_status()
            .map_err(|e| external_api_err("binance_klines", "klines status", e))?;
        let raw: Vec<Vec<serde_json::Value>> =
            resp.json().await.map_err(|e| external_api_err("binance_klines", "klines json", e))?;
        let candles = raw
            .into_iter()
            .filter_map(|row| {
                let open_time = row.first()?.as_i64()? / 1000;
                let open: f64 = row.get(1)?.as_str()?.parse().ok()?;
                let high: f64 = row.get(2)?.as_str()?.parse().ok()?;
                let low: f64 = row.get(3)?.as_str()?.parse().ok()?;
                let close: f64 = row.get(4)?.as_str()?.parse().ok()?;
                let volume: f64 = row.get(5)?.as_str()?.parse().ok()?;
                Some(Candle::new(open_time, open, high, low, close, volume))
            })
            .collect();
        Ok(candles)
    }

    /// Macro metrics from the configured macro provider, keyed to a separate
    /// circuit breaker (§4.E item 3). `None` when `CMC_API_KEY` isn't set or
    /// the call fails after retries.
    pub async fn fetch_macro_metrics(&self) -> Option<(Option<f64>, Option<f64>, Option<f64>)> {
        let api_key = self.cmc_api_key.as_ref()?;
        let result = self
            .macro_breaker
            .call(|| {
                retry_with_backoff(
                    self.retry_policy,
                    "cmc_global_metrics",
                    || self.fetch_macro_once(api_key),
                    is_retryable_anyhow,
                )
            })
            .await;
        match result {
            Ok(metrics) => Some(metrics),
            Err(err) => {
                tracing::warn!("macro metrics fetch failed: {err:?}");
                None
            }
        }
    }

    async fn fetch_macro_once(&self, api_key: &str) -> Result<(Option<f64>, Option<f64>, Option<f64>)> {
        #[derive(Deserialize)]
        struct UsdQuote {
            total_market_cap: Option<f64>,
        }
        #[derive(Deserialize)]
        struct GlobalQuote {
            #[serde(rename = "USD")]
            usd: UsdQuote,
        }
        #[derive(Deserialize)]
        struct GlobalData {
            btc_dominance: Option<f64>,
            quote: GlobalQuote,
        }
        #[derive(Deserialize)]
        struct GlobalResponse {
            data: GlobalData,
        }
        let resp = self
            .http
            .get("https://pro-api.coinmarketcap.com/v1/global-metrics/quotes/latest")
            .header("X-CMC_PRO_API_KEY", api_key)
            .send()
            .await
            .map_err(|e| external_api_err("cmc_global_metrics", "global metrics request failed", e))?
            .error_for_status()
            .map_err(|e| external_api_err("cmc_global_metrics", "global metrics status", e))?;
        let body: GlobalResponse =
            resp.json().await.map_err(|e| external_api_err("cmc_global_metrics", "global metrics json", e))?;
        let btc_dominance = body.data.btc_dominance;
        let total_market_cap = body.data.quote.usd.total_market_cap;

        let usdt_dominance = self.fetch_usdt_dominance(api_key, total_market_cap).await;

        Ok((btc_dominance, usdt_dominance, total_market_cap))
    }

    /// USDT Dominance = USDT market cap / total market cap, ported from
    /// `market_data_service/main.py`'s `fetch_usdt_dominance`. Fails soft to
    /// `None` so one bad CMC call doesn't sink the whole macro snapshot.
    async fn fetch_usdt_dominance(&self, api_key: &str, total_market_cap: Option<f64>) -> Option<f64> {
        #[derive(Deserialize)]
        struct UsdQuote {
            market_cap: Option<f64>,
        }
        #[derive(Deserialize)]
        struct UsdtQuote {
            #[serde(rename = "USD")]
            usd: UsdQuote,
        }
        #[derive(Deserialize)]
        struct UsdtData {
            #[serde(rename = "USDT")]
            usdt: UsdtQuote,
        }
        #[derive(Deserialize)]
        struct UsdtResponse {
            data: UsdtData,
        }

        let total_market_cap = total_market_cap?;
        if total_market_cap <= 0.0 {
            return None;
        }

        let result = self
            .http
            .get("https://pro-api.coinmarketcap.com/v1/cryptocurrency/quotes/latest")
            .header("X-CMC_PRO_API_KEY", api_key)
            .query(&[("symbol", "USDT")])
            .send()
            .await
            .context("cmc usdt quote request failed")
            .and_then(|r| r.error_for_status().context("cmc usdt quote status"));
        let resp = match result {
            Ok(r) => r,
            Err(err) => {
                tracing::warn!(error = %err, "usdt dominance fetch failed");
                return None;
            }
        };
        let body: UsdtResponse = match resp.json().await.context("cmc usdt quote json") {
            Ok(b) => b,
            Err(err) => {
                tracing::warn!(error = %err, "usdt dominance fetch failed");
                return None;
            }
        };
        let usdt_market_cap = body.data.usdt.usd.market_cap?;
        Some(usdt_market_cap / total_market_cap * 100.0)
    }
}

/// Annualised volatility = stdev of daily returns × √252, as a percentage
/// (§4.E item 4).
pub fn annualized_volatility(daily_closes: &[f64]) -> Option<f64> {
    if daily_closes.len() < 2 {
        return None;
    }
    let returns: Vec<f64> = daily_closes
        .windows(2)
        .filter_map(|w| if w[0] != 0.0 { Some((w[1] - w[0]) / w[0]) } else { None })
        .collect();
    if returns.len() < 2 {
        return None;
    }
    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (returns.len() - 1) as f64;
    let stdev = variance.sqrt();
    Some(stdev * (252.0_f64).sqrt() * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn annualized_volatility_absent_under_two_points() {
        assert!(annualized_volatility(&[100.0]).is_none());
    }

    #[test]
    fn annualized_volatility_is_nonnegative() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + (i as f64 * 0.3).sin() * 3.0).collect();
        let v = annualized_volatility(&closes).unwrap();
        assert!(v >= 0.0);
    }
}
