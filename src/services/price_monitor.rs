//! Price/Volatility Monitor (§4.G). 60-second cadence; maintains an
//! in-memory ring of (timestamp, price) per symbol, owned exclusively by
//! this loop (§5: "accessed only by the Price Monitor's main loop").

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::domain::{
    EventEnvelope, PriceUpdate, VolatilityEvent, VolatilityKind, VolatilityTimeframe,
    STREAM_PRICE_UPDATE_READY,
};
use crate::error::Result;
use crate::kernel::ServiceKernel;

use super::market_client::MarketClient;

const CYCLE_SECS: u64 = 60;
const WINDOW_5M_SECS: i64 = 300;
const WINDOW_15M_SECS: i64 = 900;
const THRESHOLD_5M: f64 = 0.03;
const THRESHOLD_15M_ALT: f64 = 0.05;
const THRESHOLD_15M_BTC: f64 = 0.005;

pub async fn run(kernel: Arc<ServiceKernel>) -> Result<()> {
    let client = MarketClient::new(&kernel.config);
    let mut rings: HashMap<String, VecDeque<(i64, f64)>> = HashMap::new();

    while kernel.running.load(Ordering::SeqCst) {
        if let Err(err) = run_cycle(&kernel, &client, &mut rings).await {
            tracing::error!(error = %err, "price monitor cycle failed");
            kernel.metrics.error("price_monitor_cycle");
        }
        sleep_chunked(&kernel, CYCLE_SECS).await;
    }
    Ok(())
}

async fn sleep_chunked(kernel: &ServiceKernel, secs: u64) {
    for _ in 0..secs {
        if !kernel.running.load(Ordering::SeqCst) {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
    }
}

async fn run_cycle(
    kernel: &ServiceKernel,
    client: &MarketClient,
    rings: &mut HashMap<String, VecDeque<(i64, f64)>>,
) -> Result<()> {
    let now = chrono::Utc::now().timestamp();
    let mut prices = HashMap::new();
    let mut volatilities = Vec::new();

    for symbol in &kernel.config.coins {
        let Some(price) = client.fetch_price(symbol).await else { continue };
        prices.insert(symbol.clone(), price);

        let ring = rings.entry(symbol.clone()).or_default();
        ring.push_back((now, price));
        while ring.front().map(|(ts, _)| now - ts > WINDOW_15M_SECS).unwrap_or(false) {
            ring.pop_front();
        }

        if let Some(oldest) = oldest_within(ring, now, WINDOW_5M_SECS) {
            if let Some(event) = check_change(symbol, price, oldest, THRESHOLD_5M, VolatilityTimeframe::FiveMinutes) {
                volatilities.push(event);
            }
        }

        if let Some(oldest) = oldest_within(ring, now, WINDOW_15M_SECS) {
            if symbol == "BTCUSDT" {
                if let Some(mut event) =
                    check_change(symbol, price, oldest, THRESHOLD_15M_BTC, VolatilityTimeframe::FifteenMinutes)
                {
                    event.kind = VolatilityKind::BtcMovement;
                    volatilities.push(event);
                }
            } else if let Some(event) =
                check_change(symbol, price, oldest, THRESHOLD_15M_ALT, VolatilityTimeframe::FifteenMinutes)
            {
                volatilities.push(event);
            }
        }
    }

    let has_volatility = !volatilities.is_empty();
    let message = if has_volatility {
        format!("{} volatility event(s) detected", volatilities.len())
    } else {
        "no significant moves".to_string()
    };

    let update = PriceUpdate { timestamp: now, prices: prices.clone(), volatilities: volatilities.clone(), message };
    kernel.docstore.insert_price_update(&update).await?;

    let payload = serde_json::json!({
        "timestamp": now,
        "prices": prices,
        "volatilities": volatilities,
        "has_volatility": has_volatility,
    });
    if let Err(err) = kernel
        .event_bus
        .publish(
            STREAM_PRICE_UPDATE_READY,
            EventEnvelope {
                event_name: STREAM_PRICE_UPDATE_READY.to_string(),
                event_timestamp: now,
                payload,
                correlation_id: uuid::Uuid::new_v4().to_string(),
            },
        )
        .await
    {
        tracing::error!(error = %err, "failed to publish price_update_ready");
        kernel.metrics.error("event_publish");
    }

    Ok(())
}

fn oldest_within(ring: &VecDeque<(i64, f64)>, now: i64, window_secs: i64) -> Option<f64> {
    ring.iter().find(|(ts, _)| now - ts <= window_secs).map(|(_, price)| *price)
}

fn check_change(
    symbol: &str,
    latest: f64,
    oldest: f64,
    threshold: f64,
    timeframe: VolatilityTimeframe,
) -> Option<VolatilityEvent> {
    if oldest == 0.0 {
        return None;
    }
    let change_pct = (latest - oldest) / oldest;
    if change_pct.abs() < threshold {
        return None;
    }
    let kind = if change_pct >= 0.0 { VolatilityKind::Pump } else { VolatilityKind::Dump };
    Some(VolatilityEvent { kind, symbol: symbol.to_string(), change_pct: change_pct * 100.0, timeframe })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_pump_above_threshold() {
        let event = check_change("ETHUSDT", 103.1, 100.0, THRESHOLD_5M, VolatilityTimeframe::FiveMinutes).unwrap();
        assert_eq!(event.kind, VolatilityKind::Pump);
    }

    #[test]
    fn no_event_below_threshold() {
        assert!(check_change("ETHUSDT", 101.0, 100.0, THRESHOLD_5M, VolatilityTimeframe::FiveMinutes).is_none());
    }

    #[test]
    fn detects_dump() {
        let event = check_change("ETHUSDT", 96.0, 100.0, THRESHOLD_5M, VolatilityTimeframe::FiveMinutes).unwrap();
        assert_eq!(event.kind, VolatilityKind::Dump);
    }
}
