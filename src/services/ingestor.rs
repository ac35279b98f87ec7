//! Market Data Ingestor (§4.E). 5-minute cadence: prices, multi-timeframe
//! candles, macro metrics, persist a MarketSnapshot, emit
//! `market_data_updated`.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::domain::{
    Candle, EventEnvelope, MarketSnapshot, TIMEFRAMES, STREAM_MARKET_DATA_UPDATED,
};
use crate::error::Result;
use crate::kernel::ServiceKernel;

use super::market_client::{annualized_volatility, MarketClient};

const CYCLE_SECS: u64 = 300;
const CANDLE_LIMIT: u32 = 500;

pub async fn run(kernel: Arc<ServiceKernel>) -> Result<()> {
    let client = MarketClient::new(&kernel.config);
    while kernel.running.load(Ordering::SeqCst) {
        if let Err(err) = run_cycle(&kernel, &client).await {
            tracing::error!(error = %err, "ingest cycle failed");
            kernel.metrics.error("ingest_cycle");
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

async fn run_cycle(kernel: &ServiceKernel, client: &MarketClient) -> Result<()> {
    let correlation_id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().timestamp();

    let mut snapshot = MarketSnapshot::new(format!("market_{now}"), now);

    for symbol in &kernel.config.coins {
        if let Some(price) = client.fetch_price(symbol).await {
            snapshot.prices.insert(symbol.clone(), price);
        }
    }

    // Failed external calls are omitted (§4.E/§7): a failed price fetch
    // still lets the cycle proceed, it just never populates that symbol.
    if !snapshot.is_valid() {
        tracing::warn!(correlation_id = %correlation_id, "ingest cycle obtained no prices; skipping persist/emit");
        return Ok(());
    }

    for symbol in &kernel.config.coins {
        let mut per_interval: std::collections::HashMap<String, Vec<Candle>> =
            std::collections::HashMap::new();
        for interval in TIMEFRAMES {
            if let Some(candles) = client.fetch_candles(symbol, interval, CANDLE_LIMIT).await {
                per_interval.insert(interval.to_string(), candles);
            }
        }
        if !per_interval.is_empty() {
            snapshot.candlesticks.insert(symbol.clone(), per_interval);
        }
    }

    if let Some((btc_dominance, usdt_dominance, total_market_cap)) = client.fetch_macro_metrics().await {
        snapshot.metrics.btc_dominance = btc_dominance;
        snapshot.metrics.usdt_dominance = usdt_dominance;
        snapshot.metrics.total_market_cap = total_market_cap;
    }

    if let Some(daily) = snapshot.candles_for("BTCUSDT", "1d") {
        let closes: Vec<f64> = daily.iter().rev().take(30).rev().map(|c| c.close).collect();
        snapshot.metrics.btc_volatility = annualized_volatility(&closes);
    }

    let has_candlesticks = !snapshot.candlesticks.is_empty();
    let has_metrics = snapshot.metrics.btc_dominance.is_some() || snapshot.metrics.usdt_dominance.is_some();

    // Database write failure aborts the cycle with no event (§7).
    kernel.docstore.insert_snapshot(&snapshot).await?;

    let payload = serde_json::json!({
        "timestamp": now,
        "coins": kernel.config.coins,
        "has_candlesticks": has_candlesticks,
        "has_metrics": has_metrics,
        "correlation_id": correlation_id,
    });
    match kernel
        .event_bus
        .publish(
            STREAM_MARKET_DATA_UPDATED,
            EventEnvelope {
                event_name: STREAM_MARKET_DATA_UPDATED.to_string(),
                event_timestamp: now,
                payload,
                correlation_id: correlation_id.clone(),
            },
        )
        .await
    {
        Ok(()) => {}
        Err(err) => {
            // Event-publish failure is logged and counted; the producer
            // continues (§7) rather than aborting the cycle.
            tracing::error!(correlation_id = %correlation_id, error = %err, "failed to publish market_data_updated");
            kernel.metrics.error("event_publish");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_invalid_without_prices() {
        let snapshot = MarketSnapshot::new("market_0".into(), 0);
        assert!(!snapshot.is_valid());
    }
}
