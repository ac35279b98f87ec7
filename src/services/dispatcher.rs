//! Notification Dispatcher (§4.I). Subscribes to `price_update_ready` and
//! `signal_generated`, formats and posts to two chat channels, and
//! independently runs a 5-minute market-outlook ticker.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::{PriceUpdate, Signal, STREAM_PRICE_UPDATE_READY, STREAM_SIGNAL_GENERATED};
use crate::error::{is_retryable_anyhow, PipelineError, Result};
use crate::kernel::ServiceKernel;
use crate::resilience::{retry_with_backoff, CallError, CircuitBreaker, RetryPolicy, SlidingWindowRateLimiter};
use crate::validation::parse_event;

const CONSUMER_GROUP: &str = "notification_dispatcher";
const OUTLOOK_CYCLE_SECS: u64 = 300;
/// §4.I rate limit: 30 messages / 1 second sliding window.
const CHAT_RATE_LIMIT: usize = 30;

fn chat_provider_err(context: &str, err: reqwest::Error) -> anyhow::Error {
    anyhow::Error::new(PipelineError::ExternalApi {
        message: format!("{context}: {err}"),
        api_name: "chat_provider".to_string(),
        status_code: err.status().map(|s| s.as_u16()),
    })
}

pub struct Dispatcher {
    http: reqwest::Client,
    bot_token: Option<String>,
    price_chat_id: Option<String>,
    signal_chat_id: Option<String>,
    rate_limiter: SlidingWindowRateLimiter,
    breaker: CircuitBreaker,
    retry_policy: RetryPolicy,
}

impl Dispatcher {
    fn new(kernel: &ServiceKernel) -> Self {
        Self {
            http: reqwest::Client::new(),
            bot_token: kernel.config.telegram_bot_token.clone(),
            price_chat_id: kernel.config.telegram_price_chat_id.clone(),
            signal_chat_id: kernel.config.telegram_signal_chat_id.clone(),
            rate_limiter: SlidingWindowRateLimiter::new(CHAT_RATE_LIMIT, Duration::from_secs(1)),
            breaker: CircuitBreaker::new(
                "chat_provider",
                kernel.config.circuit_breaker.failure_threshold,
                kernel.config.circuit_breaker.recovery_timeout,
                kernel.config.circuit_breaker.failure_window,
            ),
            retry_policy: RetryPolicy {
                timeout: kernel.config.default_timeout,
                ..RetryPolicy::from(&kernel.config.retry)
            },
        }
    }

    async fn send(&self, chat_id: &str, text: &str) -> Result<()> {
        self.rate_limiter.acquire().await;
        let result = self
            .breaker
            .call(|| {
                retry_with_backoff(
                    self.retry_policy,
                    "chat_send",
                    || self.send_once(chat_id, text),
                    is_retryable_anyhow,
                )
            })
            .await;
        match result {
            Ok(()) => Ok(()),
            Err(CallError::CircuitOpen(err)) => Err(err.into()),
            Err(CallError::Inner(err)) => Err(err),
        }
    }

    async fn send_once(&self, chat_id: &str, text: &str) -> Result<()> {
        let Some(token) = &self.bot_token else {
            return Ok(()); // no chat provider configured; treat as a no-op send
        };
        let url = format!("https://api.telegram.org/bot{token}/sendMessage");
        let resp = self
            .http
            .post(&url)
            .json(&serde_json::json!({"chat_id": chat_id, "text": text, "parse_mode": "HTML"}))
            .send()
            .await
            .map_err(|e| chat_provider_err("telegram sendMessage request failed", e))?;

        if resp.status().as_u16() == 429 {
            let retry_after = resp
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(1);
            tokio::time::sleep(Duration::from_secs(retry_after)).await;
            return Err(anyhow::Error::new(PipelineError::ExternalApi {
                message: format!("rate limited, honoured retry-after={retry_after}s"),
                api_name: "chat_provider".to_string(),
                status_code: Some(429),
            }));
        }

        resp.error_for_status().map_err(|e| chat_provider_err("telegram sendMessage status", e))?;
        Ok(())
    }
}

pub async fn run(kernel: Arc<ServiceKernel>) -> Result<()> {
    let dispatcher = Arc::new(Dispatcher::new(&kernel));

    let outlook_kernel = kernel.clone();
    let outlook_dispatcher = dispatcher.clone();
    let outlook_task = tokio::spawn(async move {
        run_outlook_ticker(outlook_kernel, outlook_dispatcher).await;
    });

    let kernel_for_handler = kernel.clone();
    let dispatcher_for_handler = dispatcher.clone();
    let handler: crate::eventbus::Handler = Arc::new(move |event_name, payload| {
        let kernel = kernel_for_handler.clone();
        let dispatcher = dispatcher_for_handler.clone();
        Box::pin(async move { handle_event(&kernel, &dispatcher, event_name, payload).await })
    });

    let result = kernel
        .event_bus
        .subscribe(
            &[STREAM_PRICE_UPDATE_READY, STREAM_SIGNAL_GENERATED],
            CONSUMER_GROUP,
            "dispatcher-1",
            handler,
            kernel.running.clone(),
        )
        .await;

    let _ = outlook_task.await;
    result
}

async fn handle_event(
    kernel: &ServiceKernel,
    dispatcher: &Dispatcher,
    event_name: String,
    payload: serde_json::Value,
) -> Result<()> {
    match event_name.as_str() {
        STREAM_PRICE_UPDATE_READY => {
            if let Some(chat_id) = &dispatcher.price_chat_id {
                let update: PriceUpdate = match parse_event(STREAM_PRICE_UPDATE_READY, payload) {
                    Ok(update) => update,
                    Err(err) => {
                        tracing::error!(error = %err, "malformed price_update_ready payload, acking to avoid poison redelivery");
                        kernel.metrics.error("validation");
                        return Ok(());
                    }
                };
                let text = format_price_line(&update);
                if let Err(err) = dispatcher.send(chat_id, &text).await {
                    tracing::error!(error = %err, "failed to send price update");
                    kernel.metrics.error("chat_send");
                }
            }
        }
        STREAM_SIGNAL_GENERATED => {
            if let Some(chat_id) = &dispatcher.signal_chat_id {
                let signal: Signal = match parse_event(STREAM_SIGNAL_GENERATED, payload) {
                    Ok(signal) => signal,
                    Err(err) => {
                        tracing::error!(error = %err, "malformed signal_generated payload, acking to avoid poison redelivery");
                        kernel.metrics.error("validation");
                        return Ok(());
                    }
                };
                let text = format_signal_message(&signal);
                if let Err(err) = dispatcher.send(chat_id, &text).await {
                    tracing::error!(error = %err, "failed to send signal notification");
                    kernel.metrics.error("chat_send");
                }
            }
        }
        other => {
            tracing::warn!(event = other, "dispatcher received unrecognised event; skipping");
        }
    }
    Ok(())
}

fn format_price_line(update: &PriceUpdate) -> String {
    let local_ts = chrono::Local::now().format("%H:%M:%S");
    let mut symbols: Vec<&String> = update.prices.keys().collect();
    symbols.sort();
    let body = symbols
        .into_iter()
        .map(|symbol| format!("{symbol}:{:.2}", update.prices[symbol]))
        .collect::<Vec<_>>()
        .join("|");
    format!("[{local_ts}] {body}")
}

fn format_signal_message(signal: &Signal) -> String {
    let mut lines = vec![
        format!("Asset: {}", signal.asset),
        format!("Type: {:?}", signal.direction),
        format!("Score: {:.1} ({:?})", signal.score, signal.confidence),
        format!("Entry: {:.4} - {:.4}", signal.entry_range.min, signal.entry_range.max),
        format!("Take profit: {}", signal.take_profit.iter().map(|t| format!("{t:.4}")).collect::<Vec<_>>().join(", ")),
        format!("Stop loss: {:.4}", signal.stop_loss),
    ];
    for (category, notes) in &signal.reasons {
        lines.push(format!("{category}: {}", notes.join("; ")));
    }
    lines.push(format!("Liquidity: {}", signal.liquidity_note));
    lines.push(format!("Funding: {}", signal.funding_note));
    lines.join("\n")
}

async fn run_outlook_ticker(kernel: Arc<ServiceKernel>, dispatcher: Arc<Dispatcher>) {
    while kernel.running.load(Ordering::SeqCst) {
        if let Some(chat_id) = &dispatcher.signal_chat_id {
            let text = match kernel.docstore.latest_analysis().await {
                Ok(Some(analysis)) => format_outlook(&analysis),
                Ok(None) => "Market outlook: no analysis data yet (stale)".to_string(),
                Err(err) => {
                    tracing::error!(error = %err, "failed to load analysis for outlook ticker");
                    "Market outlook: unavailable (no data)".to_string()
                }
            };
            if let Err(err) = dispatcher.send(chat_id, &text).await {
                tracing::error!(error = %err, "failed to send outlook ticker message");
                kernel.metrics.error("chat_send");
            }
        }
        sleep_chunked(&kernel, OUTLOOK_CYCLE_SECS).await;
    }
}

fn format_outlook(analysis: &crate::domain::AnalysisDocument) -> String {
    let conflicts: Vec<&String> = analysis
        .sentiment_details
        .iter()
        .filter(|d| d.contains("bullish") || d.contains("bearish"))
        .collect();
    format!(
        "Market outlook\nBias: {:?} (strength {:.0})\nBTC.D: {:?}\nUSDT.D: {:?}\nEvidence: {}",
        analysis.sentiment,
        analysis.trend_strength,
        analysis.dominance_analysis.interpretation.btc_dom,
        analysis.dominance_analysis.interpretation.usdt_dom,
        conflicts.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", "),
    )
}

async fn sleep_chunked(kernel: &ServiceKernel, secs: u64) {
    for _ in 0..secs {
        if !kernel.running.load(Ordering::SeqCst) {
            return;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn price_line_is_sorted_and_compact() {
        let mut prices = HashMap::new();
        prices.insert("ETHUSDT".to_string(), 3200.5);
        prices.insert("BTCUSDT".to_string(), 65000.1234);
        let update = PriceUpdate { timestamp: 0, prices, volatilities: vec![], message: String::new() };
        let line = format_price_line(&update);
        assert!(line.contains("BTCUSDT:65000.12"));
        assert!(line.find("BTCUSDT").unwrap() < line.find("ETHUSDT").unwrap());
    }
}
