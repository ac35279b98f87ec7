//! Redis Streams implementation of the event bus, grounded in
//! `original_source/shared/events.py` (stream naming `events:{event_name}`,
//! `XGROUP CREATE ... MKSTREAM`, `XREADGROUP`) and in the async `redis`
//! client usage pattern from
//! `aibysid-HyperLiquidMM/backend/mm-engine-rs/src/publisher.rs`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Value};
use serde_json::Value as JsonValue;

use crate::domain::EventEnvelope;
use crate::error::{PipelineError, Result};
use crate::observability::ServiceMetrics;

use super::{EventBus, Handler};

const BLOCK_MS: usize = 1000;

fn stream_key(stream: &str) -> String {
    format!("events:{stream}")
}

pub struct RedisEventBus {
    client: redis::Client,
    metrics: Option<ServiceMetrics>,
}

impl RedisEventBus {
    pub fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url).context("opening redis client")?;
        Ok(Self { client, metrics: None })
    }

    pub fn with_metrics(mut self, metrics: ServiceMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    async fn connection(&self) -> Result<MultiplexedConnection> {
        self.client.get_multiplexed_tokio_connection().await.context("redis connect")
    }

    async fn ensure_group(&self, con: &mut MultiplexedConnection, stream: &str, group: &str) -> Result<()> {
        let key = stream_key(stream);
        let result: redis::RedisResult<()> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&key)
            .arg(group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(con)
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl EventBus for RedisEventBus {
    async fn publish(&self, stream: &str, envelope: EventEnvelope) -> Result<()> {
        let mut con = self.connection().await?;
        let key = stream_key(stream);
        let payload = serde_json::to_string(&envelope.payload)?;
        let _: String = con
            .xadd(
                &key,
                "*",
                &[
                    ("event_name", envelope.event_name.as_str()),
                    ("event_timestamp", &envelope.event_timestamp.to_string()),
                    ("payload", payload.as_str()),
                    ("correlation_id", envelope.correlation_id.as_str()),
                ],
            )
            .await
            .map_err(|e| {
                anyhow::Error::new(PipelineError::EventPublish {
                    message: e.to_string(),
                    event_name: envelope.event_name.clone(),
                })
            })?;
        if let Some(m) = &self.metrics {
            m.event_published(&envelope.event_name);
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        streams: &[&str],
        group: &str,
        consumer: &str,
        handler: Handler,
        running: Arc<AtomicBool>,
    ) -> Result<()> {
        let mut con = self.connection().await?;
        for s in streams {
            self.ensure_group(&mut con, s, group).await?;
        }
        let keys: Vec<String> = streams.iter().map(|s| stream_key(s)).collect();
        let ids: Vec<&str> = streams.iter().map(|_| ">").collect();

        while running.load(Ordering::SeqCst) {
            let mut cmd = redis::cmd("XREADGROUP");
            cmd.arg("GROUP").arg(group).arg(consumer).arg("BLOCK").arg(BLOCK_MS).arg("COUNT").arg(10).arg("STREAMS");
            for k in &keys {
                cmd.arg(k);
            }
            for id in &ids {
                cmd.arg(id);
            }

            let reply: redis::RedisResult<Value> = cmd.query_async(&mut con).await;
            let reply = match reply {
                Ok(v) => v,
                Err(e) => {
                    tracing::error!(error = %e, "XREADGROUP failed");
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    continue;
                }
            };

            for (stream_key_name, entry_id, event_name, payload) in parse_xreadgroup_reply(&reply) {
                let original_stream = stream_key_name.trim_start_matches("events:").to_string();
                if let Some(m) = &self.metrics {
                    m.event_consumed(&event_name);
                }
                match handler(event_name.clone(), payload).await {
                    Ok(()) => {
                        let _: redis::RedisResult<i64> = redis::cmd("XACK")
                            .arg(&stream_key_name)
                            .arg(group)
                            .arg(&entry_id)
                            .query_async(&mut con)
                            .await;
                    }
                    Err(err) => {
                        tracing::error!(stream = %original_stream, id = %entry_id, error = %err, "handler failed, leaving message pending for redelivery");
                    }
                }
            }
        }
        Ok(())
    }
}

/// Parses an `XREADGROUP` reply into `(stream_key, entry_id, event_name, payload)` tuples.
fn parse_xreadgroup_reply(value: &Value) -> Vec<(String, String, String, JsonValue)> {
    let mut out = Vec::new();
    let streams = match value {
        Value::Bulk(items) => items,
        Value::Nil => return out,
        _ => return out,
    };
    for stream_entry in streams {
        let pair = match stream_entry {
            Value::Bulk(p) if p.len() == 2 => p,
            _ => continue,
        };
        let stream_name = match &pair[0] {
            Value::Data(bytes) => String::from_utf8_lossy(bytes).to_string(),
            _ => continue,
        };
        let entries = match &pair[1] {
            Value::Bulk(e) => e,
            _ => continue,
        };
        for entry in entries {
            let entry_pair = match entry {
                Value::Bulk(p) if p.len() == 2 => p,
                _ => continue,
            };
            let entry_id = match &entry_pair[0] {
                Value::Data(bytes) => String::from_utf8_lossy(bytes).to_string(),
                _ => continue,
            };
            let fields = match &entry_pair[1] {
                Value::Bulk(f) => f,
                _ => continue,
            };
            let mut event_name = String::new();
            let mut payload = JsonValue::Null;
            let mut i = 0;
            while i + 1 < fields.len() {
                let field_name = match &fields[i] {
                    Value::Data(bytes) => String::from_utf8_lossy(bytes).to_string(),
                    _ => String::new(),
                };
                let field_value = match &fields[i + 1] {
                    Value::Data(bytes) => String::from_utf8_lossy(bytes).to_string(),
                    _ => String::new(),
                };
                match field_name.as_str() {
                    "event_name" => event_name = field_value,
                    "payload" => payload = serde_json::from_str(&field_value).unwrap_or(JsonValue::Null),
                    _ => {}
                }
                i += 2;
            }
            out.push((stream_name.clone(), entry_id, event_name, payload));
        }
    }
    out
}
