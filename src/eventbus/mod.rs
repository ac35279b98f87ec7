//! Event Bus (§4.A): named append-only streams with consumer-group
//! semantics, at-least-once delivery, explicit acknowledgement.

pub mod memory;
pub mod redis_bus;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use async_trait::async_trait;

use crate::domain::EventEnvelope;
use crate::error::Result;

pub use memory::InMemoryEventBus;
pub use redis_bus::RedisEventBus;

pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;
pub type Handler = Arc<dyn Fn(String, serde_json::Value) -> HandlerFuture + Send + Sync>;

#[async_trait]
pub trait EventBus: Send + Sync {
    /// Append to `stream`, assigning a monotonic id; durable before return.
    async fn publish(&self, stream: &str, envelope: EventEnvelope) -> Result<()>;

    /// Create the consumer group on the stream if it doesn't already exist
    /// ("already exists" is not an error), then loop reading new messages
    /// with a bounded block timeout so `running` is observed promptly,
    /// dispatching `handler(event_name, payload)`. On success, acks the
    /// message. On handler failure, logs and does not ack (pending,
    /// redelivered later). Returns once `running` is false.
    async fn subscribe(
        &self,
        streams: &[&str],
        group: &str,
        consumer: &str,
        handler: Handler,
        running: Arc<AtomicBool>,
    ) -> Result<()>;
}
