//! In-memory event bus for tests: same consumer-group contract as
//! `RedisEventBus` without a live Redis server.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::domain::EventEnvelope;
use crate::error::Result;

use super::{EventBus, Handler};

struct StreamState {
    messages: Vec<EventEnvelope>,
    cursors: HashMap<String, usize>,
}

#[derive(Default)]
pub struct InMemoryEventBus {
    streams: Mutex<HashMap<String, StreamState>>,
}

impl InMemoryEventBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, stream: &str, envelope: EventEnvelope) -> Result<()> {
        let mut streams = self.streams.lock();
        let state = streams.entry(stream.to_string()).or_insert_with(|| StreamState {
            messages: Vec::new(),
            cursors: HashMap::new(),
        });
        state.messages.push(envelope);
        Ok(())
    }

    async fn subscribe(
        &self,
        streams: &[&str],
        group: &str,
        _consumer: &str,
        handler: Handler,
        running: Arc<AtomicBool>,
    ) -> Result<()> {
        while running.load(Ordering::SeqCst) {
            let mut dispatched_any = false;
            for stream in streams {
                let next = {
                    let mut guard = self.streams.lock();
                    let state = guard
                        .entry(stream.to_string())
                        .or_insert_with(|| StreamState { messages: Vec::new(), cursors: HashMap::new() });
                    let cursor = state.cursors.entry(group.to_string()).or_insert(0);
                    if *cursor < state.messages.len() {
                        let envelope = state.messages[*cursor].clone();
                        *cursor += 1;
                        Some(envelope)
                    } else {
                        None
                    }
                };
                if let Some(envelope) = next {
                    dispatched_any = true;
                    if let Err(err) = handler(envelope.event_name.clone(), envelope.payload.clone()).await {
                        tracing::error!(stream = *stream, error = %err, "handler failed; in-memory bus has no redelivery for this test double");
                    }
                }
            }
            if !dispatched_any {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn delivers_published_message_once() {
        let bus = InMemoryEventBus::new();
        bus.publish(
            "test_stream",
            EventEnvelope {
                event_name: "test_event".into(),
                event_timestamp: 0,
                payload: serde_json::json!({"a": 1}),
                correlation_id: "corr-1".into(),
            },
        )
        .await
        .unwrap();

        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        let handler: Handler = Arc::new(move |_name, _payload| {
            let count = count2.clone();
            Box::pin(async move {
                count.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        });

        let running = Arc::new(AtomicBool::new(true));
        let running2 = running.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            running2.store(false, Ordering::SeqCst);
        });

        bus.subscribe(&["test_stream"], "group1", "consumer1", handler, running).await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
