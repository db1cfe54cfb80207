//! # In-Memory Bus Provider
//!
//! Broadcast-channel topics plus a TTL key table. Used by tests and
//! single-process deployments; semantics mirror the Redis provider,
//! including drop-on-slow-consumer delivery.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::SUBSCRIPTION_BUFFER;
use crate::error::BusError;

const TOPIC_CAPACITY: usize = 1024;

#[derive(Debug, Default)]
struct MemoryBusInner {
    topics: DashMap<String, broadcast::Sender<Vec<u8>>>,
    keys: DashMap<String, (String, Instant)>,
}

/// In-process bus shared by all clones
#[derive(Debug, Clone, Default)]
pub struct MemoryBus {
    inner: Arc<MemoryBusInner>,
}

impl MemoryBus {
    fn topic_sender(&self, topic: &str) -> broadcast::Sender<Vec<u8>> {
        self.inner
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .clone()
    }

    pub fn publish(&self, topic: &str, bytes: Vec<u8>) -> Result<(), BusError> {
        // No subscribers is not an error for pub/sub.
        let _ = self.topic_sender(topic).send(bytes);
        Ok(())
    }

    pub fn subscribe(&self, topic: &str, cancel: CancellationToken) -> mpsc::Receiver<Vec<u8>> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let mut broadcast_rx = self.topic_sender(topic).subscribe();
        let topic = topic.to_string();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    received = broadcast_rx.recv() => match received {
                        Ok(bytes) => {
                            if tx.try_send(bytes).is_err() {
                                warn!(topic = %topic, "Slow subscriber, dropping message");
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(topic = %topic, skipped, "Subscriber lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        });

        rx
    }

    pub fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), BusError> {
        self.inner
            .keys
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<Option<String>, BusError> {
        if let Some(entry) = self.inner.keys.get(key) {
            let (value, expires_at) = entry.value().clone();
            if Instant::now() < expires_at {
                return Ok(Some(value));
            }
        }
        // Expired entries are removed lazily on read.
        self.inner
            .keys
            .remove_if(key, |_, (_, expires_at)| Instant::now() >= *expires_at);
        Ok(None)
    }
}
