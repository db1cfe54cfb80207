//! # Redis Bus Provider
//!
//! Pub/sub over dedicated subscriber connections, keyed TTL state over a
//! `ConnectionManager`. Each subscription runs a background task that owns
//! its pub/sub connection and transparently re-subscribes after connection
//! loss, with exponential backoff capped at 5 seconds.

use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::SUBSCRIPTION_BUFFER;
use crate::error::BusError;

const INITIAL_BACKOFF: Duration = Duration::from_millis(250);
const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Redis-backed bus provider
#[derive(Clone)]
pub struct RedisBus {
    client: redis::Client,
    manager: ConnectionManager,
}

impl std::fmt::Debug for RedisBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBus").finish_non_exhaustive()
    }
}

impl RedisBus {
    pub async fn connect(url: &str) -> Result<Self, BusError> {
        let client =
            redis::Client::open(url).map_err(|e| BusError::connection(e.to_string()))?;
        let manager = ConnectionManager::new(client.clone())
            .await
            .map_err(|e| BusError::connection(e.to_string()))?;
        info!(url = %url, "Connected to Redis bus");
        Ok(RedisBus { client, manager })
    }

    pub async fn publish(&self, topic: &str, bytes: Vec<u8>) -> Result<(), BusError> {
        let mut conn = self.manager.clone();
        conn.publish::<_, _, ()>(topic, bytes)
            .await
            .map_err(|e| BusError::publish(topic, e.to_string()))
    }

    /// Spawn the subscription task and hand back its delivery channel
    pub fn subscribe(&self, topic: &str, cancel: CancellationToken) -> mpsc::Receiver<Vec<u8>> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let client = self.client.clone();
        let topic = topic.to_string();
        tokio::spawn(subscription_task(client, topic, tx, cancel));
        rx
    }

    pub async fn set_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), BusError> {
        let mut conn = self.manager.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
            .await
            .map_err(|e| BusError::keyed_state(key, e.to_string()))
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, BusError> {
        let mut conn = self.manager.clone();
        conn.get::<_, Option<String>>(key)
            .await
            .map_err(|e| BusError::keyed_state(key, e.to_string()))
    }
}

/// Owns one pub/sub connection per subscription and re-issues the
/// subscription across reconnects until cancelled.
async fn subscription_task(
    client: redis::Client,
    topic: String,
    tx: mpsc::Sender<Vec<u8>>,
    cancel: CancellationToken,
) {
    use futures::StreamExt;

    let mut backoff = INITIAL_BACKOFF;

    while !cancel.is_cancelled() {
        let mut pubsub = match client.get_async_pubsub().await {
            Ok(pubsub) => pubsub,
            Err(e) => {
                warn!(topic = %topic, error = %e, "Pub/sub connection failed, retrying");
                if sleep_or_cancel(backoff, &cancel).await {
                    return;
                }
                backoff = (backoff * 2).min(MAX_BACKOFF);
                continue;
            }
        };

        if let Err(e) = pubsub.subscribe(&topic).await {
            warn!(topic = %topic, error = %e, "Subscribe failed, retrying");
            if sleep_or_cancel(backoff, &cancel).await {
                return;
            }
            backoff = (backoff * 2).min(MAX_BACKOFF);
            continue;
        }

        debug!(topic = %topic, "Subscribed");
        backoff = INITIAL_BACKOFF;

        let mut stream = pubsub.on_message();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                message = stream.next() => match message {
                    Some(message) => {
                        let payload = message.get_payload_bytes().to_vec();
                        if tx.try_send(payload).is_err() {
                            warn!(topic = %topic, "Slow subscriber, dropping message");
                        }
                    }
                    // Connection lost; fall through to resubscribe.
                    None => {
                        warn!(topic = %topic, "Pub/sub stream ended, reconnecting");
                        break;
                    }
                }
            }
        }

        if sleep_or_cancel(backoff, &cancel).await {
            return;
        }
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}

/// Returns true when cancelled during the sleep
async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(duration) => false,
    }
}
