//! # Bus Client
//!
//! Topic pub/sub plus keyed ephemeral state with TTL, behind one facade.
//! Providers are an enum (`Redis` for production, `InMemory` for tests) with
//! identical semantics — no trait objects, all enum dispatch.
//!
//! Semantics:
//!
//! - `publish` is fire-and-forget: transient failures are logged and the
//!   message is dropped; no client-side queue. A publish never blocks longer
//!   than the configured deadline.
//! - `subscribe` yields a message stream that survives broker restarts: the
//!   subscription task reconnects with exponential backoff (capped at 5s)
//!   and re-issues the subscription transparently. Cancellation is respected
//!   during reconnect.
//! - Topics and keys are disjoint namespaces. Keyed writes overwrite.
//!
//! Messages on a single topic are delivered to a given subscription in
//! publish order; nothing is guaranteed across topics.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::BusError;
use crate::messages::{codec, Envelope};

pub mod memory;
pub mod redis;

pub use memory::MemoryBus;
pub use redis::RedisBus;

/// Broadcast topic relayed to every attached websocket client
pub const DEFAULT_FRONTEND_CHANNEL: &str = "FRONTEND_CHANNEL";
/// Request topic agents may use to reach the tool core without its channel name
pub const DEFAULT_TOOL_REQUEST_CHANNEL: &str = "tool_requests";
/// Keyed aggregate written by the coordinator
pub const SYSTEM_STATUS_KEY: &str = "system_status";
/// Value written under each agent's heartbeat key
pub const HEARTBEAT_ALIVE: &str = "alive";

/// Buffer size of the per-subscription delivery channel; a subscriber that
/// falls this far behind starts losing messages (drop-on-slow-consumer).
pub(crate) const SUBSCRIPTION_BUFFER: usize = 256;

/// Dedicated inbound topic for an agent
pub fn agent_channel(agent: &str) -> String {
    format!("{agent}_channel")
}

/// Liveness marker key for an agent
pub fn heartbeat_key(agent: &str) -> String {
    format!("{agent}_heartbeat")
}

/// Messaging backend
#[derive(Debug, Clone)]
pub enum BusProvider {
    Redis(RedisBus),
    InMemory(MemoryBus),
}

impl BusProvider {
    async fn publish(&self, topic: &str, bytes: Vec<u8>) -> Result<(), BusError> {
        match self {
            BusProvider::Redis(bus) => bus.publish(topic, bytes).await,
            BusProvider::InMemory(bus) => bus.publish(topic, bytes),
        }
    }

    fn subscribe(&self, topic: &str, cancel: CancellationToken) -> mpsc::Receiver<Vec<u8>> {
        match self {
            BusProvider::Redis(bus) => bus.subscribe(topic, cancel),
            BusProvider::InMemory(bus) => bus.subscribe(topic, cancel),
        }
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), BusError> {
        match self {
            BusProvider::Redis(bus) => bus.set_with_ttl(key, value, ttl).await,
            BusProvider::InMemory(bus) => bus.set_with_ttl(key, value, ttl),
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>, BusError> {
        match self {
            BusProvider::Redis(bus) => bus.get(key).await,
            BusProvider::InMemory(bus) => bus.get(key),
        }
    }

    fn provider_name(&self) -> &'static str {
        match self {
            BusProvider::Redis(_) => "redis",
            BusProvider::InMemory(_) => "in_memory",
        }
    }
}

/// A live subscription to a single topic.
///
/// Dropping the subscription cancels its background task.
#[derive(Debug)]
pub struct Subscription {
    topic: String,
    rx: mpsc::Receiver<Vec<u8>>,
    cancel: CancellationToken,
}

impl Subscription {
    /// Next raw message, or `None` once the subscription is cancelled
    pub async fn next(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }

    /// Next message decoded as an envelope; decode failures are skipped with
    /// a log line, matching listener semantics.
    pub async fn next_envelope(&mut self) -> Option<Envelope> {
        loop {
            let bytes = self.rx.recv().await?;
            match codec::decode(&bytes) {
                Ok(envelope) => return Some(envelope),
                Err(e) => {
                    warn!(topic = %self.topic, error = %e, "Dropping undecodable message");
                }
            }
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Domain facade over a bus provider.
///
/// Cheap to clone; all clones share the underlying connections.
#[derive(Debug, Clone)]
pub struct BusClient {
    provider: BusProvider,
    publish_deadline: Duration,
}

impl BusClient {
    /// In-process bus for tests and single-process deployments
    pub fn in_memory() -> Self {
        BusClient {
            provider: BusProvider::InMemory(MemoryBus::default()),
            publish_deadline: Duration::from_secs(2),
        }
    }

    /// Connect to a Redis bus
    pub async fn connect(redis_url: &str) -> Result<Self, BusError> {
        let bus = RedisBus::connect(redis_url).await?;
        Ok(BusClient {
            provider: BusProvider::Redis(bus),
            publish_deadline: Duration::from_secs(2),
        })
    }

    pub fn with_publish_deadline(mut self, deadline: Duration) -> Self {
        self.publish_deadline = deadline;
        self
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.provider_name()
    }

    /// Fire-and-forget publish. Failures and deadline overruns are logged
    /// and the message is dropped.
    pub async fn publish(&self, topic: &str, bytes: Vec<u8>) {
        match tokio::time::timeout(self.publish_deadline, self.provider.publish(topic, bytes))
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(topic = %topic, error = %e, "Publish failed, dropping message");
            }
            Err(_) => {
                warn!(
                    topic = %topic,
                    deadline_ms = self.publish_deadline.as_millis() as u64,
                    "Publish exceeded deadline, dropping message"
                );
            }
        }
    }

    /// Encode and publish an envelope
    pub async fn publish_envelope(&self, topic: &str, envelope: &Envelope) {
        match codec::encode(envelope) {
            Ok(bytes) => self.publish(topic, bytes).await,
            Err(e) => {
                warn!(topic = %topic, error = %e, "Failed to encode envelope, dropping");
            }
        }
    }

    /// Subscribe to a topic. The subscription reconnects internally; the
    /// returned handle never errors.
    pub fn subscribe(&self, topic: &str) -> Subscription {
        let cancel = CancellationToken::new();
        let rx = self.provider.subscribe(topic, cancel.clone());
        Subscription {
            topic: topic.to_string(),
            rx,
            cancel,
        }
    }

    /// Overwrite a key with a TTL
    pub async fn set_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), BusError> {
        self.provider.set_with_ttl(key, value, ttl).await
    }

    /// Read a key; `None` when absent or expired
    pub async fn get(&self, key: &str) -> Result<Option<String>, BusError> {
        self.provider.get(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_subscribe_round_trip() {
        let bus = BusClient::in_memory();
        let mut sub = bus.subscribe("grok_channel");
        bus.publish("grok_channel", b"payload".to_vec()).await;
        let received = sub.next().await.unwrap();
        assert_eq!(received, b"payload");
    }

    #[tokio::test]
    async fn topics_are_isolated() {
        let bus = BusClient::in_memory();
        let mut grok = bus.subscribe("grok_channel");
        let mut gpt = bus.subscribe("gpt_channel");
        bus.publish("gpt_channel", b"for gpt".to_vec()).await;
        assert_eq!(gpt.next().await.unwrap(), b"for gpt");
        // Nothing arrives on the other channel.
        tokio::select! {
            _ = grok.next() => panic!("message leaked across topics"),
            _ = tokio::time::sleep(Duration::from_millis(50)) => {}
        }
    }

    #[tokio::test]
    async fn publish_order_is_preserved_per_topic() {
        let bus = BusClient::in_memory();
        let mut sub = bus.subscribe("ordered");
        for i in 0..10u8 {
            bus.publish("ordered", vec![i]).await;
        }
        for i in 0..10u8 {
            assert_eq!(sub.next().await.unwrap(), vec![i]);
        }
    }

    #[tokio::test]
    async fn keyed_state_ttl_expires() {
        let bus = BusClient::in_memory();
        bus.set_with_ttl("gpt_heartbeat", HEARTBEAT_ALIVE, Duration::from_millis(30))
            .await
            .unwrap();
        assert_eq!(
            bus.get("gpt_heartbeat").await.unwrap().as_deref(),
            Some(HEARTBEAT_ALIVE)
        );
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(bus.get("gpt_heartbeat").await.unwrap(), None);
    }

    #[tokio::test]
    async fn keyed_state_overwrites() {
        let bus = BusClient::in_memory();
        bus.set_with_ttl("k", "one", Duration::from_secs(5)).await.unwrap();
        bus.set_with_ttl("k", "two", Duration::from_secs(5)).await.unwrap();
        assert_eq!(bus.get("k").await.unwrap().as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn cancelled_subscription_ends() {
        let bus = BusClient::in_memory();
        let mut sub = bus.subscribe("t");
        sub.cancel();
        assert_eq!(sub.next().await, None);
    }

    #[test]
    fn channel_naming() {
        assert_eq!(agent_channel("grok"), "grok_channel");
        assert_eq!(heartbeat_key("grok"), "grok_heartbeat");
    }
}
