//! # Conclave Coordinator
//!
//! Monitors agent liveness and aggregates system readiness. Every
//! `check_interval` the coordinator reads `<agent>_heartbeat` for each
//! required agent, derives the readiness snapshot, writes it to the
//! `system_status` key (30s TTL) and publishes a `system_status_update`
//! frame on the frontend channel.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use conclave_shared::bus::{heartbeat_key, BusClient, HEARTBEAT_ALIVE, SYSTEM_STATUS_KEY};
use conclave_shared::messages::WebSocketFrame;
use conclave_shared::ConclaveConfig;

/// TTL on the aggregated `system_status` key
const STATUS_TTL: Duration = Duration::from_secs(30);

/// Readiness snapshot for the whole system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStatus {
    /// True iff every required agent has a live heartbeat
    pub system_ready: bool,
    /// `alive` / `offline` per required agent
    pub agent_status: BTreeMap<String, String>,
    pub missing_agents: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Polls heartbeats and publishes readiness
#[derive(Debug, Clone)]
pub struct Coordinator {
    bus: BusClient,
    config: Arc<ConclaveConfig>,
}

impl Coordinator {
    pub fn new(bus: BusClient, config: Arc<ConclaveConfig>) -> Self {
        Coordinator { bus, config }
    }

    /// Check a single agent's heartbeat marker
    pub async fn is_agent_alive(&self, agent: &str) -> bool {
        match self.bus.get(&heartbeat_key(agent)).await {
            Ok(Some(value)) => value == HEARTBEAT_ALIVE,
            Ok(None) => false,
            Err(e) => {
                error!(agent, error = %e, "Heartbeat read failed");
                false
            }
        }
    }

    /// Derive the current readiness snapshot
    pub async fn check_system_status(&self) -> SystemStatus {
        let mut agent_status = BTreeMap::new();
        let mut missing_agents = Vec::new();

        for agent in &self.config.required_agents {
            let alive = self.is_agent_alive(agent).await;
            agent_status.insert(
                agent.clone(),
                if alive { "alive" } else { "offline" }.to_string(),
            );
            if !alive {
                missing_agents.push(agent.clone());
            }
        }

        SystemStatus {
            system_ready: missing_agents.is_empty(),
            agent_status,
            missing_agents,
            timestamp: Utc::now(),
        }
    }

    /// Write the aggregate key and broadcast the status frame
    pub async fn publish_status(&self, status: &SystemStatus) {
        match serde_json::to_string(status) {
            Ok(serialized) => {
                if let Err(e) = self
                    .bus
                    .set_with_ttl(SYSTEM_STATUS_KEY, &serialized, STATUS_TTL)
                    .await
                {
                    error!(error = %e, "Failed to store system status");
                }
            }
            Err(e) => error!(error = %e, "Failed to serialize system status"),
        }

        let frame = WebSocketFrame::new(
            "system_status_update",
            serde_json::to_value(status).unwrap_or(serde_json::Value::Null),
        );
        self.bus
            .publish(
                &self.config.frontend_channel,
                serde_json::to_vec(&frame).unwrap_or_default(),
            )
            .await;
        debug!(ready = status.system_ready, "Published system status");
    }

    /// Wait up to `ready_timeout` for all required agents, logging progress.
    /// Never blocks indefinitely.
    pub async fn wait_for_ready(&self) -> bool {
        let deadline = tokio::time::Instant::now() + self.config.ready_timeout();
        info!(
            timeout_secs = self.config.ready_timeout,
            required = ?self.config.required_agents,
            "Waiting for required agents..."
        );

        loop {
            let status = self.check_system_status().await;
            if status.system_ready {
                info!("All required agents are ready");
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                warn!(missing = ?status.missing_agents, "Timed out waiting for agents");
                return false;
            }
            info!(missing = ?status.missing_agents, "Still waiting for agents...");
            tokio::time::sleep(self.config.check_interval()).await;
        }
    }

    /// Spawn the periodic monitoring loop
    pub fn spawn_monitor(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let coordinator = self.clone();
        tokio::spawn(async move {
            info!(
                interval_secs = coordinator.config.check_interval,
                "Coordinator monitor started"
            );
            loop {
                let status = coordinator.check_system_status().await;
                coordinator.publish_status(&status).await;
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(coordinator.config.check_interval()) => {}
                }
            }
            info!("Coordinator monitor stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(required: &[&str]) -> Arc<ConclaveConfig> {
        let mut config = ConclaveConfig::default();
        config.required_agents = required.iter().map(|s| s.to_string()).collect();
        config.check_interval = 1;
        config.ready_timeout = 1;
        Arc::new(config)
    }

    async fn beat(bus: &BusClient, agent: &str) {
        bus.set_with_ttl(&heartbeat_key(agent), HEARTBEAT_ALIVE, Duration::from_secs(5))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn missing_agent_blocks_readiness() {
        let bus = BusClient::in_memory();
        let coordinator = Coordinator::new(bus.clone(), config(&["grok", "gpt", "claude"]));

        beat(&bus, "grok").await;
        beat(&bus, "gpt").await;

        let status = coordinator.check_system_status().await;
        assert!(!status.system_ready);
        assert_eq!(status.missing_agents, vec!["claude".to_string()]);
        assert_eq!(status.agent_status["grok"], "alive");
        assert_eq!(status.agent_status["claude"], "offline");

        // Once the third agent beats, the next poll reports ready.
        beat(&bus, "claude").await;
        let status = coordinator.check_system_status().await;
        assert!(status.system_ready);
        assert!(status.missing_agents.is_empty());
    }

    #[tokio::test]
    async fn expired_heartbeat_counts_as_offline() {
        let bus = BusClient::in_memory();
        let coordinator = Coordinator::new(bus.clone(), config(&["grok"]));

        bus.set_with_ttl(
            &heartbeat_key("grok"),
            HEARTBEAT_ALIVE,
            Duration::from_millis(20),
        )
        .await
        .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let status = coordinator.check_system_status().await;
        assert!(!status.system_ready);
    }

    #[tokio::test]
    async fn publish_status_writes_key_and_frame() {
        let bus = BusClient::in_memory();
        let coordinator = Coordinator::new(bus.clone(), config(&["grok"]));
        let mut frontend = bus.subscribe("FRONTEND_CHANNEL");
        beat(&bus, "grok").await;

        let status = coordinator.check_system_status().await;
        coordinator.publish_status(&status).await;

        let stored = bus.get(SYSTEM_STATUS_KEY).await.unwrap().unwrap();
        let parsed: SystemStatus = serde_json::from_str(&stored).unwrap();
        assert!(parsed.system_ready);

        let raw = frontend.next().await.unwrap();
        let frame: WebSocketFrame = serde_json::from_slice(&raw).unwrap();
        assert_eq!(frame.frame_type, "system_status_update");
        assert_eq!(frame.payload["system_ready"], true);
    }

    #[tokio::test]
    async fn wait_for_ready_times_out() {
        let bus = BusClient::in_memory();
        let coordinator = Coordinator::new(bus, config(&["grok"]));
        // Nothing ever beats; the wait must come back false, bounded.
        assert!(!coordinator.wait_for_ready().await);
    }
}
