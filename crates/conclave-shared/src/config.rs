//! # Configuration
//!
//! One settings struct shared by every process, loaded from `CONCLAVE_`
//! prefixed environment variables layered over defaults (`.env` files are
//! honored). Interval-valued options are plain seconds on the environment
//! side; accessor methods hand out `Duration`s.

use std::time::Duration;

use serde::Deserialize;

use crate::error::{ConclaveError, ConclaveResult};

/// Process-wide settings
#[derive(Debug, Clone, Deserialize)]
pub struct ConclaveConfig {
    /// Redis connection URL for the bus
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Seconds between heartbeat writes
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval: u64,
    /// TTL in seconds on heartbeat markers
    #[serde(default = "default_heartbeat_ttl")]
    pub heartbeat_ttl: u64,

    /// Upper bound on critique/refine cycles before a forced conclude
    #[serde(default = "default_max_debate_rounds")]
    pub max_debate_rounds: u32,
    #[serde(default = "default_min_debate_rounds")]
    pub min_debate_rounds: u32,

    /// Probability of exploratory routing instead of the recommended agent
    #[serde(default = "default_router_learning_rate")]
    pub router_learning_rate: f64,
    /// Seconds between cluster-model refreshes (when a model is attached)
    #[serde(default = "default_clustering_update_frequency")]
    pub clustering_update_frequency: u64,

    /// Opt-in adaptive tuning of the effort estimator
    #[serde(default)]
    pub auto_tuning_enabled: bool,
    #[serde(default = "default_min_samples_for_tuning")]
    pub min_samples_for_tuning: usize,

    /// Base URL of the external code sandbox
    #[serde(default = "default_sandbox_api_url")]
    pub sandbox_api_url: String,
    /// Seconds between sandbox result polls
    #[serde(default = "default_sandbox_poll_interval")]
    pub sandbox_poll_interval: u64,
    /// Base URL of the tool core HTTP API
    #[serde(default = "default_toolcore_api_url")]
    pub toolcore_api_url: String,
    /// Request topic for bus-originated tool submissions
    #[serde(default = "default_tool_request_channel")]
    pub tool_request_channel: String,

    /// Broadcast topic relayed to websocket clients
    #[serde(default = "default_frontend_channel")]
    pub frontend_channel: String,

    /// Canonical agent names for the debate roles
    #[serde(default = "default_orchestrator_agent")]
    pub orchestrator_agent: String,
    #[serde(default = "default_proposer_agent")]
    pub proposer_agent: String,
    #[serde(default = "default_critic_agent")]
    pub critic_agent: String,
    /// Canonical identity of the tool core
    #[serde(default = "default_toolcore_agent")]
    pub toolcore_agent: String,

    /// Agents that must be alive for the system to report ready
    #[serde(default = "default_required_agents")]
    pub required_agents: Vec<String>,
    /// Seconds the coordinator waits for readiness at boot
    #[serde(default = "default_ready_timeout")]
    pub ready_timeout: u64,
    /// Seconds between coordinator readiness polls
    #[serde(default = "default_check_interval")]
    pub check_interval: u64,

    /// Milliseconds a publish may block before being dropped
    #[serde(default = "default_publish_deadline_ms")]
    pub publish_deadline_ms: u64,
    /// Seconds allowed for outbound HTTP calls
    #[serde(default = "default_http_timeout")]
    pub http_timeout: u64,
    /// Seconds granted to activities after a stop signal
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace: u64,

    /// Bind address of the tool core HTTP server
    #[serde(default = "default_toolcore_bind_addr")]
    pub toolcore_bind_addr: String,
    /// Bind address of the websocket gateway
    #[serde(default = "default_gateway_bind_addr")]
    pub gateway_bind_addr: String,
}

impl ConclaveConfig {
    /// Load from the environment (with `.env` support) over defaults
    pub fn load() -> ConclaveResult<Self> {
        dotenvy::dotenv().ok();
        config::Config::builder()
            .add_source(
                config::Environment::with_prefix("CONCLAVE")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("required_agents"),
            )
            .build()
            .map_err(|e| ConclaveError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| ConclaveError::Config(e.to_string()))
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval)
    }

    pub fn heartbeat_ttl(&self) -> Duration {
        Duration::from_secs(self.heartbeat_ttl)
    }

    pub fn sandbox_poll_interval(&self) -> Duration {
        Duration::from_secs(self.sandbox_poll_interval)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval)
    }

    pub fn publish_deadline(&self) -> Duration {
        Duration::from_millis(self.publish_deadline_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace)
    }
}

impl Default for ConclaveConfig {
    fn default() -> Self {
        // serde fills every field from its default fn on an empty source
        serde_json::from_value(serde_json::json!({}))
            .unwrap_or_else(|e| unreachable!("default config must deserialize: {e}"))
    }
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_heartbeat_interval() -> u64 {
    10
}

fn default_heartbeat_ttl() -> u64 {
    15
}

fn default_max_debate_rounds() -> u32 {
    3
}

fn default_min_debate_rounds() -> u32 {
    2
}

fn default_router_learning_rate() -> f64 {
    0.1
}

fn default_clustering_update_frequency() -> u64 {
    3600
}

fn default_min_samples_for_tuning() -> usize {
    10
}

fn default_sandbox_api_url() -> String {
    "http://127.0.0.1:8100".to_string()
}

fn default_sandbox_poll_interval() -> u64 {
    1
}

fn default_toolcore_api_url() -> String {
    "http://127.0.0.1:8200".to_string()
}

fn default_tool_request_channel() -> String {
    crate::bus::DEFAULT_TOOL_REQUEST_CHANNEL.to_string()
}

fn default_frontend_channel() -> String {
    crate::bus::DEFAULT_FRONTEND_CHANNEL.to_string()
}

fn default_orchestrator_agent() -> String {
    "grok".to_string()
}

fn default_proposer_agent() -> String {
    "gpt".to_string()
}

fn default_critic_agent() -> String {
    "claude".to_string()
}

fn default_toolcore_agent() -> String {
    "toolcore".to_string()
}

fn default_required_agents() -> Vec<String> {
    vec![
        "grok".to_string(),
        "gpt".to_string(),
        "claude".to_string(),
        "toolcore".to_string(),
    ]
}

fn default_ready_timeout() -> u64 {
    60
}

fn default_check_interval() -> u64 {
    5
}

fn default_publish_deadline_ms() -> u64 {
    2000
}

fn default_http_timeout() -> u64 {
    30
}

fn default_shutdown_grace() -> u64 {
    5
}

fn default_toolcore_bind_addr() -> String {
    "0.0.0.0:8200".to_string()
}

fn default_gateway_bind_addr() -> String {
    "0.0.0.0:8300".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = ConclaveConfig::default();
        assert_eq!(config.heartbeat_interval, 10);
        assert_eq!(config.heartbeat_ttl, 15);
        assert_eq!(config.max_debate_rounds, 3);
        assert_eq!(config.router_learning_rate, 0.1);
        assert_eq!(config.frontend_channel, "FRONTEND_CHANNEL");
        assert_eq!(config.tool_request_channel, "tool_requests");
        assert!(!config.auto_tuning_enabled);
        assert!(config.heartbeat_ttl > config.heartbeat_interval);
        assert_eq!(config.required_agents.len(), 4);
    }

    #[test]
    fn duration_accessors() {
        let config = ConclaveConfig::default();
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(10));
        assert_eq!(config.publish_deadline(), Duration::from_millis(2000));
        assert_eq!(config.shutdown_grace(), Duration::from_secs(5));
    }
}
