//! # Agent Context
//!
//! The handle bundle passed to every handler invocation: the agent's
//! identity, the bus client, the process configuration and the tool client.
//! Convenience methods delegate to the free functions in [`crate::publish`].

use std::sync::Arc;

use conclave_shared::bus::BusClient;
use conclave_shared::messages::{Envelope, TaskEvent, TaskOutcome};
use conclave_shared::ConclaveConfig;

use crate::publish;
use crate::tool_client::ToolClient;

/// Shared handles for one agent process
#[derive(Debug, Clone)]
pub struct AgentContext {
    pub agent_name: String,
    pub bus: BusClient,
    pub config: Arc<ConclaveConfig>,
    pub tools: ToolClient,
}

impl AgentContext {
    pub fn new(agent_name: impl Into<String>, bus: BusClient, config: Arc<ConclaveConfig>) -> Self {
        let agent_name = agent_name.into();
        let tools = ToolClient::new(&agent_name, bus.clone(), &config);
        AgentContext {
            agent_name,
            bus,
            config,
            tools,
        }
    }

    pub fn frontend_channel(&self) -> &str {
        &self.config.frontend_channel
    }

    /// The orchestrator's canonical name, the default error target
    pub fn orchestrator(&self) -> &str {
        &self.config.orchestrator_agent
    }

    pub async fn publish_to_agent(&self, target: &str, envelope: &Envelope) {
        publish::publish_to_agent(&self.bus, target, envelope).await;
    }

    pub async fn publish_to_frontend(&self, envelope: &Envelope) {
        publish::publish_to_frontend(&self.bus, self.frontend_channel(), envelope).await;
    }

    pub async fn publish_update(
        &self,
        task_id: &str,
        event: TaskEvent,
        content: &str,
        target: &str,
        confidence: Option<f64>,
        outcome: TaskOutcome,
    ) {
        publish::publish_update(
            &self.bus,
            &self.agent_name,
            self.frontend_channel(),
            task_id,
            event,
            content,
            target,
            confidence,
            outcome,
        )
        .await;
    }

    pub async fn publish_completion(
        &self,
        task_id: &str,
        content: &str,
        target: &str,
        confidence: f64,
        contributing_agents: Option<Vec<String>>,
    ) {
        publish::publish_completion(
            &self.bus,
            &self.agent_name,
            self.frontend_channel(),
            task_id,
            content,
            target,
            confidence,
            contributing_agents,
        )
        .await;
    }

    /// Error target defaults to the orchestrator when not supplied
    pub async fn publish_error(&self, task_id: &str, error_content: &str, target: Option<&str>) {
        let target = target.unwrap_or_else(|| self.orchestrator());
        publish::publish_error(
            &self.bus,
            &self.agent_name,
            self.frontend_channel(),
            task_id,
            error_content,
            target,
        )
        .await;
    }

    pub async fn publish_system_message(&self, content: &str, task_id: &str) {
        publish::publish_system_message(
            &self.bus,
            &self.agent_name,
            self.frontend_channel(),
            content,
            task_id,
        )
        .await;
    }

    pub async fn publish_stream_delta(&self, task_id: &str, delta: &str, done: bool) {
        publish::publish_stream_delta(
            &self.bus,
            &self.agent_name,
            self.frontend_channel(),
            task_id,
            delta,
            done,
        )
        .await;
    }
}
