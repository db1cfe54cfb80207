//! # Tool Client
//!
//! The agent-side half of the asynchronous tool protocol. A request:
//!
//! 1. generates an `execution_id`,
//! 2. announces `awaiting_tool` to the orchestrator,
//! 3. records a pending-call entry keyed by the execution id,
//! 4. submits to the tool core over HTTP or the bus request topic,
//! 5. is resolved later when the matching `tool_response` arrives on the
//!    agent's channel.
//!
//! The pending table is shared with the listener path, so entries are kept
//! in a concurrent map. `await_response` lets sequential flows block on a
//! specific execution with a timeout.

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{info, warn};
use uuid::Uuid;

use conclave_shared::bus::BusClient;
use conclave_shared::messages::{TaskEvent, TaskOutcome, TaskResult};
use conclave_shared::ConclaveConfig;

use crate::publish;

#[derive(Debug, Error)]
pub enum ToolClientError {
    #[error("Tool core connection failed: {0}")]
    Connection(String),

    #[error("Tool core rejected request with status {status}: {detail}")]
    Rejected { status: u16, detail: String },

    #[error("No pending tool call for execution {0}")]
    UnknownExecution(String),

    #[error("Timed out waiting for execution {0}")]
    Timeout(String),
}

/// Disposition of a pending tool call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingStatus {
    Pending,
    Succeeded,
    Failed,
}

/// Agent-side record of an in-flight tool execution
#[derive(Debug, Clone)]
pub struct PendingToolCall {
    pub tool_name: String,
    pub tool_input: Value,
    pub task_id: String,
    pub task_context: Option<Value>,
    pub status: PendingStatus,
}

/// How to hand the request to the tool core
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolSubmission {
    /// `POST /execute/` on the tool core API
    Http,
    /// Publish on the tool request topic
    Bus,
}

/// Composable tool-invocation capability for an agent
#[derive(Clone)]
pub struct ToolClient {
    agent_name: String,
    bus: BusClient,
    http: reqwest::Client,
    toolcore_api_url: String,
    tool_request_channel: String,
    frontend_channel: String,
    orchestrator: String,
    pending: Arc<DashMap<String, PendingToolCall>>,
    waiters: Arc<DashMap<String, oneshot::Sender<TaskResult>>>,
    receivers: Arc<DashMap<String, oneshot::Receiver<TaskResult>>>,
}

impl std::fmt::Debug for ToolClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolClient")
            .field("agent_name", &self.agent_name)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl ToolClient {
    pub fn new(agent_name: &str, bus: BusClient, config: &ConclaveConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout())
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        ToolClient {
            agent_name: agent_name.to_string(),
            bus,
            http,
            toolcore_api_url: config.toolcore_api_url.clone(),
            tool_request_channel: config.tool_request_channel.clone(),
            frontend_channel: config.frontend_channel.clone(),
            orchestrator: config.orchestrator_agent.clone(),
            pending: Arc::new(DashMap::new()),
            waiters: Arc::new(DashMap::new()),
            receivers: Arc::new(DashMap::new()),
        }
    }

    /// Request execution of a tool; returns the execution id used to
    /// correlate the eventual `tool_response`.
    pub async fn request(
        &self,
        task_id: &str,
        tool_name: &str,
        parameters: Value,
        task_context: Option<Value>,
        via: ToolSubmission,
    ) -> Result<String, ToolClientError> {
        let execution_id = format!("{}-{}-{}", self.agent_name, tool_name, Uuid::new_v4());

        publish::publish_update(
            &self.bus,
            &self.agent_name,
            &self.frontend_channel,
            task_id,
            TaskEvent::AwaitingTool,
            &format!("Requesting execution of tool {tool_name}"),
            &self.orchestrator,
            None,
            TaskOutcome::InProgress,
        )
        .await;

        self.pending.insert(
            execution_id.clone(),
            PendingToolCall {
                tool_name: tool_name.to_string(),
                tool_input: parameters.clone(),
                task_id: task_id.to_string(),
                task_context,
                status: PendingStatus::Pending,
            },
        );
        let (tx, rx) = oneshot::channel();
        self.waiters.insert(execution_id.clone(), tx);
        self.receivers.insert(execution_id.clone(), rx);

        let request_body = json!({
            "tool_name": tool_name,
            "parameters": parameters,
            "dry_run": false,
            "requesting_agent": self.agent_name.as_str(),
            "task_id": task_id,
            "execution_id": execution_id.as_str(),
        });

        let submitted = match via {
            ToolSubmission::Http => self.submit_http(&request_body).await,
            ToolSubmission::Bus => {
                self.bus
                    .publish(
                        &self.tool_request_channel,
                        serde_json::to_vec(&request_body).unwrap_or_default(),
                    )
                    .await;
                Ok(())
            }
        };

        if let Err(e) = submitted {
            self.drop_tracking(&execution_id);
            return Err(e);
        }

        info!(
            agent = %self.agent_name,
            tool = tool_name,
            execution_id = %execution_id,
            "Tool execution requested"
        );
        Ok(execution_id)
    }

    async fn submit_http(&self, body: &Value) -> Result<(), ToolClientError> {
        let url = format!("{}/execute/", self.toolcore_api_url.trim_end_matches('/'));
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| ToolClientError::Connection(e.to_string()))?;

        if response.status().as_u16() == 202 {
            Ok(())
        } else {
            let status = response.status().as_u16();
            let detail = response.text().await.unwrap_or_default();
            Err(ToolClientError::Rejected { status, detail })
        }
    }

    /// Match an inbound tool result against the pending table.
    ///
    /// Pops the pending record (updating its status from the result outcome)
    /// and wakes any `await_response` caller. Returns `None` for unknown or
    /// already-handled executions.
    pub fn resolve(&self, result: &TaskResult) -> Option<PendingToolCall> {
        let execution_id = result
            .metadata
            .as_ref()
            .and_then(|m| m.get("execution_id"))
            .and_then(Value::as_str)?;

        let (_, mut call) = self.pending.remove(execution_id)?;
        call.status = if result.outcome == TaskOutcome::Success {
            PendingStatus::Succeeded
        } else {
            PendingStatus::Failed
        };

        if let Some((_, waiter)) = self.waiters.remove(execution_id) {
            let _ = waiter.send(result.clone());
        }
        self.receivers.remove(execution_id);
        Some(call)
    }

    /// Block until the tool core answers a specific execution
    pub async fn await_response(
        &self,
        execution_id: &str,
        timeout: std::time::Duration,
    ) -> Result<TaskResult, ToolClientError> {
        let (_, rx) = self
            .receivers
            .remove(execution_id)
            .ok_or_else(|| ToolClientError::UnknownExecution(execution_id.to_string()))?;
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(_)) | Err(_) => {
                warn!(execution_id, "Tool response wait timed out or was dropped");
                Err(ToolClientError::Timeout(execution_id.to_string()))
            }
        }
    }

    /// Abandon a pending execution
    pub fn cancel(&self, execution_id: &str) -> Option<PendingToolCall> {
        self.drop_tracking(execution_id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    fn drop_tracking(&self, execution_id: &str) -> Option<PendingToolCall> {
        self.waiters.remove(execution_id);
        self.receivers.remove(execution_id);
        self.pending.remove(execution_id).map(|(_, call)| call)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use conclave_shared::messages::MessageIntent;

    fn test_client() -> ToolClient {
        let config = ConclaveConfig::default();
        ToolClient::new("gpt", BusClient::in_memory(), &config)
    }

    fn tool_result(execution_id: &str, outcome: TaskOutcome) -> TaskResult {
        let mut metadata = std::collections::BTreeMap::new();
        metadata.insert("execution_id".to_string(), json!(execution_id));
        TaskResult {
            timestamp: Utc::now(),
            task_id: "t-1".into(),
            agent: "toolcore".into(),
            content: "{}".into(),
            intent: MessageIntent::ToolResponse,
            target_agent: "gpt".into(),
            event: TaskEvent::ToolComplete,
            confidence: 1.0,
            reasoning_effort: None,
            reasoning_strategy: None,
            metadata: Some(metadata),
            outcome,
            contributing_agents: vec!["toolcore".into()],
        }
    }

    #[tokio::test]
    async fn bus_request_tracks_pending_call() {
        let client = test_client();
        let execution_id = client
            .request(
                "t-1",
                "web_search",
                json!({"query": "foo"}),
                None,
                ToolSubmission::Bus,
            )
            .await
            .unwrap();
        assert_eq!(client.pending_count(), 1);
        assert!(execution_id.starts_with("gpt-web_search-"));
    }

    #[tokio::test]
    async fn resolve_pops_record_and_wakes_waiter() {
        let client = test_client();
        let execution_id = client
            .request("t-1", "web_search", json!({"query": "foo"}), None, ToolSubmission::Bus)
            .await
            .unwrap();

        let resolved = client.resolve(&tool_result(&execution_id, TaskOutcome::Success));
        let call = resolved.expect("pending call should resolve");
        assert_eq!(call.tool_name, "web_search");
        assert_eq!(call.status, PendingStatus::Succeeded);
        assert_eq!(client.pending_count(), 0);

        // A second resolve for the same execution is a no-op.
        assert!(client
            .resolve(&tool_result(&execution_id, TaskOutcome::Success))
            .is_none());
    }

    #[tokio::test]
    async fn await_response_returns_resolved_result() {
        let client = test_client();
        let execution_id = client
            .request("t-1", "file_rw", json!({"mode": "read", "path": "x"}), None, ToolSubmission::Bus)
            .await
            .unwrap();

        let waiter = client.clone();
        let id = execution_id.clone();
        let handle = tokio::spawn(async move {
            waiter
                .await_response(&id, std::time::Duration::from_secs(1))
                .await
        });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        client.resolve(&tool_result(&execution_id, TaskOutcome::Failure));

        let result = handle.await.unwrap().unwrap();
        assert_eq!(result.outcome, TaskOutcome::Failure);
    }

    #[tokio::test]
    async fn cancel_discards_tracking() {
        let client = test_client();
        let execution_id = client
            .request("t-1", "web_scrape", json!({"url": "http://x"}), None, ToolSubmission::Bus)
            .await
            .unwrap();
        assert!(client.cancel(&execution_id).is_some());
        assert_eq!(client.pending_count(), 0);
        assert!(client
            .resolve(&tool_result(&execution_id, TaskOutcome::Success))
            .is_none());
    }

    #[tokio::test]
    async fn awaiting_tool_update_reaches_orchestrator() {
        let config = ConclaveConfig::default();
        let bus = BusClient::in_memory();
        let mut orchestrator_channel =
            bus.subscribe(&conclave_shared::bus::agent_channel(&config.orchestrator_agent));
        let client = ToolClient::new("gpt", bus, &config);

        client
            .request("t-9", "web_search", json!({"query": "foo"}), None, ToolSubmission::Bus)
            .await
            .unwrap();

        let envelope = orchestrator_channel.next_envelope().await.unwrap();
        match envelope {
            conclave_shared::messages::Envelope::TaskResult(r) => {
                assert_eq!(r.event, TaskEvent::AwaitingTool);
                assert_eq!(r.task_id, "t-9");
            }
            other => panic!("expected awaiting_tool update, got {other:?}"),
        }
    }
}
