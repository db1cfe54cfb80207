//! # Tool Core Service
//!
//! The shared execution engine behind both submission paths (HTTP and bus).
//! Submission validates and acknowledges immediately; execution happens on a
//! background task. Every execution with `dry_run = false` eventually
//! publishes exactly one terminal TaskResult on the requesting agent's
//! channel and the frontend channel.
//!
//! Sandbox executions go into a pending table shared between the submit
//! path and the single polling activity; the table is a concurrent map to
//! keep the two sides race-free.

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use conclave_shared::bus::{agent_channel, BusClient};
use conclave_shared::messages::{factories, Envelope, MessageIntent, TaskEvent, TaskOutcome};
use conclave_shared::ConclaveConfig;

use crate::local;
use crate::registry::{ToolKind, ToolRegistry, ToolSpec};
use crate::sandbox::{PollOutcome, SandboxClient, SandboxSubmission};
use crate::schemas::{validate_parameters, ToolExecutionRequest, ToolExecutionResponse};
use crate::script;

/// Poll failures tolerated per execution before giving up
const MAX_POLL_FAILURES: u32 = 5;

/// One sandbox execution awaiting its result, keyed by the sandbox's
/// execution id
#[derive(Debug, Clone)]
struct PendingExecution {
    task_id: String,
    requesting_agent: String,
    /// The id the requesting agent correlates on
    client_execution_id: String,
    started_at: Instant,
    failures: u32,
}

#[derive(Debug)]
struct ServiceInner {
    identity: String,
    bus: BusClient,
    frontend_channel: String,
    registry: Arc<dyn ToolRegistry>,
    sandbox: SandboxClient,
    pending: DashMap<String, PendingExecution>,
    poll_interval: std::time::Duration,
    script_timeout: std::time::Duration,
    cancel: CancellationToken,
}

/// The tool execution engine. Cheap to clone; all clones share state.
#[derive(Debug, Clone)]
pub struct ToolCoreService {
    inner: Arc<ServiceInner>,
}

impl ToolCoreService {
    pub fn new(bus: BusClient, config: &ConclaveConfig, registry: Arc<dyn ToolRegistry>) -> Self {
        ToolCoreService {
            inner: Arc::new(ServiceInner {
                identity: config.toolcore_agent.clone(),
                bus,
                frontend_channel: config.frontend_channel.clone(),
                registry,
                sandbox: SandboxClient::new(&config.sandbox_api_url, config.http_timeout()),
                pending: DashMap::new(),
                poll_interval: config.sandbox_poll_interval(),
                script_timeout: config.http_timeout(),
                cancel: CancellationToken::new(),
            }),
        }
    }

    pub fn identity(&self) -> &str {
        &self.inner.identity
    }

    pub fn registry(&self) -> &Arc<dyn ToolRegistry> {
        &self.inner.registry
    }

    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    /// Stop the polling loop
    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
    }

    /// Submit a tool execution request.
    ///
    /// Validation and `dry_run` answer synchronously; real work is handed to
    /// a background task and acknowledged with an execution id.
    pub async fn submit(&self, request: ToolExecutionRequest) -> ToolExecutionResponse {
        let tool_name = request.tool_name.clone();

        let Some(spec) = self.inner.registry.lookup(&tool_name) else {
            warn!(tool = %tool_name, "Execution requested for unknown tool");
            return ToolExecutionResponse::not_found(&tool_name);
        };
        if !spec.active {
            warn!(tool = %tool_name, "Execution requested for inactive tool");
            return ToolExecutionResponse::failed(
                &tool_name,
                format!("Tool '{tool_name}' is registered but not active."),
            );
        }

        if let Some(schema) = &spec.parameter_schema {
            let parameters = if request.parameters.is_null() {
                json!({})
            } else {
                request.parameters.clone()
            };
            if let Err(errors) = validate_parameters(schema, &parameters) {
                info!(tool = %tool_name, ?errors, "Parameter validation failed");
                return ToolExecutionResponse::validation_error(&tool_name, errors);
            }
        }

        if request.dry_run {
            return ToolExecutionResponse::dry_run_valid(&tool_name);
        }

        let execution_id = request
            .execution_id
            .clone()
            .unwrap_or_else(|| format!("exec-{}", uuid::Uuid::new_v4()));
        let service = self.clone();
        let background_id = execution_id.clone();
        tokio::spawn(async move {
            service.execute(spec, request, background_id).await;
        });

        info!(tool = %tool_name, execution_id = %execution_id, "Execution acknowledged");
        ToolExecutionResponse::acknowledged(&tool_name, execution_id)
    }

    /// Background execution of one acknowledged request
    async fn execute(&self, spec: ToolSpec, request: ToolExecutionRequest, execution_id: String) {
        let task_id = request
            .task_id
            .clone()
            .unwrap_or_else(|| execution_id.clone());
        let requesting_agent = request
            .requesting_agent
            .clone()
            .unwrap_or_else(|| "unknown_agent".to_string());

        match spec.kind {
            ToolKind::Local => {
                let outcome = match local::run_local_tool(&spec.name, &request.parameters).await {
                    Some(outcome) => outcome,
                    None => Err(format!(
                        "Tool '{}' is registered as local but has no implementation.",
                        spec.name
                    )),
                };
                self.publish_result(&execution_id, &task_id, &requesting_agent, &spec.name, outcome)
                    .await;
            }
            ToolKind::Sandbox => {
                let submission = match SandboxSubmission::from_parameters(
                    &task_id,
                    &requesting_agent,
                    &request.parameters,
                ) {
                    Ok(submission) => submission,
                    Err(e) => {
                        self.publish_result(
                            &execution_id,
                            &task_id,
                            &requesting_agent,
                            &spec.name,
                            Err(e),
                        )
                        .await;
                        return;
                    }
                };
                match self.inner.sandbox.submit(&submission).await {
                    Ok(sandbox_execution_id) => {
                        info!(
                            task_id = %task_id,
                            sandbox_execution_id = %sandbox_execution_id,
                            "Sandbox accepted submission; polling will deliver the result"
                        );
                        self.inner.pending.insert(
                            sandbox_execution_id,
                            PendingExecution {
                                task_id,
                                requesting_agent,
                                client_execution_id: execution_id,
                                started_at: Instant::now(),
                                failures: 0,
                            },
                        );
                    }
                    Err(e) => {
                        self.publish_result(
                            &execution_id,
                            &task_id,
                            &requesting_agent,
                            &spec.name,
                            Err(e),
                        )
                        .await;
                    }
                }
            }
            ToolKind::Script => {
                let outcome = match &spec.path {
                    Some(path) => {
                        script::run_script(path, &request.parameters, self.inner.script_timeout)
                            .await
                    }
                    None => Err(format!("Script tool '{}' has no path configured.", spec.name)),
                };
                self.publish_result(&execution_id, &task_id, &requesting_agent, &spec.name, outcome)
                    .await;
            }
        }
    }

    /// Publish the terminal TaskResult for one execution
    async fn publish_result(
        &self,
        execution_id: &str,
        task_id: &str,
        requesting_agent: &str,
        tool_name: &str,
        outcome: Result<Value, String>,
    ) {
        let (event, task_outcome, content) = match &outcome {
            Ok(value) => (
                TaskEvent::ToolComplete,
                TaskOutcome::Success,
                serde_json::to_string(value).unwrap_or_else(|_| value.to_string()),
            ),
            Err(reason) => (
                TaskEvent::Fail,
                TaskOutcome::Failure,
                format!("Tool '{tool_name}' failed: {reason}"),
            ),
        };

        let mut result = factories::create_task_result(
            task_id,
            &self.inner.identity,
            &content,
            requesting_agent,
            event,
            task_outcome,
            MessageIntent::ToolResponse,
            None,
            if outcome.is_ok() { 1.0 } else { 0.0 },
        );
        result.metadata = Some(
            [
                ("execution_id".to_string(), json!(execution_id)),
                ("tool_name".to_string(), json!(tool_name)),
            ]
            .into_iter()
            .collect(),
        );

        let envelope = Envelope::TaskResult(result);
        self.inner
            .bus
            .publish_envelope(&agent_channel(requesting_agent), &envelope)
            .await;
        self.inner
            .bus
            .publish_envelope(&self.inner.frontend_channel, &envelope)
            .await;

        info!(
            execution_id,
            task_id,
            tool = tool_name,
            success = outcome.is_ok(),
            "Published tool result"
        );
    }

    /// Spawn the single sandbox polling loop
    pub fn start_polling(&self) -> JoinHandle<()> {
        let service = self.clone();
        tokio::spawn(async move {
            info!(
                interval_secs = service.inner.poll_interval.as_secs(),
                "Sandbox polling loop started"
            );
            loop {
                tokio::select! {
                    _ = service.inner.cancel.cancelled() => break,
                    _ = tokio::time::sleep(service.inner.poll_interval) => {}
                }
                service.poll_once().await;
            }
            info!("Sandbox polling loop stopped");
        })
    }

    /// One pass over the pending table
    async fn poll_once(&self) {
        let ids: Vec<String> = self.inner.pending.iter().map(|e| e.key().clone()).collect();
        for sandbox_execution_id in ids {
            // The entry may have been completed concurrently.
            let Some(entry) = self
                .inner
                .pending
                .get(&sandbox_execution_id)
                .map(|e| e.value().clone())
            else {
                continue;
            };

            match self.inner.sandbox.poll(&sandbox_execution_id).await {
                PollOutcome::Pending => {}
                PollOutcome::Complete(result) => {
                    self.inner.pending.remove(&sandbox_execution_id);
                    let outcome = if result.is_success() {
                        Ok(json!({
                            "stdout": result.stdout,
                            "stderr": result.stderr,
                            "execution_time": result.execution_time,
                            "exit_code": result.exit_code,
                            "output_files": result.output_files,
                        }))
                    } else {
                        Err(result.failure_reason())
                    };
                    info!(
                        sandbox_execution_id = %sandbox_execution_id,
                        elapsed_secs = entry.started_at.elapsed().as_secs(),
                        "Sandbox execution finished"
                    );
                    self.publish_result(
                        &entry.client_execution_id,
                        &entry.task_id,
                        &entry.requesting_agent,
                        "python_sandbox",
                        outcome,
                    )
                    .await;
                }
                PollOutcome::NotFound => {
                    warn!(sandbox_execution_id = %sandbox_execution_id, "Sandbox lost the execution");
                    self.inner.pending.remove(&sandbox_execution_id);
                    self.publish_result(
                        &entry.client_execution_id,
                        &entry.task_id,
                        &entry.requesting_agent,
                        "python_sandbox",
                        Err("execution result not found".to_string()),
                    )
                    .await;
                }
                PollOutcome::Error(e) => {
                    let failures = entry.failures + 1;
                    error!(
                        sandbox_execution_id = %sandbox_execution_id,
                        failures,
                        error = %e,
                        "Sandbox poll failed"
                    );
                    if failures >= MAX_POLL_FAILURES {
                        self.inner.pending.remove(&sandbox_execution_id);
                        self.publish_result(
                            &entry.client_execution_id,
                            &entry.task_id,
                            &entry.requesting_agent,
                            "python_sandbox",
                            Err(format!("polling failed after {failures} attempts: {e}")),
                        )
                        .await;
                    } else if let Some(mut entry) =
                        self.inner.pending.get_mut(&sandbox_execution_id)
                    {
                        entry.failures = failures;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::InMemoryToolRegistry;
    use std::time::Duration;

    fn service_with_bus() -> (ToolCoreService, BusClient) {
        let bus = BusClient::in_memory();
        let config = ConclaveConfig::default();
        let registry = Arc::new(InMemoryToolRegistry::with_builtin_tools());
        let service = ToolCoreService::new(bus.clone(), &config, registry);
        (service, bus)
    }

    fn request(tool: &str, parameters: Value) -> ToolExecutionRequest {
        ToolExecutionRequest {
            tool_name: tool.to_string(),
            parameters,
            dry_run: false,
            requesting_agent: Some("gpt".to_string()),
            task_id: Some("t-1".to_string()),
            execution_id: None,
        }
    }

    #[tokio::test]
    async fn unknown_tool_is_not_found() {
        let (service, _bus) = service_with_bus();
        let response = service.submit(request("no_such_tool", json!({}))).await;
        assert_eq!(response.status, crate::ExecutionStatus::NotFound);
    }

    #[tokio::test]
    async fn inactive_tool_fails_with_reason() {
        let bus = BusClient::in_memory();
        let config = ConclaveConfig::default();
        let registry = Arc::new(InMemoryToolRegistry::with_builtin_tools());
        registry.deactivate("web_search");
        let service = ToolCoreService::new(bus, &config, registry);

        let response = service
            .submit(request("web_search", json!({"query": "x"})))
            .await;
        assert_eq!(response.status, crate::ExecutionStatus::Failed);
        assert!(response.error.unwrap().contains("not active"));
    }

    #[tokio::test]
    async fn validation_failure_is_immediate_and_silent() {
        let (service, bus) = service_with_bus();
        let mut agent_channel_sub = bus.subscribe("gpt_channel");

        let response = service
            .submit(request("file_rw", json!({"mode": "read"})))
            .await;
        assert_eq!(response.status, crate::ExecutionStatus::ValidationError);
        let errors = response.validation_errors.unwrap();
        assert_eq!(errors["path"], vec!["required".to_string()]);

        // No bus traffic for HTTP-side validation errors.
        tokio::select! {
            _ = agent_channel_sub.next() => panic!("validation error must not publish"),
            _ = tokio::time::sleep(Duration::from_millis(50)) => {}
        }
    }

    #[tokio::test]
    async fn dry_run_stops_after_validation() {
        let (service, bus) = service_with_bus();
        let mut agent_channel_sub = bus.subscribe("gpt_channel");

        let mut req = request("web_search", json!({"query": "foo"}));
        req.dry_run = true;
        let response = service.submit(req).await;
        assert_eq!(response.status, crate::ExecutionStatus::Completed);
        assert_eq!(response.result.unwrap()["dry_run_status"], "valid");

        tokio::select! {
            _ = agent_channel_sub.next() => panic!("dry run must not execute"),
            _ = tokio::time::sleep(Duration::from_millis(50)) => {}
        }
    }

    #[tokio::test]
    async fn local_tool_publishes_success_to_agent_and_frontend() {
        let (service, bus) = service_with_bus();
        let mut agent_channel_sub = bus.subscribe("gpt_channel");
        let mut frontend = bus.subscribe("FRONTEND_CHANNEL");

        let response = service
            .submit(request("web_search", json!({"query": "foo"})))
            .await;
        assert_eq!(response.status, crate::ExecutionStatus::Acknowledged);
        let execution_id = response.execution_id.unwrap();

        for sub in [&mut agent_channel_sub, &mut frontend] {
            let envelope = tokio::time::timeout(Duration::from_secs(2), sub.next_envelope())
                .await
                .unwrap()
                .unwrap();
            match envelope {
                Envelope::TaskResult(r) => {
                    assert_eq!(r.event, TaskEvent::ToolComplete);
                    assert_eq!(r.outcome, TaskOutcome::Success);
                    assert_eq!(r.intent, MessageIntent::ToolResponse);
                    assert_eq!(r.target_agent, "gpt");
                    assert!(r.content.contains("foo"));
                    assert_eq!(
                        r.metadata.unwrap()["execution_id"],
                        json!(execution_id.clone())
                    );
                }
                other => panic!("expected tool result, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn failing_local_tool_publishes_failure() {
        let (service, bus) = service_with_bus();
        let mut agent_channel_sub = bus.subscribe("gpt_channel");

        // Schema allows the call; the read itself fails.
        let response = service
            .submit(request(
                "file_rw",
                json!({"mode": "read", "path": "/nonexistent/nowhere.txt"}),
            ))
            .await;
        assert_eq!(response.status, crate::ExecutionStatus::Acknowledged);

        let envelope =
            tokio::time::timeout(Duration::from_secs(2), agent_channel_sub.next_envelope())
                .await
                .unwrap()
                .unwrap();
        match envelope {
            Envelope::TaskResult(r) => {
                assert_eq!(r.event, TaskEvent::Fail);
                assert_eq!(r.outcome, TaskOutcome::Failure);
                assert!(r.content.contains("file_rw"));
            }
            other => panic!("expected failure result, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn caller_execution_id_is_honored() {
        let (service, bus) = service_with_bus();
        let mut agent_channel_sub = bus.subscribe("gpt_channel");

        let mut req = request("web_search", json!({"query": "bar"}));
        req.execution_id = Some("gpt-web_search-abc".to_string());
        let response = service.submit(req).await;
        assert_eq!(response.execution_id.as_deref(), Some("gpt-web_search-abc"));

        let envelope =
            tokio::time::timeout(Duration::from_secs(2), agent_channel_sub.next_envelope())
                .await
                .unwrap()
                .unwrap();
        match envelope {
            Envelope::TaskResult(r) => {
                assert_eq!(
                    r.metadata.unwrap()["execution_id"],
                    json!("gpt-web_search-abc")
                );
            }
            other => panic!("expected tool result, got {other:?}"),
        }
    }
}
