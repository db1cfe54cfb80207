//! # Bus Request Listener
//!
//! Agents may reach the tool core without knowing its HTTP address by
//! publishing a [`ToolExecutionRequest`] JSON document on the tool request
//! topic. Semantics are identical to the HTTP path, except that terminal
//! submission errors (validation, unknown tool, inactive tool) are reported
//! back as `fail` TaskResults on the requesting agent's channel, since there
//! is no synchronous response to carry them.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use conclave_shared::bus::{agent_channel, BusClient};
use conclave_shared::messages::{factories, Envelope, MessageIntent, TaskEvent, TaskOutcome};

use crate::schemas::ToolExecutionRequest;
use crate::service::ToolCoreService;

/// Spawn the tool-request subscription
pub fn spawn(
    service: Arc<ToolCoreService>,
    bus: BusClient,
    request_channel: String,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut subscription = bus.subscribe(&request_channel);
        info!(channel = %request_channel, "Tool request listener started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                message = subscription.next() => match message {
                    Some(bytes) => {
                        let request: ToolExecutionRequest = match serde_json::from_slice(&bytes) {
                            Ok(request) => request,
                            Err(e) => {
                                warn!(error = %e, "Dropping malformed tool request");
                                continue;
                            }
                        };
                        handle_request(&service, &bus, request).await;
                    }
                    None => break,
                }
            }
        }
        info!(channel = %request_channel, "Tool request listener stopped");
    })
}

async fn handle_request(
    service: &Arc<ToolCoreService>,
    bus: &BusClient,
    request: ToolExecutionRequest,
) {
    let tool_name = request.tool_name.clone();
    let requesting_agent = request.requesting_agent.clone();
    let task_id = request.task_id.clone();

    let response = service.submit(request).await;
    if !response.is_terminal_error() {
        return;
    }

    // Surface the rejection to the requester as a failure result.
    let Some(agent) = requesting_agent else {
        warn!(tool = %tool_name, "Rejected bus tool request has no requesting agent");
        return;
    };
    let reason = response
        .error
        .clone()
        .or_else(|| {
            response
                .validation_errors
                .as_ref()
                .map(|errors| format!("invalid parameters: {errors:?}"))
        })
        .unwrap_or_else(|| response.message.clone());

    let result = factories::create_task_result(
        task_id.as_deref().unwrap_or("unknown"),
        service.identity(),
        &format!("Tool '{tool_name}' request rejected: {reason}"),
        &agent,
        TaskEvent::Fail,
        TaskOutcome::Failure,
        MessageIntent::ToolResponse,
        None,
        0.0,
    );
    bus.publish_envelope(&agent_channel(&agent), &Envelope::TaskResult(result))
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::InMemoryToolRegistry;
    use conclave_shared::ConclaveConfig;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn bus_request_executes_and_publishes() {
        let bus = BusClient::in_memory();
        let config = ConclaveConfig::default();
        let registry = Arc::new(InMemoryToolRegistry::with_builtin_tools());
        let service = Arc::new(ToolCoreService::new(bus.clone(), &config, registry));
        let cancel = CancellationToken::new();
        let mut agent_channel_sub = bus.subscribe("gpt_channel");

        let handle = spawn(
            service,
            bus.clone(),
            config.tool_request_channel.clone(),
            cancel.clone(),
        );
        tokio::time::sleep(Duration::from_millis(20)).await;

        bus.publish(
            &config.tool_request_channel,
            serde_json::to_vec(&json!({
                "tool_name": "web_search",
                "parameters": {"query": "foo"},
                "requesting_agent": "gpt",
                "task_id": "t-1"
            }))
            .unwrap(),
        )
        .await;

        let envelope = tokio::time::timeout(
            Duration::from_secs(2),
            agent_channel_sub.next_envelope(),
        )
        .await
        .unwrap()
        .unwrap();
        match envelope {
            Envelope::TaskResult(r) => {
                assert_eq!(r.event, TaskEvent::ToolComplete);
                assert!(r.content.contains("foo"));
            }
            other => panic!("expected tool result, got {other:?}"),
        }

        cancel.cancel();
        let _ = handle.await;
    }

    #[tokio::test]
    async fn bus_validation_error_surfaces_as_fail_result() {
        let bus = BusClient::in_memory();
        let config = ConclaveConfig::default();
        let registry = Arc::new(InMemoryToolRegistry::with_builtin_tools());
        let service = Arc::new(ToolCoreService::new(bus.clone(), &config, registry));
        let cancel = CancellationToken::new();
        let mut agent_channel_sub = bus.subscribe("gpt_channel");

        let handle = spawn(
            service,
            bus.clone(),
            config.tool_request_channel.clone(),
            cancel.clone(),
        );
        tokio::time::sleep(Duration::from_millis(20)).await;

        bus.publish(
            &config.tool_request_channel,
            serde_json::to_vec(&json!({
                "tool_name": "file_rw",
                "parameters": {"mode": "read"},
                "requesting_agent": "gpt",
                "task_id": "t-2"
            }))
            .unwrap(),
        )
        .await;

        let envelope = tokio::time::timeout(
            Duration::from_secs(2),
            agent_channel_sub.next_envelope(),
        )
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

        cancel.cancel();
        let _ = handle.await;
    }
}
