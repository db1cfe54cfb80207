//! End-to-end tool execution: HTTP submission through the real axum router,
//! callback delivery on the requesting agent's channel, and the validation
//! failure path.

mod common;

use std::sync::Arc;
use std::time::Duration;

use conclave_agent::{ToolClient, ToolSubmission};
use conclave_shared::bus::{agent_channel, BusClient};
use conclave_shared::messages::{Envelope, TaskEvent, TaskOutcome};
use conclave_shared::ConclaveConfig;
use conclave_toolcore::registry::InMemoryToolRegistry;
use conclave_toolcore::{http, ToolCoreService};
use serde_json::json;

use common::next_envelope;

/// Serve the tool core API on an ephemeral port; returns its base URL
async fn serve_toolcore(bus: &BusClient, config: &ConclaveConfig) -> String {
    let registry = Arc::new(InMemoryToolRegistry::with_builtin_tools());
    let service = Arc::new(ToolCoreService::new(bus.clone(), config, registry));
    let app = http::router(service);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("ephemeral bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn http_tool_request_acknowledges_and_calls_back() {
    let bus = BusClient::in_memory();
    let mut config = ConclaveConfig::default();
    let base_url = serve_toolcore(&bus, &config).await;
    config.toolcore_api_url = base_url;
    let config = Arc::new(config);

    let mut agent_channel_sub = bus.subscribe(&agent_channel("gpt"));
    let mut frontend = bus.subscribe(&config.frontend_channel);

    let tools = ToolClient::new("gpt", bus.clone(), &config);
    let execution_id = tools
        .request(
            "t-tool",
            "web_search",
            json!({"query": "foo"}),
            None,
            ToolSubmission::Http,
        )
        .await
        .expect("submission must be accepted");
    assert_eq!(tools.pending_count(), 1);

    // The terminal result lands on the agent channel and the frontend.
    let result = loop {
        match next_envelope(&mut agent_channel_sub).await {
            Envelope::TaskResult(r) if r.event == TaskEvent::ToolComplete => break r,
            _ => continue,
        }
    };
    assert_eq!(result.outcome, TaskOutcome::Success);
    assert_eq!(result.task_id, "t-tool");
    assert!(result.content.contains("foo"));
    assert_eq!(
        result.metadata.as_ref().unwrap()["execution_id"],
        json!(execution_id.clone())
    );

    // Resolving against the pending table continues the agent-side protocol.
    let call = tools.resolve(&result).expect("pending call must resolve");
    assert_eq!(call.tool_name, "web_search");
    assert_eq!(tools.pending_count(), 0);

    let frontend_copy = loop {
        match next_envelope(&mut frontend).await {
            Envelope::TaskResult(r) if r.event == TaskEvent::ToolComplete => break r,
            _ => continue,
        }
    };
    assert_eq!(frontend_copy.task_id, "t-tool");
}

#[tokio::test]
async fn http_validation_failure_is_immediate_with_no_bus_traffic() {
    let bus = BusClient::in_memory();
    let config = ConclaveConfig::default();
    let base_url = serve_toolcore(&bus, &config).await;

    let mut agent_channel_sub = bus.subscribe(&agent_channel("gpt"));

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{base_url}/execute/"))
        .json(&json!({
            "tool_name": "file_rw",
            "parameters": {"mode": "read"},
            "requesting_agent": "gpt"
        }))
        .send()
        .await
        .expect("request must succeed");
    assert_eq!(response.status().as_u16(), 202);

    let body: serde_json::Value = response.json().await.expect("json body");
    assert_eq!(body["status"], "validation_error");
    assert_eq!(body["validation_errors"]["path"], json!(["required"]));

    tokio::select! {
        _ = agent_channel_sub.next() => panic!("validation errors must not publish"),
        _ = tokio::time::sleep(Duration::from_millis(100)) => {}
    }
}

#[tokio::test]
async fn http_tools_listing_contains_builtins() {
    let bus = BusClient::in_memory();
    let config = ConclaveConfig::default();
    let base_url = serve_toolcore(&bus, &config).await;

    let body: serde_json::Value = reqwest::get(format!("{base_url}/tools/"))
        .await
        .expect("request must succeed")
        .json()
        .await
        .expect("json body");
    let names: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"web_search"));
    assert!(names.contains(&"python_sandbox"));
}
