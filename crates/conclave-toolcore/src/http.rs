//! # Tool Core HTTP API
//!
//! - `POST /execute/` — submit a tool execution; always answers `202` with a
//!   [`ToolExecutionResponse`] carrying the disposition
//! - `POST /execute/upload-execute` — multipart script upload executed in
//!   the sandbox
//! - `GET /tools/` — list the registry
//!
//! Registry CRUD beyond listing lives outside the core contract.

use std::sync::Arc;

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tracing::warn;

use crate::registry::ToolSpec;
use crate::schemas::{ToolExecutionRequest, ToolExecutionResponse};
use crate::service::ToolCoreService;

/// Build the HTTP router over a shared service handle
pub fn router(service: Arc<ToolCoreService>) -> Router {
    Router::new()
        .route("/execute/", post(execute))
        .route("/execute/upload-execute", post(upload_execute))
        .route("/tools/", get(list_tools))
        .with_state(service)
}

async fn execute(
    State(service): State<Arc<ToolCoreService>>,
    Json(request): Json<ToolExecutionRequest>,
) -> (StatusCode, Json<ToolExecutionResponse>) {
    let response = service.submit(request).await;
    (StatusCode::ACCEPTED, Json(response))
}

async fn list_tools(
    State(service): State<Arc<ToolCoreService>>,
) -> Json<Vec<ToolSpec>> {
    Json(service.registry().list())
}

/// Multipart script upload, executed as `python_sandbox`
async fn upload_execute(
    State(service): State<Arc<ToolCoreService>>,
    mut multipart: Multipart,
) -> (StatusCode, Json<ToolExecutionResponse>) {
    let mut code: Option<String> = None;
    let mut task_id: Option<String> = None;
    let mut requesting_agent: Option<String> = None;
    let mut timeout: u64 = 30;
    let mut memory_limit: u64 = 512;
    let mut dependencies: Vec<Value> = Vec::new();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Malformed multipart upload");
                return (
                    StatusCode::ACCEPTED,
                    Json(ToolExecutionResponse::failed(
                        "python_sandbox",
                        format!("malformed upload: {e}"),
                    )),
                );
            }
        };

        let name = field.name().unwrap_or_default().to_string();
        let text = match field.text().await {
            Ok(text) => text,
            Err(e) => {
                return (
                    StatusCode::ACCEPTED,
                    Json(ToolExecutionResponse::failed(
                        "python_sandbox",
                        format!("unreadable field '{name}': {e}"),
                    )),
                );
            }
        };

        match name.as_str() {
            "code_file" => code = Some(text),
            "task_id" => task_id = Some(text),
            "requesting_agent" => requesting_agent = Some(text),
            "timeout" => timeout = text.parse().unwrap_or(30),
            "memory_limit" => memory_limit = text.parse().unwrap_or(512),
            "dependencies" => dependencies.push(json!(text)),
            _ => {}
        }
    }

    let Some(code) = code else {
        return (
            StatusCode::ACCEPTED,
            Json(ToolExecutionResponse::failed(
                "python_sandbox",
                "missing 'code_file' field",
            )),
        );
    };

    let request = ToolExecutionRequest {
        tool_name: "python_sandbox".to_string(),
        parameters: json!({
            "code": code,
            "timeout": timeout,
            "memory_limit": memory_limit,
            "dependencies": dependencies,
            "allow_file_access": true,
        }),
        dry_run: false,
        requesting_agent,
        task_id,
        execution_id: None,
    };

    let response = service.submit(request).await;
    (StatusCode::ACCEPTED, Json(response))
}
