//! # Sandbox Client
//!
//! HTTP client for the external code sandbox: one POST to submit, then
//! polling of `/result/{execution_id}` until a terminal answer. The sandbox
//! frames results itself; this module only maps its wire shapes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Submission payload for `POST /execute`
#[derive(Debug, Clone, Serialize)]
pub struct SandboxSubmission {
    pub task_id: String,
    pub code: String,
    pub timeout: u64,
    pub memory_limit: u64,
    pub dependencies: Vec<String>,
    pub allow_file_access: bool,
    pub execution_mode: String,
    pub requesting_agent: String,
}

impl SandboxSubmission {
    /// Build a submission from tool parameters, applying the defaults the
    /// sandbox expects.
    pub fn from_parameters(
        task_id: &str,
        requesting_agent: &str,
        parameters: &Value,
    ) -> Result<Self, String> {
        let code = parameters
            .get("code")
            .and_then(Value::as_str)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| "missing required parameter 'code'".to_string())?;

        Ok(SandboxSubmission {
            task_id: task_id.to_string(),
            code: code.to_string(),
            timeout: parameters.get("timeout").and_then(Value::as_u64).unwrap_or(30),
            memory_limit: parameters
                .get("memory_limit")
                .and_then(Value::as_u64)
                .unwrap_or(512),
            dependencies: parameters
                .get("dependencies")
                .and_then(Value::as_array)
                .map(|deps| {
                    deps.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            allow_file_access: parameters
                .get("allow_file_access")
                .and_then(Value::as_bool)
                .unwrap_or(true),
            execution_mode: "docker".to_string(),
            requesting_agent: requesting_agent.to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    execution_id: String,
}

/// Terminal result from `GET /result/{execution_id}`
#[derive(Debug, Clone, Deserialize)]
pub struct SandboxResult {
    pub status: String,
    #[serde(default)]
    pub stdout: Option<String>,
    #[serde(default)]
    pub stderr: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub output_files: Option<Value>,
    #[serde(default)]
    pub execution_time: Option<f64>,
    #[serde(default)]
    pub exit_code: Option<i64>,
}

impl SandboxResult {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }

    /// Human-readable failure reason, preferring the explicit message
    pub fn failure_reason(&self) -> String {
        self.error_message
            .clone()
            .or_else(|| self.stderr.clone())
            .unwrap_or_else(|| format!("sandbox reported status '{}'", self.status))
    }
}

/// One poll of a pending execution
#[derive(Debug)]
pub enum PollOutcome {
    /// 202: still running
    Pending,
    /// 200: finished
    Complete(SandboxResult),
    /// 404: the sandbox no longer knows the execution
    NotFound,
    /// Transport or protocol error; retried up to a bound
    Error(String),
}

/// Client for the sandbox HTTP API
#[derive(Debug, Clone)]
pub struct SandboxClient {
    http: reqwest::Client,
    base_url: String,
}

impl SandboxClient {
    pub fn new(base_url: &str, timeout: std::time::Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        SandboxClient {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Submit code for execution; returns the sandbox's execution id
    pub async fn submit(&self, submission: &SandboxSubmission) -> Result<String, String> {
        let url = format!("{}/execute", self.base_url);
        debug!(task_id = %submission.task_id, "Submitting to sandbox");

        let response = self
            .http
            .post(&url)
            .json(submission)
            .send()
            .await
            .map_err(|e| format!("sandbox submit failed: {e}"))?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            return Err(format!("sandbox submit failed with status {status}"));
        }
        let body: SubmitResponse = response
            .json()
            .await
            .map_err(|e| format!("sandbox submit response malformed: {e}"))?;
        Ok(body.execution_id)
    }

    /// Check one pending execution
    pub async fn poll(&self, execution_id: &str) -> PollOutcome {
        let url = format!("{}/result/{}", self.base_url, execution_id);
        let response = match self.http.get(&url).send().await {
            Ok(response) => response,
            Err(e) => return PollOutcome::Error(e.to_string()),
        };

        match response.status().as_u16() {
            202 => PollOutcome::Pending,
            200 => match response.json::<SandboxResult>().await {
                Ok(result) => PollOutcome::Complete(result),
                Err(e) => PollOutcome::Error(format!("result payload malformed: {e}")),
            },
            404 => PollOutcome::NotFound,
            other => PollOutcome::Error(format!("polling failed with status {other}")),
        }
    }
}
