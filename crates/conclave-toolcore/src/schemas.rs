//! # Tool Execution API Types
//!
//! Request/response envelopes shared by the HTTP API and the bus request
//! listener, plus parameter validation against a tool's JSON schema.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// A request to execute a named tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolExecutionRequest {
    pub tool_name: String,
    #[serde(default)]
    pub parameters: Value,
    /// Validate only; never executes
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requesting_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    /// Caller-supplied correlation id; generated when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Acknowledged,
    Completed,
    Failed,
    ValidationError,
    NotFound,
}

/// The immediate answer to a submission; terminal results travel on the bus
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolExecutionResponse {
    pub status: ExecutionStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_errors: Option<BTreeMap<String, Vec<String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<String>,
}

impl ToolExecutionResponse {
    pub fn acknowledged(tool_name: &str, execution_id: String) -> Self {
        ToolExecutionResponse {
            status: ExecutionStatus::Acknowledged,
            message: format!("Tool '{tool_name}' execution acknowledged."),
            result: None,
            error: None,
            validation_errors: None,
            execution_id: Some(execution_id),
        }
    }

    pub fn dry_run_valid(tool_name: &str) -> Self {
        ToolExecutionResponse {
            status: ExecutionStatus::Completed,
            message: format!("Dry run for tool '{tool_name}' passed validation."),
            result: Some(json!({"dry_run_status": "valid"})),
            error: None,
            validation_errors: None,
            execution_id: None,
        }
    }

    pub fn validation_error(
        tool_name: &str,
        errors: BTreeMap<String, Vec<String>>,
    ) -> Self {
        ToolExecutionResponse {
            status: ExecutionStatus::ValidationError,
            message: format!("Parameters for tool '{tool_name}' failed validation."),
            result: None,
            error: None,
            validation_errors: Some(errors),
            execution_id: None,
        }
    }

    pub fn not_found(tool_name: &str) -> Self {
        ToolExecutionResponse {
            status: ExecutionStatus::NotFound,
            message: format!("Tool '{tool_name}' not found."),
            result: None,
            error: Some(format!("Tool '{tool_name}' not found.")),
            validation_errors: None,
            execution_id: None,
        }
    }

    pub fn failed(tool_name: &str, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        ToolExecutionResponse {
            status: ExecutionStatus::Failed,
            message: format!("Tool '{tool_name}' request failed."),
            result: None,
            error: Some(reason),
            validation_errors: None,
            execution_id: None,
        }
    }

    pub fn is_terminal_error(&self) -> bool {
        matches!(
            self.status,
            ExecutionStatus::Failed | ExecutionStatus::ValidationError | ExecutionStatus::NotFound
        )
    }
}

/// Validate parameters against a tool's JSON schema.
///
/// Errors come back keyed by field: missing required properties map to
/// `["required"]`, everything else keeps the validator's message.
pub fn validate_parameters(
    schema: &Value,
    parameters: &Value,
) -> Result<(), BTreeMap<String, Vec<String>>> {
    let validator = match jsonschema::validator_for(schema) {
        Ok(validator) => validator,
        Err(e) => {
            let mut errors = BTreeMap::new();
            errors.insert("schema".to_string(), vec![e.to_string()]);
            return Err(errors);
        }
    };

    let mut errors: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for error in validator.iter_errors(parameters) {
        use jsonschema::error::ValidationErrorKind;
        match &error.kind() {
            ValidationErrorKind::Required { property } => {
                let field = property
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| property.to_string());
                errors.entry(field).or_default().push("required".to_string());
            }
            _ => {
                let path = error.instance_path().to_string();
                let field = if path.is_empty() {
                    "parameters".to_string()
                } else {
                    path.trim_start_matches('/').replace('/', ".")
                };
                errors.entry(field).or_default().push(error.to_string());
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_rw_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "mode": {"type": "string", "enum": ["read", "write", "append", "delete"]},
                "path": {"type": "string"},
                "content": {"type": "string"}
            },
            "required": ["mode", "path"]
        })
    }

    #[test]
    fn missing_required_field_maps_to_required() {
        let err = validate_parameters(&file_rw_schema(), &json!({"mode": "read"})).unwrap_err();
        assert_eq!(err["path"], vec!["required".to_string()]);
    }

    #[test]
    fn valid_parameters_pass() {
        assert!(validate_parameters(
            &file_rw_schema(),
            &json!({"mode": "read", "path": "/tmp/x"})
        )
        .is_ok());
    }

    #[test]
    fn type_mismatch_reports_field() {
        let err = validate_parameters(
            &file_rw_schema(),
            &json!({"mode": "read", "path": 42}),
        )
        .unwrap_err();
        assert!(err.contains_key("path"));
    }

    #[test]
    fn request_defaults() {
        let request: ToolExecutionRequest =
            serde_json::from_value(json!({"tool_name": "web_search"})).unwrap();
        assert!(!request.dry_run);
        assert!(request.requesting_agent.is_none());
        assert_eq!(request.parameters, Value::Null);
    }

    #[test]
    fn response_wire_symbols() {
        let response = ToolExecutionResponse::validation_error("file_rw", BTreeMap::new());
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["status"], "validation_error");
    }
}
