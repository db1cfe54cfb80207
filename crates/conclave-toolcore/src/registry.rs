//! # Tool Registry
//!
//! Keyed lookup of tool definitions: `(name, kind, path, parameter schema,
//! active)`. Persistent storage stays outside the core; the in-memory
//! implementation ships pre-loaded with the built-in tools and is enough
//! for single-process deployments and tests.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// How a tool is executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// In-process async function
    Local,
    /// Submitted to the external code sandbox
    Sandbox,
    /// Spawned interpreter with JSON over stdin/stdout
    Script,
}

/// A registered tool definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub kind: ToolKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Script path for `Script` tools
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// JSON schema for the tool's parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter_schema: Option<Value>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Keyed tool lookup
pub trait ToolRegistry: Send + Sync + std::fmt::Debug {
    fn lookup(&self, name: &str) -> Option<ToolSpec>;
    fn list(&self) -> Vec<ToolSpec>;
}

/// In-memory registry
#[derive(Debug, Default)]
pub struct InMemoryToolRegistry {
    tools: DashMap<String, ToolSpec>,
}

impl InMemoryToolRegistry {
    pub fn new() -> Self {
        InMemoryToolRegistry::default()
    }

    /// Registry pre-loaded with the built-in local tools and the sandbox
    pub fn with_builtin_tools() -> Self {
        let registry = InMemoryToolRegistry::new();
        for spec in builtin_tools() {
            registry.register(spec);
        }
        registry
    }

    pub fn register(&self, spec: ToolSpec) {
        self.tools.insert(spec.name.clone(), spec);
    }

    pub fn deactivate(&self, name: &str) -> bool {
        match self.tools.get_mut(name) {
            Some(mut spec) => {
                spec.active = false;
                true
            }
            None => false,
        }
    }
}

impl ToolRegistry for InMemoryToolRegistry {
    fn lookup(&self, name: &str) -> Option<ToolSpec> {
        self.tools.get(name).map(|spec| spec.clone())
    }

    fn list(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self.tools.iter().map(|e| e.value().clone()).collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }
}

/// Built-in tool definitions with their parameter schemas
pub fn builtin_tools() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: "web_search".to_string(),
            kind: ToolKind::Local,
            description: Some("Search the web for a query".to_string()),
            path: None,
            parameter_schema: Some(json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "minLength": 1},
                    "max_results": {"type": "integer", "minimum": 1, "maximum": 50}
                },
                "required": ["query"]
            })),
            active: true,
        },
        ToolSpec {
            name: "web_scrape".to_string(),
            kind: ToolKind::Local,
            description: Some("Fetch a page and return its text".to_string()),
            path: None,
            parameter_schema: Some(json!({
                "type": "object",
                "properties": {
                    "url": {"type": "string", "minLength": 1}
                },
                "required": ["url"]
            })),
            active: true,
        },
        ToolSpec {
            name: "file_rw".to_string(),
            kind: ToolKind::Local,
            description: Some("Read, write, append or delete a file".to_string()),
            path: None,
            parameter_schema: Some(json!({
                "type": "object",
                "properties": {
                    "mode": {"type": "string", "enum": ["read", "write", "append", "delete"]},
                    "path": {"type": "string", "minLength": 1},
                    "content": {"type": "string"}
                },
                "required": ["mode", "path"]
            })),
            active: true,
        },
        ToolSpec {
            name: "local_file_retriever".to_string(),
            kind: ToolKind::Local,
            description: Some("Return the contents of a local file".to_string()),
            path: None,
            parameter_schema: Some(json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "minLength": 1}
                },
                "required": ["path"]
            })),
            active: true,
        },
        ToolSpec {
            name: "python_sandbox".to_string(),
            kind: ToolKind::Sandbox,
            description: Some("Run Python code in the isolated sandbox".to_string()),
            path: None,
            parameter_schema: Some(json!({
                "type": "object",
                "properties": {
                    "code": {"type": "string", "minLength": 1},
                    "timeout": {"type": "integer", "minimum": 1, "maximum": 600},
                    "memory_limit": {"type": "integer", "minimum": 16, "maximum": 8192},
                    "dependencies": {"type": "array", "items": {"type": "string"}},
                    "allow_file_access": {"type": "boolean"}
                },
                "required": ["code"]
            })),
            active: true,
        },
    ]
}
