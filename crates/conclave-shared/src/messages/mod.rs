//! # Wire Envelope and Message Types
//!
//! The canonical JSON envelope exchanged over the bus, its string-valued
//! enums, and the client-facing websocket frame. The envelope is a tagged
//! variant (`type` field): decode once, dispatch on the tag. Payloads
//! published by older peers without a tag are still accepted — the codec
//! infers the variant from the `intent` field (see [`codec`]).
//!
//! All timestamps are UTC and serialize as ISO-8601 with second precision.
//! Optional fields are omitted when absent.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod codec;
pub mod factories;

pub use codec::{classify, decode, encode, EnvelopeKind};

// =============================================================================
// Enums (stable wire symbols)
// =============================================================================

/// What the sender wants the recipient to do with an envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageIntent {
    /// General communication between agents or user -> agent
    Chat,
    /// Initiate a new task for an agent
    StartTask,
    /// Request a status update on a task
    CheckStatus,
    /// Modify or provide feedback on an ongoing task/result
    ModifyTask,
    /// Agent requests execution of a tool
    ToolRequest,
    /// Tool core responds with a tool execution result
    ToolResponse,
    /// Agent liveness signal
    Heartbeat,
    /// System-level messages (agent status, errors)
    System,
    /// Messages related to managing agent interaction
    Orchestration,
    GenerateWorkflow,
}

impl MessageIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageIntent::Chat => "chat",
            MessageIntent::StartTask => "start_task",
            MessageIntent::CheckStatus => "check_status",
            MessageIntent::ModifyTask => "modify_task",
            MessageIntent::ToolRequest => "tool_request",
            MessageIntent::ToolResponse => "tool_response",
            MessageIntent::Heartbeat => "heartbeat",
            MessageIntent::System => "system",
            MessageIntent::Orchestration => "orchestration",
            MessageIntent::GenerateWorkflow => "generate_workflow",
        }
    }
}

/// Lifecycle step a task is entering or has performed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskEvent {
    Plan,
    Execute,
    Critique,
    Refine,
    Conclude,
    Complete,
    Fail,
    Escalate,
    Info,
    AwaitingTool,
    ToolComplete,
}

impl TaskEvent {
    /// Events that only ever start work. A result carrying one of these is
    /// malformed and gets coerced to `Info` by the factories.
    pub fn is_start_event(&self) -> bool {
        matches!(self, TaskEvent::Plan | TaskEvent::Execute | TaskEvent::Critique)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskEvent::Plan => "plan",
            TaskEvent::Execute => "execute",
            TaskEvent::Critique => "critique",
            TaskEvent::Refine => "refine",
            TaskEvent::Conclude => "conclude",
            TaskEvent::Complete => "complete",
            TaskEvent::Fail => "fail",
            TaskEvent::Escalate => "escalate",
            TaskEvent::Info => "info",
            TaskEvent::AwaitingTool => "awaiting_tool",
            TaskEvent::ToolComplete => "tool_complete",
        }
    }
}

/// Terminal or in-flight disposition of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOutcome {
    Success,
    Failure,
    Pending,
    InProgress,
    Timeout,
    Cancelled,
}

/// Estimated computational effort for a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningEffort {
    Low,
    Medium,
    High,
}

impl ReasoningEffort {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasoningEffort::Low => "low",
            ReasoningEffort::Medium => "medium",
            ReasoningEffort::High => "high",
        }
    }

    /// One level up, saturating at `High`
    pub fn bumped(&self) -> ReasoningEffort {
        match self {
            ReasoningEffort::Low => ReasoningEffort::Medium,
            ReasoningEffort::Medium | ReasoningEffort::High => ReasoningEffort::High,
        }
    }
}

/// Cognitive strategy an agent should apply, derived from effort
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReasoningStrategy {
    #[serde(rename = "direct_answer")]
    DirectAnswer,
    #[serde(rename = "chain-of-thought")]
    ChainOfThought,
    #[serde(rename = "chain-of-draft")]
    ChainOfDraft,
}

impl From<ReasoningEffort> for ReasoningStrategy {
    fn from(effort: ReasoningEffort) -> Self {
        match effort {
            ReasoningEffort::Low => ReasoningStrategy::DirectAnswer,
            ReasoningEffort::Medium => ReasoningStrategy::ChainOfThought,
            ReasoningEffort::High => ReasoningStrategy::ChainOfDraft,
        }
    }
}

// =============================================================================
// Envelope
// =============================================================================

/// The single wire type exchanged over the bus
///
/// Internally tagged on `type`; every variant is valid JSON parseable without
/// out-of-band information. `task_id` is immutable across the life of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    Message(Message),
    Task(Task),
    TaskResult(TaskResult),
    StreamUpdate(StreamUpdate),
}

impl Envelope {
    pub fn task_id(&self) -> &str {
        match self {
            Envelope::Message(m) => &m.task_id,
            Envelope::Task(t) => &t.task_id,
            Envelope::TaskResult(r) => &r.task_id,
            Envelope::StreamUpdate(s) => &s.task_id,
        }
    }

    pub fn agent(&self) -> &str {
        match self {
            Envelope::Message(m) => &m.agent,
            Envelope::Task(t) => &t.agent,
            Envelope::TaskResult(r) => &r.agent,
            Envelope::StreamUpdate(s) => &s.agent,
        }
    }

    /// Stream updates carry no intent; everything else does.
    pub fn intent(&self) -> Option<MessageIntent> {
        match self {
            Envelope::Message(m) => Some(m.intent),
            Envelope::Task(t) => Some(t.intent),
            Envelope::TaskResult(r) => Some(r.intent),
            Envelope::StreamUpdate(_) => None,
        }
    }

    pub fn target_agent(&self) -> Option<&str> {
        match self {
            Envelope::Message(m) => m.target_agent.as_deref(),
            Envelope::Task(t) => Some(&t.target_agent),
            Envelope::TaskResult(r) => Some(&r.target_agent),
            Envelope::StreamUpdate(_) => None,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Envelope::Message(m) => m.timestamp,
            Envelope::Task(t) => t.timestamp,
            Envelope::TaskResult(r) => r.timestamp,
            Envelope::StreamUpdate(s) => s.timestamp,
        }
    }
}

/// General chat or informational message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(with = "wire_time")]
    pub timestamp: DateTime<Utc>,
    pub task_id: String,
    /// Sender identity (canonical agent name or a frontend client id)
    pub agent: String,
    pub content: String,
    #[serde(default = "default_chat_intent")]
    pub intent: MessageIntent,
    /// Recipient identity, absent for broadcast
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_agent: Option<String>,
}

/// A task assigned to an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(with = "wire_time")]
    pub timestamp: DateTime<Utc>,
    pub task_id: String,
    /// Originating agent or frontend client id
    pub agent: String,
    /// Description of the task
    pub content: String,
    #[serde(default = "default_start_intent")]
    pub intent: MessageIntent,
    /// The agent assigned to the task
    pub target_agent: String,
    /// Lifecycle step the recipient should perform
    #[serde(default = "default_plan_event")]
    pub event: TaskEvent,
    /// Sender's confidence in its current step, in [0, 1]
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<ReasoningEffort>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_strategy: Option<ReasoningStrategy>,
    /// Diagnostics and routing context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, Value>>,
}

impl Task {
    /// Attach a metadata entry, creating the map on first use
    pub fn insert_metadata(&mut self, key: impl Into<String>, value: Value) {
        self.metadata
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value);
    }
}

/// The result of (or an update to) a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    #[serde(with = "wire_time")]
    pub timestamp: DateTime<Utc>,
    pub task_id: String,
    /// The agent reporting the result
    pub agent: String,
    /// The result or update content (may itself be JSON-encoded)
    pub content: String,
    #[serde(default = "default_modify_intent")]
    pub intent: MessageIntent,
    /// Who should receive this result
    pub target_agent: String,
    /// Never a start event (`plan`, `execute`, `critique`)
    pub event: TaskEvent,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<ReasoningEffort>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_strategy: Option<ReasoningStrategy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, Value>>,
    pub outcome: TaskOutcome,
    /// Agents that produced the result, in order of contribution
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contributing_agents: Vec<String>,
}

/// A partial chunk of agent output streamed toward the frontend
///
/// Consumers distinguish partial from final content via `done`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamUpdate {
    #[serde(with = "wire_time")]
    pub timestamp: DateTime<Utc>,
    pub task_id: String,
    pub agent: String,
    pub delta: String,
    #[serde(default)]
    pub done: bool,
}

/// The JSON frame exchanged between the gateway and frontend clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebSocketFrame {
    /// e.g. `chat_message`, `start_task`, `task_result`, `system_info`, `error`
    #[serde(rename = "type")]
    pub frame_type: String,
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(with = "wire_time", default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl WebSocketFrame {
    pub fn new(frame_type: impl Into<String>, payload: Value) -> Self {
        WebSocketFrame {
            frame_type: frame_type.into(),
            payload,
            client_id: None,
            timestamp: wire_now(),
        }
    }
}

/// Current instant at wire precision (whole seconds), so a constructed
/// envelope round-trips bit-identically.
pub fn wire_now() -> DateTime<Utc> {
    use chrono::Timelike;
    let now = Utc::now();
    now.with_nanosecond(0).unwrap_or(now)
}

fn default_chat_intent() -> MessageIntent {
    MessageIntent::Chat
}

fn default_start_intent() -> MessageIntent {
    MessageIntent::StartTask
}

fn default_modify_intent() -> MessageIntent {
    MessageIntent::ModifyTask
}

fn default_plan_event() -> TaskEvent {
    TaskEvent::Plan
}

fn default_confidence() -> f64 {
    0.9
}

/// ISO-8601 with second precision on the wire, RFC 3339 accepted inbound
pub(crate) mod wire_time {
    use chrono::{DateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(de)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(de::Error::custom)
    }
}
