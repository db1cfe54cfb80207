//! # Envelope Factories
//!
//! Constructors that fill in the derived fields a raw struct literal would
//! get wrong: task ids, UTC timestamps, estimated reasoning effort and the
//! strategy that follows from it, and the event/intent coercions that keep
//! results well-formed on the wire.

use tracing::debug;
use uuid::Uuid;

use super::{
    Message, MessageIntent, ReasoningEffort, ReasoningStrategy, StreamUpdate, Task, TaskEvent,
    TaskOutcome, TaskResult,
};
use crate::effort;

/// Create a task, estimating reasoning effort from content and context.
///
/// A fresh `task_id` (uuid v4) is generated when none is supplied.
pub fn create_task(
    agent: &str,
    content: &str,
    target_agent: &str,
    task_id: Option<String>,
    intent: MessageIntent,
    event: TaskEvent,
    confidence: f64,
) -> Task {
    let task_id = task_id.unwrap_or_else(|| Uuid::new_v4().to_string());
    let (reasoning_effort, _) =
        effort::estimate_effort(content, Some(event), Some(intent), Some(confidence), None);

    debug!(
        task_id = %task_id,
        target = %target_agent,
        intent = intent.as_str(),
        event = event.as_str(),
        effort = reasoning_effort.as_str(),
        "Creating task"
    );

    Task {
        timestamp: super::wire_now(),
        task_id,
        agent: agent.to_string(),
        content: content.to_string(),
        intent,
        target_agent: target_agent.to_string(),
        event,
        confidence: confidence.clamp(0.0, 1.0),
        reasoning_effort: Some(reasoning_effort),
        reasoning_strategy: Some(ReasoningStrategy::from(reasoning_effort)),
        metadata: None,
    }
}

/// Create a standard message
pub fn create_message(
    task_id: &str,
    agent: &str,
    content: &str,
    intent: MessageIntent,
    target_agent: Option<&str>,
) -> Message {
    Message {
        timestamp: super::wire_now(),
        task_id: task_id.to_string(),
        agent: agent.to_string(),
        content: content.to_string(),
        intent,
        target_agent: target_agent.map(str::to_string),
    }
}

/// Create a task result.
///
/// Start events are coerced to `info` (a result never carries `plan`,
/// `execute` or `critique`), and intents outside the update set are coerced
/// to `modify_task`. Reasoning effort is estimated from the result content
/// when not supplied.
#[allow(clippy::too_many_arguments)]
pub fn create_task_result(
    task_id: &str,
    agent: &str,
    content: &str,
    target_agent: &str,
    event: TaskEvent,
    outcome: TaskOutcome,
    intent: MessageIntent,
    contributing_agents: Option<Vec<String>>,
    confidence: f64,
) -> TaskResult {
    let event = if event.is_start_event() {
        TaskEvent::Info
    } else {
        event
    };
    let intent = match intent {
        MessageIntent::ModifyTask | MessageIntent::ToolResponse | MessageIntent::System => intent,
        _ => MessageIntent::ModifyTask,
    };
    let (reasoning_effort, _) = effort::estimate_effort(
        content,
        Some(event),
        Some(MessageIntent::ModifyTask),
        Some(confidence),
        None,
    );

    TaskResult {
        timestamp: super::wire_now(),
        task_id: task_id.to_string(),
        agent: agent.to_string(),
        content: content.to_string(),
        intent,
        target_agent: target_agent.to_string(),
        event,
        confidence: confidence.clamp(0.0, 1.0),
        reasoning_effort: Some(reasoning_effort),
        reasoning_strategy: Some(ReasoningStrategy::from(reasoning_effort)),
        metadata: None,
        outcome,
        contributing_agents: contributing_agents.unwrap_or_else(|| vec![agent.to_string()]),
    }
}

/// Create a streamed output chunk addressed at the frontend
pub fn create_stream_update(agent: &str, task_id: &str, delta: &str, done: bool) -> StreamUpdate {
    StreamUpdate {
        timestamp: super::wire_now(),
        task_id: task_id.to_string(),
        agent: agent.to_string(),
        delta: delta.to_string(),
        done,
    }
}
