//! # Agent Handler Trait
//!
//! The seven handler operations an agent exposes, dispatched by
//! `(intent, body type)`:
//!
//! | (intent, body) | handler |
//! |---|---|
//! | (`start_task`, Task) | `handle_start_task` |
//! | (`modify_task`, Task \| TaskResult) | `handle_modify_task` |
//! | (`chat`, Message) | `handle_chat_message` |
//! | (`check_status`, any) | `handle_check_status` |
//! | (`tool_response`, TaskResult) | `handle_tool_response` |
//! | (`system`, Message) | `handle_system_message` |
//! | (`orchestration`, Message) | `handle_orchestration_message` |
//! | anything else | `handle_unknown_message` |
//!
//! Every handler has a log-and-ignore default so an agent only implements
//! what it cares about. A handler returning an error triggers a best-effort
//! `publish_error` for the envelope's task id; the agent keeps running.

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

use conclave_shared::messages::{Envelope, Message, Task, TaskEvent, TaskOutcome, TaskResult};

use crate::context::AgentContext;

/// Error surfaced by a handler; the runtime reports it and moves on
#[derive(Debug, Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        HandlerError(message.into())
    }
}

pub type HandlerResult = Result<(), HandlerError>;

/// A `modify_task` body: feedback (Task) or a result (TaskResult)
#[derive(Debug, Clone)]
pub enum TaskUpdate {
    Task(Task),
    Result(TaskResult),
}

impl TaskUpdate {
    pub fn task_id(&self) -> &str {
        match self {
            TaskUpdate::Task(t) => &t.task_id,
            TaskUpdate::Result(r) => &r.task_id,
        }
    }

    pub fn agent(&self) -> &str {
        match self {
            TaskUpdate::Task(t) => &t.agent,
            TaskUpdate::Result(r) => &r.agent,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            TaskUpdate::Task(t) => &t.content,
            TaskUpdate::Result(r) => &r.content,
        }
    }

    pub fn event(&self) -> TaskEvent {
        match self {
            TaskUpdate::Task(t) => t.event,
            TaskUpdate::Result(r) => r.event,
        }
    }

    pub fn outcome(&self) -> Option<TaskOutcome> {
        match self {
            TaskUpdate::Task(_) => None,
            TaskUpdate::Result(r) => Some(r.outcome),
        }
    }

    pub fn confidence(&self) -> f64 {
        match self {
            TaskUpdate::Task(t) => t.confidence,
            TaskUpdate::Result(r) => r.confidence,
        }
    }
}

/// The agent interface the runtime composes lifecycle and listener around
#[async_trait]
pub trait AgentHandler: Send + Sync + 'static {
    /// Canonical agent name; owns the `<name>_channel` topic
    fn name(&self) -> &str;

    /// Handle a new task assignment
    async fn handle_start_task(&self, ctx: &AgentContext, task: Task) -> HandlerResult {
        warn!(
            agent = self.name(),
            task_id = %task.task_id,
            "start_task received but not handled"
        );
        let _ = ctx;
        Ok(())
    }

    /// Handle feedback or a result for an ongoing task
    async fn handle_modify_task(&self, ctx: &AgentContext, update: TaskUpdate) -> HandlerResult {
        warn!(
            agent = self.name(),
            task_id = %update.task_id(),
            "modify_task received but not handled"
        );
        let _ = ctx;
        Ok(())
    }

    /// Handle a general chat message
    async fn handle_chat_message(&self, ctx: &AgentContext, message: Message) -> HandlerResult {
        info!(
            agent = self.name(),
            from = %message.agent,
            "chat received but not handled"
        );
        let _ = ctx;
        Ok(())
    }

    /// Handle a status request
    async fn handle_check_status(&self, ctx: &AgentContext, envelope: Envelope) -> HandlerResult {
        ctx.publish_update(
            envelope.task_id(),
            TaskEvent::Info,
            "Status check received, task is in progress.",
            envelope.agent(),
            None,
            TaskOutcome::InProgress,
        )
        .await;
        Ok(())
    }

    /// Handle a tool execution result from the tool core
    async fn handle_tool_response(&self, ctx: &AgentContext, result: TaskResult) -> HandlerResult {
        warn!(
            agent = self.name(),
            task_id = %result.task_id,
            "tool_response received but not handled"
        );
        let _ = ctx;
        Ok(())
    }

    /// Handle system-level messages
    async fn handle_system_message(&self, ctx: &AgentContext, message: Message) -> HandlerResult {
        info!(agent = self.name(), content = %message.content, "system message");
        let _ = ctx;
        Ok(())
    }

    /// Handle coordination messages
    async fn handle_orchestration_message(
        &self,
        ctx: &AgentContext,
        message: Message,
    ) -> HandlerResult {
        info!(agent = self.name(), content = %message.content, "orchestration message");
        let _ = ctx;
        Ok(())
    }

    /// Fallback for unrecognized intent/body combinations
    async fn handle_unknown_message(&self, ctx: &AgentContext, envelope: Envelope) -> HandlerResult {
        warn!(
            agent = self.name(),
            intent = ?envelope.intent(),
            "unhandled message"
        );
        let _ = ctx;
        Ok(())
    }
}
