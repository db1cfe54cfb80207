//! # Debate Agents
//!
//! The proposer/critic pair that completes the orchestrated debate loop.
//! Model backends stay out of scope: a debate agent is parameterized by a
//! [`Responder`] (`prompt -> text`, with an optional streaming variant whose
//! chunks are published as `stream_update` envelopes on the frontend
//! channel).
//!
//! Reply shapes per assignment:
//!
//! - `plan` (initial proposal): a `modify_task` Task carrying `execute`
//! - `critique`: a `modify_task` Task carrying `critique`
//! - `refine`: a transitional TaskResult carrying `refine`
//! - `conclude`: a successful TaskResult carrying `conclude`
//!
//! The orchestrator drives the next step from its own per-task state, so
//! these replies only need to carry the produced content and the step that
//! was performed.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use thiserror::Error;
use tracing::{info, warn};

use conclave_shared::messages::{
    factories, Envelope, Message, MessageIntent, Task, TaskEvent, TaskOutcome, TaskResult,
};

use crate::context::AgentContext;
use crate::handler::{AgentHandler, HandlerError, HandlerResult, TaskUpdate};

#[derive(Debug, Error)]
#[error("Responder error: {0}")]
pub struct ResponderError(pub String);

/// A text-generation backend: prompt in, text out
#[async_trait]
pub trait Responder: Send + Sync + 'static {
    async fn respond(&self, prompt: &str) -> Result<String, ResponderError>;

    /// Streaming variant; the default yields the full response as one chunk
    async fn respond_streaming(
        &self,
        prompt: &str,
    ) -> Result<BoxStream<'static, String>, ResponderError> {
        let text = self.respond(prompt).await?;
        Ok(futures::stream::once(async move { text }).boxed())
    }
}

/// Echoes a transformation of the prompt; the zero-dependency backend used
/// by demos and tests
#[derive(Debug, Default)]
pub struct EchoResponder;

#[async_trait]
impl Responder for EchoResponder {
    async fn respond(&self, prompt: &str) -> Result<String, ResponderError> {
        Ok(format!("[echo] {prompt}"))
    }
}

/// Returns queued replies in order, then falls back to echoing
#[derive(Debug, Default)]
pub struct ScriptedResponder {
    replies: Mutex<VecDeque<String>>,
}

impl ScriptedResponder {
    pub fn new(replies: impl IntoIterator<Item = String>) -> Self {
        ScriptedResponder {
            replies: Mutex::new(replies.into_iter().collect()),
        }
    }
}

#[async_trait]
impl Responder for ScriptedResponder {
    async fn respond(&self, prompt: &str) -> Result<String, ResponderError> {
        let queued = self
            .replies
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front();
        Ok(queued.unwrap_or_else(|| format!("[scripted] {prompt}")))
    }
}

/// Role of a debate participant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebateRole {
    /// Drafts and refines proposals
    Proposer,
    /// Critiques and concludes
    Critic,
}

/// An agent that plays one debate role over any responder
pub struct DebateAgent {
    name: String,
    role: DebateRole,
    responder: Box<dyn Responder>,
}

impl std::fmt::Debug for DebateAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebateAgent")
            .field("name", &self.name)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

impl DebateAgent {
    pub fn new(name: impl Into<String>, role: DebateRole, responder: Box<dyn Responder>) -> Self {
        DebateAgent {
            name: name.into(),
            role,
            responder,
        }
    }

    /// Generate text, streaming chunks to the frontend as they arrive
    async fn generate(
        &self,
        ctx: &AgentContext,
        task_id: &str,
        prompt: &str,
    ) -> Result<String, HandlerError> {
        let mut stream = self
            .responder
            .respond_streaming(prompt)
            .await
            .map_err(|e| HandlerError::new(e.to_string()))?;

        let mut full_text = String::new();
        while let Some(delta) = stream.next().await {
            ctx.publish_stream_delta(task_id, &delta, false).await;
            full_text.push_str(&delta);
        }
        ctx.publish_stream_delta(task_id, "", true).await;
        Ok(full_text)
    }

    /// Reply with a `modify_task` Task so the carried event may be a start
    /// event (`execute`, `critique`) that a TaskResult could not express.
    async fn reply_with_task(
        &self,
        ctx: &AgentContext,
        task_id: &str,
        event: TaskEvent,
        content: &str,
    ) {
        let mut reply = factories::create_task(
            &self.name,
            content,
            ctx.orchestrator(),
            Some(task_id.to_string()),
            MessageIntent::ModifyTask,
            event,
            0.9,
        );
        reply.insert_metadata("role", serde_json::json!(role_name(self.role)));
        let envelope = Envelope::Task(reply);
        ctx.publish_to_agent(ctx.orchestrator(), &envelope).await;
        ctx.publish_to_frontend(&envelope).await;
    }

    async fn propose(&self, ctx: &AgentContext, task_id: &str, content: &str) -> HandlerResult {
        let prompt = format!("Draft an initial proposal for the following task:\n{content}");
        let text = self.generate(ctx, task_id, &prompt).await?;
        self.reply_with_task(ctx, task_id, TaskEvent::Execute, &text).await;
        Ok(())
    }

    async fn critique(&self, ctx: &AgentContext, task_id: &str, content: &str) -> HandlerResult {
        let prompt = format!(
            "Critique the following proposal. Point out weaknesses and concrete improvements:\n{content}"
        );
        let text = self.generate(ctx, task_id, &prompt).await?;
        self.reply_with_task(ctx, task_id, TaskEvent::Critique, &text).await;
        Ok(())
    }

    async fn refine(&self, ctx: &AgentContext, task_id: &str, content: &str) -> HandlerResult {
        let prompt = format!("Refine the proposal based on this critique:\n{content}");
        let text = self.generate(ctx, task_id, &prompt).await?;
        ctx.publish_update(
            task_id,
            TaskEvent::Refine,
            &text,
            ctx.orchestrator(),
            Some(0.9),
            TaskOutcome::InProgress,
        )
        .await;
        Ok(())
    }

    async fn conclude(&self, ctx: &AgentContext, task_id: &str, content: &str) -> HandlerResult {
        let prompt = format!(
            "Write the final conclusion for this debate, merging the strongest points:\n{content}"
        );
        let text = self.generate(ctx, task_id, &prompt).await?;
        let result = factories::create_task_result(
            task_id,
            &self.name,
            &text,
            ctx.orchestrator(),
            TaskEvent::Conclude,
            TaskOutcome::Success,
            MessageIntent::ModifyTask,
            None,
            0.95,
        );
        let envelope = Envelope::TaskResult(result);
        ctx.publish_to_agent(ctx.orchestrator(), &envelope).await;
        ctx.publish_to_frontend(&envelope).await;
        Ok(())
    }

    async fn perform(
        &self,
        ctx: &AgentContext,
        task_id: &str,
        event: TaskEvent,
        content: &str,
    ) -> HandlerResult {
        match (self.role, event) {
            (_, TaskEvent::Plan) | (_, TaskEvent::Execute) => {
                self.propose(ctx, task_id, content).await
            }
            (DebateRole::Critic, TaskEvent::Critique) => self.critique(ctx, task_id, content).await,
            (DebateRole::Proposer, TaskEvent::Refine) => self.refine(ctx, task_id, content).await,
            (DebateRole::Critic, TaskEvent::Conclude) => self.conclude(ctx, task_id, content).await,
            _ => {
                warn!(
                    agent = %self.name,
                    role = role_name(self.role),
                    event = event.as_str(),
                    "Assignment does not match role, ignoring"
                );
                Ok(())
            }
        }
    }
}

fn role_name(role: DebateRole) -> &'static str {
    match role {
        DebateRole::Proposer => "proposer",
        DebateRole::Critic => "critic",
    }
}

#[async_trait]
impl AgentHandler for DebateAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle_start_task(&self, ctx: &AgentContext, task: Task) -> HandlerResult {
        info!(
            agent = %self.name,
            task_id = %task.task_id,
            event = task.event.as_str(),
            "Debate task received"
        );
        self.perform(ctx, &task.task_id, task.event, &task.content).await
    }

    async fn handle_modify_task(&self, ctx: &AgentContext, update: TaskUpdate) -> HandlerResult {
        self.perform(ctx, update.task_id(), update.event(), update.content())
            .await
    }

    async fn handle_chat_message(&self, ctx: &AgentContext, message: Message) -> HandlerResult {
        let prompt = format!("Reply helpfully to: {}", message.content);
        let text = self.generate(ctx, &message.task_id, &prompt).await?;
        let reply = factories::create_message(
            &message.task_id,
            &self.name,
            &text,
            MessageIntent::Chat,
            Some(&message.agent),
        );
        ctx.publish_to_frontend(&Envelope::Message(reply)).await;
        Ok(())
    }

    async fn handle_tool_response(&self, ctx: &AgentContext, result: TaskResult) -> HandlerResult {
        let Some(call) = ctx.tools.resolve(&result) else {
            warn!(
                agent = %self.name,
                task_id = %result.task_id,
                "Tool response without a pending call, ignoring"
            );
            return Ok(());
        };

        if result.outcome == TaskOutcome::Success {
            let prompt = format!(
                "Incorporate this result from tool {} into the ongoing work:\n{}",
                call.tool_name, result.content
            );
            let text = self.generate(ctx, &result.task_id, &prompt).await?;
            ctx.publish_update(
                &result.task_id,
                TaskEvent::Info,
                &text,
                ctx.orchestrator(),
                None,
                TaskOutcome::InProgress,
            )
            .await;
        } else {
            ctx.publish_error(
                &result.task_id,
                &format!("Tool {} failed: {}", call.tool_name, result.content),
                None,
            )
            .await;
        }
        Ok(())
    }
}
