//! # Debate Orchestrator
//!
//! The single agent that owns per-task debate state. Fresh tasks get a
//! record and an executor picked by the router; every later update is
//! resolved against the workflow table in [`crate::workflow`]. Terminal
//! results are forwarded to the original requester, dependents are
//! released, and the router/effort statistics are fed with the outcome.

use std::sync::Mutex;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tracing::{info, warn};

use conclave_agent::{AgentContext, AgentHandler, HandlerResult, TaskUpdate};
use conclave_shared::effort::{self, EffortTuner, OutcomeSample, TuningConfig};
use conclave_shared::messages::{
    factories, Envelope, Message, MessageIntent, Task, TaskEvent, TaskOutcome,
};
use conclave_shared::ConclaveConfig;

use crate::routing::TaskRouter;
use crate::state::TaskRecord;
use crate::workflow::{next_transition, DebateRole, WorkflowOutcome};

/// Orchestrator agent; implements [`AgentHandler`] and is hosted by the
/// standard agent runtime.
pub struct Orchestrator {
    name: String,
    proposer: String,
    critic: String,
    max_rounds: u32,
    router: TaskRouter,
    records: DashMap<String, TaskRecord>,
    tuner: Mutex<EffortTuner>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("name", &self.name)
            .field("active_tasks", &self.records.len())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn new(config: &ConclaveConfig) -> Self {
        let router = TaskRouter::new(&config.proposer_agent, config.router_learning_rate);
        let tuner = EffortTuner::new(TuningConfig {
            enabled: config.auto_tuning_enabled,
            min_samples_for_tuning: config.min_samples_for_tuning,
            ..TuningConfig::default()
        });
        Orchestrator {
            name: config.orchestrator_agent.clone(),
            proposer: config.proposer_agent.clone(),
            critic: config.critic_agent.clone(),
            max_rounds: config.max_debate_rounds,
            router,
            records: DashMap::new(),
            tuner: Mutex::new(tuner),
        }
    }

    /// Replace the router (seeded or cluster-backed instances)
    pub fn with_router(mut self, router: TaskRouter) -> Self {
        self.router = router;
        self
    }

    pub fn router(&self) -> &TaskRouter {
        &self.router
    }

    pub fn active_task_count(&self) -> usize {
        self.records.len()
    }

    pub fn has_task(&self, task_id: &str) -> bool {
        self.records.contains_key(task_id)
    }

    /// Queue `task` for release once `parent_task_id` completes
    pub fn register_dependent(&self, parent_task_id: &str, task: Task) -> bool {
        match self.records.get_mut(parent_task_id) {
            Some(mut record) => {
                info!(
                    parent = parent_task_id,
                    dependent = %task.task_id,
                    "Registered dependent task"
                );
                record.dependents.push(task);
                true
            }
            None => {
                warn!(parent = parent_task_id, "Cannot register dependent: unknown parent");
                false
            }
        }
    }

    fn role_of(&self, agent: &str) -> Option<DebateRole> {
        if agent == self.proposer {
            Some(DebateRole::Proposer)
        } else if agent == self.critic {
            Some(DebateRole::Critic)
        } else {
            None
        }
    }

    fn name_of(&self, role: DebateRole) -> &str {
        match role {
            DebateRole::Proposer => &self.proposer,
            DebateRole::Critic => &self.critic,
        }
    }

    /// Remove the record, feed the statistics, release dependents and send
    /// the terminal result to the original requester.
    async fn complete_task(
        &self,
        ctx: &AgentContext,
        task_id: &str,
        content: &str,
        confidence: f64,
        finishing_agent: &str,
        success: bool,
    ) {
        let Some((_, record)) = self.records.remove(task_id) else {
            return;
        };
        let duration = record.duration_secs();
        self.router
            .record_outcome(finishing_agent, duration, success);
        if let Some(diagnostics) = record.diagnostics.clone() {
            self.tuner
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .record_outcome(OutcomeSample {
                    task_id: task_id.to_string(),
                    diagnostics,
                    duration_secs: duration,
                    success,
                });
        }

        if success {
            ctx.publish_completion(
                task_id,
                content,
                &record.original_requester,
                confidence,
                Some(vec![self.proposer.clone(), self.critic.clone()]),
            )
            .await;
        } else {
            ctx.publish_error(task_id, content, Some(&record.original_requester))
                .await;
        }

        info!(
            task_id,
            duration_secs = duration,
            success,
            rounds = record.round,
            "Task finished"
        );

        for dependent in record.dependents {
            info!(
                parent = task_id,
                dependent = %dependent.task_id,
                target = %dependent.target_agent,
                "Releasing dependent task"
            );
            let envelope = Envelope::Task(dependent.clone());
            ctx.publish_to_agent(&dependent.target_agent, &envelope).await;
            ctx.publish_to_frontend(&envelope).await;
        }
    }

    /// Conversational tasks get an immediate reply carrying the same task id
    async fn answer_chat_task(&self, ctx: &AgentContext, task: &Task) {
        let reply = format!("Received your message: {}", task.content);
        ctx.publish_completion(&task.task_id, &reply, &task.agent, 0.9, None)
            .await;
    }
}

#[async_trait]
impl AgentHandler for Orchestrator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle_start_task(&self, ctx: &AgentContext, task: Task) -> HandlerResult {
        info!(
            task_id = %task.task_id,
            from = %task.agent,
            "start_task received"
        );
        if task.content.trim().is_empty() {
            ctx.publish_error(&task.task_id, "Task content cannot be empty.", Some(&task.agent))
                .await;
            return Ok(());
        }

        let (_, diagnostics) = effort::estimate_effort(
            &task.content,
            Some(TaskEvent::Plan),
            Some(MessageIntent::StartTask),
            Some(task.confidence),
            None,
        );
        let candidates = vec![self.proposer.clone(), self.critic.clone()];
        let (target, decision) =
            self.router
                .route(&task.task_id, &task.content, &candidates, Some(&diagnostics));

        let mut record = TaskRecord::new(
            &task.agent,
            &target,
            format!("Task received from {}: {}", task.agent, snippet(&task.content)),
        );
        record.diagnostics = Some(diagnostics.clone());
        self.records.insert(task.task_id.clone(), record);

        let mut assignment = factories::create_task(
            &self.name,
            &task.content,
            &target,
            Some(task.task_id.clone()),
            MessageIntent::StartTask,
            TaskEvent::Plan,
            task.confidence,
        );
        assignment.insert_metadata(
            "routing",
            serde_json::to_value(&decision).unwrap_or(Value::Null),
        );
        assignment.insert_metadata(
            "effort_diagnostics",
            serde_json::to_value(&diagnostics).unwrap_or(Value::Null),
        );

        let envelope = Envelope::Task(assignment);
        ctx.publish_to_agent(&target, &envelope).await;
        ctx.publish_to_frontend(&envelope).await;
        ctx.publish_update(
            &task.task_id,
            TaskEvent::Info,
            &format!(
                "Task assigned to {target} (method: {}, confidence: {:.2})",
                decision.method, decision.confidence
            ),
            &task.agent,
            None,
            TaskOutcome::InProgress,
        )
        .await;
        Ok(())
    }

    async fn handle_modify_task(&self, ctx: &AgentContext, update: TaskUpdate) -> HandlerResult {
        let task_id = update.task_id().to_string();
        let sender = update.agent().to_string();
        let event = update.event();
        info!(
            task_id = %task_id,
            from = %sender,
            event = event.as_str(),
            "Task update received"
        );

        if !self.records.contains_key(&task_id) {
            warn!(task_id = %task_id, "Update for unknown task id, ignoring");
            return Ok(());
        }

        if let Some(mut record) = self.records.get_mut(&task_id) {
            record.record(
                format!("Update from {sender} ({}): {}", event.as_str(), snippet(update.content())),
                event,
            );
        }

        // Terminal failure
        if event == TaskEvent::Fail || update.outcome() == Some(TaskOutcome::Failure) {
            self.complete_task(ctx, &task_id, update.content(), 0.0, &sender, false)
                .await;
            return Ok(());
        }

        // Terminal success
        if event == TaskEvent::Complete && update.outcome() == Some(TaskOutcome::Success) {
            self.complete_task(
                ctx,
                &task_id,
                update.content(),
                update.confidence(),
                &sender,
                true,
            )
            .await;
            return Ok(());
        }

        // Tool callback: route to whichever agent is working the task.
        if event == TaskEvent::ToolComplete {
            let active = match self.records.get(&task_id) {
                Some(record) => record.active_agent.clone(),
                None => return Ok(()),
            };
            if let TaskUpdate::Result(mut result) = update {
                result.target_agent = active.clone();
                result.intent = MessageIntent::ToolResponse;
                ctx.publish_to_agent(&active, &Envelope::TaskResult(result)).await;
            }
            return Ok(());
        }

        // Everything else goes through the workflow table.
        let Some(sender_role) = self.role_of(&sender) else {
            warn!(task_id = %task_id, sender = %sender, "Update from non-debate agent, ignoring");
            return Ok(());
        };
        let (step, round) = match self.records.get(&task_id) {
            Some(record) => (record.current_step, record.round),
            None => return Ok(()),
        };

        match next_transition(sender_role, step, round, self.max_rounds) {
            Some(WorkflowOutcome::Finalize) => {
                self.complete_task(
                    ctx,
                    &task_id,
                    update.content(),
                    update.confidence(),
                    &sender,
                    true,
                )
                .await;
            }
            Some(WorkflowOutcome::Assign(transition)) => {
                let target = self.name_of(transition.target).to_string();
                if let Some(mut record) = self.records.get_mut(&task_id) {
                    if transition.increments_round {
                        record.round += 1;
                    }
                    record.current_step = transition.next_step;
                    record.active_agent = target.clone();
                    record.status = transition.event;
                }

                let assignment = factories::create_task(
                    &self.name,
                    update.content(),
                    &target,
                    Some(task_id.clone()),
                    MessageIntent::ModifyTask,
                    transition.event,
                    0.9,
                );
                let envelope = Envelope::Task(assignment);
                ctx.publish_to_agent(&target, &envelope).await;
                ctx.publish_to_frontend(&envelope).await;
            }
            None => {
                warn!(
                    task_id = %task_id,
                    sender = %sender,
                    step = step.as_str(),
                    "Unsupported transition, ignoring"
                );
            }
        }
        Ok(())
    }

    async fn handle_chat_message(&self, ctx: &AgentContext, message: Message) -> HandlerResult {
        let reply = factories::create_message(
            &message.task_id,
            &self.name,
            &format!("Received your message: {}", message.content),
            MessageIntent::Chat,
            Some(&message.agent),
        );
        let envelope = Envelope::Message(reply);
        ctx.publish_to_agent(&message.agent, &envelope).await;
        ctx.publish_to_frontend(&envelope).await;
        Ok(())
    }

    async fn handle_unknown_message(&self, ctx: &AgentContext, envelope: Envelope) -> HandlerResult {
        // The gateway wraps user chat as Tasks addressed at the
        // orchestrator; answer them conversationally.
        if let Envelope::Task(task) = &envelope {
            if task.intent == MessageIntent::Chat {
                self.answer_chat_task(ctx, task).await;
                return Ok(());
            }
        }
        warn!(intent = ?envelope.intent(), "Unhandled message");
        Ok(())
    }
}

fn snippet(content: &str) -> String {
    if content.len() <= 120 {
        content.to_string()
    } else {
        let truncated: String = content.chars().take(120).collect();
        format!("{truncated}...")
    }
}
