//! # Per-Task Orchestrator State
//!
//! One record per in-flight task, created on `start_task` and destroyed on
//! completion or failure. The record is the only place debate progress
//! lives; in particular `active_agent` makes `tool_complete` routing
//! deterministic instead of guessed.

use std::time::Instant;

use conclave_shared::effort::EffortDiagnostics;
use conclave_shared::messages::{Task, TaskEvent};

/// Debate position of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebateStep {
    InitialProposal,
    Critique,
    Refine,
    Conclude,
}

impl DebateStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            DebateStep::InitialProposal => "initial_proposal",
            DebateStep::Critique => "critique",
            DebateStep::Refine => "refine",
            DebateStep::Conclude => "conclude",
        }
    }
}

/// Orchestrator-owned state for one task
#[derive(Debug)]
pub struct TaskRecord {
    /// Last observed event
    pub status: TaskEvent,
    /// Identity that first submitted the task
    pub original_requester: String,
    pub current_step: DebateStep,
    /// 1-based critique/refine cycle counter
    pub round: u32,
    /// Append-only transition summaries
    pub history: Vec<String>,
    pub started_at: Instant,
    /// Agent currently working the task; `tool_complete` routes here
    pub active_agent: String,
    /// Tasks to release when this one completes
    pub dependents: Vec<Task>,
    /// Effort diagnostics captured at routing time, for outcome recording
    pub diagnostics: Option<EffortDiagnostics>,
}

impl TaskRecord {
    pub fn new(original_requester: &str, active_agent: &str, first_entry: String) -> Self {
        TaskRecord {
            status: TaskEvent::Plan,
            original_requester: original_requester.to_string(),
            current_step: DebateStep::InitialProposal,
            round: 1,
            history: vec![first_entry],
            started_at: Instant::now(),
            active_agent: active_agent.to_string(),
            dependents: Vec::new(),
            diagnostics: None,
        }
    }

    pub fn record(&mut self, entry: String, status: TaskEvent) {
        self.history.push(entry);
        self.status = status;
    }

    pub fn duration_secs(&self) -> f64 {
        self.started_at.elapsed().as_secs_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_starts_at_initial_proposal() {
        let record = TaskRecord::new("client-1", "gpt", "task received".into());
        assert_eq!(record.current_step, DebateStep::InitialProposal);
        assert_eq!(record.round, 1);
        assert_eq!(record.original_requester, "client-1");
        assert_eq!(record.active_agent, "gpt");
        assert_eq!(record.history.len(), 1);
    }

    #[test]
    fn record_appends_history_and_tracks_status() {
        let mut record = TaskRecord::new("client-1", "gpt", "start".into());
        record.record("critique arrived".into(), TaskEvent::Refine);
        assert_eq!(record.history.len(), 2);
        assert_eq!(record.status, TaskEvent::Refine);
    }
}
