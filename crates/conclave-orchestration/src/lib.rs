//! # Conclave Orchestration
//!
//! The orchestrator owns per-task debate state and drives the round-based
//! workflow: it receives fresh tasks, selects an executor through the
//! [`routing`] subsystem, and walks results through the
//! critique/refine/conclude cycle defined by the [`workflow`] transition
//! table. Completion, failure and dependency fan-out all happen here.

pub mod orchestrator;
pub mod routing;
pub mod state;
pub mod workflow;

pub use orchestrator::Orchestrator;
pub use routing::{ClusterModel, RoutingDecision, TaskRouter};
pub use state::{DebateStep, TaskRecord};
pub use workflow::{next_transition, DebateRole, Transition, WorkflowOutcome};
