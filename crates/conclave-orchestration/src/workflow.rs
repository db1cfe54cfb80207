//! # Debate Workflow Table
//!
//! The single source of truth for debate transitions. Every `modify_task`
//! update the orchestrator receives (that is not a terminal completion,
//! failure or tool callback) is resolved through [`next_transition`]; no
//! transition logic lives anywhere else.
//!
//! | sender@step | next target | next event | new step | round++ |
//! |---|---|---|---|---|
//! | proposer@initial_proposal | critic | `critique` | critique | no |
//! | critic@critique | proposer | `refine` | refine | yes |
//! | proposer@refine (round < max) | critic | `critique` | critique | no |
//! | proposer@refine (round ≥ max) | critic | `conclude` | conclude | no |
//! | critic@conclude | — | — | — | task completes |
//!
//! Round overflow always forces `conclude` rather than failing.

use conclave_shared::messages::TaskEvent;

use crate::state::DebateStep;

/// Which side of the debate an agent plays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebateRole {
    Proposer,
    Critic,
}

/// One resolved row of the workflow table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub target: DebateRole,
    pub event: TaskEvent,
    pub next_step: DebateStep,
    pub increments_round: bool,
}

/// What the orchestrator should do with an update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowOutcome {
    /// Assign the next step to an agent
    Assign(Transition),
    /// The debate is over; the sender's content is the final answer
    Finalize,
}

/// Resolve the workflow table for an update from `sender` while the task sits
/// at `step`. Returns `None` for combinations outside the table (logged by
/// the caller as unsupported transitions).
pub fn next_transition(
    sender: DebateRole,
    step: DebateStep,
    round: u32,
    max_rounds: u32,
) -> Option<WorkflowOutcome> {
    match (sender, step) {
        (DebateRole::Proposer, DebateStep::InitialProposal) => {
            Some(WorkflowOutcome::Assign(Transition {
                target: DebateRole::Critic,
                event: TaskEvent::Critique,
                next_step: DebateStep::Critique,
                increments_round: false,
            }))
        }
        (DebateRole::Critic, DebateStep::Critique) => Some(WorkflowOutcome::Assign(Transition {
            target: DebateRole::Proposer,
            event: TaskEvent::Refine,
            next_step: DebateStep::Refine,
            increments_round: true,
        })),
        (DebateRole::Proposer, DebateStep::Refine) if round < max_rounds => {
            Some(WorkflowOutcome::Assign(Transition {
                target: DebateRole::Critic,
                event: TaskEvent::Critique,
                next_step: DebateStep::Critique,
                increments_round: false,
            }))
        }
        (DebateRole::Proposer, DebateStep::Refine) => Some(WorkflowOutcome::Assign(Transition {
            target: DebateRole::Critic,
            event: TaskEvent::Conclude,
            next_step: DebateStep::Conclude,
            increments_round: false,
        })),
        (DebateRole::Critic, DebateStep::Conclude) => Some(WorkflowOutcome::Finalize),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_proposal_goes_to_critic() {
        let outcome =
            next_transition(DebateRole::Proposer, DebateStep::InitialProposal, 1, 3).unwrap();
        match outcome {
            WorkflowOutcome::Assign(t) => {
                assert_eq!(t.target, DebateRole::Critic);
                assert_eq!(t.event, TaskEvent::Critique);
                assert_eq!(t.next_step, DebateStep::Critique);
                assert!(!t.increments_round);
            }
            WorkflowOutcome::Finalize => panic!("must assign"),
        }
    }

    #[test]
    fn critique_increments_round() {
        let outcome = next_transition(DebateRole::Critic, DebateStep::Critique, 1, 3).unwrap();
        match outcome {
            WorkflowOutcome::Assign(t) => {
                assert_eq!(t.target, DebateRole::Proposer);
                assert_eq!(t.event, TaskEvent::Refine);
                assert!(t.increments_round);
            }
            WorkflowOutcome::Finalize => panic!("must assign"),
        }
    }

    #[test]
    fn refine_below_max_loops_back_to_critique() {
        let outcome = next_transition(DebateRole::Proposer, DebateStep::Refine, 2, 3).unwrap();
        match outcome {
            WorkflowOutcome::Assign(t) => assert_eq!(t.event, TaskEvent::Critique),
            WorkflowOutcome::Finalize => panic!("must assign"),
        }
    }

    #[test]
    fn refine_at_max_forces_conclude() {
        for round in [3, 4, 99] {
            let outcome =
                next_transition(DebateRole::Proposer, DebateStep::Refine, round, 3).unwrap();
            match outcome {
                WorkflowOutcome::Assign(t) => {
                    assert_eq!(t.event, TaskEvent::Conclude);
                    assert_eq!(t.next_step, DebateStep::Conclude);
                }
                WorkflowOutcome::Finalize => panic!("must assign conclude"),
            }
        }
    }

    #[test]
    fn conclude_finalizes() {
        assert_eq!(
            next_transition(DebateRole::Critic, DebateStep::Conclude, 3, 3),
            Some(WorkflowOutcome::Finalize)
        );
    }

    #[test]
    fn off_table_combinations_are_none() {
        assert_eq!(
            next_transition(DebateRole::Critic, DebateStep::InitialProposal, 1, 3),
            None
        );
        assert_eq!(
            next_transition(DebateRole::Proposer, DebateStep::Conclude, 3, 3),
            None
        );
        assert_eq!(
            next_transition(DebateRole::Critic, DebateStep::Refine, 2, 3),
            None
        );
    }

    /// max_rounds bounds the number of refine cycles: walking the table from
    /// the initial proposal always reaches conclude within max_rounds cycles.
    #[test]
    fn max_rounds_is_an_upper_bound() {
        for max_rounds in [1, 2, 3, 5] {
            let mut step = DebateStep::InitialProposal;
            let mut round = 1;
            let mut refine_cycles = 0;
            let mut sender = DebateRole::Proposer;

            loop {
                match next_transition(sender, step, round, max_rounds) {
                    Some(WorkflowOutcome::Assign(t)) => {
                        if t.increments_round {
                            round += 1;
                        }
                        if t.event == TaskEvent::Refine {
                            refine_cycles += 1;
                        }
                        step = t.next_step;
                        // The assigned agent answers next.
                        sender = t.target;
                    }
                    Some(WorkflowOutcome::Finalize) => break,
                    None => panic!("walk fell off the table at {step:?}"),
                }
                assert!(refine_cycles <= max_rounds, "too many refine cycles");
            }
            assert!(refine_cycles <= max_rounds);
        }
    }
}
