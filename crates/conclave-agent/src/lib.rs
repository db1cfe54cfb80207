//! # Conclave Agent Runtime
//!
//! The runtime every long-lived agent process is built from. An agent is a
//! value implementing [`AgentHandler`] (seven intent handlers); the runtime
//! composes the lifecycle around it:
//!
//! - `created → initialized → running → stopping → stopped`
//! - a heartbeat loop writing `<agent>_heartbeat = "alive"` with TTL
//! - a listener loop on `<agent>_channel` that decodes each inbound envelope
//!   and dispatches it on its own task, so slow handlers never stall the
//!   listener
//!
//! Publishing helpers live in [`publish`] as free functions over a bus
//! client and the agent's identity; [`AgentContext`] adds ergonomic methods
//! on top. Tool invocation is composed in via [`ToolClient`].

pub mod context;
pub mod debate;
pub mod handler;
pub mod publish;
pub mod runtime;
pub mod tool_client;

pub use context::AgentContext;
pub use handler::{AgentHandler, HandlerError, HandlerResult, TaskUpdate};
pub use runtime::{AgentRuntime, AgentState};
pub use tool_client::{PendingStatus, PendingToolCall, ToolClient, ToolSubmission};
