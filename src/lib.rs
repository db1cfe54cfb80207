//! # Conclave Core
//!
//! Workspace umbrella for the conclave multi-agent fabric. The root crate
//! carries no library code; functionality lives in the workspace members:
//!
//! - `conclave-shared` — envelopes, codec, effort estimation, bus client,
//!   configuration
//! - `conclave-agent` — agent runtime, publishing helpers, tool client,
//!   debate agents
//! - `conclave-orchestration` — debate FSM, workflow table, task router
//! - `conclave-toolcore` — tool execution service
//! - `conclave-gateway` — websocket gateway
//! - `conclave-coordinator` — readiness aggregation
//!
//! The `tests/` directory exercises the whole fabric end-to-end against the
//! in-memory bus provider.
