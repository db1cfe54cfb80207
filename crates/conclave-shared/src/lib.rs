//! # Conclave Shared Components
//!
//! Common building blocks used by every process in the conclave fabric:
//!
//! - **Messages**: the canonical wire envelope, its enums, the codec and the
//!   factory constructors ([`messages`])
//! - **Bus**: pub/sub + keyed ephemeral state client with Redis and in-memory
//!   providers ([`bus`])
//! - **Effort**: the reasoning-effort estimator and its outcome recorder
//!   ([`effort`])
//! - **Config**: environment-driven settings shared across processes
//!   ([`config`])
//! - **Error**: the workspace error taxonomy ([`error`])
//! - **Logging**: tracing initialization for process entrypoints
//!   ([`logging`])

pub mod bus;
pub mod config;
pub mod effort;
pub mod error;
pub mod logging;
pub mod messages;

pub use config::ConclaveConfig;
pub use error::{ConclaveError, ConclaveResult};
