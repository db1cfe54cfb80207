//! # Conclave Tool Core
//!
//! The service that executes named tools on behalf of agents. Three tool
//! kinds are supported:
//!
//! - **Local**: a fixed registry of in-process async functions
//!   (`web_search`, `web_scrape`, `file_rw`, `local_file_retriever`)
//! - **Sandbox**: `python_sandbox`, submitted to the external sandbox over
//!   HTTP and completed by a single polling loop
//! - **Script**: registered scripts spawned as child processes with JSON
//!   over stdin/stdout
//!
//! Requests arrive over the HTTP API ([`http`]) or the bus request topic
//! ([`bus_listener`]); both funnel into [`ToolCoreService`] with identical
//! semantics: validate, honor `dry_run`, acknowledge immediately, execute in
//! the background, and publish exactly one terminal TaskResult per
//! execution on the requesting agent's channel and the frontend channel.

pub mod bus_listener;
pub mod http;
pub mod local;
pub mod registry;
pub mod sandbox;
pub mod schemas;
pub mod script;
pub mod service;

pub use registry::{InMemoryToolRegistry, ToolKind, ToolRegistry, ToolSpec};
pub use schemas::{ExecutionStatus, ToolExecutionRequest, ToolExecutionResponse};
pub use service::ToolCoreService;
