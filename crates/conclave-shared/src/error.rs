//! # Error Taxonomy
//!
//! Component-level error enums plus the workspace facade. Each concern gets
//! its own `thiserror` enum so call sites can match on what actually went
//! wrong; `ConclaveError` exists for binaries and cross-crate boundaries
//! where the distinction no longer matters.

use thiserror::Error;

/// Workspace-level result alias
pub type ConclaveResult<T> = Result<T, ConclaveError>;

/// Top-level error for process entrypoints and cross-component boundaries
#[derive(Debug, Error)]
pub enum ConclaveError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("HTTP error: {0}")]
    Http(String),
}

impl From<serde_json::Error> for ConclaveError {
    fn from(e: serde_json::Error) -> Self {
        ConclaveError::Serialization(e.to_string())
    }
}

/// Envelope decoding failures.
///
/// These are always terminal for the offending message: the listener logs a
/// single line and moves on. No envelope is ever emitted in response.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// Payload is not valid JSON at all
    #[error("Unparseable envelope: {0}")]
    Unparseable(String),

    /// A string-valued enum field carried a symbol outside the allowed set
    #[error("Unknown enum symbol {symbol:?} in field {field:?}")]
    UnknownEnum { field: String, symbol: String },

    /// The discriminator (type tag or intent) does not match the body shape
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),
}

/// Bus transport failures.
///
/// Publish failures are logged and dropped (no client-side queue); subscribe
/// failures are retried with backoff inside the subscription task and never
/// reach callers.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("Bus connection error: {0}")]
    Connection(String),

    #[error("Publish to {topic:?} failed: {message}")]
    Publish { topic: String, message: String },

    #[error("Publish to {topic:?} exceeded deadline of {deadline_ms}ms")]
    PublishDeadline { topic: String, deadline_ms: u64 },

    #[error("Keyed state operation on {key:?} failed: {message}")]
    KeyedState { key: String, message: String },
}

impl BusError {
    pub fn connection(message: impl Into<String>) -> Self {
        BusError::Connection(message.into())
    }

    pub fn publish(topic: impl Into<String>, message: impl Into<String>) -> Self {
        BusError::Publish {
            topic: topic.into(),
            message: message.into(),
        }
    }

    pub fn keyed_state(key: impl Into<String>, message: impl Into<String>) -> Self {
        BusError::KeyedState {
            key: key.into(),
            message: message.into(),
        }
    }
}
