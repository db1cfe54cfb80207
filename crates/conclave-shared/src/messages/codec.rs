//! # Envelope Codec
//!
//! Canonical (de)serialization for [`Envelope`]. Decoding is a single pass:
//! parse the JSON, validate every string-valued enum field against its
//! allowed symbol set, then resolve the variant — by the `type` tag when
//! present, otherwise by the `intent` inference policy:
//!
//! | `intent` | parses as |
//! |---|---|
//! | `start_task` | Task |
//! | `modify_task` | TaskResult, falling back to Task |
//! | `chat`, `system`, `orchestration` | Message |
//! | `tool_response` | TaskResult |
//! | anything else | TaskResult, Task, then Message |
//!
//! Inconsistent discriminator/body combinations are rejected with
//! [`DecodeError::SchemaMismatch`]; enum symbols outside the allowed set with
//! [`DecodeError::UnknownEnum`].

use serde_json::Value;

use super::{Envelope, Message, Task, TaskResult};
use crate::error::{ConclaveError, ConclaveResult, DecodeError};

const TYPE_SYMBOLS: &[&str] = &["message", "task", "task_result", "stream_update"];
const INTENT_SYMBOLS: &[&str] = &[
    "chat",
    "start_task",
    "check_status",
    "modify_task",
    "tool_request",
    "tool_response",
    "heartbeat",
    "system",
    "orchestration",
    "generate_workflow",
];
const EVENT_SYMBOLS: &[&str] = &[
    "plan",
    "execute",
    "critique",
    "refine",
    "conclude",
    "complete",
    "fail",
    "escalate",
    "info",
    "awaiting_tool",
    "tool_complete",
];
const OUTCOME_SYMBOLS: &[&str] = &[
    "success",
    "failure",
    "pending",
    "in_progress",
    "timeout",
    "cancelled",
];
const EFFORT_SYMBOLS: &[&str] = &["low", "medium", "high"];
const STRATEGY_SYMBOLS: &[&str] = &["direct_answer", "chain-of-thought", "chain-of-draft"];

/// Variant tag of a decoded envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeKind {
    Message,
    Task,
    TaskResult,
    StreamUpdate,
}

/// Serialize an envelope to canonical wire bytes
pub fn encode(envelope: &Envelope) -> ConclaveResult<Vec<u8>> {
    serde_json::to_vec(envelope).map_err(ConclaveError::from)
}

/// Tag of an already-decoded envelope
pub fn classify(envelope: &Envelope) -> EnvelopeKind {
    match envelope {
        Envelope::Message(_) => EnvelopeKind::Message,
        Envelope::Task(_) => EnvelopeKind::Task,
        Envelope::TaskResult(_) => EnvelopeKind::TaskResult,
        Envelope::StreamUpdate(_) => EnvelopeKind::StreamUpdate,
    }
}

/// Decode wire bytes into an envelope
pub fn decode(bytes: &[u8]) -> Result<Envelope, DecodeError> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| DecodeError::Unparseable(e.to_string()))?;

    validate_enum_field(&value, "type", TYPE_SYMBOLS)?;
    validate_enum_field(&value, "intent", INTENT_SYMBOLS)?;
    validate_enum_field(&value, "event", EVENT_SYMBOLS)?;
    validate_enum_field(&value, "outcome", OUTCOME_SYMBOLS)?;
    validate_enum_field(&value, "reasoning_effort", EFFORT_SYMBOLS)?;
    validate_enum_field(&value, "reasoning_strategy", STRATEGY_SYMBOLS)?;

    let mut envelope = if value.get("type").is_some() {
        serde_json::from_value::<Envelope>(value)
            .map_err(|e| DecodeError::SchemaMismatch(e.to_string()))?
    } else {
        infer_untagged(value)?
    };

    check_consistency(&envelope)?;
    clamp_confidence(&mut envelope);
    Ok(envelope)
}

/// Resolve the variant for payloads published without a `type` tag
fn infer_untagged(value: Value) -> Result<Envelope, DecodeError> {
    let intent = value
        .get("intent")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            DecodeError::SchemaMismatch("envelope has neither a type tag nor an intent".into())
        })?
        .to_string();

    match intent.as_str() {
        "start_task" => parse_as::<Task>(&value)
            .map(Envelope::Task)
            .ok_or_else(|| {
                DecodeError::SchemaMismatch("start_task envelope does not parse as a task".into())
            }),
        "modify_task" => parse_as::<TaskResult>(&value)
            // A body whose event is a start event cannot be a result; let it
            // fall through to the Task interpretation.
            .filter(|result| !result.event.is_start_event())
            .map(Envelope::TaskResult)
            .or_else(|| parse_as::<Task>(&value).map(Envelope::Task))
            .ok_or_else(|| {
                DecodeError::SchemaMismatch(
                    "modify_task envelope parses as neither a task result nor a task".into(),
                )
            }),
        "chat" | "system" | "orchestration" => parse_as::<Message>(&value)
            .map(Envelope::Message)
            .ok_or_else(|| {
                DecodeError::SchemaMismatch(format!(
                    "{intent} envelope does not parse as a message"
                ))
            }),
        "tool_response" => parse_as::<TaskResult>(&value)
            .map(Envelope::TaskResult)
            .ok_or_else(|| {
                DecodeError::SchemaMismatch(
                    "tool_response envelope does not parse as a task result".into(),
                )
            }),
        _ => parse_as::<TaskResult>(&value)
            .filter(|result| !result.event.is_start_event())
            .map(Envelope::TaskResult)
            .or_else(|| parse_as::<Task>(&value).map(Envelope::Task))
            .or_else(|| parse_as::<Message>(&value).map(Envelope::Message))
            .ok_or_else(|| {
                DecodeError::SchemaMismatch(format!(
                    "{intent} envelope does not parse as any known variant"
                ))
            }),
    }
}

fn parse_as<T: serde::de::DeserializeOwned>(value: &Value) -> Option<T> {
    serde_json::from_value(value.clone()).ok()
}

/// Reject discriminator/body combinations the dispatch table cannot handle
fn check_consistency(envelope: &Envelope) -> Result<(), DecodeError> {
    use super::MessageIntent;

    // A result never carries a start event.
    if let Envelope::TaskResult(result) = envelope {
        if result.event.is_start_event() {
            return Err(DecodeError::SchemaMismatch(format!(
                "task result cannot carry start event {:?}",
                result.event.as_str()
            )));
        }
    }

    match (envelope.intent(), envelope) {
        (Some(MessageIntent::StartTask), Envelope::Task(_)) => Ok(()),
        (Some(MessageIntent::StartTask), _) => Err(DecodeError::SchemaMismatch(
            "start_task intent requires a task body".into(),
        )),
        (Some(MessageIntent::ModifyTask), Envelope::Task(_) | Envelope::TaskResult(_)) => Ok(()),
        (Some(MessageIntent::ModifyTask), _) => Err(DecodeError::SchemaMismatch(
            "modify_task intent requires a task or task result body".into(),
        )),
        (Some(MessageIntent::ToolResponse), Envelope::TaskResult(_)) => Ok(()),
        (Some(MessageIntent::ToolResponse), _) => Err(DecodeError::SchemaMismatch(
            "tool_response intent requires a task result body".into(),
        )),
        _ => Ok(()),
    }
}

fn clamp_confidence(envelope: &mut Envelope) {
    match envelope {
        Envelope::Task(t) => t.confidence = t.confidence.clamp(0.0, 1.0),
        Envelope::TaskResult(r) => r.confidence = r.confidence.clamp(0.0, 1.0),
        _ => {}
    }
}

fn validate_enum_field(
    value: &Value,
    field: &str,
    allowed: &[&str],
) -> Result<(), DecodeError> {
    match value.get(field) {
        Some(Value::String(symbol)) if !allowed.contains(&symbol.as_str()) => {
            Err(DecodeError::UnknownEnum {
                field: field.to_string(),
                symbol: symbol.clone(),
            })
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::super::factories;
    use super::*;
    use crate::messages::{MessageIntent, TaskEvent, TaskOutcome};

    #[test]
    fn round_trip_task() {
        let task = factories::create_task(
            "user-1",
            "Analyze the latest market trends for AI hardware.",
            "gpt",
            None,
            MessageIntent::StartTask,
            TaskEvent::Plan,
            0.9,
        );
        let envelope = Envelope::Task(task);
        let bytes = encode(&envelope).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, envelope);
        assert_eq!(classify(&decoded), EnvelopeKind::Task);
    }

    #[test]
    fn round_trip_task_result() {
        let result = factories::create_task_result(
            "t-7f",
            "gpt",
            "analysis complete",
            "grok",
            TaskEvent::Refine,
            TaskOutcome::Success,
            MessageIntent::ModifyTask,
            Some(vec!["gpt".into()]),
            0.83,
        );
        let envelope = Envelope::TaskResult(result);
        let decoded = decode(&encode(&envelope).unwrap()).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn untagged_start_task_parses_as_task() {
        let raw = serde_json::json!({
            "task_id": "t-1",
            "agent": "client-9",
            "content": "do the thing",
            "intent": "start_task",
            "target_agent": "grok",
            "event": "plan",
            "timestamp": "2024-05-01T12:00:00Z"
        });
        let decoded = decode(serde_json::to_vec(&raw).unwrap().as_slice()).unwrap();
        assert_eq!(classify(&decoded), EnvelopeKind::Task);
    }

    #[test]
    fn untagged_modify_task_prefers_task_result() {
        let raw = serde_json::json!({
            "task_id": "t-1",
            "agent": "gpt",
            "content": "refined",
            "intent": "modify_task",
            "target_agent": "grok",
            "event": "refine",
            "outcome": "success",
            "timestamp": "2024-05-01T12:00:00Z"
        });
        let decoded = decode(serde_json::to_vec(&raw).unwrap().as_slice()).unwrap();
        assert_eq!(classify(&decoded), EnvelopeKind::TaskResult);
    }

    #[test]
    fn untagged_modify_task_without_outcome_falls_back_to_task() {
        let raw = serde_json::json!({
            "task_id": "t-1",
            "agent": "grok",
            "content": "feedback",
            "intent": "modify_task",
            "target_agent": "gpt",
            "event": "refine",
            "timestamp": "2024-05-01T12:00:00Z"
        });
        let decoded = decode(serde_json::to_vec(&raw).unwrap().as_slice()).unwrap();
        assert_eq!(classify(&decoded), EnvelopeKind::Task);
    }

    #[test]
    fn untagged_chat_parses_as_message() {
        let raw = serde_json::json!({
            "task_id": "t-1",
            "agent": "client-3",
            "content": "hello",
            "intent": "chat",
            "timestamp": "2024-05-01T12:00:00Z"
        });
        let decoded = decode(serde_json::to_vec(&raw).unwrap().as_slice()).unwrap();
        assert_eq!(classify(&decoded), EnvelopeKind::Message);
    }

    #[test]
    fn unknown_intent_symbol_rejected() {
        let raw = serde_json::json!({
            "type": "message",
            "task_id": "t-1",
            "agent": "x",
            "content": "hi",
            "intent": "teleport",
            "timestamp": "2024-05-01T12:00:00Z"
        });
        let err = decode(serde_json::to_vec(&raw).unwrap().as_slice()).unwrap_err();
        assert_eq!(
            err,
            DecodeError::UnknownEnum {
                field: "intent".into(),
                symbol: "teleport".into()
            }
        );
    }

    #[test]
    fn unknown_event_symbol_rejected() {
        let raw = serde_json::json!({
            "type": "task",
            "task_id": "t-1",
            "agent": "x",
            "content": "hi",
            "intent": "start_task",
            "target_agent": "grok",
            "event": "ponder",
            "timestamp": "2024-05-01T12:00:00Z"
        });
        assert!(matches!(
            decode(serde_json::to_vec(&raw).unwrap().as_slice()),
            Err(DecodeError::UnknownEnum { .. })
        ));
    }

    #[test]
    fn start_task_message_body_is_schema_mismatch() {
        let raw = serde_json::json!({
            "type": "message",
            "task_id": "t-1",
            "agent": "x",
            "content": "hi",
            "intent": "start_task",
            "timestamp": "2024-05-01T12:00:00Z"
        });
        assert!(matches!(
            decode(serde_json::to_vec(&raw).unwrap().as_slice()),
            Err(DecodeError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn task_result_with_start_event_rejected() {
        let raw = serde_json::json!({
            "type": "task_result",
            "task_id": "t-1",
            "agent": "gpt",
            "content": "x",
            "intent": "modify_task",
            "target_agent": "grok",
            "event": "critique",
            "outcome": "in_progress",
            "timestamp": "2024-05-01T12:00:00Z"
        });
        assert!(matches!(
            decode(serde_json::to_vec(&raw).unwrap().as_slice()),
            Err(DecodeError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn garbage_is_unparseable() {
        assert!(matches!(
            decode(b"not json at all"),
            Err(DecodeError::Unparseable(_))
        ));
    }

    #[test]
    fn confidence_clamped_on_decode() {
        let raw = serde_json::json!({
            "type": "task",
            "task_id": "t-1",
            "agent": "x",
            "content": "hi",
            "intent": "start_task",
            "target_agent": "grok",
            "event": "plan",
            "confidence": 1.7,
            "timestamp": "2024-05-01T12:00:00Z"
        });
        let decoded = decode(serde_json::to_vec(&raw).unwrap().as_slice()).unwrap();
        match decoded {
            Envelope::Task(t) => assert_eq!(t.confidence, 1.0),
            other => panic!("expected task, got {other:?}"),
        }
    }

    #[test]
    fn stream_update_round_trip() {
        let envelope = Envelope::StreamUpdate(factories::create_stream_update(
            "gpt", "t-1", "partial text", false,
        ));
        let decoded = decode(&encode(&envelope).unwrap()).unwrap();
        assert_eq!(decoded, envelope);
        assert_eq!(classify(&decoded), EnvelopeKind::StreamUpdate);
    }
}
