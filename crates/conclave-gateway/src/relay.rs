//! # Bus → Client Relay
//!
//! One process-wide subscription to the frontend broadcast channel. Each
//! payload is decoded once and classified into a client frame type:
//!
//! | envelope | frame type |
//! |---|---|
//! | Message (chat) | `chat_message` |
//! | Message (system) | `system_info` |
//! | Message (other) | `agent_message` |
//! | Task | `task_update` |
//! | TaskResult | `task_result` |
//! | StreamUpdate | `stream_update` |
//! | pre-wrapped frame | forwarded as-is |
//! | undecodable | `error` |
//!
//! Envelopes originating from a connected client are not echoed back.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use conclave_shared::messages::{codec, Envelope, MessageIntent, WebSocketFrame};

use crate::GatewayState;

/// Classify a decoded envelope into an outbound frame
pub fn classify_envelope(envelope: &Envelope) -> WebSocketFrame {
    let (frame_type, payload) = match envelope {
        Envelope::Message(message) => {
            let frame_type = match message.intent {
                MessageIntent::Chat => "chat_message",
                MessageIntent::System => "system_info",
                _ => "agent_message",
            };
            (frame_type, serde_json::to_value(message).unwrap_or(Value::Null))
        }
        Envelope::Task(task) => (
            "task_update",
            serde_json::to_value(task).unwrap_or(Value::Null),
        ),
        Envelope::TaskResult(result) => (
            "task_result",
            serde_json::to_value(result).unwrap_or(Value::Null),
        ),
        Envelope::StreamUpdate(update) => (
            "stream_update",
            serde_json::to_value(update).unwrap_or(Value::Null),
        ),
    };
    WebSocketFrame::new(frame_type, payload)
}

/// Turn one raw frontend-channel payload into the frame to broadcast.
///
/// Returns `None` when the payload must not be forwarded (client echo).
pub fn frame_for_broadcast(state: &GatewayState, bytes: &[u8]) -> Option<WebSocketFrame> {
    match codec::decode(bytes) {
        Ok(envelope) => {
            if state.connections.is_client(envelope.agent()) {
                debug!(agent = %envelope.agent(), "Suppressing client echo");
                return None;
            }
            Some(classify_envelope(&envelope))
        }
        Err(_) => {
            // Coordinator status updates and other pre-wrapped frames pass
            // through untouched.
            if let Ok(frame) = serde_json::from_slice::<WebSocketFrame>(bytes) {
                return Some(frame);
            }
            warn!("Unclassifiable frontend payload");
            Some(WebSocketFrame::new(
                "error",
                json!({"message": "Failed to parse broadcast payload"}),
            ))
        }
    }
}

/// Spawn the frontend-channel fan-out
pub fn spawn(state: Arc<GatewayState>, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let channel = state.config.frontend_channel.clone();
        let mut subscription = state.bus.subscribe(&channel);
        info!(channel = %channel, "Frontend relay started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                message = subscription.next() => match message {
                    Some(bytes) => {
                        if let Some(frame) = frame_for_broadcast(&state, &bytes) {
                            state.connections.broadcast(&frame);
                        }
                    }
                    None => break,
                }
            }
        }
        info!(channel = %channel, "Frontend relay stopped");
    })
}
