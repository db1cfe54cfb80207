//! # Websocket Endpoint
//!
//! Per-connection lifecycle: accept, assign a `client_id`, greet with a
//! `system` frame, then run the read loop alongside the outbound forward
//! loop until either side closes. User utterances become Task envelopes
//! addressed at the orchestrator; `get_agent_status` is answered
//! synchronously from the heartbeat keys.

use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::any;
use axum::Router;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use conclave_shared::bus::{agent_channel, heartbeat_key, BusClient, HEARTBEAT_ALIVE};
use conclave_shared::messages::{factories, Envelope, MessageIntent, Task, TaskEvent, WebSocketFrame};

use crate::GatewayState;

/// Build the gateway router (`/ws`)
pub fn router(state: Arc<GatewayState>) -> Router {
    Router::new().route("/ws", any(upgrade)).with_state(state)
}

async fn upgrade(State(state): State<Arc<GatewayState>>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

/// Wrap a client utterance as a Task addressed at the orchestrator
pub fn inbound_task(
    frame_type: &str,
    payload: &Value,
    client_id: &str,
    orchestrator: &str,
) -> Result<Task, String> {
    let content = payload
        .get("content")
        .and_then(Value::as_str)
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| "Content cannot be empty.".to_string())?;
    let task_id = payload
        .get("task_id")
        .and_then(Value::as_str)
        .map(str::to_string);
    let intent = match frame_type {
        "start_task" => MessageIntent::StartTask,
        _ => MessageIntent::Chat,
    };

    Ok(factories::create_task(
        client_id,
        content,
        orchestrator,
        task_id,
        intent,
        TaskEvent::Plan,
        0.9,
    ))
}

/// Answer `get_agent_status` from the heartbeat keys
pub async fn agent_status_payload(bus: &BusClient, required_agents: &[String]) -> Value {
    let mut status = Map::new();
    for agent in required_agents {
        let alive = matches!(
            bus.get(&heartbeat_key(agent)).await,
            Ok(Some(value)) if value == HEARTBEAT_ALIVE
        );
        status.insert(
            agent.clone(),
            json!(if alive { "alive" } else { "offline" }),
        );
    }
    Value::Object(status)
}

async fn handle_socket(state: Arc<GatewayState>, socket: WebSocket) {
    let (client_id, mut outbound_rx) = state.connections.register();
    let (mut sink, mut stream) = socket.split();

    let mut greeting = WebSocketFrame::new(
        "system",
        json!({"message": "Connected", "client_id": client_id.clone()}),
    );
    greeting.client_id = Some(client_id.clone());
    if send_frame(&mut sink, &greeting).await.is_err() {
        state.connections.unregister(&client_id);
        return;
    }

    // Outbound: drain the per-client buffer into the socket.
    let forward_client_id = client_id.clone();
    let forward_state = state.clone();
    let forward = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            if send_frame(&mut sink, &frame).await.is_err() {
                break;
            }
        }
        forward_state.connections.unregister(&forward_client_id);
    });

    // Inbound: read client frames until disconnect.
    while let Some(message) = stream.next().await {
        let text = match message {
            Ok(WsMessage::Text(text)) => text.to_string(),
            Ok(WsMessage::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };
        handle_client_frame(&state, &client_id, &text).await;
    }

    debug!(client_id = %client_id, "Read loop ended");
    state.connections.unregister(&client_id);
    forward.abort();
}

async fn handle_client_frame(state: &Arc<GatewayState>, client_id: &str, raw: &str) {
    let frame: WebSocketFrame = match serde_json::from_str(raw) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(client_id = %client_id, error = %e, "Invalid client frame");
            state.connections.send_to(
                client_id,
                WebSocketFrame::new("error", json!({"message": "Invalid JSON format."})),
            );
            return;
        }
    };

    match frame.frame_type.as_str() {
        "chat_message" | "start_task" => {
            match inbound_task(
                &frame.frame_type,
                &frame.payload,
                client_id,
                &state.config.orchestrator_agent,
            ) {
                Ok(task) => {
                    info!(
                        client_id = %client_id,
                        task_id = %task.task_id,
                        intent = task.intent.as_str(),
                        "Forwarding client message to orchestrator"
                    );
                    state
                        .bus
                        .publish_envelope(
                            &agent_channel(&state.config.orchestrator_agent),
                            &Envelope::Task(task),
                        )
                        .await;
                }
                Err(reason) => {
                    state.connections.send_to(
                        client_id,
                        WebSocketFrame::new("error", json!({"message": reason})),
                    );
                }
            }
        }
        "get_agent_status" => {
            let payload =
                agent_status_payload(&state.bus, &state.config.required_agents).await;
            state
                .connections
                .send_to(client_id, WebSocketFrame::new("agent_status", payload));
        }
        other => {
            warn!(client_id = %client_id, frame_type = other, "Unknown client frame type");
            state.connections.send_to(
                client_id,
                WebSocketFrame::new(
                    "error",
                    json!({"message": format!("Unknown message type: {other}")}),
                ),
            );
        }
    }
}

async fn send_frame(
    sink: &mut futures::stream::SplitSink<WebSocket, WsMessage>,
    frame: &WebSocketFrame,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(frame).unwrap_or_else(|_| "{}".to_string());
    sink.send(WsMessage::Text(text.into())).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use conclave_shared::ConclaveConfig;

    #[test]
    fn chat_frame_becomes_chat_task() {
        let task = inbound_task(
            "chat_message",
            &json!({"content": "hello"}),
            "client-7",
            "grok",
        )
        .unwrap();
        assert_eq!(task.intent, MessageIntent::Chat);
        assert_eq!(task.agent, "client-7");
        assert_eq!(task.target_agent, "grok");
        assert_eq!(task.content, "hello");
    }

    #[test]
    fn start_task_frame_keeps_supplied_task_id() {
        let task = inbound_task(
            "start_task",
            &json!({"content": "Analyze AI hardware trends", "task_id": "t-9"}),
            "client-7",
            "grok",
        )
        .unwrap();
        assert_eq!(task.intent, MessageIntent::StartTask);
        assert_eq!(task.task_id, "t-9");
    }

    #[test]
    fn empty_content_is_rejected() {
        let err = inbound_task("chat_message", &json!({"content": "  "}), "c", "grok").unwrap_err();
        assert!(err.contains("empty"));
        assert!(inbound_task("chat_message", &json!({}), "c", "grok").is_err());
    }

    #[tokio::test]
    async fn agent_status_reads_heartbeats() {
        let bus = BusClient::in_memory();
        bus.set_with_ttl(
            &heartbeat_key("grok"),
            HEARTBEAT_ALIVE,
            std::time::Duration::from_secs(5),
        )
        .await
        .unwrap();

        let config = ConclaveConfig::default();
        let payload = agent_status_payload(&bus, &config.required_agents).await;
        assert_eq!(payload["grok"], "alive");
        assert_eq!(payload["gpt"], "offline");
    }
}
