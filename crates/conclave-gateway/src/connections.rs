//! # Connection Manager
//!
//! Tracks attached websocket clients. Each client gets a bounded outbound
//! buffer; a client whose buffer is full (or whose receiver is gone) is
//! dropped rather than allowed to stall the fan-out.

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use conclave_shared::messages::WebSocketFrame;

/// Outbound frames buffered per client before it is considered stalled
const CLIENT_BUFFER: usize = 64;

/// Registry of connected clients
#[derive(Debug, Default)]
pub struct ConnectionManager {
    clients: DashMap<String, mpsc::Sender<WebSocketFrame>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        ConnectionManager::default()
    }

    /// Register a new connection; returns its id and the outbound receiver
    pub fn register(&self) -> (String, mpsc::Receiver<WebSocketFrame>) {
        let client_id = format!("client-{}", Uuid::new_v4());
        let (tx, rx) = mpsc::channel(CLIENT_BUFFER);
        self.clients.insert(client_id.clone(), tx);
        info!(client_id = %client_id, total = self.clients.len(), "Client connected");
        (client_id, rx)
    }

    pub fn unregister(&self, client_id: &str) {
        if self.clients.remove(client_id).is_some() {
            info!(client_id = %client_id, total = self.clients.len(), "Client disconnected");
        }
    }

    /// Whether an identity belongs to a connected client (used to suppress
    /// gateway echo)
    pub fn is_client(&self, identity: &str) -> bool {
        self.clients.contains_key(identity)
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Send to one client; a failed send drops the client
    pub fn send_to(&self, client_id: &str, frame: WebSocketFrame) -> bool {
        let delivered = match self.clients.get(client_id) {
            Some(tx) => tx.try_send(frame).is_ok(),
            None => false,
        };
        if !delivered {
            warn!(client_id = %client_id, "Client send failed, dropping client");
            self.unregister(client_id);
        }
        delivered
    }

    /// Broadcast to every client, dropping any that stall
    pub fn broadcast(&self, frame: &WebSocketFrame) {
        let mut stalled = Vec::new();
        for entry in self.clients.iter() {
            if entry.value().try_send(frame.clone()).is_err() {
                stalled.push(entry.key().clone());
            }
        }
        for client_id in stalled {
            warn!(client_id = %client_id, "Client stalled during broadcast, dropping");
            self.unregister(&client_id);
        }
    }
}
