//! Transport abstraction.
//!
//! The core never talks to a concrete network stack. It addresses clients
//! through the [`GroupTransport`] contract: named groups of connections with
//! add/remove/broadcast, plus direct sends to a single connection. A
//! connection belongs to the group `"agent-{agentId}"` for every agent it
//! subscribed to and `"session-{sessionId}"` for every session it joined.
//!
//! [`InMemoryHubTransport`] is the reference implementation: each registered
//! connection owns an unbounded channel, group broadcasts iterate the
//! members, and a dead recipient never prevents delivery to the rest. The
//! optional WebSocket binding pumps these channels onto real sockets; the
//! tests consume them directly.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::error::Error;
use tokio::sync::mpsc;

/// Group name for subscribers of one agent.
pub fn agent_group(agent_id: &str) -> String {
    format!("agent-{}", agent_id)
}

/// Group name for members of one session.
pub fn session_group(session_id: &str) -> String {
    format!("session-{}", session_id)
}

/// One server-initiated push: a named client method and its JSON payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientMessage {
    /// Client method to invoke (e.g. `"ReceiveAgentResponse"`).
    pub method: String,
    /// JSON-shaped argument.
    pub payload: serde_json::Value,
}

impl ClientMessage {
    /// Build a push for the given method and payload.
    pub fn new(method: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            method: method.into(),
            payload,
        }
    }
}

/// Server-side view of a bidirectional streaming transport.
///
/// Implementations must tolerate unknown groups and connections on the send
/// paths (deliver to whoever is reachable) and must not let one failing
/// recipient abort delivery to the others.
#[async_trait]
pub trait GroupTransport: Send + Sync {
    /// Add a connection to a named group.
    async fn add_to_group(
        &self,
        group: &str,
        connection_id: &str,
    ) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// Remove a connection from a named group.
    async fn remove_from_group(
        &self,
        group: &str,
        connection_id: &str,
    ) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// Invoke a client method on every member of a group.
    async fn send_to_group(
        &self,
        group: &str,
        method: &str,
        payload: serde_json::Value,
    ) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// Invoke a client method on a single connection.
    async fn send_to_connection(
        &self,
        connection_id: &str,
        method: &str,
        payload: serde_json::Value,
    ) -> Result<(), Box<dyn Error + Send + Sync>>;
}

/// In-process transport backed by per-connection channels.
pub struct InMemoryHubTransport {
    groups: DashMap<String, HashSet<String>>,
    outboxes: DashMap<String, mpsc::UnboundedSender<ClientMessage>>,
}

impl InMemoryHubTransport {
    /// Create an empty transport.
    pub fn new() -> Self {
        Self {
            groups: DashMap::new(),
            outboxes: DashMap::new(),
        }
    }

    /// Register a connection and hand back the receiving half of its outbox.
    ///
    /// Everything pushed to the connection — directly or via one of its
    /// groups — arrives on the returned receiver in send order.
    pub fn register_connection(
        &self,
        connection_id: &str,
    ) -> mpsc::UnboundedReceiver<ClientMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.outboxes.insert(connection_id.to_string(), tx);
        rx
    }

    /// Drop a connection's outbox and all of its group memberships.
    pub fn unregister_connection(&self, connection_id: &str) {
        self.outboxes.remove(connection_id);
        for mut entry in self.groups.iter_mut() {
            entry.value_mut().remove(connection_id);
        }
    }

    /// Current members of a group (testing/diagnostics).
    pub fn group_members(&self, group: &str) -> HashSet<String> {
        self.groups
            .get(group)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    fn push(&self, connection_id: &str, message: ClientMessage) -> bool {
        match self.outboxes.get(connection_id) {
            Some(tx) => tx.send(message).is_ok(),
            None => false,
        }
    }
}

impl Default for InMemoryHubTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GroupTransport for InMemoryHubTransport {
    async fn add_to_group(
        &self,
        group: &str,
        connection_id: &str,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.groups
            .entry(group.to_string())
            .or_insert_with(HashSet::new)
            .insert(connection_id.to_string());
        Ok(())
    }

    async fn remove_from_group(
        &self,
        group: &str,
        connection_id: &str,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        if let Some(mut members) = self.groups.get_mut(group) {
            members.remove(connection_id);
        }
        Ok(())
    }

    async fn send_to_group(
        &self,
        group: &str,
        method: &str,
        payload: serde_json::Value,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let members = self.group_members(group);
        for connection_id in members {
            let delivered = self.push(
                &connection_id,
                ClientMessage::new(method, payload.clone()),
            );
            if !delivered {
                // One dead recipient must not starve the rest.
                log::debug!(
                    "dropping {} for closed connection {} in group {}",
                    method,
                    connection_id,
                    group
                );
            }
        }
        Ok(())
    }

    async fn send_to_connection(
        &self,
        connection_id: &str,
        method: &str,
        payload: serde_json::Value,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        if self.push(connection_id, ClientMessage::new(method, payload)) {
            Ok(())
        } else {
            Err(format!("connection {} is not reachable", connection_id).into())
        }
    }
}
