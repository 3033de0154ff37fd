//! Transport connection bookkeeping.
//!
//! The [`ConnectionManager`] tracks which transport connection belongs to
//! which user and which sessions each connection has joined. It is pure
//! in-memory state bounded by the lifetime of the underlying connections —
//! nothing here is persisted.
//!
//! All operations are safe under concurrent connect/disconnect storms: every
//! map is a [`DashMap`] with per-key locking, and no operation holds more
//! than one shard lock at a time while mutating another map.

use dashmap::DashMap;
use std::collections::HashSet;

/// Bidirectional maps between connections, users, and joined sessions.
pub struct ConnectionManager {
    /// connection id → user id
    users_by_connection: DashMap<String, String>,
    /// user id → connection ids
    connections_by_user: DashMap<String, HashSet<String>>,
    /// connection id → joined session ids
    sessions_by_connection: DashMap<String, HashSet<String>>,
    /// session id → member connection ids
    connections_by_session: DashMap<String, HashSet<String>>,
}

impl ConnectionManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self {
            users_by_connection: DashMap::new(),
            connections_by_user: DashMap::new(),
            sessions_by_connection: DashMap::new(),
            connections_by_session: DashMap::new(),
        }
    }

    /// Associate a connection with a user.
    ///
    /// Re-adding the same pair is a no-op. Re-adding a connection under a
    /// different user replaces the mapping and drops the old reverse entry.
    pub fn add_connection(&self, connection_id: &str, user_id: &str) {
        let previous = self
            .users_by_connection
            .insert(connection_id.to_string(), user_id.to_string());

        if let Some(previous_user) = previous {
            if previous_user != user_id {
                self.drop_user_connection(&previous_user, connection_id);
            }
        }

        self.connections_by_user
            .entry(user_id.to_string())
            .or_insert_with(HashSet::new)
            .insert(connection_id.to_string());
    }

    /// Remove a connection, its user mapping, and all session memberships.
    /// Unknown connections are a no-op.
    pub fn remove_connection(&self, connection_id: &str) {
        if let Some((_, user_id)) = self.users_by_connection.remove(connection_id) {
            self.drop_user_connection(&user_id, connection_id);
        }

        if let Some((_, sessions)) = self.sessions_by_connection.remove(connection_id) {
            for session_id in sessions {
                self.drop_session_connection(&session_id, connection_id);
            }
        }
    }

    /// Record that a connection joined a session.
    ///
    /// Returns `false` when the connection is unknown.
    pub fn add_user_to_session(&self, connection_id: &str, session_id: &str) -> bool {
        if !self.users_by_connection.contains_key(connection_id) {
            return false;
        }
        self.sessions_by_connection
            .entry(connection_id.to_string())
            .or_insert_with(HashSet::new)
            .insert(session_id.to_string());
        self.connections_by_session
            .entry(session_id.to_string())
            .or_insert_with(HashSet::new)
            .insert(connection_id.to_string());
        true
    }

    /// Record that a connection left a session.
    ///
    /// Returns `false` when the connection was not a member.
    pub fn remove_user_from_session(&self, connection_id: &str, session_id: &str) -> bool {
        let removed = match self.sessions_by_connection.get_mut(connection_id) {
            Some(mut sessions) => sessions.remove(session_id),
            None => false,
        };
        if removed {
            self.drop_session_connection(session_id, connection_id);
        }
        removed
    }

    /// The user behind a connection, or `None` when unknown.
    pub fn get_user_id(&self, connection_id: &str) -> Option<String> {
        self.users_by_connection
            .get(connection_id)
            .map(|entry| entry.value().clone())
    }

    /// Every live connection of a user. Unknown users yield an empty set.
    pub fn get_connection_ids(&self, user_id: &str) -> HashSet<String> {
        self.connections_by_user
            .get(user_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Whether the user currently has at least one connection.
    pub fn is_user_online(&self, user_id: &str) -> bool {
        self.connections_by_user
            .get(user_id)
            .map(|entry| !entry.value().is_empty())
            .unwrap_or(false)
    }

    /// Sessions a connection has joined. Unknown connections yield empty.
    pub fn get_user_sessions(&self, connection_id: &str) -> HashSet<String> {
        self.sessions_by_connection
            .get(connection_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Member connections of a session. Unknown sessions yield empty.
    pub fn get_session_users(&self, session_id: &str) -> HashSet<String> {
        self.connections_by_session
            .get(session_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Number of tracked connections.
    pub fn connection_count(&self) -> usize {
        self.users_by_connection.len()
    }

    fn drop_user_connection(&self, user_id: &str, connection_id: &str) {
        let now_empty = match self.connections_by_user.get_mut(user_id) {
            Some(mut connections) => {
                connections.remove(connection_id);
                connections.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.connections_by_user
                .remove_if(user_id, |_, connections| connections.is_empty());
        }
    }

    fn drop_session_connection(&self, session_id: &str, connection_id: &str) {
        let now_empty = match self.connections_by_session.get_mut(session_id) {
            Some(mut connections) => {
                connections.remove(connection_id);
                connections.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.connections_by_session
                .remove_if(session_id, |_, connections| connections.is_empty());
        }
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}
