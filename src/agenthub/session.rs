//! Session data model.
//!
//! A [`Session`] is a conversation context binding participant agents, an
//! ordered message log, shared key/value context, and an optional working
//! directory. Sessions are owned by the repository; values handed out by the
//! session manager are read-mostly snapshots — mutation goes through the
//! manager, never through a held `Session` value.

use crate::agenthub::message::AgentMessage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// How many agents a session coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionType {
    /// One agent answering one user.
    SingleAgent,
    /// Several agents sharing one conversation.
    MultiAgent,
    /// Agents driven by orchestration plans.
    Orchestrated,
}

/// Lifecycle state of a session.
///
/// A `Completed` session still accepts read operations and administrative
/// transitions but no new messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Active,
    Paused,
    Completed,
    Failed,
    Archived,
}

/// A conversation context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Unique opaque id.
    pub id: String,
    /// Display name; the caller defines name semantics and an empty name is
    /// accepted as-is.
    pub name: String,
    /// Coordination shape of the session.
    pub session_type: SessionType,
    /// Current lifecycle state.
    pub status: SessionStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last time a message was appended or the session was mutated.
    /// Always `>= created_at`.
    pub last_activity_at: DateTime<Utc>,
    /// Participant agent ids in insertion order (order is significant to
    /// consumers rendering the roster).
    pub participant_agent_ids: Vec<String>,
    /// Ordered message log, densely indexed by `sequence_number` from 1.
    pub messages: Vec<AgentMessage>,
    /// Shared key/value context, merged into by the session manager.
    pub context: HashMap<String, serde_json::Value>,
    /// Working directory agents operate in, if any.
    pub working_directory: Option<String>,
}

impl Session {
    /// Create an empty active session with a fresh id.
    pub fn new(name: impl Into<String>, session_type: SessionType) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            session_type,
            status: SessionStatus::Active,
            created_at: now,
            last_activity_at: now,
            participant_agent_ids: Vec::new(),
            messages: Vec::new(),
            context: HashMap::new(),
            working_directory: None,
        }
    }

    /// Add a participant, preserving insertion order and ignoring duplicates.
    pub fn add_participant(&mut self, agent_id: impl Into<String>) {
        let agent_id = agent_id.into();
        if !self.participant_agent_ids.contains(&agent_id) {
            self.participant_agent_ids.push(agent_id);
        }
    }

    /// Whether the session still accepts new messages.
    pub fn accepts_messages(&self) -> bool {
        matches!(self.status, SessionStatus::Active | SessionStatus::Paused)
    }
}

/// Point-in-time capture of a session, optionally bundled with the state of
/// the agents that participate in it.
///
/// `agent_states` is populated by the caller (the agent runtime) when
/// available; the session manager itself only captures `session_state`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Unique snapshot id.
    pub id: String,
    /// Id of the captured session.
    pub session_id: String,
    /// Capture time.
    pub created_at: DateTime<Utc>,
    /// Free-form description supplied by the caller.
    pub description: String,
    /// Full session state at capture time.
    pub session_state: Session,
    /// Per-agent state blobs keyed by agent id.
    pub agent_states: HashMap<String, serde_json::Value>,
}

impl SessionSnapshot {
    /// Capture the given session under a fresh snapshot id.
    pub fn capture(session: &Session, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session.id.clone(),
            created_at: Utc::now(),
            description: description.into(),
            session_state: session.clone(),
            agent_states: HashMap::new(),
        }
    }
}
