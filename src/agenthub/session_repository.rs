//! Session persistence contract and the default in-memory implementation.
//!
//! The core never talks to a storage engine directly; it goes through the
//! [`SessionRepository`] trait. Implementations own the session records and
//! must guarantee per-session monotone sequence assignment: two concurrent
//! [`add_message`](SessionRepository::add_message) calls against the same
//! session serialize, while distinct sessions proceed independently.
//!
//! [`InMemorySessionRepository`] is the batteries-included default used by
//! the tests and by in-process deployments. Sequence numbers are assigned
//! inside the per-session critical section at commit time, so a failed
//! append assigns nothing and the log stays gap-free.

use crate::agenthub::error::{HubError, HubResult};
use crate::agenthub::message::AgentMessage;
use crate::agenthub::session::{Session, SessionSnapshot, SessionStatus};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Storage contract for sessions, messages, and snapshots.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Persist a new session. Fails if the id is already taken.
    async fn create_session(&self, session: Session) -> HubResult<Session>;

    /// Fetch a session by id, or `None` when unknown.
    async fn get_session_by_id(&self, id: &str) -> HubResult<Option<Session>>;

    /// Up to `count` sessions ordered by last activity, most recent first.
    /// Ties break by creation time descending, then id ascending.
    async fn get_recent_sessions(&self, count: usize) -> HubResult<Vec<Session>>;

    /// Every session whose status is [`SessionStatus::Active`].
    async fn get_active_sessions(&self) -> HubResult<Vec<Session>>;

    /// Replace the stored session with the given value.
    async fn update_session(&self, session: Session) -> HubResult<()>;

    /// Merge the given entries into the session's context map.
    async fn update_session_context(
        &self,
        session_id: &str,
        context: HashMap<String, serde_json::Value>,
    ) -> HubResult<()>;

    /// Append a message to the session's log, assigning the next sequence
    /// number, and return the stamped record.
    ///
    /// Rejects unknown sessions with `NotFound` and sessions that no longer
    /// accept messages with `PreconditionFailed`.
    async fn add_message(&self, session_id: &str, message: AgentMessage)
        -> HubResult<AgentMessage>;

    /// Persist a snapshot.
    async fn create_snapshot(&self, snapshot: SessionSnapshot) -> HubResult<SessionSnapshot>;

    /// Fetch a snapshot by id, or `None` when unknown.
    async fn get_snapshot(&self, snapshot_id: &str) -> HubResult<Option<SessionSnapshot>>;
}

/// Default repository keeping everything in process memory.
///
/// Sessions are stored behind one mutex each so that message appends to the
/// same session serialize while appends to different sessions run in
/// parallel. The outer map is only write-locked while inserting or removing
/// whole sessions.
pub struct InMemorySessionRepository {
    sessions: RwLock<HashMap<String, Arc<Mutex<Session>>>>,
    snapshots: RwLock<HashMap<String, SessionSnapshot>>,
}

impl InMemorySessionRepository {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            snapshots: RwLock::new(HashMap::new()),
        }
    }

    /// Clone the handle of one session record, if present.
    async fn record(&self, session_id: &str) -> Option<Arc<Mutex<Session>>> {
        let sessions = self.sessions.read().await;
        sessions.get(session_id).cloned()
    }

    /// Snapshot every stored session value.
    async fn all_sessions(&self) -> Vec<Session> {
        let handles: Vec<Arc<Mutex<Session>>> = {
            let sessions = self.sessions.read().await;
            sessions.values().cloned().collect()
        };
        let mut out = Vec::with_capacity(handles.len());
        for handle in handles {
            out.push(handle.lock().await.clone());
        }
        out
    }
}

impl Default for InMemorySessionRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn create_session(&self, session: Session) -> HubResult<Session> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session.id) {
            return Err(HubError::invalid_argument(format!(
                "session id {} already exists",
                session.id
            )));
        }
        sessions.insert(session.id.clone(), Arc::new(Mutex::new(session.clone())));
        Ok(session)
    }

    async fn get_session_by_id(&self, id: &str) -> HubResult<Option<Session>> {
        match self.record(id).await {
            Some(handle) => Ok(Some(handle.lock().await.clone())),
            None => Ok(None),
        }
    }

    async fn get_recent_sessions(&self, count: usize) -> HubResult<Vec<Session>> {
        let mut sessions = self.all_sessions().await;
        sessions.sort_by(|a, b| {
            b.last_activity_at
                .cmp(&a.last_activity_at)
                .then_with(|| b.created_at.cmp(&a.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        sessions.truncate(count);
        Ok(sessions)
    }

    async fn get_active_sessions(&self) -> HubResult<Vec<Session>> {
        let sessions = self.all_sessions().await;
        Ok(sessions
            .into_iter()
            .filter(|s| s.status == SessionStatus::Active)
            .collect())
    }

    async fn update_session(&self, session: Session) -> HubResult<()> {
        let handle = self
            .record(&session.id)
            .await
            .ok_or_else(|| HubError::not_found("session", &session.id))?;
        let mut stored = handle.lock().await;
        *stored = session;
        Ok(())
    }

    async fn update_session_context(
        &self,
        session_id: &str,
        context: HashMap<String, serde_json::Value>,
    ) -> HubResult<()> {
        let handle = self
            .record(session_id)
            .await
            .ok_or_else(|| HubError::not_found("session", session_id))?;
        let mut stored = handle.lock().await;
        stored.context.extend(context);
        stored.last_activity_at = Utc::now();
        Ok(())
    }

    async fn add_message(
        &self,
        session_id: &str,
        mut message: AgentMessage,
    ) -> HubResult<AgentMessage> {
        let handle = self
            .record(session_id)
            .await
            .ok_or_else(|| HubError::not_found("session", session_id))?;

        // The per-session lock is the serialization point: the sequence
        // number is assigned and the record committed without interleaving.
        let mut stored = handle.lock().await;
        if !stored.accepts_messages() {
            return Err(HubError::PreconditionFailed(format!(
                "session {} no longer accepts messages",
                session_id
            )));
        }
        message.sequence_number = stored.messages.len() as u64 + 1;
        message.session_id = stored.id.clone();
        stored.messages.push(message.clone());
        stored.last_activity_at = Utc::now();
        Ok(message)
    }

    async fn create_snapshot(&self, snapshot: SessionSnapshot) -> HubResult<SessionSnapshot> {
        let mut snapshots = self.snapshots.write().await;
        snapshots.insert(snapshot.id.clone(), snapshot.clone());
        Ok(snapshot)
    }

    async fn get_snapshot(&self, snapshot_id: &str) -> HubResult<Option<SessionSnapshot>> {
        let snapshots = self.snapshots.read().await;
        Ok(snapshots.get(snapshot_id).cloned())
    }
}
