//! Session lifecycle management.
//!
//! The [`SessionManager`] is the single entry point for creating, reading,
//! and ending sessions and for appending to their ordered message logs. It
//! delegates storage to a [`SessionRepository`], stamps what the caller
//! should not have to (timestamps, session ids on messages), publishes
//! lifecycle events on the [`EventBus`], and keeps the process-wide
//! "current session" pointer.
//!
//! The current-session pointer assumes a single interactive user per
//! process; multi-user deployments should address sessions by id and ignore
//! it.
//!
//! # Example
//!
//! ```rust,no_run
//! use agenthub::dto::CreateSessionRequest;
//! use agenthub::event_bus::EventBus;
//! use agenthub::session::SessionType;
//! use agenthub::session_manager::SessionManager;
//! use agenthub::session_repository::InMemorySessionRepository;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), agenthub::error::HubError> {
//! let manager = SessionManager::new(
//!     Arc::new(InMemorySessionRepository::new()),
//!     Arc::new(EventBus::new()),
//! );
//!
//! let session = manager
//!     .create_session(CreateSessionRequest {
//!         name: "triage".into(),
//!         session_type: SessionType::MultiAgent,
//!         agent_ids: vec!["a1".into()],
//!         working_directory: None,
//!     })
//!     .await?;
//!
//! assert_eq!(manager.get_current_session().await?.unwrap().id, session.id);
//! # Ok(())
//! # }
//! ```

use crate::agenthub::dto::CreateSessionRequest;
use crate::agenthub::error::{HubError, HubResult};
use crate::agenthub::event_bus::EventBus;
use crate::agenthub::events::{MessageAddedEvent, SessionCreatedEvent, SessionEndedEvent};
use crate::agenthub::message::AgentMessage;
use crate::agenthub::session::{Session, SessionSnapshot, SessionStatus};
use crate::agenthub::session_repository::SessionRepository;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Coordinates session lifecycle, message logging, and snapshots.
pub struct SessionManager {
    repository: Arc<dyn SessionRepository>,
    bus: Arc<EventBus>,
    /// Id of the session most recently created or switched to.
    current: RwLock<Option<String>>,
}

impl SessionManager {
    /// Create a manager over the given repository and bus.
    pub fn new(repository: Arc<dyn SessionRepository>, bus: Arc<EventBus>) -> Self {
        Self {
            repository,
            bus,
            current: RwLock::new(None),
        }
    }

    /// The repository this manager persists through.
    pub fn repository(&self) -> &Arc<dyn SessionRepository> {
        &self.repository
    }

    /// Create and persist a new active session, make it current, and emit
    /// a session-created event.
    ///
    /// An empty name is accepted as-is; the caller owns name semantics. The
    /// requested agent ids become the participant roster in request order.
    pub async fn create_session(&self, request: CreateSessionRequest) -> HubResult<Session> {
        let mut session = Session::new(request.name, request.session_type);
        for agent_id in request.agent_ids {
            session.add_participant(agent_id);
        }
        session.working_directory = request.working_directory;

        let session = self.repository.create_session(session).await?;
        self.set_current(&session.id);
        self.bus
            .publish(&SessionCreatedEvent::new(session.clone()))
            .await;
        Ok(session)
    }

    /// Fetch a session by id.
    ///
    /// An empty id resolves to `None` without touching the repository.
    pub async fn get_session(&self, id: &str) -> HubResult<Option<Session>> {
        if id.is_empty() {
            return Ok(None);
        }
        self.repository.get_session_by_id(id).await
    }

    /// The session most recently created or switched to by this process.
    pub async fn get_current_session(&self) -> HubResult<Option<Session>> {
        let current = {
            let guard = self
                .current
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            guard.clone()
        };
        match current {
            Some(id) => self.repository.get_session_by_id(&id).await,
            None => Ok(None),
        }
    }

    /// Switch the current-session pointer.
    pub fn set_current(&self, session_id: &str) {
        let mut guard = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Some(session_id.to_string());
    }

    /// Up to `count` sessions ordered by recency of activity.
    ///
    /// Non-positive counts return an empty list without touching the
    /// repository.
    pub async fn get_recent_sessions(&self, count: i64) -> HubResult<Vec<Session>> {
        if count <= 0 {
            return Ok(Vec::new());
        }
        self.repository.get_recent_sessions(count as usize).await
    }

    /// Every session currently active.
    pub async fn get_active_sessions(&self) -> HubResult<Vec<Session>> {
        self.repository.get_active_sessions().await
    }

    /// Append `message` to the session's log and emit a message-added event.
    ///
    /// Stamps the message's session id and timestamp; the repository assigns
    /// the sequence number. Session existence is not checked here — the
    /// repository rejects unknown sessions.
    pub async fn add_message(
        &self,
        session_id: &str,
        mut message: AgentMessage,
    ) -> HubResult<AgentMessage> {
        if session_id.is_empty() {
            return Err(HubError::invalid_argument("session id must not be empty"));
        }
        message.session_id = session_id.to_string();
        message.timestamp = Utc::now();

        let stored = self.repository.add_message(session_id, message).await?;
        self.bus
            .publish(&MessageAddedEvent::new(stored.clone()))
            .await;
        Ok(stored)
    }

    /// Merge the given entries into the session's shared context.
    pub async fn update_session_context(
        &self,
        session_id: &str,
        context: HashMap<String, serde_json::Value>,
    ) -> HubResult<()> {
        if session_id.is_empty() {
            return Err(HubError::invalid_argument("session id must not be empty"));
        }
        self.repository
            .update_session_context(session_id, context)
            .await
    }

    /// Mark the session completed and emit a session-ended event.
    ///
    /// Returns `false` for an empty id or an unknown session, without
    /// mutating anything. Ending an already-completed session is idempotent
    /// and still emits the event.
    pub async fn end_session(&self, session_id: &str) -> HubResult<bool> {
        if session_id.is_empty() {
            return Ok(false);
        }
        let mut session = match self.repository.get_session_by_id(session_id).await? {
            Some(session) => session,
            None => return Ok(false),
        };

        session.status = SessionStatus::Completed;
        session.last_activity_at = Utc::now();
        self.repository.update_session(session).await?;
        self.bus.publish(&SessionEndedEvent::new(session_id)).await;
        Ok(true)
    }

    /// Capture the session into a persisted snapshot.
    ///
    /// Agent states are the runtime's to contribute; callers that have them
    /// attach them to the returned snapshot and re-persist.
    pub async fn create_snapshot(
        &self,
        session_id: &str,
        description: impl Into<String>,
    ) -> HubResult<SessionSnapshot> {
        if session_id.is_empty() {
            return Err(HubError::invalid_argument("session id must not be empty"));
        }
        let session = self
            .repository
            .get_session_by_id(session_id)
            .await?
            .ok_or_else(|| HubError::not_found("session", session_id))?;

        let snapshot = SessionSnapshot::capture(&session, description);
        self.repository.create_snapshot(snapshot).await
    }

    /// Re-persist the session captured in `snapshot`, creating it when the
    /// id is unknown and overwriting it otherwise.
    pub async fn restore_snapshot(&self, snapshot: &SessionSnapshot) -> HubResult<Session> {
        let restored = snapshot.session_state.clone();
        let existing = self
            .repository
            .get_session_by_id(&restored.id)
            .await?;
        if existing.is_some() {
            self.repository.update_session(restored.clone()).await?;
        } else {
            self.repository.create_session(restored.clone()).await?;
        }
        Ok(restored)
    }
}
