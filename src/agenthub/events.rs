//! Typed event payloads published on the [`EventBus`](crate::event_bus::EventBus).
//!
//! Every event carries the same base shape — a unique `id`, a `timestamp`,
//! and the `source` component that published it — plus a typed payload.
//! Components publish these instead of holding references to each other: the
//! session manager announces log changes, the agent runtime announces status
//! transitions, and the orchestrator announces step completions. The hub
//! layer subscribes and forwards what clients need to see.

use crate::agenthub::agent::AgentStatus;
use crate::agenthub::message::AgentMessage;
use crate::agenthub::orchestrator::OrchestrationProgress;
use crate::agenthub::session::Session;
use chrono::{DateTime, Utc};
use uuid::Uuid;

fn event_id() -> String {
    Uuid::new_v4().to_string()
}

/// A session was created and persisted.
#[derive(Debug, Clone)]
pub struct SessionCreatedEvent {
    /// Unique event id.
    pub id: String,
    /// Publication time.
    pub timestamp: DateTime<Utc>,
    /// Publishing component.
    pub source: &'static str,
    /// The freshly created session.
    pub session: Session,
}

impl SessionCreatedEvent {
    /// Stamp a new event for the given session.
    pub fn new(session: Session) -> Self {
        Self {
            id: event_id(),
            timestamp: Utc::now(),
            source: "session_manager",
            session,
        }
    }
}

/// A session transitioned to its completed state.
#[derive(Debug, Clone)]
pub struct SessionEndedEvent {
    /// Unique event id.
    pub id: String,
    /// Publication time.
    pub timestamp: DateTime<Utc>,
    /// Publishing component.
    pub source: &'static str,
    /// Id of the ended session.
    pub session_id: String,
}

impl SessionEndedEvent {
    /// Stamp a new event for the given session id.
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            id: event_id(),
            timestamp: Utc::now(),
            source: "session_manager",
            session_id: session_id.into(),
        }
    }
}

/// A message was appended to a session's log.
#[derive(Debug, Clone)]
pub struct MessageAddedEvent {
    /// Unique event id.
    pub id: String,
    /// Publication time.
    pub timestamp: DateTime<Utc>,
    /// Publishing component.
    pub source: &'static str,
    /// The appended message, with its assigned sequence number.
    pub message: AgentMessage,
}

impl MessageAddedEvent {
    /// Stamp a new event for the given message.
    pub fn new(message: AgentMessage) -> Self {
        Self {
            id: event_id(),
            timestamp: Utc::now(),
            source: "session_manager",
            message,
        }
    }
}

/// An agent moved between lifecycle states.
#[derive(Debug, Clone)]
pub struct AgentStatusChangedEvent {
    /// Unique event id.
    pub id: String,
    /// Publication time.
    pub timestamp: DateTime<Utc>,
    /// Publishing component.
    pub source: &'static str,
    /// Id of the agent that transitioned.
    pub agent_id: String,
    /// State before the transition.
    pub old_status: AgentStatus,
    /// State after the transition.
    pub new_status: AgentStatus,
}

impl AgentStatusChangedEvent {
    /// Stamp a new event for the given transition.
    pub fn new(agent_id: impl Into<String>, old_status: AgentStatus, new_status: AgentStatus) -> Self {
        Self {
            id: event_id(),
            timestamp: Utc::now(),
            source: "agent_runtime",
            agent_id: agent_id.into(),
            old_status,
            new_status,
        }
    }
}

/// A plan step reached a terminal state.
#[derive(Debug, Clone)]
pub struct OrchestrationStepCompletedEvent {
    /// Unique event id.
    pub id: String,
    /// Publication time.
    pub timestamp: DateTime<Utc>,
    /// Publishing component.
    pub source: &'static str,
    /// Owning plan id.
    pub plan_id: String,
    /// Session the plan runs in.
    pub session_id: String,
    /// Id of the completed step.
    pub step_id: String,
    /// Position of the step in the plan.
    pub step_order: usize,
    /// Agent that executed the step.
    pub agent_id: String,
    /// Whether the step completed successfully.
    pub success: bool,
}

/// Progress tick emitted after each step transition of a running plan.
#[derive(Debug, Clone)]
pub struct OrchestrationProgressEvent {
    /// Unique event id.
    pub id: String,
    /// Publication time.
    pub timestamp: DateTime<Utc>,
    /// Publishing component.
    pub source: &'static str,
    /// Session the plan runs in.
    pub session_id: String,
    /// Snapshot of the plan's progress.
    pub progress: OrchestrationProgress,
}

impl OrchestrationProgressEvent {
    /// Stamp a new progress event.
    pub fn new(session_id: impl Into<String>, progress: OrchestrationProgress) -> Self {
        Self {
            id: event_id(),
            timestamp: Utc::now(),
            source: "orchestrator",
            session_id: session_id.into(),
            progress,
        }
    }
}

impl OrchestrationStepCompletedEvent {
    /// Stamp a new step-completed event.
    pub fn new(
        plan_id: impl Into<String>,
        session_id: impl Into<String>,
        step_id: impl Into<String>,
        step_order: usize,
        agent_id: impl Into<String>,
        success: bool,
    ) -> Self {
        Self {
            id: event_id(),
            timestamp: Utc::now(),
            source: "orchestrator",
            plan_id: plan_id.into(),
            session_id: session_id.into(),
            step_id: step_id.into(),
            step_order,
            agent_id: agent_id.into(),
            success,
        }
    }
}
