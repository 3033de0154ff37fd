//! Wire surface: request, response, and push payload shapes.
//!
//! Everything a client sends to or receives from the hubs is defined here,
//! serde-derived and JSON-shaped. Server-initiated pushes are addressed by
//! client method name; the [`methods`] module holds the canonical names so
//! hubs, router, and tests agree on the strings.

use crate::agenthub::agent::{AgentCapabilities, AgentResponse, AgentStatus};
use crate::agenthub::message::Attachment;
use crate::agenthub::orchestrator::OrchestrationStrategy;
use crate::agenthub::session::{Session, SessionType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canonical client method names used for server-initiated pushes.
pub mod methods {
    /// Pushed to a connection right after it connects to the orchestrator
    /// endpoint.
    pub const CONNECTED: &str = "Connected";
    /// Pushed to a caller when a void hub method fails.
    pub const RECEIVE_ERROR: &str = "ReceiveError";
    /// Pushed to the session group when a session is created.
    pub const SESSION_CREATED: &str = "SessionCreated";
    /// Pushed to a caller after successfully joining a session.
    pub const SESSION_JOINED: &str = "SessionJoined";
    /// Streamed agent response chunks.
    pub const RECEIVE_AGENT_RESPONSE: &str = "ReceiveAgentResponse";
    /// Mid-turn tool execution updates.
    pub const TOOL_EXECUTION_UPDATE: &str = "ToolExecutionUpdate";
    /// Agent lifecycle changes forwarded to agent subscribers.
    pub const AGENT_STATUS_UPDATE: &str = "AgentStatusUpdate";
    /// Pushed to the session group when a plan has been created.
    pub const ORCHESTRATION_PLAN_CREATED: &str = "OrchestrationPlanCreated";
    /// Progress ticks while a plan executes.
    pub const ORCHESTRATION_PROGRESS: &str = "OrchestrationProgress";
    /// Terminal result of a plan execution.
    pub const ORCHESTRATION_COMPLETED: &str = "OrchestrationCompleted";
}

/// Client request to create a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    /// Session display name; empty is accepted as-is.
    pub name: String,
    /// Coordination shape of the session.
    pub session_type: SessionType,
    /// Initial participant roster, in order.
    pub agent_ids: Vec<String>,
    /// Optional working directory shared by the participants.
    pub working_directory: Option<String>,
}

/// Response to [`CreateSessionRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionCreatedResponse {
    /// Whether the session was created.
    pub success: bool,
    /// Id of the created session.
    pub session_id: Option<String>,
    /// The created session.
    pub session: Option<Session>,
    /// Failure description when `success` is false.
    pub error: Option<String>,
}

impl SessionCreatedResponse {
    /// Successful response carrying the session.
    pub fn ok(session: Session) -> Self {
        Self {
            success: true,
            session_id: Some(session.id.clone()),
            session: Some(session),
            error: None,
        }
    }

    /// Failed response carrying the error text.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            session_id: None,
            session: None,
            error: Some(error.into()),
        }
    }
}

/// Client request to send a message to one agent within a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMessageRequest {
    /// Session the exchange belongs to.
    pub session_id: String,
    /// Agent addressed by the message.
    pub agent_id: String,
    /// Message body.
    pub content: String,
    /// Files attached to the message.
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// Optional client-side correlation id echoed on every response chunk.
    pub command_id: Option<String>,
}

/// Client request to execute a tool through an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolExecutionRequest {
    /// Agent the tool runs on behalf of.
    pub agent_id: String,
    /// Session context, when the call belongs to one.
    pub session_id: Option<String>,
    /// Tool to execute.
    pub tool_name: String,
    /// JSON arguments for the tool.
    pub arguments: serde_json::Value,
    /// Caller-supplied deadline in milliseconds.
    pub timeout_ms: Option<u64>,
}

/// Response to [`ToolExecutionRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolExecutionResponse {
    /// Whether the tool ran and succeeded.
    pub success: bool,
    /// Tool output on success.
    pub output: Option<serde_json::Value>,
    /// Failure description otherwise.
    pub error: Option<String>,
    /// Wall-clock execution time in milliseconds.
    pub execution_time_ms: u64,
}

/// Client request driving an orchestration across agents in a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationMessageRequest {
    /// Session to orchestrate in.
    pub session_id: String,
    /// Goal message decomposed into the plan.
    pub message: String,
    /// Agents to involve, in order.
    pub agent_ids: Vec<String>,
    /// Plan strategy.
    pub strategy: OrchestrationStrategy,
}

/// One streamed agent response chunk as fanned out to groups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponseDto {
    /// Authoring agent.
    pub agent_id: String,
    /// Owning session.
    pub session_id: String,
    /// The chunk itself.
    pub response: AgentResponse,
    /// Correlation id from the originating request, if any.
    pub command_id: Option<String>,
}

/// Current status and capabilities of one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStatusDto {
    /// Agent id.
    pub agent_id: String,
    /// Current lifecycle state.
    pub status: AgentStatus,
    /// Advertised capabilities.
    pub capabilities: AgentCapabilities,
}

/// Error pushed to a caller when a void hub method fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Failure description.
    pub error: String,
    /// Agent involved, when the failure is agent-scoped.
    pub agent_id: Option<String>,
    /// Session involved, when the failure is session-scoped.
    pub session_id: Option<String>,
}

impl ErrorResponse {
    /// Error without agent or session scope.
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            agent_id: None,
            session_id: None,
        }
    }

    /// Attach the agent scope (builder pattern).
    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    /// Attach the session scope (builder pattern).
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// Greeting pushed to a freshly connected client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionInfo {
    /// Transport-assigned connection id.
    pub connection_id: String,
    /// Server time the connection was accepted.
    pub connected_at: DateTime<Utc>,
}
