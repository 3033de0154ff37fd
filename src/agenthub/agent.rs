//! Agent runtime.
//!
//! An [`Agent`] is the process-wide runtime entity behind one agent id: it
//! owns the status machine, wraps a provider-specific [`AgentAdapter`],
//! dispatches tool calls through the [`ToolRegistry`], and announces every
//! status transition on the [`EventBus`]. Agents know nothing about
//! transports or subscribers — the hub layer consumes their streams and fans
//! chunks out.
//!
//! # Status machine
//!
//! ```text
//!            initialize (ok)
//! Uninitialized ────────────► Initializing ──► Ready
//!      ▲                            │ fail
//!      │ reset()                    ▼
//!      └─────────────────────────  Error  ◄── fatal adapter failure
//!
//! Ready ◄── send / tool done ──► Processing
//!   │                                │ cancel
//!   └── shutdown ──► Shutdown        └──► Ready
//! ```
//!
//! Every transition is published as an
//! [`AgentStatusChangedEvent`](crate::events::AgentStatusChangedEvent).
//!
//! # Streaming
//!
//! [`Agent::send_message_stream`] returns a lazy, finite sequence of
//! [`AgentResponse`] chunks. The stream is pull-based: the next chunk is
//! produced only after the consumer accepted the previous one, which is the
//! whole back-pressure story — multiplexing to many subscribers is the hub's
//! job, not the agent's. Cancelling the supplied token ends the stream
//! cooperatively (well under 250 ms: the driver races the token against the
//! next chunk) with a final `is_complete` chunk carrying a `cancelled`
//! metadata marker, and the agent returns to `Ready`.

use crate::agenthub::error::{HubError, HubResult};
use crate::agenthub::event_bus::EventBus;
use crate::agenthub::events::AgentStatusChangedEvent;
use crate::agenthub::message::{AgentMessage, MessageRole, ToolCall, ToolResult};
use crate::agenthub::tool_protocol::{
    ApprovalHandler, StaticApprovalHandler, ToolExecutionContext, ToolRegistry,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Lifecycle state of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentStatus {
    Uninitialized,
    Initializing,
    Ready,
    Processing,
    Error,
    Shutdown,
}

/// What an agent's adapter is able to do.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCapabilities {
    /// Whether the adapter produces incremental chunks.
    pub supports_streaming: bool,
    /// Whether the adapter understands tool calls.
    pub supports_tools: bool,
    /// Whether the adapter may touch the session working directory.
    pub supports_file_operations: bool,
    /// Models the adapter can be pointed at.
    pub supported_models: Vec<String>,
}

impl Default for AgentCapabilities {
    fn default() -> Self {
        Self {
            supports_streaming: true,
            supports_tools: true,
            supports_file_operations: false,
            supported_models: Vec::new(),
        }
    }
}

/// Kind of content carried by one [`AgentResponse`] chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentResponseType {
    /// Assistant text (possibly partial).
    Text,
    /// A tool invocation the agent performed mid-turn.
    ToolInvocation,
    /// The result of a mid-turn tool invocation.
    ToolOutput,
}

/// One element of an agent's response stream.
///
/// A completed turn produces at least one chunk; the final chunk carries
/// `is_complete = true`. When a turn interleaves tool use, text chunks of
/// role [`MessageRole::Assistant`] alternate with synthetic chunks of role
/// [`MessageRole::Tool`] describing the invocations and their results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    /// Chunk content (text delta or tool description).
    pub content: String,
    /// Kind of content in this chunk.
    pub response_type: AgentResponseType,
    /// Role the chunk plays when folded into the session log.
    pub role: MessageRole,
    /// True exactly on the terminal chunk of a turn.
    pub is_complete: bool,
    /// Production time.
    pub timestamp: DateTime<Utc>,
    /// Free-form chunk metadata (`cancelled: true` on a cancelled turn).
    pub metadata: HashMap<String, serde_json::Value>,
    /// Tool calls attached to this chunk.
    pub tool_calls: Vec<ToolCall>,
}

impl AgentResponse {
    /// A partial assistant text chunk.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            response_type: AgentResponseType::Text,
            role: MessageRole::Assistant,
            is_complete: false,
            timestamp: Utc::now(),
            metadata: HashMap::new(),
            tool_calls: Vec::new(),
        }
    }

    /// The terminal chunk of a successful turn.
    pub fn completed(content: impl Into<String>) -> Self {
        let mut chunk = Self::text(content);
        chunk.is_complete = true;
        chunk
    }

    /// A synthetic chunk describing a mid-turn tool invocation.
    pub fn tool_invocation(call: ToolCall) -> Self {
        Self {
            content: format!("Invoking tool {}", call.tool_name),
            response_type: AgentResponseType::ToolInvocation,
            role: MessageRole::Tool,
            is_complete: false,
            timestamp: Utc::now(),
            metadata: HashMap::new(),
            tool_calls: vec![call],
        }
    }

    /// The terminal chunk of a cancelled turn.
    pub fn cancelled() -> Self {
        let mut chunk = Self::completed(String::new());
        chunk
            .metadata
            .insert("cancelled".to_string(), serde_json::Value::Bool(true));
        chunk
    }

    /// Whether this chunk carries the cancelled marker.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self.metadata.get("cancelled"),
            Some(serde_json::Value::Bool(true))
        )
    }
}

/// Failure reported by an [`AgentAdapter`].
///
/// `fatal` marks failures after which the adapter cannot continue; the
/// runtime moves the agent to [`AgentStatus::Error`] in that case and back
/// to [`AgentStatus::Ready`] otherwise.
#[derive(Debug, Clone)]
pub struct AdapterError {
    /// Human-readable description.
    pub message: String,
    /// Whether the owning agent must enter its error state.
    pub fatal: bool,
}

impl AdapterError {
    /// A transient failure; the agent stays usable.
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fatal: false,
        }
    }

    /// A fatal failure; the agent enters its error state.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fatal: true,
        }
    }
}

impl fmt::Display for AdapterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for AdapterError {}

/// Lazy, finite sequence of response chunks produced by a streaming send.
pub type AgentResponseStream =
    Pin<Box<dyn Stream<Item = Result<AgentResponse, AdapterError>> + Send>>;

/// Provider-specific collaborator wrapped by the [`Agent`] runtime.
///
/// Implementations translate the message into the provider's wire format and
/// surface the reply. They never touch the status machine, the event bus, or
/// the transport — that is the runtime's job.
#[async_trait]
pub trait AgentAdapter: Send + Sync {
    /// Identifier of the adapter family (e.g. `"mock"`, `"anthropic"`).
    fn adapter_type(&self) -> &str;

    /// Connect/authenticate against the provider.
    async fn initialize(&self) -> Result<(), AdapterError> {
        Ok(())
    }

    /// Release provider resources.
    async fn shutdown(&self) -> Result<(), AdapterError> {
        Ok(())
    }

    /// One full request/response turn.
    async fn send_message(
        &self,
        message: &AgentMessage,
        cancellation: CancellationToken,
    ) -> Result<AgentResponse, AdapterError>;

    /// One streaming turn.
    ///
    /// The default implementation performs a plain send and wraps the reply
    /// in a single-chunk stream, for adapters without streaming support.
    async fn send_message_stream(
        &self,
        message: &AgentMessage,
        cancellation: CancellationToken,
    ) -> Result<AgentResponseStream, AdapterError> {
        let mut response = self.send_message(message, cancellation).await?;
        response.is_complete = true;
        Ok(Box::pin(stream::iter(vec![Ok(response)])))
    }
}

/// Shared mutable core of an agent: the status machine and activity clock.
///
/// Split out of [`Agent`] so the stream driver can keep transitioning the
/// status after the borrow of the agent ends.
#[derive(Clone)]
struct StatusCell {
    agent_id: Arc<str>,
    status: Arc<RwLock<AgentStatus>>,
    last_activity_at: Arc<RwLock<DateTime<Utc>>>,
    bus: Arc<EventBus>,
}

impl StatusCell {
    fn new(agent_id: &str, bus: Arc<EventBus>) -> Self {
        Self {
            agent_id: Arc::from(agent_id),
            status: Arc::new(RwLock::new(AgentStatus::Uninitialized)),
            last_activity_at: Arc::new(RwLock::new(Utc::now())),
            bus,
        }
    }

    fn current(&self) -> AgentStatus {
        *self
            .status
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn touch(&self) {
        let mut guard = self
            .last_activity_at
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Utc::now();
    }

    fn last_activity(&self) -> DateTime<Utc> {
        *self
            .last_activity_at
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Swap the status and publish the transition when it changed.
    async fn transition(&self, new_status: AgentStatus) {
        let old_status = {
            let mut guard = self
                .status
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            std::mem::replace(&mut *guard, new_status)
        };
        if old_status != new_status {
            self.bus
                .publish(&AgentStatusChangedEvent::new(
                    self.agent_id.to_string(),
                    old_status,
                    new_status,
                ))
                .await;
        }
    }
}

/// Runtime entity behind one agent id.
///
/// Exactly one instance per id lives in the
/// [`AgentRegistry`](crate::agent_registry::AgentRegistry), shared as
/// `Arc<Agent>`.
pub struct Agent {
    /// Stable identifier referenced by sessions and plans.
    pub id: String,
    /// Human-readable display name.
    pub name: String,
    /// Adapter family identifier (e.g. `"mock"`, `"anthropic"`).
    pub agent_type: String,
    /// Opaque configuration supplied at creation.
    pub configuration: serde_json::Value,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    capabilities: AgentCapabilities,
    cell: StatusCell,
    adapter: Arc<dyn AgentAdapter>,
    tools: Arc<ToolRegistry>,
    approvals: Arc<dyn ApprovalHandler>,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("agent_type", &self.agent_type)
            .field("configuration", &self.configuration)
            .field("created_at", &self.created_at)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

impl Agent {
    /// Create an uninitialized agent over the given adapter.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        adapter: Arc<dyn AgentAdapter>,
        bus: Arc<EventBus>,
    ) -> Self {
        let id = id.into();
        let cell = StatusCell::new(&id, bus);
        Self {
            name: name.into(),
            agent_type: adapter.adapter_type().to_string(),
            configuration: serde_json::Value::Null,
            created_at: Utc::now(),
            capabilities: AgentCapabilities::default(),
            cell,
            adapter,
            tools: Arc::new(ToolRegistry::new()),
            approvals: StaticApprovalHandler::allow_all(),
            id,
        }
    }

    /// Override the advertised capabilities (builder pattern).
    pub fn with_capabilities(mut self, capabilities: AgentCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Attach opaque configuration (builder pattern).
    pub fn with_configuration(mut self, configuration: serde_json::Value) -> Self {
        self.configuration = configuration;
        self
    }

    /// Grant access to a shared tool registry (builder pattern).
    pub fn with_tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = tools;
        self
    }

    /// Attach the approval collaborator gating restricted tools (builder
    /// pattern).
    pub fn with_approvals(mut self, approvals: Arc<dyn ApprovalHandler>) -> Self {
        self.approvals = approvals;
        self
    }

    /// Advertised capabilities.
    pub fn capabilities(&self) -> &AgentCapabilities {
        &self.capabilities
    }

    /// Current lifecycle state.
    pub fn status(&self) -> AgentStatus {
        self.cell.current()
    }

    /// Last time the agent completed an operation.
    pub fn last_activity_at(&self) -> DateTime<Utc> {
        self.cell.last_activity()
    }

    /// The tool registry this agent dispatches through.
    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    /// Initialize the adapter and become `Ready`.
    ///
    /// Legal from `Uninitialized` and from `Error` (after [`reset`](Agent::reset)
    /// or directly); a failed initialization leaves the agent in `Error`.
    pub async fn initialize(&self) -> HubResult<()> {
        match self.status() {
            AgentStatus::Uninitialized | AgentStatus::Error => {}
            status => {
                return Err(HubError::PreconditionFailed(format!(
                    "agent {} cannot initialize from {:?}",
                    self.id, status
                )))
            }
        }

        self.cell.transition(AgentStatus::Initializing).await;
        match self.adapter.initialize().await {
            Ok(()) => {
                self.cell.transition(AgentStatus::Ready).await;
                self.cell.touch();
                Ok(())
            }
            Err(err) => {
                log::error!("agent {} failed to initialize: {}", self.id, err);
                self.cell.transition(AgentStatus::Error).await;
                Err(HubError::AdapterFailure {
                    message: err.message,
                    fatal: true,
                })
            }
        }
    }

    /// Clear the error state back to `Uninitialized` so the agent can be
    /// initialized again.
    pub async fn reset(&self) -> HubResult<()> {
        match self.status() {
            AgentStatus::Error => {
                self.cell.transition(AgentStatus::Uninitialized).await;
                Ok(())
            }
            status => Err(HubError::PreconditionFailed(format!(
                "agent {} cannot reset from {:?}",
                self.id, status
            ))),
        }
    }

    /// Shut the adapter down and become `Shutdown`. Terminal.
    pub async fn shutdown(&self) {
        if let Err(err) = self.adapter.shutdown().await {
            log::warn!("agent {} shutdown reported: {}", self.id, err);
        }
        self.cell.transition(AgentStatus::Shutdown).await;
    }

    fn require_ready(&self) -> HubResult<()> {
        match self.status() {
            AgentStatus::Ready => Ok(()),
            status => Err(HubError::PreconditionFailed(format!(
                "agent {} is {:?}, not Ready",
                self.id, status
            ))),
        }
    }

    /// One full request/response turn, for callers that do not need
    /// streaming.
    pub async fn send_message(
        &self,
        message: &AgentMessage,
        cancellation: CancellationToken,
    ) -> HubResult<AgentResponse> {
        self.require_ready()?;
        self.cell.transition(AgentStatus::Processing).await;

        let outcome = tokio::select! {
            _ = cancellation.cancelled() => {
                self.cell.transition(AgentStatus::Ready).await;
                return Err(HubError::Cancelled(format!(
                    "send to agent {} was cancelled",
                    self.id
                )));
            }
            result = self.adapter.send_message(message, cancellation.clone()) => result,
        };

        match outcome {
            Ok(response) => {
                self.cell.transition(AgentStatus::Ready).await;
                self.cell.touch();
                Ok(response)
            }
            Err(err) => {
                let fatal = err.fatal;
                log::error!("agent {} send failed: {}", self.id, err);
                self.cell
                    .transition(if fatal {
                        AgentStatus::Error
                    } else {
                        AgentStatus::Ready
                    })
                    .await;
                Err(HubError::AdapterFailure {
                    message: err.message,
                    fatal,
                })
            }
        }
    }

    /// One streaming turn.
    ///
    /// The returned stream drives the status machine: the agent is
    /// `Processing` while chunks flow and returns to `Ready` on the terminal
    /// chunk, on cancellation, and on a non-fatal failure. The consumer is
    /// expected to drain the stream to completion.
    pub async fn send_message_stream(
        &self,
        message: &AgentMessage,
        cancellation: CancellationToken,
    ) -> HubResult<AgentResponseStream> {
        self.require_ready()?;
        self.cell.transition(AgentStatus::Processing).await;

        let inner_stream = match self
            .adapter
            .send_message_stream(message, cancellation.clone())
            .await
        {
            Ok(stream) => stream,
            Err(err) => {
                let fatal = err.fatal;
                log::error!("agent {} stream start failed: {}", self.id, err);
                self.cell
                    .transition(if fatal {
                        AgentStatus::Error
                    } else {
                        AgentStatus::Ready
                    })
                    .await;
                return Err(HubError::AdapterFailure {
                    message: err.message,
                    fatal,
                });
            }
        };

        let cell = self.cell.clone();
        let driven = stream::unfold(
            (inner_stream, cell, cancellation, false),
            |(mut inner, cell, token, finished)| async move {
                if finished {
                    return None;
                }
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        cell.transition(AgentStatus::Ready).await;
                        Some((Ok(AgentResponse::cancelled()), (inner, cell, token, true)))
                    }
                    next = inner.next() => match next {
                        Some(Ok(chunk)) => {
                            let terminal = chunk.is_complete;
                            if terminal {
                                cell.transition(AgentStatus::Ready).await;
                                cell.touch();
                            }
                            Some((Ok(chunk), (inner, cell, token, terminal)))
                        }
                        Some(Err(err)) => {
                            let fatal = err.fatal;
                            log::error!("agent {} stream failed: {}", cell.agent_id, err);
                            cell.transition(if fatal { AgentStatus::Error } else { AgentStatus::Ready })
                                .await;
                            Some((Err(err), (inner, cell, token, true)))
                        }
                        None => {
                            // Adapter ended without a terminal chunk; recover.
                            cell.transition(AgentStatus::Ready).await;
                            None
                        }
                    }
                }
            },
        );

        Ok(Box::pin(driven))
    }

    /// Execute a tool on behalf of this agent.
    ///
    /// The call is dispatched through the agent's [`ToolRegistry`] with the
    /// agent's approval collaborator and the caller's deadline; see
    /// [`ToolRegistry::execute`] for the failure surface.
    pub async fn execute_tool(
        &self,
        call: &ToolCall,
        context: &ToolExecutionContext,
        timeout: Option<Duration>,
        cancellation: CancellationToken,
    ) -> HubResult<ToolResult> {
        match self.status() {
            AgentStatus::Error | AgentStatus::Shutdown | AgentStatus::Uninitialized => {
                return Err(HubError::PreconditionFailed(format!(
                    "agent {} is {:?} and cannot execute tools",
                    self.id,
                    self.status()
                )))
            }
            _ => {}
        }
        if !self.capabilities.supports_tools {
            return Err(HubError::PreconditionFailed(format!(
                "agent {} does not support tools",
                self.id
            )));
        }

        let was_ready = self.status() == AgentStatus::Ready;
        if was_ready {
            self.cell.transition(AgentStatus::Processing).await;
        }

        let result = self
            .tools
            .execute(call, context, &self.approvals, timeout, cancellation)
            .await;

        if was_ready {
            self.cell.transition(AgentStatus::Ready).await;
        }
        self.cell.touch();
        result
    }
}

/// Summary of a registered agent for listings and status pushes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInfo {
    /// Stable identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Adapter family identifier.
    pub agent_type: String,
    /// Current lifecycle state.
    pub status: AgentStatus,
    /// Advertised capabilities.
    pub capabilities: AgentCapabilities,
}

impl AgentInfo {
    /// Capture the given agent.
    pub fn from_agent(agent: &Agent) -> Self {
        Self {
            id: agent.id.clone(),
            name: agent.name.clone(),
            agent_type: agent.agent_type.clone(),
            status: agent.status(),
            capabilities: agent.capabilities().clone(),
        }
    }
}
