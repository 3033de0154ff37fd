//! Client-facing agent endpoint.
//!
//! The [`AgentHub`] exposes the agent-side method surface: sending a message
//! to an agent and streaming the response to subscribers, executing a tool,
//! and subscribing to an agent's status and output. It is transport-facing
//! glue — session bookkeeping lives in the
//! [`SessionManager`](crate::session_manager::SessionManager), agent
//! behavior in the [`Agent`](crate::agent::Agent) runtime, and delivery in
//! the [`MessageRouter`](crate::message_router::MessageRouter).
//!
//! # Error boundary
//!
//! Hub methods never let an error escape into the transport. Void methods
//! push a `ReceiveError` to the caller; response-returning methods return a
//! `success = false` response.

use crate::agenthub::agent::AgentResponseType;
use crate::agenthub::agent_registry::AgentRegistry;
use crate::agenthub::connection_manager::ConnectionManager;
use crate::agenthub::dto::{
    methods, AgentMessageRequest, AgentStatusDto, ErrorResponse, ToolExecutionRequest,
    ToolExecutionResponse,
};
use crate::agenthub::error::HubError;
use crate::agenthub::event_bus::{EventBus, EventSubscriber};
use crate::agenthub::events::AgentStatusChangedEvent;
use crate::agenthub::message::{AgentMessage, MessageRole, ToolCall};
use crate::agenthub::message_router::MessageRouter;
use crate::agenthub::session_manager::SessionManager;
use crate::agenthub::tool_protocol::ToolExecutionContext;
use crate::agenthub::transport::{agent_group, GroupTransport};
use async_trait::async_trait;
use futures_util::StreamExt;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Agent-side hub endpoint.
pub struct AgentHub {
    sessions: Arc<SessionManager>,
    registry: Arc<AgentRegistry>,
    router: Arc<MessageRouter>,
    connections: Arc<ConnectionManager>,
    transport: Arc<dyn GroupTransport>,
    bus: Arc<EventBus>,
}

impl AgentHub {
    /// Create the hub over its collaborators.
    pub fn new(
        sessions: Arc<SessionManager>,
        registry: Arc<AgentRegistry>,
        router: Arc<MessageRouter>,
        connections: Arc<ConnectionManager>,
        transport: Arc<dyn GroupTransport>,
        bus: Arc<EventBus>,
    ) -> Arc<Self> {
        let hub = Arc::new(Self {
            sessions,
            registry,
            router,
            connections,
            transport,
            bus,
        });
        hub.attach_status_forwarder();
        hub
    }

    /// Subscribe the hub to agent status changes so they are forwarded to
    /// the corresponding agent group as `AgentStatusUpdate` pushes.
    fn attach_status_forwarder(self: &Arc<Self>) {
        let forwarder = Arc::new(StatusForwarder {
            registry: Arc::clone(&self.registry),
            transport: Arc::clone(&self.transport),
        });
        self.bus.subscribe::<AgentStatusChangedEvent>(forwarder);
    }

    /// Push a `ReceiveError` to the caller, logging if even that fails.
    async fn push_error(&self, connection_id: &str, error: ErrorResponse) {
        let payload = match serde_json::to_value(&error) {
            Ok(payload) => payload,
            Err(err) => {
                log::error!("failed to encode error response: {}", err);
                return;
            }
        };
        if let Err(err) = self
            .transport
            .send_to_connection(connection_id, methods::RECEIVE_ERROR, payload)
            .await
        {
            log::error!(
                "failed to push error to connection {}: {}",
                connection_id,
                err
            );
        }
    }

    /// Send a user message to an agent and stream the response.
    ///
    /// The user message is appended to the session log first; each streamed
    /// chunk is fanned out to the agent group and the session group; on
    /// completion one aggregated assistant message (with all tool calls
    /// attached) is appended to the log. Any failure is pushed to the caller
    /// as `ReceiveError` and nothing escapes.
    pub async fn send_agent_message(
        &self,
        connection_id: &str,
        request: AgentMessageRequest,
        cancellation: CancellationToken,
    ) {
        let session = match self.sessions.get_session(&request.session_id).await {
            Ok(Some(session)) => session,
            Ok(None) => {
                self.push_error(
                    connection_id,
                    ErrorResponse::new(
                        HubError::not_found("session", &request.session_id).to_string(),
                    )
                    .with_session(request.session_id.clone()),
                )
                .await;
                return;
            }
            Err(err) => {
                self.push_error(
                    connection_id,
                    ErrorResponse::new(err.to_string()).with_session(request.session_id.clone()),
                )
                .await;
                return;
            }
        };

        let user_message = AgentMessage::user(&session.id, request.content.clone())
            .with_attachments(request.attachments.clone());
        if let Err(err) = self.sessions.add_message(&session.id, user_message).await {
            self.push_error(
                connection_id,
                ErrorResponse::new(err.to_string()).with_session(session.id.clone()),
            )
            .await;
            return;
        }

        let agent = match self.registry.get_agent(&request.agent_id).await {
            Some(agent) => agent,
            None => {
                self.push_error(
                    connection_id,
                    ErrorResponse::new(
                        HubError::not_found("agent", &request.agent_id).to_string(),
                    )
                    .with_agent(request.agent_id.clone())
                    .with_session(session.id.clone()),
                )
                .await;
                return;
            }
        };

        let outbound = AgentMessage::user(&session.id, request.content.clone())
            .with_attachments(request.attachments);
        let mut stream = match agent.send_message_stream(&outbound, cancellation).await {
            Ok(stream) => stream,
            Err(err) => {
                self.push_error(
                    connection_id,
                    ErrorResponse::new(err.to_string())
                        .with_agent(request.agent_id.clone())
                        .with_session(session.id.clone()),
                )
                .await;
                return;
            }
        };

        // Single consumer: drain the stream, fan each chunk out, and fold
        // the assistant text into one aggregated log record.
        let mut aggregated = String::new();
        let mut tool_calls: Vec<ToolCall> = Vec::new();
        let mut completed = false;
        while let Some(item) = stream.next().await {
            match item {
                Ok(chunk) => {
                    if chunk.role == MessageRole::Assistant
                        && chunk.response_type == AgentResponseType::Text
                    {
                        aggregated.push_str(&chunk.content);
                    }
                    tool_calls.extend(chunk.tool_calls.iter().cloned());
                    completed = chunk.is_complete;
                    self.router
                        .route_agent_message(
                            &session.id,
                            &request.agent_id,
                            &chunk,
                            request.command_id.as_deref(),
                        )
                        .await;
                    if completed {
                        break;
                    }
                }
                Err(err) => {
                    self.push_error(
                        connection_id,
                        ErrorResponse::new(err.to_string())
                            .with_agent(request.agent_id.clone())
                            .with_session(session.id.clone()),
                    )
                    .await;
                    return;
                }
            }
        }

        // Partial content from a cancelled turn is retained as well; only a
        // turn that produced nothing leaves no assistant record.
        if completed && !(aggregated.is_empty() && tool_calls.is_empty()) {
            let assistant =
                AgentMessage::assistant(&session.id, &request.agent_id, aggregated)
                    .with_tool_calls(tool_calls);
            if let Err(err) = self.sessions.add_message(&session.id, assistant).await {
                log::error!(
                    "failed to append assistant message for agent {} in session {}: {}",
                    request.agent_id,
                    session.id,
                    err
                );
            }
        }
    }

    /// Execute a tool through an agent and answer the caller directly.
    ///
    /// Every failure — unknown agent, rejected approval, adapter error — is
    /// folded into a `success = false` response; this method does not push
    /// `ReceiveError`.
    pub async fn execute_tool(
        &self,
        _connection_id: &str,
        request: ToolExecutionRequest,
        cancellation: CancellationToken,
    ) -> ToolExecutionResponse {
        let agent = match self.registry.get_agent(&request.agent_id).await {
            Some(agent) => agent,
            None => {
                return ToolExecutionResponse {
                    success: false,
                    output: None,
                    error: Some(HubError::not_found("agent", &request.agent_id).to_string()),
                    execution_time_ms: 0,
                }
            }
        };

        let mut context = ToolExecutionContext::for_agent(&request.agent_id);
        if let Some(session_id) = &request.session_id {
            context = context.with_session(session_id.clone());
            if let Ok(Some(session)) = self.sessions.get_session(session_id).await {
                if let Some(dir) = session.working_directory {
                    context = context.with_working_directory(dir);
                }
            }
        }

        let call = ToolCall::new(request.tool_name.clone(), request.arguments.clone());
        let timeout = request.timeout_ms.map(Duration::from_millis);
        let outcome = agent
            .execute_tool(&call, &context, timeout, cancellation)
            .await;

        let response = match outcome {
            Ok(result) => ToolExecutionResponse {
                success: result.success,
                output: if result.success {
                    Some(result.output)
                } else {
                    None
                },
                error: result.error,
                execution_time_ms: result.execution_time_ms,
            },
            Err(err) => ToolExecutionResponse {
                success: false,
                output: None,
                error: Some(err.to_string()),
                execution_time_ms: 0,
            },
        };

        if let Some(session_id) = &request.session_id {
            self.router
                .route_tool_execution_update(
                    session_id,
                    &request.agent_id,
                    serde_json::json!({
                        "agent_id": request.agent_id,
                        "tool_name": request.tool_name,
                        "success": response.success,
                        "error": response.error,
                    }),
                )
                .await;
        }

        response
    }

    /// Join the caller to an agent's group and push the agent's current
    /// status.
    pub async fn subscribe_to_agent(&self, connection_id: &str, agent_id: &str) {
        let agent = match self.registry.get_agent(agent_id).await {
            Some(agent) => agent,
            None => {
                self.push_error(
                    connection_id,
                    ErrorResponse::new(HubError::not_found("agent", agent_id).to_string())
                        .with_agent(agent_id.to_string()),
                )
                .await;
                return;
            }
        };

        if let Err(err) = self
            .transport
            .add_to_group(&agent_group(agent_id), connection_id)
            .await
        {
            self.push_error(
                connection_id,
                ErrorResponse::new(err.to_string()).with_agent(agent_id.to_string()),
            )
            .await;
            return;
        }

        let status = AgentStatusDto {
            agent_id: agent_id.to_string(),
            status: agent.status(),
            capabilities: agent.capabilities().clone(),
        };
        match serde_json::to_value(&status) {
            Ok(payload) => {
                if let Err(err) = self
                    .transport
                    .send_to_connection(connection_id, methods::AGENT_STATUS_UPDATE, payload)
                    .await
                {
                    log::error!(
                        "failed to push status of agent {} to connection {}: {}",
                        agent_id,
                        connection_id,
                        err
                    );
                }
            }
            Err(err) => log::error!("failed to encode status of agent {}: {}", agent_id, err),
        }
    }

    /// Remove the caller from an agent's group.
    pub async fn unsubscribe_from_agent(&self, connection_id: &str, agent_id: &str) {
        if let Err(err) = self
            .transport
            .remove_from_group(&agent_group(agent_id), connection_id)
            .await
        {
            log::error!(
                "failed to remove connection {} from group of agent {}: {}",
                connection_id,
                agent_id,
                err
            );
        }
    }

    /// Connection bookkeeping shared with the orchestrator endpoint.
    pub fn connections(&self) -> &Arc<ConnectionManager> {
        &self.connections
    }
}

/// Bus subscriber forwarding agent status changes to agent groups.
struct StatusForwarder {
    registry: Arc<AgentRegistry>,
    transport: Arc<dyn GroupTransport>,
}

#[async_trait]
impl EventSubscriber<AgentStatusChangedEvent> for StatusForwarder {
    async fn handle(
        &self,
        event: &AgentStatusChangedEvent,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let capabilities = match self.registry.get_agent(&event.agent_id).await {
            Some(agent) => agent.capabilities().clone(),
            // Transitions can fire before registration completes (initialize
            // runs first); forward them with default capabilities.
            None => Default::default(),
        };
        let dto = AgentStatusDto {
            agent_id: event.agent_id.clone(),
            status: event.new_status,
            capabilities,
        };
        self.transport
            .send_to_group(
                &agent_group(&event.agent_id),
                methods::AGENT_STATUS_UPDATE,
                serde_json::to_value(&dto)?,
            )
            .await
    }
}
