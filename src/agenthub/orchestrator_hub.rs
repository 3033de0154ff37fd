//! Client-facing orchestrator endpoint.
//!
//! The [`OrchestratorHub`] exposes session membership and orchestration:
//! creating and joining sessions, leaving them, and driving a multi-agent
//! plan from a single message. Plan progress is pushed to the session group
//! after every step transition and also published on the
//! [`EventBus`](crate::event_bus::EventBus), so in-process observers and
//! transport subscribers see the same ticks.
//!
//! Orchestration runs are session-scoped: starting a new run for a session
//! cancels the previous one, and
//! [`OrchestratorHub::cancel_orchestration`] cancels without replacing.

use crate::agenthub::connection_manager::ConnectionManager;
use crate::agenthub::dto::{
    methods, ConnectionInfo, CreateSessionRequest, ErrorResponse, OrchestrationMessageRequest,
    SessionCreatedResponse,
};
use crate::agenthub::error::HubError;
use crate::agenthub::event_bus::EventBus;
use crate::agenthub::events::OrchestrationProgressEvent;
use crate::agenthub::message::AgentMessage;
use crate::agenthub::message_router::MessageRouter;
use crate::agenthub::orchestrator::{
    OrchestrationProgress, Orchestrator, PlanRequest, ProgressSink,
};
use crate::agenthub::session_manager::SessionManager;
use crate::agenthub::transport::{session_group, GroupTransport};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Orchestrator-side hub endpoint.
pub struct OrchestratorHub {
    sessions: Arc<SessionManager>,
    orchestrator: Arc<Orchestrator>,
    router: Arc<MessageRouter>,
    connections: Arc<ConnectionManager>,
    transport: Arc<dyn GroupTransport>,
    bus: Arc<EventBus>,
    /// One cancellation token per session with a running plan, tagged with a
    /// run sequence so a finishing run only cleans up its own entry.
    active_runs: DashMap<String, (u64, CancellationToken)>,
    run_seq: AtomicU64,
}

impl OrchestratorHub {
    /// Create the hub over its collaborators.
    pub fn new(
        sessions: Arc<SessionManager>,
        orchestrator: Arc<Orchestrator>,
        router: Arc<MessageRouter>,
        connections: Arc<ConnectionManager>,
        transport: Arc<dyn GroupTransport>,
        bus: Arc<EventBus>,
    ) -> Arc<Self> {
        Arc::new(Self {
            sessions,
            orchestrator,
            router,
            connections,
            transport,
            bus,
            active_runs: DashMap::new(),
            run_seq: AtomicU64::new(1),
        })
    }

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

    async fn push_to_caller(&self, connection_id: &str, method: &str, payload: serde_json::Value) {
        if let Err(err) = self
            .transport
            .send_to_connection(connection_id, method, payload)
            .await
        {
            log::error!(
                "failed to push {} to connection {}: {}",
                method,
                connection_id,
                err
            );
        }
    }

    /// Register the connection and greet it.
    pub async fn on_connected(&self, connection_id: &str, user_id: &str) {
        self.connections.add_connection(connection_id, user_id);
        let info = ConnectionInfo {
            connection_id: connection_id.to_string(),
            connected_at: Utc::now(),
        };
        match serde_json::to_value(&info) {
            Ok(payload) => {
                self.push_to_caller(connection_id, methods::CONNECTED, payload)
                    .await
            }
            Err(err) => log::error!("failed to encode connection info: {}", err),
        }
    }

    /// Drop the connection and all of its memberships.
    pub fn on_disconnected(&self, connection_id: &str) {
        self.connections.remove_connection(connection_id);
    }

    /// Create a session, join the caller to its group, and announce it.
    pub async fn create_session(
        &self,
        connection_id: &str,
        request: CreateSessionRequest,
    ) -> SessionCreatedResponse {
        let session = match self.sessions.create_session(request).await {
            Ok(session) => session,
            Err(err) => return SessionCreatedResponse::failed(err.to_string()),
        };

        let group = session_group(&session.id);
        if let Err(err) = self.transport.add_to_group(&group, connection_id).await {
            log::error!(
                "failed to add connection {} to group {}: {}",
                connection_id,
                group,
                err
            );
        }
        self.connections
            .add_user_to_session(connection_id, &session.id);

        match serde_json::to_value(&session) {
            Ok(payload) => {
                if let Err(err) = self
                    .transport
                    .send_to_group(&group, methods::SESSION_CREATED, payload)
                    .await
                {
                    log::error!("failed to announce session {}: {}", session.id, err);
                }
            }
            Err(err) => log::error!("failed to encode session {}: {}", session.id, err),
        }

        SessionCreatedResponse::ok(session)
    }

    /// Join the caller to an existing session.
    ///
    /// Unknown sessions yield a `ReceiveError` push and no `SessionJoined`.
    pub async fn join_session(&self, connection_id: &str, session_id: &str) {
        let session = match self.sessions.get_session(session_id).await {
            Ok(Some(session)) => session,
            Ok(None) => {
                self.push_error(
                    connection_id,
                    ErrorResponse::new(HubError::not_found("session", session_id).to_string())
                        .with_session(session_id.to_string()),
                )
                .await;
                return;
            }
            Err(err) => {
                self.push_error(
                    connection_id,
                    ErrorResponse::new(err.to_string()).with_session(session_id.to_string()),
                )
                .await;
                return;
            }
        };

        if let Err(err) = self
            .transport
            .add_to_group(&session_group(session_id), connection_id)
            .await
        {
            self.push_error(
                connection_id,
                ErrorResponse::new(err.to_string()).with_session(session_id.to_string()),
            )
            .await;
            return;
        }
        self.connections
            .add_user_to_session(connection_id, session_id);

        match serde_json::to_value(&session) {
            Ok(payload) => {
                self.push_to_caller(connection_id, methods::SESSION_JOINED, payload)
                    .await
            }
            Err(err) => log::error!("failed to encode session {}: {}", session_id, err),
        }
    }

    /// Remove the caller from a session's group.
    pub async fn leave_session(&self, connection_id: &str, session_id: &str) {
        if let Err(err) = self
            .transport
            .remove_from_group(&session_group(session_id), connection_id)
            .await
        {
            log::error!(
                "failed to remove connection {} from session {}: {}",
                connection_id,
                session_id,
                err
            );
        }
        self.connections
            .remove_user_from_session(connection_id, session_id);
    }

    /// Create and run a plan for the session.
    ///
    /// Pushes `OrchestrationPlanCreated` to the session group, then executes
    /// the plan; every step transition yields an `OrchestrationProgress`
    /// push (and bus event), and the terminal state an
    /// `OrchestrationCompleted` push. A run already active for the session
    /// is cancelled first.
    pub async fn send_orchestration_message(
        &self,
        connection_id: &str,
        request: OrchestrationMessageRequest,
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

        // The goal is part of the conversation; log it before planning.
        let user_message = AgentMessage::user(&session.id, request.message.clone());
        if let Err(err) = self.sessions.add_message(&session.id, user_message).await {
            self.push_error(
                connection_id,
                ErrorResponse::new(err.to_string()).with_session(session.id.clone()),
            )
            .await;
            return;
        }

        let mut plan = match self.orchestrator.create_plan(&PlanRequest {
            session_id: session.id.clone(),
            goal: request.message.clone(),
            agent_ids: request.agent_ids.clone(),
            strategy: request.strategy,
        }) {
            Ok(plan) => plan,
            Err(err) => {
                self.push_error(
                    connection_id,
                    ErrorResponse::new(err.to_string()).with_session(session.id.clone()),
                )
                .await;
                return;
            }
        };

        match serde_json::to_value(&plan) {
            Ok(payload) => {
                self.router
                    .broadcast_to_session(&session.id, methods::ORCHESTRATION_PLAN_CREATED, payload)
                    .await;
            }
            Err(err) => log::error!("failed to encode plan {}: {}", plan.id, err),
        }

        // A new run supersedes whatever was active for this session.
        let run = self.run_seq.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        if let Some((_, previous)) = self
            .active_runs
            .insert(session.id.clone(), (run, token.clone()))
        {
            previous.cancel();
        }

        let sink = Arc::new(HubProgressSink {
            router: Arc::clone(&self.router),
            bus: Arc::clone(&self.bus),
            session_id: session.id.clone(),
        });

        let result = self.orchestrator.execute_plan(&mut plan, sink, token).await;
        self.active_runs
            .remove_if(&session.id, |_, (active_run, _)| *active_run == run);

        match result {
            Ok(result) => match serde_json::to_value(&result) {
                Ok(payload) => {
                    self.router
                        .broadcast_to_session(
                            &session.id,
                            methods::ORCHESTRATION_COMPLETED,
                            payload,
                        )
                        .await;
                }
                Err(err) => log::error!("failed to encode result of plan {}: {}", plan.id, err),
            },
            Err(err) => {
                self.push_error(
                    connection_id,
                    ErrorResponse::new(err.to_string()).with_session(session.id.clone()),
                )
                .await;
            }
        }
    }

    /// Cancel the run currently active for the session, if any.
    ///
    /// Returns whether a run was cancelled. Completed steps stay completed;
    /// in-flight steps receive the signal.
    pub fn cancel_orchestration(&self, session_id: &str) -> bool {
        match self.active_runs.remove(session_id) {
            Some((_, (_, token))) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Connection bookkeeping shared with the agent endpoint.
    pub fn connections(&self) -> &Arc<ConnectionManager> {
        &self.connections
    }
}

/// Progress sink pushing ticks to the session group and the event bus.
struct HubProgressSink {
    router: Arc<MessageRouter>,
    bus: Arc<EventBus>,
    session_id: String,
}

#[async_trait]
impl ProgressSink for HubProgressSink {
    async fn report(&self, progress: &OrchestrationProgress) {
        self.bus
            .publish(&OrchestrationProgressEvent::new(
                self.session_id.clone(),
                progress.clone(),
            ))
            .await;
        self.router
            .route_orchestration_update(&self.session_id, progress)
            .await;
    }
}
