//! WebSocket binding for the hub endpoints.
//!
//! Optional, behind the `ws-server` feature. Exposes the two logical hub
//! endpoints over WebSocket:
//!
//! ```text
//! GET /hubs/agent         — SendAgentMessage, ExecuteTool, SubscribeToAgent, ...
//! GET /hubs/orchestrator  — CreateSession, JoinSession, SendOrchestrationMessage, ...
//! ```
//!
//! The wire format is JSON text frames in both directions, each frame a
//! `{"method": "...", "payload": ...}` envelope. Server pushes reuse the
//! same envelope, so a browser client needs nothing beyond `JSON.parse`.
//!
//! Authentication is out of scope; the trusted caller identifier is read
//! from the `user` query parameter and attached to the connection.

use crate::agenthub::agent_hub::AgentHub;
use crate::agenthub::dto::{AgentMessageRequest, CreateSessionRequest, OrchestrationMessageRequest, ToolExecutionRequest};
use crate::agenthub::orchestrator_hub::OrchestratorHub;
use crate::agenthub::transport::{ClientMessage, GroupTransport, InMemoryHubTransport};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use axum::routing::any;
use axum::Router;
use std::collections::HashMap;
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Which logical endpoint a socket is attached to.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Endpoint {
    Agent,
    Orchestrator,
}

/// Shared state handed to every socket task.
#[derive(Clone)]
struct WsState {
    agent_hub: Arc<AgentHub>,
    orchestrator_hub: Arc<OrchestratorHub>,
    transport: Arc<InMemoryHubTransport>,
}

/// A running WebSocket server.
pub struct WsServerInstance {
    /// Address the server is listening on.
    pub addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl WsServerInstance {
    /// Stop accepting connections.
    pub fn shutdown(&self) {
        self.handle.abort();
    }
}

/// Bind both hub endpoints on `addr` and serve until shut down.
pub async fn start(
    addr: SocketAddr,
    agent_hub: Arc<AgentHub>,
    orchestrator_hub: Arc<OrchestratorHub>,
    transport: Arc<InMemoryHubTransport>,
) -> Result<WsServerInstance, Box<dyn Error + Send + Sync>> {
    let state = WsState {
        agent_hub,
        orchestrator_hub,
        transport,
    };

    let app = Router::new()
        .route("/hubs/agent", any(agent_endpoint))
        .route("/hubs/orchestrator", any(orchestrator_endpoint))
        .with_state(state);

    let listener = TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    log::info!("hub endpoints listening on {}", local_addr);

    let handle = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            log::error!("websocket server stopped: {}", err);
        }
    });

    Ok(WsServerInstance {
        addr: local_addr,
        handle,
    })
}

async fn agent_endpoint(
    ws: WebSocketUpgrade,
    Query(params): Query<HashMap<String, String>>,
    State(state): State<WsState>,
) -> Response {
    let user_id = caller_identity(&params);
    ws.on_upgrade(move |socket| handle_socket(socket, state, Endpoint::Agent, user_id))
}

async fn orchestrator_endpoint(
    ws: WebSocketUpgrade,
    Query(params): Query<HashMap<String, String>>,
    State(state): State<WsState>,
) -> Response {
    let user_id = caller_identity(&params);
    ws.on_upgrade(move |socket| handle_socket(socket, state, Endpoint::Orchestrator, user_id))
}

fn caller_identity(params: &HashMap<String, String>) -> String {
    params
        .get("user")
        .cloned()
        .unwrap_or_else(|| "anonymous".to_string())
}

/// Bridge one socket: pump pushes out, dispatch client calls in.
async fn handle_socket(mut socket: WebSocket, state: WsState, endpoint: Endpoint, user_id: String) {
    let connection_id = Uuid::new_v4().to_string();
    let mut outbox = state.transport.register_connection(&connection_id);
    let lifetime = CancellationToken::new();

    if endpoint == Endpoint::Orchestrator {
        state
            .orchestrator_hub
            .on_connected(&connection_id, &user_id)
            .await;
    }
    log::info!(
        "connection {} ({}) attached to {} endpoint",
        connection_id,
        user_id,
        match endpoint {
            Endpoint::Agent => "agent",
            Endpoint::Orchestrator => "orchestrator",
        }
    );

    loop {
        tokio::select! {
            pushed = outbox.recv() => {
                match pushed {
                    Some(message) => {
                        let frame = match serde_json::to_string(&message) {
                            Ok(frame) => frame,
                            Err(err) => {
                                log::error!("failed to encode push for {}: {}", connection_id, err);
                                continue;
                            }
                        };
                        if socket.send(Message::Text(frame.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(text.as_str()) {
                            Ok(call) => {
                                dispatch(&state, endpoint, &connection_id, call, &lifetime).await;
                            }
                            Err(err) => {
                                log::warn!(
                                    "connection {} sent an invalid frame: {}",
                                    connection_id,
                                    err
                                );
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // binary frames ignored
                    Some(Err(err)) => {
                        log::debug!("connection {} receive error: {}", connection_id, err);
                        break;
                    }
                }
            }
        }
    }

    lifetime.cancel();
    state.transport.unregister_connection(&connection_id);
    if endpoint == Endpoint::Orchestrator {
        state.orchestrator_hub.on_disconnected(&connection_id);
    }
    log::info!("connection {} detached", connection_id);
}

/// Route one client call to the owning hub method.
async fn dispatch(
    state: &WsState,
    endpoint: Endpoint,
    connection_id: &str,
    call: ClientMessage,
    lifetime: &CancellationToken,
) {
    match (endpoint, call.method.as_str()) {
        (Endpoint::Agent, "SendAgentMessage") => {
            if let Some(request) = decode::<AgentMessageRequest>(connection_id, call.payload) {
                let hub = Arc::clone(&state.agent_hub);
                let connection_id = connection_id.to_string();
                let token = lifetime.child_token();
                tokio::spawn(async move {
                    hub.send_agent_message(&connection_id, request, token).await;
                });
            }
        }
        (Endpoint::Agent, "ExecuteTool") => {
            if let Some(request) = decode::<ToolExecutionRequest>(connection_id, call.payload) {
                let response = state
                    .agent_hub
                    .execute_tool(connection_id, request, lifetime.child_token())
                    .await;
                if let Ok(payload) = serde_json::to_value(&response) {
                    if let Err(err) = state
                        .transport
                        .send_to_connection(connection_id, "ToolExecutionResult", payload)
                        .await
                    {
                        log::debug!("result push to {} failed: {}", connection_id, err);
                    }
                }
            }
        }
        (Endpoint::Agent, "SubscribeToAgent") => {
            if let Some(agent_id) = decode::<String>(connection_id, call.payload) {
                state
                    .agent_hub
                    .subscribe_to_agent(connection_id, &agent_id)
                    .await;
            }
        }
        (Endpoint::Agent, "UnsubscribeFromAgent") => {
            if let Some(agent_id) = decode::<String>(connection_id, call.payload) {
                state
                    .agent_hub
                    .unsubscribe_from_agent(connection_id, &agent_id)
                    .await;
            }
        }
        (Endpoint::Orchestrator, "CreateSession") => {
            if let Some(request) = decode::<CreateSessionRequest>(connection_id, call.payload) {
                let response = state
                    .orchestrator_hub
                    .create_session(connection_id, request)
                    .await;
                if let Ok(payload) = serde_json::to_value(&response) {
                    if let Err(err) = state
                        .transport
                        .send_to_connection(connection_id, "SessionCreatedResponse", payload)
                        .await
                    {
                        log::debug!("result push to {} failed: {}", connection_id, err);
                    }
                }
            }
        }
        (Endpoint::Orchestrator, "JoinSession") => {
            if let Some(session_id) = decode::<String>(connection_id, call.payload) {
                state
                    .orchestrator_hub
                    .join_session(connection_id, &session_id)
                    .await;
            }
        }
        (Endpoint::Orchestrator, "LeaveSession") => {
            if let Some(session_id) = decode::<String>(connection_id, call.payload) {
                state
                    .orchestrator_hub
                    .leave_session(connection_id, &session_id)
                    .await;
            }
        }
        (Endpoint::Orchestrator, "SendOrchestrationMessage") => {
            if let Some(request) =
                decode::<OrchestrationMessageRequest>(connection_id, call.payload)
            {
                let hub = Arc::clone(&state.orchestrator_hub);
                let connection_id = connection_id.to_string();
                tokio::spawn(async move {
                    hub.send_orchestration_message(&connection_id, request).await;
                });
            }
        }
        (_, other) => {
            log::warn!("connection {} called unknown method {}", connection_id, other);
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(
    connection_id: &str,
    payload: serde_json::Value,
) -> Option<T> {
    match serde_json::from_value(payload) {
        Ok(value) => Some(value),
        Err(err) => {
            log::warn!("connection {} sent a malformed payload: {}", connection_id, err);
            None
        }
    }
}
