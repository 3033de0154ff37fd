//! Group-addressed message delivery.
//!
//! The [`MessageRouter`] translates logical addressing intents — "this chunk
//! belongs to agent X in session Y" — into transport group broadcasts. Agent
//! response chunks go to both the agent group and the session group; tool
//! execution updates likewise; orchestration updates go to the session group
//! only.
//!
//! The router never throws back to the producer: any transport failure is
//! logged at error level together with the target identifiers and swallowed.
//! A producer thread streaming chunks must not be stalled or killed by one
//! dead subscriber.

use crate::agenthub::agent::AgentResponse;
use crate::agenthub::config::HubConfig;
use crate::agenthub::dto::{methods, AgentResponseDto};
use crate::agenthub::orchestrator::OrchestrationProgress;
use crate::agenthub::transport::{agent_group, session_group, GroupTransport};
use std::sync::Arc;

/// Routes agent, tool, and orchestration traffic onto transport groups.
///
/// Holds one transport handle per logical endpoint. The two handles may
/// point at the same transport instance; the split exists because
/// [`broadcast_to_session`](MessageRouter::broadcast_to_session) dispatches
/// by method-name convention, mirroring the two client-facing endpoints.
pub struct MessageRouter {
    agent_endpoint: Arc<dyn GroupTransport>,
    orchestrator_endpoint: Arc<dyn GroupTransport>,
    max_chunk_size: usize,
}

impl MessageRouter {
    /// Create a router over the two endpoint transports.
    pub fn new(
        agent_endpoint: Arc<dyn GroupTransport>,
        orchestrator_endpoint: Arc<dyn GroupTransport>,
        config: &HubConfig,
    ) -> Self {
        Self {
            agent_endpoint,
            orchestrator_endpoint,
            max_chunk_size: config.max_stream_chunk_size.max(1),
        }
    }

    /// Router where both endpoints share one transport.
    pub fn single_endpoint(transport: Arc<dyn GroupTransport>, config: &HubConfig) -> Self {
        Self::new(Arc::clone(&transport), transport, config)
    }

    /// Fan one agent response chunk out to the agent group and the session
    /// group.
    ///
    /// Chunks larger than the configured maximum are split into consecutive
    /// deliveries; only the last piece carries the terminal flag and the
    /// attached tool calls.
    pub async fn route_agent_message(
        &self,
        session_id: &str,
        agent_id: &str,
        response: &AgentResponse,
        command_id: Option<&str>,
    ) {
        for piece in self.split_chunk(response) {
            let dto = AgentResponseDto {
                agent_id: agent_id.to_string(),
                session_id: session_id.to_string(),
                response: piece,
                command_id: command_id.map(str::to_string),
            };
            let payload = match serde_json::to_value(&dto) {
                Ok(payload) => payload,
                Err(err) => {
                    log::error!(
                        "failed to encode agent response for agent {} in session {}: {}",
                        agent_id,
                        session_id,
                        err
                    );
                    return;
                }
            };

            self.deliver(
                &self.agent_endpoint,
                &agent_group(agent_id),
                methods::RECEIVE_AGENT_RESPONSE,
                payload.clone(),
            )
            .await;
            self.deliver(
                &self.agent_endpoint,
                &session_group(session_id),
                methods::RECEIVE_AGENT_RESPONSE,
                payload,
            )
            .await;
        }
    }

    /// Fan a tool execution update out to the agent group and the session
    /// group.
    pub async fn route_tool_execution_update(
        &self,
        session_id: &str,
        agent_id: &str,
        update: serde_json::Value,
    ) {
        self.deliver(
            &self.agent_endpoint,
            &agent_group(agent_id),
            methods::TOOL_EXECUTION_UPDATE,
            update.clone(),
        )
        .await;
        self.deliver(
            &self.agent_endpoint,
            &session_group(session_id),
            methods::TOOL_EXECUTION_UPDATE,
            update,
        )
        .await;
    }

    /// Push an orchestration progress tick to the session group.
    pub async fn route_orchestration_update(
        &self,
        session_id: &str,
        progress: &OrchestrationProgress,
    ) {
        let payload = match serde_json::to_value(progress) {
            Ok(payload) => payload,
            Err(err) => {
                log::error!(
                    "failed to encode orchestration progress for session {}: {}",
                    session_id,
                    err
                );
                return;
            }
        };
        self.deliver(
            &self.orchestrator_endpoint,
            &session_group(session_id),
            methods::ORCHESTRATION_PROGRESS,
            payload,
        )
        .await;
    }

    /// Broadcast an arbitrary method to the session group, choosing the
    /// endpoint by naming convention: methods beginning with `"Agent"` go
    /// through the agent endpoint, everything else through the orchestrator
    /// endpoint.
    pub async fn broadcast_to_session(
        &self,
        session_id: &str,
        method: &str,
        payload: serde_json::Value,
    ) {
        let endpoint = if method.starts_with("Agent") {
            &self.agent_endpoint
        } else {
            &self.orchestrator_endpoint
        };
        self.deliver(endpoint, &session_group(session_id), method, payload)
            .await;
    }

    /// Send on one endpoint, logging instead of propagating failures.
    async fn deliver(
        &self,
        endpoint: &Arc<dyn GroupTransport>,
        group: &str,
        method: &str,
        payload: serde_json::Value,
    ) {
        if let Err(err) = endpoint.send_to_group(group, method, payload).await {
            log::error!("broadcast of {} to group {} failed: {}", method, group, err);
        }
    }

    /// Split an oversized chunk into transportable pieces.
    fn split_chunk(&self, response: &AgentResponse) -> Vec<AgentResponse> {
        if response.content.len() <= self.max_chunk_size {
            return vec![response.clone()];
        }

        let mut pieces: Vec<AgentResponse> = Vec::new();
        let mut rest = response.content.as_str();
        while !rest.is_empty() {
            // Back off to a char boundary so splitting never tears a code point.
            let mut cut = rest.len().min(self.max_chunk_size);
            while cut > 0 && !rest.is_char_boundary(cut) {
                cut -= 1;
            }
            if cut == 0 {
                cut = rest
                    .char_indices()
                    .nth(1)
                    .map(|(i, _)| i)
                    .unwrap_or_else(|| rest.len());
            }
            let (head, tail) = rest.split_at(cut);
            let mut piece = response.clone();
            piece.content = head.to_string();
            piece.is_complete = false;
            piece.tool_calls = Vec::new();
            pieces.push(piece);
            rest = tail;
        }

        if let Some(last) = pieces.last_mut() {
            last.is_complete = response.is_complete;
            last.tool_calls = response.tool_calls.clone();
        }
        pieces
    }
}
