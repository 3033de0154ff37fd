//! End-to-end exercises of the two hub endpoints over the in-memory
//! transport, with scripted agents behind the registry.

use agenthub::agent::{AdapterError, AgentAdapter, AgentResponse, AgentResponseStream, AgentStatus};
use agenthub::agent_hub::AgentHub;
use agenthub::agent_registry::{AgentFactory, AgentRegistry, CreateAgentRequest};
use agenthub::config::HubConfig;
use agenthub::connection_manager::ConnectionManager;
use agenthub::dto::{
    AgentMessageRequest, CreateSessionRequest, OrchestrationMessageRequest, ToolExecutionRequest,
};
use agenthub::event_bus::{EventBus, EventSubscriber};
use agenthub::events::OrchestrationStepCompletedEvent;
use agenthub::message::{AgentMessage, MessageRole};
use agenthub::message_router::MessageRouter;
use agenthub::orchestrator::{OrchestrationStrategy, Orchestrator};
use agenthub::orchestrator_hub::OrchestratorHub;
use agenthub::session::SessionType;
use agenthub::session_manager::SessionManager;
use agenthub::session_repository::InMemorySessionRepository;
use agenthub::transport::{ClientMessage, InMemoryHubTransport};
use async_trait::async_trait;
use futures_util::stream;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;

/// Adapter whose behavior is scripted through the agent configuration:
/// `{"chunks": ["he","llo"]}` streams those chunks, `{"fail": true}` fails
/// the send.
struct ConfiguredAdapter {
    chunks: Vec<String>,
    fail: bool,
}

#[async_trait]
impl AgentAdapter for ConfiguredAdapter {
    fn adapter_type(&self) -> &str {
        "configured"
    }

    async fn send_message(
        &self,
        message: &AgentMessage,
        _cancellation: CancellationToken,
    ) -> Result<AgentResponse, AdapterError> {
        if self.fail {
            return Err(AdapterError::transient("scripted failure"));
        }
        Ok(AgentResponse::completed(format!(
            "{}:{}",
            self.chunks.concat(),
            message.content
        )))
    }

    async fn send_message_stream(
        &self,
        _message: &AgentMessage,
        _cancellation: CancellationToken,
    ) -> Result<AgentResponseStream, AdapterError> {
        if self.fail {
            return Err(AdapterError::transient("scripted failure"));
        }
        let total = self.chunks.len();
        let items: Vec<Result<AgentResponse, AdapterError>> = self
            .chunks
            .iter()
            .enumerate()
            .map(|(i, text)| {
                if i + 1 == total {
                    Ok(AgentResponse::completed(text.clone()))
                } else {
                    Ok(AgentResponse::text(text.clone()))
                }
            })
            .collect();
        Ok(Box::pin(stream::iter(items)))
    }
}

struct ConfiguredFactory;

#[async_trait]
impl AgentFactory for ConfiguredFactory {
    async fn create_adapter(
        &self,
        _agent_type: &str,
        configuration: &serde_json::Value,
    ) -> Result<Arc<dyn AgentAdapter>, Box<dyn std::error::Error + Send + Sync>> {
        let chunks = configuration["chunks"]
            .as_array()
            .map(|chunks| {
                chunks
                    .iter()
                    .filter_map(|c| c.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_else(|| vec!["pong".to_string()]);
        Ok(Arc::new(ConfiguredAdapter {
            chunks,
            fail: configuration["fail"].as_bool().unwrap_or(false),
        }))
    }
}

struct Harness {
    bus: Arc<EventBus>,
    registry: Arc<AgentRegistry>,
    sessions: Arc<SessionManager>,
    transport: Arc<InMemoryHubTransport>,
    agent_hub: Arc<AgentHub>,
    orchestrator_hub: Arc<OrchestratorHub>,
}

impl Harness {
    async fn new() -> Self {
        agenthub::init_logger();
        let config = HubConfig::default();
        let bus = Arc::new(EventBus::new());
        let sessions = Arc::new(SessionManager::new(
            Arc::new(InMemorySessionRepository::new()),
            bus.clone(),
        ));
        let connections = Arc::new(ConnectionManager::new());
        let transport = Arc::new(InMemoryHubTransport::new());
        let router = Arc::new(MessageRouter::single_endpoint(transport.clone(), &config));
        let registry = Arc::new(AgentRegistry::new(
            Arc::new(ConfiguredFactory),
            bus.clone(),
            config.clone(),
        ));
        let orchestrator = Arc::new(Orchestrator::new(
            registry.clone(),
            bus.clone(),
            config.clone(),
        ));

        let agent_hub = AgentHub::new(
            sessions.clone(),
            registry.clone(),
            router.clone(),
            connections.clone(),
            transport.clone(),
            bus.clone(),
        );
        let orchestrator_hub = OrchestratorHub::new(
            sessions.clone(),
            orchestrator,
            router,
            connections,
            transport.clone(),
            bus.clone(),
        );

        Self {
            bus,
            registry,
            sessions,
            transport,
            agent_hub,
            orchestrator_hub,
        }
    }

    async fn add_agent(&self, id: &str, configuration: serde_json::Value) {
        self.registry
            .create_agent(CreateAgentRequest {
                id: id.to_string(),
                name: id.to_string(),
                agent_type: "configured".to_string(),
                configuration,
            })
            .await
            .unwrap();
    }

    /// Register a connection on the shared transport and greet it on the
    /// orchestrator endpoint.
    async fn connect(&self, connection_id: &str) -> UnboundedReceiver<ClientMessage> {
        let rx = self.transport.register_connection(connection_id);
        self.orchestrator_hub
            .on_connected(connection_id, "user-1")
            .await;
        rx
    }
}

fn drain(rx: &mut UnboundedReceiver<ClientMessage>) -> Vec<ClientMessage> {
    let mut out = Vec::new();
    while let Ok(message) = rx.try_recv() {
        out.push(message);
    }
    out
}

fn methods_of(messages: &[ClientMessage]) -> Vec<String> {
    messages.iter().map(|m| m.method.clone()).collect()
}

#[tokio::test]
async fn scenario_basic_exchange() {
    let h = Harness::new().await;
    h.add_agent("a1", serde_json::json!({"chunks": ["he", "llo", "!"]}))
        .await;

    // Two logical connections, as a real client would hold.
    let mut orch_rx = h.connect("c1-orch").await;
    let mut agent_rx = h.connect("c1-agent").await;

    let created = h
        .orchestrator_hub
        .create_session(
            "c1-orch",
            CreateSessionRequest {
                name: "S1".to_string(),
                session_type: SessionType::MultiAgent,
                agent_ids: vec!["a1".to_string()],
                working_directory: None,
            },
        )
        .await;
    assert!(created.success);
    let session_id = created.session_id.unwrap();

    h.agent_hub.subscribe_to_agent("c1-agent", "a1").await;
    drain(&mut agent_rx); // greeting + initial status push

    h.agent_hub
        .send_agent_message(
            "c1-agent",
            AgentMessageRequest {
                session_id: session_id.clone(),
                agent_id: "a1".to_string(),
                content: "hi".to_string(),
                attachments: Vec::new(),
                command_id: Some("c1".to_string()),
            },
            CancellationToken::new(),
        )
        .await;

    // Exactly three chunks on the agent subscription, in order.
    let received = drain(&mut agent_rx);
    let chunks: Vec<&ClientMessage> = received
        .iter()
        .filter(|m| m.method == "ReceiveAgentResponse")
        .collect();
    assert_eq!(chunks.len(), 3);
    for chunk in &chunks {
        assert_eq!(chunk.payload["agent_id"], "a1");
        assert_eq!(chunk.payload["session_id"], session_id);
        assert_eq!(chunk.payload["command_id"], "c1");
    }
    let contents: Vec<&str> = chunks
        .iter()
        .map(|m| m.payload["response"]["content"].as_str().unwrap())
        .collect();
    assert_eq!(contents, vec!["he", "llo", "!"]);

    // The session group connection saw the same three chunks.
    let session_side = drain(&mut orch_rx);
    assert_eq!(
        session_side
            .iter()
            .filter(|m| m.method == "ReceiveAgentResponse")
            .count(),
        3
    );

    // The log holds the user message and one aggregated assistant message.
    let session = h.sessions.get_session(&session_id).await.unwrap().unwrap();
    assert_eq!(session.messages.len(), 2);
    assert_eq!(session.messages[0].role, MessageRole::User);
    assert_eq!(session.messages[0].content, "hi");
    assert_eq!(session.messages[0].sequence_number, 1);
    assert_eq!(session.messages[1].role, MessageRole::Assistant);
    assert_eq!(session.messages[1].content, "hello!");
    assert_eq!(session.messages[1].sequence_number, 2);
}

#[tokio::test]
async fn scenario_failing_agent() {
    let h = Harness::new().await;
    h.add_agent("a1", serde_json::json!({"fail": true})).await;

    let _orch_rx = h.connect("c1-orch").await;
    let mut agent_rx = h.connect("c1-agent").await;

    let created = h
        .orchestrator_hub
        .create_session(
            "c1-orch",
            CreateSessionRequest {
                name: "S1".to_string(),
                session_type: SessionType::MultiAgent,
                agent_ids: vec!["a1".to_string()],
                working_directory: None,
            },
        )
        .await;
    let session_id = created.session_id.unwrap();
    drain(&mut agent_rx);

    h.agent_hub
        .send_agent_message(
            "c1-agent",
            AgentMessageRequest {
                session_id: session_id.clone(),
                agent_id: "a1".to_string(),
                content: "hi".to_string(),
                attachments: Vec::new(),
                command_id: None,
            },
            CancellationToken::new(),
        )
        .await;

    let received = drain(&mut agent_rx);
    let errors: Vec<&ClientMessage> = received
        .iter()
        .filter(|m| m.method == "ReceiveError")
        .collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].payload["agent_id"], "a1");
    assert_eq!(errors[0].payload["session_id"], session_id);

    // Non-fatal failure: the agent is usable again.
    let agent = h.registry.get_agent("a1").await.unwrap();
    assert_eq!(agent.status(), AgentStatus::Ready);

    // The user message survived; no assistant message was appended.
    let session = h.sessions.get_session(&session_id).await.unwrap().unwrap();
    assert_eq!(session.messages.len(), 1);
    assert_eq!(session.messages[0].role, MessageRole::User);
    assert_eq!(session.messages[0].sequence_number, 1);
}

#[tokio::test]
async fn scenario_join_nonexistent_session() {
    let h = Harness::new().await;
    let mut rx = h.connect("c1").await;
    drain(&mut rx);

    h.orchestrator_hub.join_session("c1", "nope").await;

    let received = drain(&mut rx);
    let methods = methods_of(&received);
    assert!(methods.contains(&"ReceiveError".to_string()));
    assert!(!methods.contains(&"SessionJoined".to_string()));
    let error = received
        .iter()
        .find(|m| m.method == "ReceiveError")
        .unwrap();
    assert!(error.payload["error"]
        .as_str()
        .unwrap()
        .contains("Session nope not found"));
}

struct StepOrderLog {
    orders: Mutex<Vec<usize>>,
}

#[async_trait]
impl EventSubscriber<OrchestrationStepCompletedEvent> for StepOrderLog {
    async fn handle(
        &self,
        event: &OrchestrationStepCompletedEvent,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.orders.lock().unwrap().push(event.step_order);
        Ok(())
    }
}

#[tokio::test]
async fn scenario_orchestration_happy_path() {
    let h = Harness::new().await;
    h.add_agent("a1", serde_json::json!({})).await;
    h.add_agent("a2", serde_json::json!({})).await;

    let steps = Arc::new(StepOrderLog {
        orders: Mutex::new(Vec::new()),
    });
    h.bus
        .subscribe::<OrchestrationStepCompletedEvent>(steps.clone());

    let mut rx = h.connect("c1").await;
    let created = h
        .orchestrator_hub
        .create_session(
            "c1",
            CreateSessionRequest {
                name: "plan".to_string(),
                session_type: SessionType::Orchestrated,
                agent_ids: vec!["a1".to_string(), "a2".to_string()],
                working_directory: None,
            },
        )
        .await;
    let session_id = created.session_id.unwrap();
    drain(&mut rx);

    h.orchestrator_hub
        .send_orchestration_message(
            "c1",
            OrchestrationMessageRequest {
                session_id: session_id.clone(),
                message: "split the work".to_string(),
                agent_ids: vec!["a1".to_string(), "a2".to_string()],
                strategy: OrchestrationStrategy::Sequential,
            },
        )
        .await;

    let received = drain(&mut rx);
    let orchestration: Vec<&ClientMessage> = received
        .iter()
        .filter(|m| m.method.starts_with("Orchestration"))
        .collect();

    let order: Vec<&str> = orchestration.iter().map(|m| m.method.as_str()).collect();
    assert_eq!(
        order,
        vec![
            "OrchestrationPlanCreated",
            "OrchestrationProgress",
            "OrchestrationProgress",
            "OrchestrationCompleted",
        ]
    );

    let first_tick = &orchestration[1].payload;
    assert_eq!(first_tick["current_step"], 1);
    assert!((first_tick["percent_complete"].as_f64().unwrap() - 50.0).abs() < 1.0);

    let second_tick = &orchestration[2].payload;
    assert_eq!(second_tick["current_step"], 2);
    assert!((second_tick["percent_complete"].as_f64().unwrap() - 100.0).abs() < 0.01);

    let completed = &orchestration[3].payload;
    assert_eq!(completed["success"], true);

    assert_eq!(*steps.orders.lock().unwrap(), vec![1, 2]);
}

#[tokio::test]
async fn scenario_orchestration_with_failing_step() {
    let h = Harness::new().await;
    h.add_agent("a1", serde_json::json!({})).await;
    h.add_agent("boom", serde_json::json!({"fail": true})).await;
    h.add_agent("a3", serde_json::json!({})).await;

    let mut rx = h.connect("c1").await;
    let created = h
        .orchestrator_hub
        .create_session(
            "c1",
            CreateSessionRequest {
                name: "plan".to_string(),
                session_type: SessionType::Orchestrated,
                agent_ids: vec!["a1".to_string(), "boom".to_string(), "a3".to_string()],
                working_directory: None,
            },
        )
        .await;
    let session_id = created.session_id.unwrap();
    drain(&mut rx);

    h.orchestrator_hub
        .send_orchestration_message(
            "c1",
            OrchestrationMessageRequest {
                session_id,
                message: "fragile work".to_string(),
                agent_ids: vec!["a1".to_string(), "boom".to_string(), "a3".to_string()],
                strategy: OrchestrationStrategy::Sequential,
            },
        )
        .await;

    let received = drain(&mut rx);
    let completed = received
        .iter()
        .find(|m| m.method == "OrchestrationCompleted")
        .unwrap();
    assert_eq!(completed.payload["success"], false);

    let step_results = completed.payload["step_results"].as_array().unwrap();
    assert_eq!(step_results.len(), 3);
    assert_eq!(step_results[0]["status"], "Completed");
    assert_eq!(step_results[1]["status"], "Failed");
    assert_eq!(step_results[2]["status"], "Skipped");
    // The skipped step produced no observable output.
    assert!(step_results[2]["output"].is_null());
}

#[tokio::test]
async fn scenario_concurrent_broadcast_fan_out() {
    let h = Harness::new().await;
    h.add_agent("a1", serde_json::json!({"chunks": ["ping"]}))
        .await;

    let mut sender_rx = h.connect("sender").await;
    let created = h
        .orchestrator_hub
        .create_session(
            "sender",
            CreateSessionRequest {
                name: "crowd".to_string(),
                session_type: SessionType::MultiAgent,
                agent_ids: vec!["a1".to_string()],
                working_directory: None,
            },
        )
        .await;
    let session_id = created.session_id.unwrap();

    let mut members = Vec::new();
    for i in 0..100 {
        let id = format!("m{}", i);
        let rx = h.connect(&id).await;
        h.orchestrator_hub.join_session(&id, &session_id).await;
        members.push((id, rx));
    }

    // Member 13 is dead: receiver dropped, membership intact.
    let (_, dead_rx) = members.swap_remove(13);
    drop(dead_rx);

    h.agent_hub
        .send_agent_message(
            "sender",
            AgentMessageRequest {
                session_id: session_id.clone(),
                agent_id: "a1".to_string(),
                content: "fan out".to_string(),
                attachments: Vec::new(),
                command_id: None,
            },
            CancellationToken::new(),
        )
        .await;

    for (id, rx) in members.iter_mut() {
        let received = drain(rx);
        let count = received
            .iter()
            .filter(|m| m.method == "ReceiveAgentResponse")
            .count();
        assert_eq!(count, 1, "member {} should see exactly one chunk", id);
    }

    // The sender joined the session group when creating it, so it sees the
    // chunk too.
    let sender_msgs = drain(&mut sender_rx);
    assert_eq!(
        sender_msgs
            .iter()
            .filter(|m| m.method == "ReceiveAgentResponse")
            .count(),
        1
    );
}

#[tokio::test]
async fn execute_tool_wraps_failures_into_the_response() {
    let h = Harness::new().await;
    h.add_agent("a1", serde_json::json!({})).await;

    let response = h
        .agent_hub
        .execute_tool(
            "c1",
            ToolExecutionRequest {
                agent_id: "a1".to_string(),
                session_id: None,
                tool_name: "no-such-tool".to_string(),
                arguments: serde_json::json!({}),
                timeout_ms: None,
            },
            CancellationToken::new(),
        )
        .await;
    assert!(!response.success);
    assert!(response
        .error
        .as_deref()
        .unwrap()
        .contains("Tool no-such-tool not found"));

    let missing_agent = h
        .agent_hub
        .execute_tool(
            "c1",
            ToolExecutionRequest {
                agent_id: "ghost".to_string(),
                session_id: None,
                tool_name: "anything".to_string(),
                arguments: serde_json::json!({}),
                timeout_ms: None,
            },
            CancellationToken::new(),
        )
        .await;
    assert!(!missing_agent.success);
    assert!(missing_agent
        .error
        .as_deref()
        .unwrap()
        .contains("Agent ghost not found"));
}
