use agenthub::agent::AgentResponse;
use agenthub::config::HubConfig;
use agenthub::message_router::MessageRouter;
use agenthub::orchestrator::OrchestrationProgress;
use agenthub::transport::{
    agent_group, session_group, ClientMessage, GroupTransport, InMemoryHubTransport,
};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

async fn join(
    transport: &Arc<InMemoryHubTransport>,
    group: &str,
    connection_id: &str,
) -> UnboundedReceiver<ClientMessage> {
    let rx = transport.register_connection(connection_id);
    transport.add_to_group(group, connection_id).await.unwrap();
    rx
}

#[tokio::test]
async fn agent_messages_reach_both_groups() {
    let transport = Arc::new(InMemoryHubTransport::new());
    let router = MessageRouter::single_endpoint(transport.clone(), &HubConfig::default());

    let mut agent_sub = join(&transport, &agent_group("a1"), "watcher").await;
    let mut session_member = join(&transport, &session_group("s1"), "member").await;

    router
        .route_agent_message("s1", "a1", &AgentResponse::completed("done"), Some("cmd-7"))
        .await;

    let to_watcher = agent_sub.recv().await.unwrap();
    assert_eq!(to_watcher.method, "ReceiveAgentResponse");
    assert_eq!(to_watcher.payload["agent_id"], "a1");
    assert_eq!(to_watcher.payload["session_id"], "s1");
    assert_eq!(to_watcher.payload["command_id"], "cmd-7");
    assert_eq!(to_watcher.payload["response"]["content"], "done");

    let to_member = session_member.recv().await.unwrap();
    assert_eq!(to_member.method, "ReceiveAgentResponse");
    assert_eq!(to_member.payload["response"]["is_complete"], true);
}

#[tokio::test]
async fn one_dead_recipient_does_not_starve_the_rest() {
    agenthub::init_logger();
    let transport = Arc::new(InMemoryHubTransport::new());
    let router = MessageRouter::single_endpoint(transport.clone(), &HubConfig::default());

    let mut healthy = Vec::new();
    for i in 0..5 {
        healthy.push(join(&transport, &session_group("s1"), &format!("ok{}", i)).await);
    }
    // The dead member stays in the group but its receiver is dropped.
    let dead_rx = join(&transport, &session_group("s1"), "dead").await;
    drop(dead_rx);

    router
        .route_agent_message("s1", "a1", &AgentResponse::completed("hi"), None)
        .await;

    for rx in healthy.iter_mut() {
        let message = rx.recv().await.unwrap();
        assert_eq!(message.method, "ReceiveAgentResponse");
    }
}

#[tokio::test]
async fn broadcast_dispatches_by_method_name_prefix() {
    let agent_endpoint = Arc::new(InMemoryHubTransport::new());
    let orchestrator_endpoint = Arc::new(InMemoryHubTransport::new());
    let router = MessageRouter::new(
        agent_endpoint.clone(),
        orchestrator_endpoint.clone(),
        &HubConfig::default(),
    );

    let mut on_agent = join(&agent_endpoint, &session_group("s1"), "c-agent").await;
    let mut on_orchestrator =
        join(&orchestrator_endpoint, &session_group("s1"), "c-orch").await;

    router
        .broadcast_to_session("s1", "AgentStatusUpdate", serde_json::json!({"x": 1}))
        .await;
    router
        .broadcast_to_session("s1", "SessionCreated", serde_json::json!({"y": 2}))
        .await;

    assert_eq!(on_agent.recv().await.unwrap().method, "AgentStatusUpdate");
    assert_eq!(on_orchestrator.recv().await.unwrap().method, "SessionCreated");
    // Neither side saw the other's broadcast.
    assert!(on_agent.try_recv().is_err());
    assert!(on_orchestrator.try_recv().is_err());
}

#[tokio::test]
async fn orchestration_updates_go_to_the_session_group_only() {
    let transport = Arc::new(InMemoryHubTransport::new());
    let router = MessageRouter::single_endpoint(transport.clone(), &HubConfig::default());

    let mut member = join(&transport, &session_group("s1"), "member").await;
    let mut agent_only = join(&transport, &agent_group("a1"), "watcher").await;

    router
        .route_orchestration_update(
            "s1",
            &OrchestrationProgress {
                current_step: 1,
                total_steps: 2,
                current_agent: "a1".to_string(),
                current_task: "t".to_string(),
                percent_complete: 50.0,
            },
        )
        .await;

    let tick = member.recv().await.unwrap();
    assert_eq!(tick.method, "OrchestrationProgress");
    assert_eq!(tick.payload["current_step"], 1);
    assert!(agent_only.try_recv().is_err());
}

#[tokio::test]
async fn oversized_chunks_are_split_and_only_the_tail_is_terminal() {
    let transport = Arc::new(InMemoryHubTransport::new());
    let config = HubConfig {
        max_stream_chunk_size: 4,
        ..HubConfig::default()
    };
    let router = MessageRouter::single_endpoint(transport.clone(), &config);

    let mut member = join(&transport, &session_group("s1"), "member").await;

    router
        .route_agent_message("s1", "a1", &AgentResponse::completed("hello world"), None)
        .await;

    let mut contents = Vec::new();
    let mut terminals = Vec::new();
    while let Ok(message) = member.try_recv() {
        contents.push(
            message.payload["response"]["content"]
                .as_str()
                .unwrap()
                .to_string(),
        );
        terminals.push(message.payload["response"]["is_complete"].as_bool().unwrap());
    }

    assert_eq!(contents.concat(), "hello world");
    assert!(contents.iter().all(|c| c.len() <= 4));
    let trues: Vec<&bool> = terminals.iter().filter(|t| **t).collect();
    assert_eq!(trues.len(), 1);
    assert!(terminals.last().copied().unwrap());
}
