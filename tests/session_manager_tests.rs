use agenthub::dto::CreateSessionRequest;
use agenthub::event_bus::{EventBus, EventSubscriber};
use agenthub::events::{MessageAddedEvent, SessionCreatedEvent, SessionEndedEvent};
use agenthub::message::AgentMessage;
use agenthub::session::SessionType;
use agenthub::session_manager::SessionManager;
use agenthub::session_repository::InMemorySessionRepository;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn manager() -> (SessionManager, Arc<EventBus>) {
    let bus = Arc::new(EventBus::new());
    (
        SessionManager::new(Arc::new(InMemorySessionRepository::new()), bus.clone()),
        bus,
    )
}

fn request(name: &str) -> CreateSessionRequest {
    CreateSessionRequest {
        name: name.to_string(),
        session_type: SessionType::MultiAgent,
        agent_ids: vec!["a1".to_string(), "a2".to_string()],
        working_directory: None,
    }
}

struct EventCounter {
    created: AtomicUsize,
    added: AtomicUsize,
    ended: AtomicUsize,
}

impl EventCounter {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            created: AtomicUsize::new(0),
            added: AtomicUsize::new(0),
            ended: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl EventSubscriber<SessionCreatedEvent> for EventCounter {
    async fn handle(
        &self,
        _event: &SessionCreatedEvent,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl EventSubscriber<MessageAddedEvent> for EventCounter {
    async fn handle(
        &self,
        _event: &MessageAddedEvent,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.added.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl EventSubscriber<SessionEndedEvent> for EventCounter {
    async fn handle(
        &self,
        _event: &SessionEndedEvent,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.ended.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn create_session_is_active_current_and_announced() {
    let (manager, bus) = manager();
    let counter = EventCounter::new();
    bus.subscribe::<SessionCreatedEvent>(counter.clone());

    let session = manager.create_session(request("S1")).await.unwrap();
    assert_eq!(session.name, "S1");
    assert!(session.messages.is_empty());
    assert_eq!(
        session.participant_agent_ids,
        vec!["a1".to_string(), "a2".to_string()]
    );
    assert!(session.last_activity_at >= session.created_at);
    assert_eq!(counter.created.load(Ordering::SeqCst), 1);

    let current = manager.get_current_session().await.unwrap().unwrap();
    assert_eq!(current.id, session.id);
}

#[tokio::test]
async fn empty_name_is_accepted_as_is() {
    let (manager, _) = manager();
    let session = manager.create_session(request("")).await.unwrap();
    assert_eq!(session.name, "");
}

#[tokio::test]
async fn get_session_with_empty_id_is_absent() {
    let (manager, _) = manager();
    assert!(manager.get_session("").await.unwrap().is_none());
    assert!(manager.get_session("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn recent_sessions_respect_count_and_boundaries() {
    let (manager, _) = manager();
    for name in ["a", "b", "c"] {
        manager.create_session(request(name)).await.unwrap();
        // Keep last_activity_at strictly ordered.
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    assert!(manager.get_recent_sessions(0).await.unwrap().is_empty());
    assert!(manager.get_recent_sessions(-3).await.unwrap().is_empty());

    let recent = manager.get_recent_sessions(2).await.unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].name, "c");
    assert_eq!(recent[1].name, "b");
}

#[tokio::test]
async fn add_message_assigns_contiguous_sequence_numbers() {
    let (manager, bus) = manager();
    let counter = EventCounter::new();
    bus.subscribe::<MessageAddedEvent>(counter.clone());

    let session = manager.create_session(request("log")).await.unwrap();
    for i in 0..5 {
        let stored = manager
            .add_message(&session.id, AgentMessage::user(&session.id, format!("m{}", i)))
            .await
            .unwrap();
        assert_eq!(stored.sequence_number, i + 1);
    }

    let reloaded = manager.get_session(&session.id).await.unwrap().unwrap();
    let sequence: Vec<u64> = reloaded
        .messages
        .iter()
        .map(|m| m.sequence_number)
        .collect();
    assert_eq!(sequence, vec![1, 2, 3, 4, 5]);
    assert_eq!(counter.added.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn concurrent_producers_get_no_duplicates_and_no_gaps() {
    let (manager, _) = manager();
    let manager = Arc::new(manager);
    let session = manager.create_session(request("race")).await.unwrap();

    let mut handles = Vec::new();
    for producer in 0..8 {
        let manager = manager.clone();
        let session_id = session.id.clone();
        handles.push(tokio::spawn(async move {
            for i in 0..25 {
                manager
                    .add_message(
                        &session_id,
                        AgentMessage::user(&session_id, format!("p{}-{}", producer, i)),
                    )
                    .await
                    .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let reloaded = manager.get_session(&session.id).await.unwrap().unwrap();
    let mut sequence: Vec<u64> = reloaded
        .messages
        .iter()
        .map(|m| m.sequence_number)
        .collect();
    sequence.sort_unstable();
    let expected: Vec<u64> = (1..=200).collect();
    assert_eq!(sequence, expected);
}

#[tokio::test]
async fn add_message_rejects_empty_session_id() {
    let (manager, _) = manager();
    let err = manager
        .add_message("", AgentMessage::user("", "hello"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Invalid argument"));
}

#[tokio::test]
async fn add_message_to_unknown_session_is_rejected_by_the_repository() {
    let (manager, _) = manager();
    let err = manager
        .add_message("ghost", AgentMessage::user("ghost", "hello"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Session ghost not found"));
}

#[tokio::test]
async fn end_session_is_idempotent_and_still_emits() {
    let (manager, bus) = manager();
    let counter = EventCounter::new();
    bus.subscribe::<SessionEndedEvent>(counter.clone());

    assert!(!manager.end_session("").await.unwrap());
    assert!(!manager.end_session("missing").await.unwrap());
    assert_eq!(counter.ended.load(Ordering::SeqCst), 0);

    let session = manager.create_session(request("done")).await.unwrap();
    assert_eq!(manager.get_active_sessions().await.unwrap().len(), 1);
    assert!(manager.end_session(&session.id).await.unwrap());
    assert!(manager.end_session(&session.id).await.unwrap());
    assert_eq!(counter.ended.load(Ordering::SeqCst), 2);
    assert!(manager.get_active_sessions().await.unwrap().is_empty());

    // A completed session takes no further messages.
    let err = manager
        .add_message(&session.id, AgentMessage::user(&session.id, "late"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no longer accepts messages"));
}

#[tokio::test]
async fn context_updates_merge() {
    let (manager, _) = manager();
    let session = manager.create_session(request("ctx")).await.unwrap();

    let mut first = std::collections::HashMap::new();
    first.insert("a".to_string(), serde_json::json!(1));
    first.insert("b".to_string(), serde_json::json!("x"));
    manager
        .update_session_context(&session.id, first)
        .await
        .unwrap();

    let mut second = std::collections::HashMap::new();
    second.insert("b".to_string(), serde_json::json!("y"));
    manager
        .update_session_context(&session.id, second)
        .await
        .unwrap();

    let reloaded = manager.get_session(&session.id).await.unwrap().unwrap();
    assert_eq!(reloaded.context["a"], serde_json::json!(1));
    assert_eq!(reloaded.context["b"], serde_json::json!("y"));
}

#[tokio::test]
async fn snapshot_round_trip_restores_the_session() {
    let (manager, _) = manager();
    let session = manager.create_session(request("snap")).await.unwrap();
    manager
        .add_message(&session.id, AgentMessage::user(&session.id, "first"))
        .await
        .unwrap();
    let mut context = std::collections::HashMap::new();
    context.insert("k".to_string(), serde_json::json!("v"));
    manager
        .update_session_context(&session.id, context)
        .await
        .unwrap();

    let snapshot = manager
        .create_snapshot(&session.id, "before the surgery")
        .await
        .unwrap();

    // Mutate past the snapshot, then restore from the persisted copy.
    manager
        .add_message(&session.id, AgentMessage::user(&session.id, "second"))
        .await
        .unwrap();
    manager.end_session(&session.id).await.unwrap();

    let persisted = manager
        .repository()
        .get_snapshot(&snapshot.id)
        .await
        .unwrap()
        .unwrap();
    let restored = manager.restore_snapshot(&persisted).await.unwrap();
    let reloaded = manager.get_session(&session.id).await.unwrap().unwrap();

    assert_eq!(reloaded.id, restored.id);
    assert_eq!(reloaded.name, "snap");
    assert_eq!(reloaded.session_type, SessionType::MultiAgent);
    assert_eq!(reloaded.status, restored.status);
    assert_eq!(
        reloaded.participant_agent_ids,
        vec!["a1".to_string(), "a2".to_string()]
    );
    assert_eq!(reloaded.messages.len(), 1);
    assert_eq!(reloaded.messages[0].sequence_number, 1);
    assert_eq!(reloaded.context["k"], serde_json::json!("v"));
}

#[tokio::test]
async fn set_current_switches_the_pointer() {
    let (manager, _) = manager();
    let first = manager.create_session(request("one")).await.unwrap();
    let second = manager.create_session(request("two")).await.unwrap();
    assert_eq!(
        manager.get_current_session().await.unwrap().unwrap().id,
        second.id
    );

    manager.set_current(&first.id);
    assert_eq!(
        manager.get_current_session().await.unwrap().unwrap().id,
        first.id
    );
}
