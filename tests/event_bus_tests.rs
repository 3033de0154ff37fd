use agenthub::event_bus::{EventBus, EventSubscriber};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Clone)]
struct Ping {
    label: &'static str,
}

struct Counter {
    invocations: AtomicUsize,
}

impl Counter {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            invocations: AtomicUsize::new(0),
        })
    }

    fn count(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventSubscriber<Ping> for Counter {
    async fn handle(&self, _event: &Ping) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Handler that always fails; used to prove failures stay isolated.
struct Exploder;

#[async_trait]
impl EventSubscriber<Ping> for Exploder {
    async fn handle(&self, event: &Ping) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Err(format!("refusing to handle {}", event.label).into())
    }
}

#[tokio::test]
async fn subscriber_receives_each_publish_once() {
    agenthub::init_logger();
    let bus = EventBus::new();
    let counter = Counter::new();
    bus.subscribe::<Ping>(counter.clone());

    bus.publish(&Ping { label: "one" }).await;
    bus.publish(&Ping { label: "two" }).await;

    assert_eq!(counter.count(), 2);
}

#[tokio::test]
async fn unsubscribe_stops_delivery() {
    let bus = EventBus::new();
    let counter = Counter::new();
    let id = bus.subscribe::<Ping>(counter.clone());

    bus.publish(&Ping { label: "before" }).await;
    assert!(bus.unsubscribe::<Ping>(id));
    bus.publish(&Ping { label: "after" }).await;

    assert_eq!(counter.count(), 1);
    // A second unsubscribe of the same id is a no-op.
    assert!(!bus.unsubscribe::<Ping>(id));
}

#[tokio::test]
async fn double_subscription_invokes_twice_and_unwinds_one_at_a_time() {
    let bus = EventBus::new();
    let counter = Counter::new();
    let first = bus.subscribe::<Ping>(counter.clone());
    let _second = bus.subscribe::<Ping>(counter.clone());

    bus.publish(&Ping { label: "x" }).await;
    assert_eq!(counter.count(), 2);

    bus.unsubscribe::<Ping>(first);
    bus.publish(&Ping { label: "y" }).await;
    assert_eq!(counter.count(), 3);
}

#[tokio::test]
async fn failing_handler_does_not_stop_the_others() {
    agenthub::init_logger();
    let bus = EventBus::new();
    let counter = Counter::new();
    bus.subscribe::<Ping>(Arc::new(Exploder));
    bus.subscribe::<Ping>(counter.clone());
    bus.subscribe::<Ping>(Arc::new(Exploder));

    bus.publish(&Ping { label: "stormy" }).await;
    assert_eq!(counter.count(), 1);
}

#[tokio::test]
async fn publish_concurrent_completes_even_if_every_handler_fails() {
    let bus = EventBus::new();
    bus.subscribe::<Ping>(Arc::new(Exploder));
    bus.subscribe::<Ping>(Arc::new(Exploder));

    // Must return normally; failures are logged and swallowed.
    bus.publish_concurrent(&Ping { label: "doomed" }).await;
}

#[tokio::test]
async fn events_of_other_types_are_not_delivered() {
    #[derive(Clone)]
    struct Pong;

    let bus = EventBus::new();
    let counter = Counter::new();
    bus.subscribe::<Ping>(counter.clone());

    struct PongSink;
    #[async_trait]
    impl EventSubscriber<Pong> for PongSink {
        async fn handle(
            &self,
            _event: &Pong,
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            Ok(())
        }
    }
    bus.subscribe::<Pong>(Arc::new(PongSink));

    bus.publish(&Pong).await;
    assert_eq!(counter.count(), 0);
    assert_eq!(bus.subscriber_count::<Ping>(), 1);
    assert_eq!(bus.subscriber_count::<Pong>(), 1);
}

#[tokio::test]
async fn detached_publish_is_fire_and_forget() {
    let bus = Arc::new(EventBus::new());
    let counter = Counter::new();
    bus.subscribe::<Ping>(counter.clone());

    bus.publish_detached(Ping { label: "bg" });

    // The spawn completes asynchronously; poll briefly.
    for _ in 0..50 {
        if counter.count() == 1 {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("detached publish never reached the subscriber");
}
