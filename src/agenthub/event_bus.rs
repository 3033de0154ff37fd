//! In-process typed publish/subscribe.
//!
//! The [`EventBus`] decouples the core components from the hub layer: the
//! session manager, agent runtime, and orchestrator publish typed events and
//! never learn who is listening. Handlers subscribe per concrete event type
//! and are invoked independently — a handler that returns an error is logged
//! and skipped, and the remaining handlers still run.
//!
//! The bus is intentionally in-process and fire-and-forget: no retry, no
//! ordering guarantee across event types, and FIFO delivery per subscriber
//! within a single [`publish`](EventBus::publish) call.
//!
//! # Example
//!
//! ```rust
//! use agenthub::event_bus::{EventBus, EventSubscriber};
//! use async_trait::async_trait;
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! #[derive(Clone)]
//! struct Ping;
//!
//! struct Counter(AtomicUsize);
//!
//! #[async_trait]
//! impl EventSubscriber<Ping> for Counter {
//!     async fn handle(&self, _event: &Ping) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!         Ok(())
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new();
//! let counter = Arc::new(Counter(AtomicUsize::new(0)));
//! let id = bus.subscribe::<Ping>(counter.clone());
//!
//! bus.publish(&Ping).await;
//! assert_eq!(counter.0.load(Ordering::SeqCst), 1);
//!
//! bus.unsubscribe::<Ping>(id);
//! bus.publish(&Ping).await;
//! assert_eq!(counter.0.load(Ordering::SeqCst), 1);
//! # }
//! ```

use futures_util::future::join_all;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::error::Error;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

/// Handle returned by [`EventBus::subscribe`], used to remove exactly that
/// registration later. Subscribing the same handler twice yields two distinct
/// ids and two invocations per publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// A typed event handler.
///
/// Implementations must be `Send + Sync` so they can be shared across tasks
/// behind `Arc<dyn EventSubscriber<E>>`. Returning an error does not affect
/// other subscribers; the bus logs it and moves on.
#[async_trait]
pub trait EventSubscriber<E: Send + Sync + 'static>: Send + Sync {
    /// Handle one published event.
    async fn handle(&self, event: &E) -> Result<(), Box<dyn Error + Send + Sync>>;
}

/// One registration in the subscriber table. The handler is stored type
/// erased; `publish` downcasts it back to `Arc<dyn EventSubscriber<E>>`.
struct Registration {
    id: SubscriptionId,
    handler: Box<dyn Any + Send + Sync>,
}

/// Typed in-process publish/subscribe hub.
///
/// The subscriber table is guarded by a reader-preferring lock; publishes
/// snapshot the relevant handler list under the read lock and invoke the
/// handlers after releasing it, so a subscription added while a publish is in
/// flight may or may not observe that publish but will observe all later
/// ones. Removed subscriptions never observe publishes that start after
/// removal.
pub struct EventBus {
    subscribers: RwLock<HashMap<TypeId, Vec<Registration>>>,
    next_id: AtomicU64,
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a handler for events of type `E`.
    ///
    /// Returns a [`SubscriptionId`] that removes exactly this registration
    /// when passed to [`unsubscribe`](EventBus::unsubscribe). The same
    /// handler may be registered multiple times; each registration is
    /// invoked once per publish.
    pub fn subscribe<E: Send + Sync + 'static>(
        &self,
        handler: Arc<dyn EventSubscriber<E>>,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut table = self
            .subscribers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        table
            .entry(TypeId::of::<E>())
            .or_insert_with(Vec::new)
            .push(Registration {
                id,
                handler: Box::new(handler),
            });
        id
    }

    /// Remove the registration identified by `id`.
    ///
    /// Returns `true` when a registration was removed. Publishes that start
    /// after this call will not invoke the removed handler.
    pub fn unsubscribe<E: Send + Sync + 'static>(&self, id: SubscriptionId) -> bool {
        let mut table = self
            .subscribers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(list) = table.get_mut(&TypeId::of::<E>()) {
            let before = list.len();
            list.retain(|reg| reg.id != id);
            return list.len() != before;
        }
        false
    }

    /// Number of registrations currently held for events of type `E`.
    pub fn subscriber_count<E: Send + Sync + 'static>(&self) -> usize {
        let table = self
            .subscribers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        table.get(&TypeId::of::<E>()).map_or(0, Vec::len)
    }

    /// Snapshot the handlers registered for `E` at this instant.
    fn snapshot<E: Send + Sync + 'static>(&self) -> Vec<Arc<dyn EventSubscriber<E>>> {
        let table = self
            .subscribers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match table.get(&TypeId::of::<E>()) {
            Some(list) => list
                .iter()
                .filter_map(|reg| {
                    reg.handler
                        .downcast_ref::<Arc<dyn EventSubscriber<E>>>()
                        .cloned()
                })
                .collect(),
            None => Vec::new(),
        }
    }

    /// Deliver `event` to every subscriber present at call time, one at a
    /// time in registration order.
    ///
    /// A handler failure is logged at warn level and does not stop delivery
    /// to the remaining handlers.
    pub async fn publish<E: Send + Sync + 'static>(&self, event: &E) {
        for handler in self.snapshot::<E>() {
            if let Err(err) = handler.handle(event).await {
                log::warn!(
                    "event handler for {} failed: {}",
                    std::any::type_name::<E>(),
                    err
                );
            }
        }
    }

    /// Deliver `event` to every subscriber concurrently.
    ///
    /// Completes once every handler has returned, even if every one of them
    /// fails; failures are logged exactly as in [`publish`](EventBus::publish).
    pub async fn publish_concurrent<E: Send + Sync + 'static>(&self, event: &E) {
        let handlers = self.snapshot::<E>();
        let results = join_all(handlers.iter().map(|handler| handler.handle(event))).await;
        for result in results {
            if let Err(err) = result {
                log::warn!(
                    "event handler for {} failed: {}",
                    std::any::type_name::<E>(),
                    err
                );
            }
        }
    }

    /// Fire-and-forget wrapper around [`publish`](EventBus::publish) for
    /// callers that must not suspend while handlers run.
    pub fn publish_detached<E: Clone + Send + Sync + 'static>(self: &Arc<Self>, event: E) {
        let bus = Arc::clone(self);
        tokio::spawn(async move {
            bus.publish(&event).await;
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
