//! Event Bus for one side of the UI/Engine boundary.
//!
//! Subscribers register handlers that are invoked for every dispatched event.
//! `dispatch` awaits each handler in registration order, so when it returns the
//! event has been fully delivered. The distributor relies on this to know when
//! an event is no longer in flight.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use parking_lot::RwLock;

use reelnexus_domain::GameEvent;

type Handler = Arc<dyn Fn(GameEvent) -> BoxFuture<'static, ()> + Send + Sync>;

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
struct Subscribers {
    next_id: AtomicU64,
    handlers: RwLock<Vec<(SubscriptionId, Handler)>>,
}

/// Event bus for `GameEvent`s.
///
/// Cheap to clone; clones share the same subscriber list.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Subscribers>,
}

impl EventBus {
    /// Create a new EventBus with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a synchronous callback.
    pub fn subscribe(&self, callback: impl Fn(GameEvent) + Send + Sync + 'static) -> SubscriptionId {
        self.insert(Arc::new(move |event| {
            callback(event);
            futures_util::future::ready(()).boxed()
        }))
    }

    /// Subscribe an async handler. Dispatch waits for the returned future.
    pub fn subscribe_async<F, Fut>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(GameEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.insert(Arc::new(move |event| handler(event).boxed()))
    }

    fn insert(&self, handler: Handler) -> SubscriptionId {
        let id = SubscriptionId(self.subscribers.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.handlers.write().push((id, handler));
        id
    }

    /// Remove a subscriber. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.subscribers.handlers.write();
        let before = handlers.len();
        handlers.retain(|(sub, _)| *sub != id);
        handlers.len() != before
    }

    /// Deliver an event to every subscriber.
    ///
    /// The subscriber list is snapshotted first, so handlers may subscribe,
    /// unsubscribe or dispatch again without deadlocking.
    pub async fn dispatch(&self, event: GameEvent) {
        let handlers: Vec<Handler> = self
            .subscribers
            .handlers
            .read()
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();

        for handler in handlers {
            handler(event.clone()).await;
        }
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.handlers.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelnexus_domain::{EventContext, GamePayload, PlayerId, SessionId};
    use std::sync::atomic::AtomicU32;

    fn event(payload: GamePayload) -> GameEvent {
        GameEvent::new(
            payload,
            EventContext::now(PlayerId::new("p1"), SessionId::new()),
        )
    }

    #[tokio::test]
    async fn test_subscribe_and_dispatch() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicU32::new(0));

        let count_clone = Arc::clone(&count);
        bus.subscribe(move |_event| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(bus.subscriber_count(), 1);

        bus.dispatch(event(GamePayload::StartSpin)).await;
        bus.dispatch(event(GamePayload::StopSpin)).await;

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn dispatch_waits_for_async_handlers() {
        let bus = EventBus::new();
        let done = Arc::new(AtomicU32::new(0));

        let done_clone = Arc::clone(&done);
        bus.subscribe_async(move |_event| {
            let done = Arc::clone(&done_clone);
            async move {
                tokio::task::yield_now().await;
                done.fetch_add(1, Ordering::SeqCst);
            }
        });

        bus.dispatch(event(GamePayload::SkipWin)).await;
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unsubscribed_handler_is_not_called() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicU32::new(0));

        let count_clone = Arc::clone(&count);
        let id = bus.subscribe(move |_event| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.dispatch(event(GamePayload::StartSpin)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
