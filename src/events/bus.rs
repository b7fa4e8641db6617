//! # Event bus: bounded pub/sub with a single consumer loop.
//!
//! [`Bus`] bridges hardware-callback threads and unit worker threads into
//! one consumer task that owns all handler execution.
//!
//! ## Architecture
//! ```text
//! Publishers (any thread):              Consumer (one task):
//!   bridge callbacks ──┐
//!   unit workers     ──┼─ publish_threadsafe ─► [bounded queue] ─► consumer loop
//!   loop-thread code ──┘      (publish)              FIFO              │
//!                                                                      ▼
//!                                                      matching handlers, in
//!                                                      registration order
//! ```
//!
//! ## Rules
//! - **Non-blocking publish**: on overflow the *oldest* queued event is
//!   dropped with a warning, then the new event is enqueued. Publishing
//!   never blocks and the queue never grows past its capacity.
//! - **Single consumer**: one event at a time, FIFO; matching handlers run
//!   **sequentially in registration order** on the loop that called
//!   [`Bus::start`].
//! - **Failure isolation**: a handler that returns `Err` or panics is
//!   logged and permanently unsubscribed; the other handlers for that
//!   event still fire. Panics are contained with `catch_unwind`.
//! - **Filters**: an optional exact-match payload filter narrows delivery
//!   per subscription (AND over all filter keys).
//!
//! ## Thread domains
//! `publish_threadsafe` is the only sanctioned ingress from a non-loop
//! thread (hardware callbacks, unit workers). Loop-thread code (handlers,
//! the launcher) uses `publish`. Both feed the same queue; the split keeps
//! call sites honest about which domain they run in.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use log::{debug, error, info, warn};
use serde_json::{Map, Value};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::events::handler::HandlerRef;
use crate::events::{Event, EventType};

/// Opaque id returned by [`Bus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One registered handler.
struct Subscription {
    event_type: EventType,
    handler: HandlerRef,
    filter: Option<Map<String, Value>>,
}

/// Subscription storage: id → subscription, plus a per-type index that
/// preserves registration order for dispatch.
#[derive(Default)]
struct Registry {
    subs: HashMap<SubscriptionId, Subscription>,
    by_type: HashMap<EventType, Vec<SubscriptionId>>,
}

impl Registry {
    fn insert(&mut self, sub: Subscription) -> SubscriptionId {
        let id = SubscriptionId::new();
        self.by_type.entry(sub.event_type).or_default().push(id);
        self.subs.insert(id, sub);
        id
    }

    fn remove(&mut self, id: SubscriptionId) {
        if let Some(sub) = self.subs.remove(&id) {
            if let Some(ids) = self.by_type.get_mut(&sub.event_type) {
                ids.retain(|other| *other != id);
            }
        }
    }

    /// Handlers matching `event`, in registration order.
    fn matching(&self, event: &Event) -> Vec<(SubscriptionId, HandlerRef)> {
        let Some(ids) = self.by_type.get(&event.event_type) else {
            return Vec::new();
        };
        ids.iter()
            .filter_map(|id| self.subs.get(id).map(|sub| (*id, sub)))
            .filter(|(_, sub)| match &sub.filter {
                Some(filter) => event.matches_filter(filter),
                None => true,
            })
            .map(|(id, sub)| (id, Arc::clone(&sub.handler)))
            .collect()
    }

    fn clear(&mut self) {
        self.subs.clear();
        self.by_type.clear();
    }
}

/// Consumer task bookkeeping, populated by `start()`.
#[derive(Default)]
struct ConsumerState {
    cancel: Option<CancellationToken>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

struct BusInner {
    capacity: usize,
    queue: Mutex<VecDeque<Event>>,
    notify: Notify,
    registry: Mutex<Registry>,
    consumer: Mutex<ConsumerState>,
}

/// Bounded pub/sub broker with a single consumer loop.
///
/// Cheap to clone (internally `Arc`-backed); every component holds its own
/// `Bus` handle.
#[derive(Clone)]
pub struct Bus {
    inner: Arc<BusInner>,
}

impl Bus {
    /// Creates a new bus with the given queue capacity (clamped to min 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(BusInner {
                capacity: capacity.max(1),
                queue: Mutex::new(VecDeque::new()),
                notify: Notify::new(),
                registry: Mutex::new(Registry::default()),
                consumer: Mutex::new(ConsumerState::default()),
            }),
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Starts the consumer task on the current runtime.
    ///
    /// Must be called from async context; the runtime that runs this call
    /// becomes the owning loop for all handler execution. Calling `start`
    /// on an already-started bus is a no-op.
    pub fn start(&self) {
        let mut consumer = self.inner.consumer.lock().expect("bus consumer lock");
        if consumer.handle.is_some() {
            debug!("bus already started");
            return;
        }
        let cancel = CancellationToken::new();
        let me = self.clone();
        let token = cancel.clone();
        let handle = tokio::spawn(async move { me.consume(token).await });
        consumer.cancel = Some(cancel);
        consumer.handle = Some(handle);
        info!("event bus started (capacity={})", self.inner.capacity);
    }

    /// Stops the consumer task and clears all subscriptions.
    ///
    /// Must not be called from inside a handler (the consumer cannot join
    /// itself); the system layer drives shutdown from outside the loop.
    pub async fn stop(&self) {
        let (cancel, handle) = {
            let mut consumer = self.inner.consumer.lock().expect("bus consumer lock");
            (consumer.cancel.take(), consumer.handle.take())
        };
        if let Some(cancel) = cancel {
            cancel.cancel();
        }
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        self.inner.registry.lock().expect("bus registry lock").clear();
        self.inner.queue.lock().expect("bus queue lock").clear();
        info!("event bus stopped");
    }

    // ------------------------------------------------------------------
    // Publish
    // ------------------------------------------------------------------

    /// Enqueues an event from loop-thread code (handlers, launcher).
    pub fn publish(&self, event_type: EventType, payload: Map<String, Value>) {
        self.enqueue(Event::with_payload(event_type, payload));
    }

    /// Enqueues an event from any thread.
    ///
    /// The only sanctioned path from hardware-callback threads and unit
    /// worker threads into the bus. The consumer loop picks the event up on
    /// its own runtime; handlers never run on the caller's thread.
    pub fn publish_threadsafe(&self, event_type: EventType, payload: Map<String, Value>) {
        self.enqueue(Event::with_payload(event_type, payload));
    }

    /// Enqueues a pre-built event (builder-style call sites).
    pub fn publish_event(&self, event: Event) {
        self.enqueue(event);
    }

    fn enqueue(&self, event: Event) {
        {
            let mut queue = self.inner.queue.lock().expect("bus queue lock");
            if queue.len() >= self.inner.capacity {
                if let Some(dropped) = queue.pop_front() {
                    warn!(
                        "bus queue overflow (capacity={}), dropped oldest event '{}'",
                        self.inner.capacity, dropped.event_type
                    );
                }
            }
            queue.push_back(event);
        }
        self.inner.notify.notify_one();
    }

    /// Current queue depth (introspection / tests).
    pub fn queue_len(&self) -> usize {
        self.inner.queue.lock().expect("bus queue lock").len()
    }

    // ------------------------------------------------------------------
    // Subscribe / unsubscribe
    // ------------------------------------------------------------------

    /// Registers `handler` for `event_type`, returning a subscription id.
    ///
    /// If `filter` is given, the handler only fires when every filter
    /// key/value pair matches the event payload exactly. Callable from any
    /// thread.
    pub fn subscribe(
        &self,
        event_type: EventType,
        handler: HandlerRef,
        filter: Option<Map<String, Value>>,
    ) -> SubscriptionId {
        let mut registry = self.inner.registry.lock().expect("bus registry lock");
        registry.insert(Subscription {
            event_type,
            handler,
            filter,
        })
    }

    /// Removes the subscription. Idempotent; unknown ids are ignored.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        let mut registry = self.inner.registry.lock().expect("bus registry lock");
        registry.remove(id);
    }

    // ------------------------------------------------------------------
    // Consumer loop
    // ------------------------------------------------------------------

    async fn consume(self, cancel: CancellationToken) {
        loop {
            // Arm the wakeup before checking the queue so a publish racing
            // with the check cannot be missed.
            let notified = self.inner.notify.notified();
            let next = {
                let mut queue = self.inner.queue.lock().expect("bus queue lock");
                queue.pop_front()
            };
            match next {
                Some(event) => self.dispatch(event).await,
                None => {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = notified => {}
                    }
                }
            }
        }
        debug!("bus consumer loop exited");
    }

    /// Dispatches one event to every matching handler, in registration
    /// order. A handler that fails is unsubscribed on the spot.
    async fn dispatch(&self, event: Event) {
        let matching = {
            let registry = self.inner.registry.lock().expect("bus registry lock");
            registry.matching(&event)
        };

        for (id, handler) in matching {
            let fut = handler.on_event(event.clone());
            match std::panic::AssertUnwindSafe(fut).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    error!(
                        "handler '{}' for '{}' failed: {} — unsubscribing",
                        handler.name(),
                        event.event_type,
                        err
                    );
                    self.unsubscribe(id);
                }
                Err(panic_err) => {
                    let info = panic_message(&panic_err);
                    error!(
                        "handler '{}' for '{}' panicked: {} — unsubscribing",
                        handler.name(),
                        event.event_type,
                        info
                    );
                    self.unsubscribe(id);
                }
            }
        }
    }
}

/// Best-effort extraction of a panic payload message.
pub(crate) fn panic_message(panic_err: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic_err.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic_err.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::HandlerFn;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Polls `cond` until it holds or the timeout elapses.
    async fn wait_until(cond: impl Fn() -> bool, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while !cond() {
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        true
    }

    fn counting_handler(counter: Arc<AtomicUsize>) -> HandlerRef {
        HandlerFn::arc("counter", move |_ev| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
    }

    #[tokio::test]
    async fn overflow_drops_oldest_first() {
        let bus = Bus::new(2);
        // Consumer not started: events stay queued.
        bus.publish(EventType::DisplayUpdated, Map::new());
        bus.publish_event(Event::new(EventType::DisplayUpdated).with("value", 2));
        bus.publish_event(Event::new(EventType::DisplayUpdated).with("value", 3));

        assert_eq!(bus.queue_len(), 2);
        let front = bus
            .inner
            .queue
            .lock()
            .unwrap()
            .front()
            .cloned()
            .unwrap();
        // The first (payload-less) event was dropped.
        assert_eq!(front.payload_u64("value"), Some(2));
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_silent() {
        let bus = Bus::new(16);
        bus.start();
        for _ in 0..5 {
            bus.publish(EventType::GoPressed, Map::new());
        }
        assert!(wait_until(|| bus.queue_len() == 0, Duration::from_secs(1)).await);
        bus.stop().await;
    }

    #[tokio::test]
    async fn handlers_fire_in_registration_order() {
        let bus = Bus::new(16);
        let order = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            bus.subscribe(
                EventType::GoPressed,
                HandlerFn::arc(tag, move |_ev| {
                    let order = Arc::clone(&order);
                    async move {
                        order.lock().unwrap().push(tag);
                        Ok(())
                    }
                }),
                None,
            );
        }
        bus.start();
        bus.publish(EventType::GoPressed, Map::new());

        assert!(
            wait_until(
                || order.lock().unwrap().len() == 3,
                Duration::from_secs(1)
            )
            .await
        );
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
        bus.stop().await;
    }

    #[tokio::test]
    async fn failing_handler_is_removed_others_survive() {
        let bus = Bus::new(16);
        let failures = Arc::new(AtomicUsize::new(0));
        let healthy = Arc::new(AtomicUsize::new(0));

        {
            let failures = Arc::clone(&failures);
            bus.subscribe(
                EventType::GoPressed,
                HandlerFn::arc("flaky", move |_ev| {
                    let failures = Arc::clone(&failures);
                    async move {
                        failures.fetch_add(1, Ordering::SeqCst);
                        Err(crate::error::HandlerError::new("boom"))
                    }
                }),
                None,
            );
        }
        bus.subscribe(EventType::GoPressed, counting_handler(Arc::clone(&healthy)), None);

        bus.start();
        bus.publish(EventType::GoPressed, Map::new());
        bus.publish(EventType::GoPressed, Map::new());

        assert!(
            wait_until(
                || healthy.load(Ordering::SeqCst) == 2,
                Duration::from_secs(1)
            )
            .await
        );
        // The failing handler fired exactly once, then was unsubscribed.
        assert_eq!(failures.load(Ordering::SeqCst), 1);
        bus.stop().await;
    }

    #[tokio::test]
    async fn panicking_handler_is_removed() {
        let bus = Bus::new(16);
        let healthy = Arc::new(AtomicUsize::new(0));

        bus.subscribe(
            EventType::GoPressed,
            HandlerFn::arc("bomb", |_ev| async move {
                panic!("handler exploded");
                #[allow(unreachable_code)]
                Ok(())
            }),
            None,
        );
        bus.subscribe(EventType::GoPressed, counting_handler(Arc::clone(&healthy)), None);

        bus.start();
        bus.publish(EventType::GoPressed, Map::new());
        bus.publish(EventType::GoPressed, Map::new());

        assert!(
            wait_until(
                || healthy.load(Ordering::SeqCst) == 2,
                Duration::from_secs(1)
            )
            .await
        );
        bus.stop().await;
    }

    #[tokio::test]
    async fn filter_narrows_delivery() {
        let bus = Bus::new(16);
        let hits = Arc::new(AtomicUsize::new(0));

        let mut filter = Map::new();
        filter.insert("color".into(), json!("red"));
        bus.subscribe(
            EventType::ButtonPressed,
            counting_handler(Arc::clone(&hits)),
            Some(filter),
        );

        bus.start();
        bus.publish_event(Event::new(EventType::ButtonPressed).with("color", "blue"));
        bus.publish_event(Event::new(EventType::ButtonPressed).with("color", "red"));

        assert!(wait_until(|| bus.queue_len() == 0, Duration::from_secs(1)).await);
        assert!(
            wait_until(
                || hits.load(Ordering::SeqCst) == 1,
                Duration::from_secs(1)
            )
            .await
        );
        bus.stop().await;
    }

    #[tokio::test]
    async fn unsubscribe_is_idempotent() {
        let bus = Bus::new(16);
        let hits = Arc::new(AtomicUsize::new(0));
        let id = bus.subscribe(EventType::GoPressed, counting_handler(Arc::clone(&hits)), None);
        bus.unsubscribe(id);
        bus.unsubscribe(id); // second removal is a no-op

        bus.start();
        bus.publish(EventType::GoPressed, Map::new());
        assert!(wait_until(|| bus.queue_len() == 0, Duration::from_secs(1)).await);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        bus.stop().await;
    }
}
