//! Typed publish/subscribe with an ordered asynchronous delivery queue.
//!
//! `publish` only enqueues. A single drain task, started with
//! [`EventBus::start`], pops events in FIFO order and fans each one out to
//! the all-event listeners first, then to the listeners of its kind, in
//! subscription order. `emit` performs the same fan-out inline.
//!
//! A handler that returns an error or panics is logged and skipped; the
//! remaining handlers still see the event and the publisher never observes
//! the failure.

use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::events::{Event, EventKind};

/// How long the drain task waits on an empty queue before re-checking for
/// cancellation.
pub const DRAIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

pub type HandlerResult = anyhow::Result<()>;

#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &Event) -> HandlerResult;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(Event) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send,
{
    async fn handle(&self, event: &Event) -> HandlerResult {
        (self.0)(event.clone()).await
    }
}

/// Wrap an async closure as a handler. The closure receives its own copy of
/// the event.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn EventHandler>
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// Outcome of fanning one event out to its handlers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    pub handlers: usize,
    pub failures: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BusStats {
    pub published: u64,
    pub delivered: u64,
    pub handler_failures: u64,
    pub queued: usize,
}

struct Subscription {
    id: SubscriptionId,
    /// `None` listens to every kind.
    kind: Option<EventKind>,
    handler: Arc<dyn EventHandler>,
}

struct Shared {
    queue: Mutex<VecDeque<Event>>,
    notify: Notify,
    subscriptions: RwLock<Vec<Subscription>>,
    next_id: AtomicU64,
    published: AtomicU64,
    delivered: AtomicU64,
    failures: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl Shared {
    fn enqueue(&self, event: Event) {
        lock(&self.queue).push_back(event);
        self.published.fetch_add(1, Ordering::Relaxed);
        self.notify.notify_waiters();
    }

    fn pop(&self) -> Option<Event> {
        lock(&self.queue).pop_front()
    }

    /// Take the first queued event of `kind`. Events ahead of it move to the
    /// back of the queue, keeping their relative order.
    fn take_matching(&self, kind: EventKind) -> Option<Event> {
        let mut queue = lock(&self.queue);
        let mut skipped = Vec::new();
        let mut found = None;
        while let Some(event) = queue.pop_front() {
            if event.kind() == kind {
                found = Some(event);
                break;
            }
            skipped.push(event);
        }
        queue.extend(skipped);
        found
    }

    fn handlers_for(&self, kind: EventKind) -> Vec<(SubscriptionId, Arc<dyn EventHandler>)> {
        let subs = self.subscriptions.read().unwrap_or_else(|e| e.into_inner());
        let all = subs.iter().filter(|s| s.kind.is_none());
        let typed = subs.iter().filter(|s| s.kind == Some(kind));
        all.chain(typed)
            .map(|s| (s.id, Arc::clone(&s.handler)))
            .collect()
    }

    async fn dispatch(&self, event: &Event) -> Delivery {
        let kind = event.kind();
        let handlers = self.handlers_for(kind);
        let mut delivery = Delivery {
            handlers: handlers.len(),
            failures: 0,
        };

        for (id, handler) in handlers {
            match AssertUnwindSafe(handler.handle(event)).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    delivery.failures += 1;
                    warn!(kind = %kind, subscription = id.0, error = %err, "event handler failed");
                }
                Err(panic) => {
                    delivery.failures += 1;
                    error!(
                        kind = %kind,
                        subscription = id.0,
                        panic = panic_message(panic.as_ref()),
                        "event handler panicked"
                    );
                }
            }
        }

        self.delivered.fetch_add(1, Ordering::Relaxed);
        self.failures
            .fetch_add(delivery.failures as u64, Ordering::Relaxed);
        delivery
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

struct DrainTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct Inner {
    shared: Arc<Shared>,
    drain: Mutex<Option<DrainTask>>,
}

/// Cloning yields another handle onto the same bus.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("stats", &self.stats())
            .field("running", &self.is_running())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                shared: Arc::new(Shared {
                    queue: Mutex::new(VecDeque::new()),
                    notify: Notify::new(),
                    subscriptions: RwLock::new(Vec::new()),
                    next_id: AtomicU64::new(1),
                    published: AtomicU64::new(0),
                    delivered: AtomicU64::new(0),
                    failures: AtomicU64::new(0),
                }),
                drain: Mutex::new(None),
            }),
        }
    }

    pub fn subscribe(&self, kind: EventKind, handler: Arc<dyn EventHandler>) -> SubscriptionId {
        self.add_subscription(Some(kind), handler)
    }

    pub fn subscribe_all(&self, handler: Arc<dyn EventHandler>) -> SubscriptionId {
        self.add_subscription(None, handler)
    }

    fn add_subscription(
        &self,
        kind: Option<EventKind>,
        handler: Arc<dyn EventHandler>,
    ) -> SubscriptionId {
        let shared = &self.inner.shared;
        let id = SubscriptionId(shared.next_id.fetch_add(1, Ordering::Relaxed));
        shared
            .subscriptions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(Subscription { id, kind, handler });
        debug!(subscription = id.0, kind = ?kind, "subscribed");
        id
    }

    /// Returns false if the id was unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self
            .inner
            .shared
            .subscriptions
            .write()
            .unwrap_or_else(|e| e.into_inner());
        let before = subs.len();
        subs.retain(|s| s.id != id);
        subs.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner
            .shared
            .subscriptions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Enqueue without waiting for delivery.
    pub fn publish(&self, event: Event) {
        self.inner.shared.enqueue(event);
    }

    /// Deliver to every matching handler now, bypassing the queue.
    pub async fn emit(&self, event: &Event) -> Delivery {
        self.inner.shared.dispatch(event).await
    }

    /// Handle for publishing from inside handlers without keeping the bus
    /// alive.
    pub fn publisher(&self) -> Publisher {
        Publisher {
            shared: Arc::downgrade(&self.inner.shared),
        }
    }

    /// Spawn the drain task. Returns false if it is already running.
    pub fn start(&self) -> bool {
        let mut drain = lock(&self.inner.drain);
        if let Some(task) = drain.as_ref() {
            if !task.handle.is_finished() {
                return false;
            }
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(drain_loop(
            Arc::clone(&self.inner.shared),
            cancel.clone(),
        ));
        *drain = Some(DrainTask { cancel, handle });
        info!("event bus started");
        true
    }

    pub fn is_running(&self) -> bool {
        lock(&self.inner.drain)
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
    }

    /// Stop the drain task after its current delivery, then discard whatever
    /// is still queued. Returns the number of discarded events.
    pub async fn stop(&self) -> usize {
        let task = lock(&self.inner.drain).take();
        if let Some(task) = task {
            task.cancel.cancel();
            if let Err(err) = task.handle.await {
                error!(error = %err, "event bus drain task ended abnormally");
            }
        }

        let discarded = {
            let mut queue = lock(&self.inner.shared.queue);
            let n = queue.len();
            queue.clear();
            n
        };
        info!(discarded, "event bus stopped");
        discarded
    }

    /// Pull the next queued event of `kind`, waiting up to `timeout`.
    ///
    /// Non-matching events ahead of the match are requeued at the back. They
    /// keep their order among themselves but land behind anything published
    /// in the meantime.
    pub async fn wait_for(&self, kind: EventKind, timeout: Duration) -> Option<Event> {
        let shared = &self.inner.shared;
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = shared.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(event) = shared.take_matching(kind) {
                return Some(event);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return None;
            }
        }
    }

    pub fn queue_len(&self) -> usize {
        lock(&self.inner.shared.queue).len()
    }

    pub fn stats(&self) -> BusStats {
        let shared = &self.inner.shared;
        BusStats {
            published: shared.published.load(Ordering::Relaxed),
            delivered: shared.delivered.load(Ordering::Relaxed),
            handler_failures: shared.failures.load(Ordering::Relaxed),
            queued: self.queue_len(),
        }
    }
}

async fn drain_loop(shared: Arc<Shared>, cancel: CancellationToken) {
    loop {
        let notified = shared.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if cancel.is_cancelled() {
            break;
        }
        if let Some(event) = shared.pop() {
            shared.dispatch(&event).await;
            continue;
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = &mut notified => {}
            _ = tokio::time::sleep(DRAIN_POLL_INTERVAL) => {}
        }
    }
    debug!("event bus drain loop exited");
}

/// Weak publishing handle. Publishing after the bus is dropped is a no-op.
#[derive(Clone)]
pub struct Publisher {
    shared: Weak<Shared>,
}

impl Publisher {
    /// Returns false if the bus no longer exists.
    pub fn publish(&self, event: Event) -> bool {
        match self.shared.upgrade() {
            Some(shared) => {
                shared.enqueue(event);
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("alive", &(self.shared.strong_count() > 0))
            .finish()
    }
}
