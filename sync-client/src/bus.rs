//! In-process event bus.
//!
//! [`EventBus`] routes [`Message`] values to handlers keyed on the message
//! discriminant. Dispatch is synchronous on the publisher's thread and runs
//! handlers in registration order.
//!
//! # Design
//!
//! - The [`SubscriptionRegistry`] mutex is held only while the subscriber
//!   list is mutated or copied, never while a handler runs. Handlers may
//!   subscribe, unsubscribe or publish from inside a dispatch.
//! - A failing handler (error or panic) is logged and skipped; the rest of
//!   the dispatch continues.
//! - Nested publishes are bounded by [`MAX_DISPATCH_DEPTH`] per thread.
//! - Owners hold a [`SubscriptionScope`]; dropping it unsubscribes.
//!
//! # Example
//!
//! ```ignore
//! let bus = EventBus::init();
//! let scope = bus.scope();
//! scope.subscribe(MessageKind::Connected, |_| {
//!     tracing::info!("connected");
//!     Ok(())
//! });
//! bus.publish(Message::Connected)?;
//! drop(scope); // unsubscribes
//! ```

use std::cell::Cell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use syncview_types::{Message, MessageKind, OwnerId};
use thiserror::Error;

/// Maximum nesting of publish calls on one thread.
pub const MAX_DISPATCH_DEPTH: usize = 64;

/// Error returned by a handler. Logged by the bus, never propagated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct HandlerError(String);

impl HandlerError {
    /// Create a handler error with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Dispatch errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// Publish chain nested too deeply; probably a cycle.
    #[error("dispatch depth {depth} exceeds limit of {limit}")]
    CyclicDispatch {
        /// Depth the rejected publish would have run at.
        depth: usize,
        /// Configured limit.
        limit: usize,
    },

    /// The bus was shut down.
    #[error("event bus is shut down")]
    ShutDown,
}

/// Outcome of one publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchReport {
    /// Handlers that ran and returned Ok.
    pub delivered: usize,
    /// Handlers that returned an error or panicked.
    pub faults: usize,
}

/// A shared message handler.
///
/// Handler identity is the allocation: two clones of the same `Arc` are the
/// same handler.
pub type Handler = Arc<dyn Fn(&Message) -> Result<(), HandlerError> + Send + Sync>;

struct Subscription {
    owner: OwnerId,
    kind: MessageKind,
    handler: Handler,
    active: Arc<AtomicBool>,
}

/// A handler copied out of the registry for one dispatch.
struct Delivery {
    owner: OwnerId,
    handler: Handler,
    active: Arc<AtomicBool>,
}

/// Registered subscriptions, in registration order.
#[derive(Default)]
pub struct SubscriptionRegistry {
    subscriptions: Mutex<Vec<Subscription>>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Subscription>> {
        // Handlers never run under this lock, so poisoning can only come
        // from a panic inside the registry's own bookkeeping.
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a handler.
    ///
    /// Returns false without registering if the same (owner, kind, handler)
    /// triple is already present.
    pub fn subscribe(&self, owner: OwnerId, kind: MessageKind, handler: Handler) -> bool {
        let mut subscriptions = self.lock();
        let duplicate = subscriptions
            .iter()
            .any(|s| s.owner == owner && s.kind == kind && Arc::ptr_eq(&s.handler, &handler));
        if duplicate {
            return false;
        }
        subscriptions.push(Subscription {
            owner,
            kind,
            handler,
            active: Arc::new(AtomicBool::new(true)),
        });
        true
    }

    /// Remove every subscription of `owner`. Returns how many were removed.
    ///
    /// Removed handlers will not run, even if a dispatch already copied them.
    pub fn unsubscribe(&self, owner: OwnerId) -> usize {
        let mut subscriptions = self.lock();
        let before = subscriptions.len();
        subscriptions.retain(|s| {
            if s.owner == owner {
                s.active.store(false, Ordering::Release);
                false
            } else {
                true
            }
        });
        before - subscriptions.len()
    }

    /// Number of subscriptions held by `owner`.
    pub fn count_for(&self, owner: OwnerId) -> usize {
        self.lock().iter().filter(|s| s.owner == owner).count()
    }

    /// Total number of subscriptions.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Check if there are no subscriptions.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn deliveries(&self, kind: MessageKind) -> Vec<Delivery> {
        self.lock()
            .iter()
            .filter(|s| s.kind == kind)
            .map(|s| Delivery {
                owner: s.owner,
                handler: Arc::clone(&s.handler),
                active: Arc::clone(&s.active),
            })
            .collect()
    }

    fn clear(&self) {
        let mut subscriptions = self.lock();
        for s in subscriptions.iter() {
            s.active.store(false, Ordering::Release);
        }
        subscriptions.clear();
    }
}

thread_local! {
    static DISPATCH_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Tracks publish nesting on the current thread.
struct DepthGuard;

impl DepthGuard {
    fn enter() -> Result<Self, DispatchError> {
        DISPATCH_DEPTH.with(|depth| {
            let next = depth.get() + 1;
            if next > MAX_DISPATCH_DEPTH {
                return Err(DispatchError::CyclicDispatch {
                    depth: next,
                    limit: MAX_DISPATCH_DEPTH,
                });
            }
            depth.set(next);
            Ok(DepthGuard)
        })
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        DISPATCH_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// Process-wide typed publish/subscribe router.
///
/// Create one with [`EventBus::init`] at startup and hand the `Arc` to every
/// component; call [`EventBus::shutdown`] when the process stops.
#[derive(Default)]
pub struct EventBus {
    registry: SubscriptionRegistry,
    shut_down: AtomicBool,
}

impl EventBus {
    /// Create the bus.
    pub fn init() -> Arc<Self> {
        tracing::debug!("event bus initialized");
        Arc::new(Self::default())
    }

    /// The subscription registry.
    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    /// Register a handler for one message kind.
    ///
    /// Returns false if the identical subscription already exists or the bus
    /// is shut down.
    pub fn subscribe(&self, owner: OwnerId, kind: MessageKind, handler: Handler) -> bool {
        if self.is_shut_down() {
            return false;
        }
        self.registry.subscribe(owner, kind, handler)
    }

    /// Remove every subscription of `owner`.
    pub fn unsubscribe(&self, owner: OwnerId) -> usize {
        let removed = self.registry.unsubscribe(owner);
        tracing::debug!("unsubscribed {:?} ({} handlers)", owner, removed);
        removed
    }

    /// Open a subscription scope for a new owner.
    pub fn scope(self: &Arc<Self>) -> SubscriptionScope {
        SubscriptionScope {
            bus: Arc::clone(self),
            owner: OwnerId::next(),
            released: false,
        }
    }

    /// Deliver `message` to every handler subscribed to its kind.
    ///
    /// Handlers run synchronously, in registration order. Handler faults are
    /// counted in the report, not returned.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::ShutDown`] after [`EventBus::shutdown`].
    /// - [`DispatchError::CyclicDispatch`] if publishes nest deeper than
    ///   [`MAX_DISPATCH_DEPTH`] on this thread. No handler runs.
    pub fn publish(&self, message: Message) -> Result<DispatchReport, DispatchError> {
        if self.is_shut_down() {
            return Err(DispatchError::ShutDown);
        }
        let _depth = DepthGuard::enter().map_err(|e| {
            tracing::error!("dropping {:?}: {}", message.kind(), e);
            e
        })?;

        let mut report = DispatchReport::default();
        for delivery in self.registry.deliveries(message.kind()) {
            if !delivery.active.load(Ordering::Acquire) {
                continue;
            }
            match catch_unwind(AssertUnwindSafe(|| (delivery.handler)(&message))) {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(e)) => {
                    report.faults += 1;
                    tracing::warn!(
                        "handler of {:?} failed on {:?}: {}",
                        delivery.owner,
                        message.kind(),
                        e
                    );
                }
                Err(panic) => {
                    report.faults += 1;
                    tracing::warn!(
                        "handler of {:?} panicked on {:?}: {}",
                        delivery.owner,
                        message.kind(),
                        panic_message(panic.as_ref())
                    );
                }
            }
        }
        Ok(report)
    }

    /// Drop every subscription and reject further publishes.
    pub fn shutdown(&self) {
        if !self.shut_down.swap(true, Ordering::AcqRel) {
            self.registry.clear();
            tracing::debug!("event bus shut down");
        }
    }

    /// Check if [`EventBus::shutdown`] was called.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Lifetime of one subscription owner.
///
/// Every subscription made through the scope is removed when the scope is
/// released or dropped, whichever comes first.
pub struct SubscriptionScope {
    bus: Arc<EventBus>,
    owner: OwnerId,
    released: bool,
}

impl SubscriptionScope {
    /// Owner identity of this scope.
    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    /// The bus this scope subscribes on.
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Subscribe a closure. Returns the shared handler so the caller can
    /// re-register it idempotently.
    pub fn subscribe<F>(&self, kind: MessageKind, handler: F) -> Handler
    where
        F: Fn(&Message) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        let handler: Handler = Arc::new(handler);
        self.bus.subscribe(self.owner, kind, Arc::clone(&handler));
        handler
    }

    /// Subscribe an existing handler. No-op if already subscribed.
    pub fn subscribe_handler(&self, kind: MessageKind, handler: &Handler) -> bool {
        self.bus.subscribe(self.owner, kind, Arc::clone(handler))
    }

    /// Unsubscribe everything now.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if !self.released {
            self.released = true;
            self.bus.unsubscribe(self.owner);
        }
    }
}

impl Drop for SubscriptionScope {
    fn drop(&mut self) {
        self.release_inner();
    }
}

impl std::fmt::Debug for SubscriptionScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionScope")
            .field("owner", &self.owner)
            .field("released", &self.released)
            .finish()
    }
}
