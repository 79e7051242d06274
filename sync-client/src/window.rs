//! Window controller: runs the window state machine against the bus.
//!
//! [`WindowState`] decides; this module executes. Actions are queued in the
//! order the state machine produced them and run under a per-controller
//! executor lock, so a release is never overtaken by a later adoption.
//!
//! [`WindowController::handle`] returns only after its own actions ran. A
//! caller on another thread waits for the executor; a resource callback that
//! publishes back into the same controller only enqueues, and the drain
//! already running on that thread picks the actions up.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};
use syncview_core::{OpenPhase, Visibility, WindowAction, WindowPolicy, WindowState};
use syncview_types::{Message, MessageKind, PeerUid, WindowKind};
use thiserror::Error;

use crate::bus::{EventBus, SubscriptionScope};

/// Failure to load resources for a target.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("resource error: {0}")]
pub struct ResourceError(String);

impl ResourceError {
    /// Create a resource error with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Per-target resources a window loads and drops (portraits, profile data).
pub trait TargetResources: Send + Sync {
    /// Load resources for `target`.
    fn adopt(&self, window: WindowKind, target: &PeerUid) -> Result<(), ResourceError>;

    /// Drop every resource held for `target`.
    fn release(&self, window: WindowKind, target: &PeerUid);

    /// The window became visible.
    fn opened(&self, _window: WindowKind) {}

    /// The window became hidden.
    fn closed(&self, _window: WindowKind) {}
}

impl<T: TargetResources + ?Sized> TargetResources for Arc<T> {
    fn adopt(&self, window: WindowKind, target: &PeerUid) -> Result<(), ResourceError> {
        (**self).adopt(window, target)
    }

    fn release(&self, window: WindowKind, target: &PeerUid) {
        (**self).release(window, target)
    }

    fn opened(&self, window: WindowKind) {
        (**self).opened(window)
    }

    fn closed(&self, window: WindowKind) {
        (**self).closed(window)
    }
}

/// Drives one window from bus messages.
pub struct WindowController<R> {
    policy: WindowPolicy,
    resources: R,
    state: Mutex<WindowState>,
    queue: Mutex<VecDeque<WindowAction>>,
    executor: Mutex<()>,
    drainer: Mutex<Option<ThreadId>>,
}

impl<R: TargetResources + 'static> WindowController<R> {
    /// Create a closed window.
    pub fn new(policy: WindowPolicy, resources: R) -> Arc<Self> {
        Arc::new(Self {
            policy,
            resources,
            state: Mutex::new(WindowState::new()),
            queue: Mutex::new(VecDeque::new()),
            executor: Mutex::new(()),
            drainer: Mutex::new(None),
        })
    }

    /// Subscribe to the messages this window's policy reacts to.
    pub fn attach(self: &Arc<Self>, bus: &Arc<EventBus>) -> SubscriptionScope {
        let scope = bus.scope();
        let toggle = if self.policy.targeted {
            MessageKind::ToggleTarget
        } else {
            MessageKind::ToggleWindow
        };
        let kinds = [
            MessageKind::SpecialModeEntered,
            MessageKind::SpecialModeExited,
            MessageKind::Disconnected,
            toggle,
        ];

        let weak = Arc::downgrade(self);
        let handler = scope.subscribe(kinds[0], move |message| {
            if let Some(this) = weak.upgrade() {
                this.handle(message);
            }
            Ok(())
        });
        for kind in &kinds[1..] {
            scope.subscribe_handler(*kind, &handler);
        }
        scope
    }

    /// The policy this controller runs.
    pub fn policy(&self) -> &WindowPolicy {
        &self.policy
    }

    /// Current visibility.
    pub fn visibility(&self) -> Visibility {
        self.lock_state().visibility()
    }

    /// Check if currently open.
    pub fn is_open(&self) -> bool {
        self.lock_state().is_open()
    }

    /// Peer the window currently shows.
    pub fn target(&self) -> Option<PeerUid> {
        self.lock_state().target().cloned()
    }

    /// Move an open window to another phase.
    pub fn set_phase(&self, phase: OpenPhase) {
        let mut state = self.lock_state();
        *state = state.clone().with_phase(phase);
    }

    /// Feed one message through the state machine and run its actions.
    pub fn handle(&self, message: &Message) {
        {
            let mut state = self.lock_state();
            let (next, actions) = state.clone().on_message(&self.policy, message);
            *state = next;
            if !actions.is_empty() {
                tracing::debug!(
                    "{:?} window: {:?} -> {:?}",
                    self.policy.kind,
                    message.kind(),
                    actions
                );
            }
            // Enqueue under the state lock so queue order matches state order.
            self.lock_queue().extend(actions);
        }
        self.drain();
    }

    fn lock_state(&self) -> MutexGuard<'_, WindowState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_queue(&self) -> MutexGuard<'_, VecDeque<WindowAction>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_drainer(&self) -> MutexGuard<'_, Option<ThreadId>> {
        self.drainer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run every queued action, including the caller's own.
    fn drain(&self) {
        let me = thread::current().id();
        if *self.lock_drainer() == Some(me) {
            // Re-entered from a resource callback; the outer drain runs it.
            return;
        }

        let _executor = self.executor.lock().unwrap_or_else(PoisonError::into_inner);
        *self.lock_drainer() = Some(me);
        let _drainer = DrainerGuard(&self.drainer);
        loop {
            // Pop in its own statement: the queue lock must not be held
            // while a resource callback runs.
            let next = self.lock_queue().pop_front();
            let Some(action) = next else { break };
            self.execute(action);
        }
    }

    fn execute(&self, action: WindowAction) {
        let kind = self.policy.kind;
        match action {
            WindowAction::ReleaseTarget(target) => self.resources.release(kind, &target),
            WindowAction::AdoptTarget(target) => {
                if let Err(e) = self.resources.adopt(kind, &target) {
                    tracing::warn!("{:?} window failed to load {}: {}", kind, target, e);
                    let mut state = self.lock_state();
                    if state.target() == Some(&target) {
                        *state = state.clone().with_phase(OpenPhase::Faulted);
                    }
                }
            }
            WindowAction::Opened => self.resources.opened(kind),
            WindowAction::Closed => self.resources.closed(kind),
        }
    }
}

struct DrainerGuard<'a>(&'a Mutex<Option<ThreadId>>);

impl Drop for DrainerGuard<'_> {
    fn drop(&mut self) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl<R> std::fmt::Debug for WindowController<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowController")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
