//! Single-slot replaying value holder with activation callbacks.
//!
//! An [`ObservableCell`] keeps the last published value and fans every new
//! value out to its current subscribers. It tracks how many subscribers are
//! attached and invokes `on_active` exactly once per 0→1 transition and
//! `on_inactive` exactly once per 1→0 transition.
//!
//! # Invariants
//!
//! 1. A value published while nobody observes is retained and is the first
//!    value the next subscriber receives, unless another publish intervened.
//! 2. Publish order equals delivery order for every subscriber.
//! 3. Activation callbacks never run concurrently with each other for the
//!    same cell, and transitions are reported in the order they happened.
//!
//! Callbacks run on the thread that subscribed or unsubscribed. They must not
//! subscribe to or unsubscribe from the same cell.

use std::sync::{Arc, Mutex, MutexGuard, OnceLock, Weak};

use tokio::sync::mpsc;
use tracing::trace;

type Callback = Arc<dyn Fn() + Send + Sync>;

struct ActivationHooks {
    on_active: Callback,
    on_inactive: Callback,
}

struct CellState<T> {
    value: Option<T>,
    observers: Vec<(u64, mpsc::UnboundedSender<T>)>,
    next_id: u64,
}

struct Shared<T> {
    state: Mutex<CellState<T>>,
    transitions: Mutex<()>,
    hooks: OnceLock<ActivationHooks>,
}

/// Cloning an `ObservableCell` creates another handle to the same state.
pub struct ObservableCell<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for ObservableCell<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> std::fmt::Debug for ObservableCell<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.shared.state);
        f.debug_struct("ObservableCell")
            .field("observers", &state.observers.len())
            .field("has_value", &state.value.is_some())
            .finish()
    }
}

impl<T: Clone + Send + 'static> Default for ObservableCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> ObservableCell<T> {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(CellState {
                    value: None,
                    observers: Vec::new(),
                    next_id: 0,
                }),
                transitions: Mutex::new(()),
                hooks: OnceLock::new(),
            }),
        }
    }

    pub fn with_activation<A, I>(on_active: A, on_inactive: I) -> Self
    where
        A: Fn() + Send + Sync + 'static,
        I: Fn() + Send + Sync + 'static,
    {
        let cell = Self::new();
        cell.set_activation(on_active, on_inactive);
        cell
    }

    /// Installs the activation callbacks. Only the first call takes effect;
    /// returns `false` when callbacks were already installed.
    pub fn set_activation<A, I>(&self, on_active: A, on_inactive: I) -> bool
    where
        A: Fn() + Send + Sync + 'static,
        I: Fn() + Send + Sync + 'static,
    {
        self.shared
            .hooks
            .set(ActivationHooks {
                on_active: Arc::new(on_active),
                on_inactive: Arc::new(on_inactive),
            })
            .is_ok()
    }

    /// Stores `value` and delivers it to every current subscriber.
    pub fn publish(&self, value: T) {
        let mut state = lock(&self.shared.state);
        for (_, tx) in &state.observers {
            let _ = tx.send(value.clone());
        }
        if state.observers.is_empty() {
            trace!("publish without observers; value retained");
        }
        state.value = Some(value);
    }

    pub fn subscribe(&self) -> Subscription<T> {
        let _transition = lock(&self.shared.transitions);
        let (tx, rx) = mpsc::unbounded_channel();
        let (id, activated) = {
            let mut state = lock(&self.shared.state);
            if let Some(value) = &state.value {
                let _ = tx.send(value.clone());
            }
            let id = state.next_id;
            state.next_id += 1;
            state.observers.push((id, tx));
            (id, state.observers.len() == 1)
        };
        if activated {
            if let Some(hooks) = self.shared.hooks.get() {
                (hooks.on_active)();
            }
        }
        Subscription {
            id,
            rx,
            cell: Arc::downgrade(&self.shared),
        }
    }

    /// Last published value, if any.
    pub fn value(&self) -> Option<T> {
        lock(&self.shared.state).value.clone()
    }

    pub fn observer_count(&self) -> usize {
        lock(&self.shared.state).observers.len()
    }

    pub fn is_active(&self) -> bool {
        self.observer_count() > 0
    }
}

impl<T> Shared<T> {
    fn detach(&self, id: u64) {
        let _transition = lock(&self.transitions);
        let deactivated = {
            let mut state = lock(&self.state);
            let before = state.observers.len();
            state.observers.retain(|(observer, _)| *observer != id);
            before > 0 && state.observers.is_empty()
        };
        if deactivated {
            if let Some(hooks) = self.hooks.get() {
                (hooks.on_inactive)();
            }
        }
    }
}

/// Receiving end of an [`ObservableCell`]. Dropping it unsubscribes.
pub struct Subscription<T> {
    id: u64,
    rx: mpsc::UnboundedReceiver<T>,
    cell: Weak<Shared<T>>,
}

impl<T> Subscription<T> {
    /// Waits for the next value. Returns `None` once the cell is gone and
    /// every pending value was drained.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Next pending value without waiting.
    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    pub fn unsubscribe(self) {}
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(shared) = self.cell.upgrade() {
            shared.detach(self.id);
        }
    }
}

// A panic inside a callback must not wedge the cell for everyone else.
fn lock<S>(mutex: &Mutex<S>) -> MutexGuard<'_, S> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
