//! # State Manager
//!
//! Single-writer reactive store over an immutable value.
//!
//! - State is held as `Arc<T>` and replaced wholesale on every mutation, so
//!   snapshots handed out earlier (e.g. to the history manager) never change
//! - `set_state` compares the reducer output with the previous state by
//!   reference (`Arc::ptr_eq`); returning the same `Arc` is a no-op and
//!   notifies nobody
//! - `select` listeners receive the freshly derived value on every accepted
//!   `set_state`, with no equality check on the derived value

use easel_messaging::{HandlerId, Subscription};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

type Listener<T> = Arc<dyn Fn(&Arc<T>) + Send + Sync>;

struct Store<T> {
    state: Arc<T>,
    listeners: Vec<(HandlerId, Listener<T>)>,
}

/// Reactive store handle; clones share the same store
pub struct StateManager<T> {
    store: Arc<Mutex<Store<T>>>,
}

impl<T> Clone for StateManager<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<T: Send + Sync + 'static> StateManager<T> {
    pub fn new(initial: T) -> Self {
        Self::from_arc(Arc::new(initial))
    }

    pub fn from_arc(initial: Arc<T>) -> Self {
        Self {
            store: Arc::new(Mutex::new(Store {
                state: initial,
                listeners: Vec::new(),
            })),
        }
    }

    /// Current state. The returned value is immutable; later mutations
    /// produce a new `Arc` and leave this one untouched.
    pub fn get_state(&self) -> Arc<T> {
        self.store.lock().state.clone()
    }

    /// Replace the state with `reducer(current)`.
    ///
    /// Returns `false` (and notifies nobody) when the reducer hands back the
    /// current `Arc` unchanged.
    pub fn set_state<F>(&self, reducer: F) -> bool
    where
        F: FnOnce(&Arc<T>) -> Arc<T>,
    {
        let current = self.get_state();
        let next = reducer(&current);

        if Arc::ptr_eq(&current, &next) {
            debug!("State unchanged, skipping notification");
            return false;
        }

        let listeners: Vec<Listener<T>> = {
            let mut store = self.store.lock();
            store.state = next.clone();
            store
                .listeners
                .iter()
                .map(|(_, listener)| listener.clone())
                .collect()
        };

        for listener in &listeners {
            listener(&next);
        }
        debug!(listeners = listeners.len(), "State updated");
        true
    }

    /// Build the next state from a borrowed view of the current one.
    /// Always produces a new value, so listeners always fire.
    pub fn update<F>(&self, f: F) -> bool
    where
        F: FnOnce(&T) -> T,
    {
        self.set_state(|current| Arc::new(f(current)))
    }

    /// Listen to every state change
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Arc<T>) + Send + Sync + 'static,
    {
        let id = HandlerId::next();
        self.store.lock().listeners.push((id, Arc::new(listener)));

        let weak = Arc::downgrade(&self.store);
        Subscription::new(id, move || {
            if let Some(store) = weak.upgrade() {
                store.lock().listeners.retain(|(listener_id, _)| *listener_id != id);
            }
        })
    }

    /// Listen to a derived value. Fires immediately with the current derived
    /// value, then once per accepted `set_state`.
    pub fn select<S, Sel, F>(&self, selector: Sel, listener: F) -> Subscription
    where
        Sel: Fn(&T) -> S + Send + Sync + 'static,
        F: Fn(S) + Send + Sync + 'static,
    {
        listener(selector(&self.get_state()));
        self.subscribe(move |state| listener(selector(state)))
    }

    pub fn listener_count(&self) -> usize {
        self.store.lock().listeners.len()
    }
}
