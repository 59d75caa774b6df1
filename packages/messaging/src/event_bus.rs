//! # Event Bus
//!
//! Generic publish/subscribe keyed by event name.
//!
//! ## Semantics
//!
//! - `emit` runs every persistent handler for the event, then every one-shot
//!   handler, in registration order
//! - The one-shot set is taken out of the bus when dispatch starts: a handler
//!   that re-emits the same event cannot trigger those one-shots again, while
//!   one-shots registered during dispatch fire on the next `emit`
//! - Handler failures are isolated and reported in the [`DispatchReport`]

use crate::dispatch::{invoke_isolated, DispatchReport, HandlerId, HandlerResult, Subscription};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tracing::debug;

type Handler<A> = Arc<dyn Fn(&A) -> HandlerResult + Send + Sync>;
type HandlerList<A> = Vec<(HandlerId, Handler<A>)>;

struct Handlers<A> {
    persistent: HashMap<String, HandlerList<A>>,
    once: HashMap<String, HandlerList<A>>,
}

impl<A> Handlers<A> {
    fn remove(&mut self, event: &str, id: HandlerId, once: bool) -> bool {
        let table = if once { &mut self.once } else { &mut self.persistent };
        let Some(list) = table.get_mut(event) else {
            return false;
        };

        let before = list.len();
        list.retain(|(handler_id, _)| *handler_id != id);
        let removed = list.len() != before;

        if list.is_empty() {
            table.remove(event);
        }
        removed
    }
}

/// Name-keyed event bus carrying arguments of type `A`
pub struct EventBus<A> {
    handlers: Arc<Mutex<Handlers<A>>>,
}

impl<A> Clone for EventBus<A> {
    fn clone(&self) -> Self {
        Self {
            handlers: self.handlers.clone(),
        }
    }
}

impl<A: 'static> EventBus<A> {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(Mutex::new(Handlers {
                persistent: HashMap::new(),
                once: HashMap::new(),
            })),
        }
    }

    /// Register a persistent handler
    pub fn on<F>(&self, event: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(&A) -> HandlerResult + Send + Sync + 'static,
    {
        self.register(event.into(), Arc::new(handler), false)
    }

    /// Register a handler that fires on the next emit only
    pub fn once<F>(&self, event: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(&A) -> HandlerResult + Send + Sync + 'static,
    {
        self.register(event.into(), Arc::new(handler), true)
    }

    fn register(&self, event: String, handler: Handler<A>, once: bool) -> Subscription {
        let id = HandlerId::next();
        {
            let mut handlers = self.handlers.lock();
            let table = if once {
                &mut handlers.once
            } else {
                &mut handlers.persistent
            };
            table.entry(event.clone()).or_default().push((id, handler));
        }
        debug!(event = %event, handler = %id, once, "Registered event handler");

        let weak: Weak<Mutex<Handlers<A>>> = Arc::downgrade(&self.handlers);
        Subscription::new(id, move || {
            if let Some(handlers) = weak.upgrade() {
                handlers.lock().remove(&event, id, once);
            }
        })
    }

    /// Remove a handler by id. Returns whether anything was removed.
    pub fn off(&self, event: &str, id: HandlerId, once: bool) -> bool {
        self.handlers.lock().remove(event, id, once)
    }

    /// Deliver `args` to every handler registered for `event`
    pub fn emit(&self, event: &str, args: &A) -> DispatchReport {
        let (persistent, once) = {
            let mut handlers = self.handlers.lock();
            let persistent = handlers.persistent.get(event).cloned().unwrap_or_default();
            let once = handlers.once.remove(event).unwrap_or_default();
            (persistent, once)
        };

        let mut report = DispatchReport::default();
        for (id, handler) in persistent.iter().chain(once.iter()) {
            report.record(invoke_isolated(event, *id, || handler(args)));
        }

        debug!(
            event = %event,
            delivered = report.delivered,
            failed = report.failed,
            "Emitted event"
        );
        report
    }

    /// Drop every handler for every event
    pub fn clear(&self) {
        let mut handlers = self.handlers.lock();
        handlers.persistent.clear();
        handlers.once.clear();
    }

    pub fn listener_count(&self, event: &str) -> usize {
        let handlers = self.handlers.lock();
        handlers.persistent.get(event).map_or(0, Vec::len)
            + handlers.once.get(event).map_or(0, Vec::len)
    }

    pub fn has_listeners(&self, event: &str) -> bool {
        self.listener_count(event) > 0
    }
}

impl<A: 'static> Default for EventBus<A> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    #[test]
    fn test_on_and_emit() {
        let bus: EventBus<i32> = EventBus::new();
        let total = counter();

        let t = total.clone();
        bus.on("add", move |n| {
            t.fetch_add(*n as usize, Ordering::SeqCst);
            Ok(())
        });

        let report = bus.emit("add", &3);
        bus.emit("add", &4);

        assert_eq!(report.delivered, 1);
        assert_eq!(total.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn test_once_fires_a_single_time() {
        let bus: EventBus<()> = EventBus::new();
        let hits = counter();

        let h = hits.clone();
        bus.once("ready", move |_| {
            h.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        bus.emit("ready", &());
        bus.emit("ready", &());

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(!bus.has_listeners("ready"));
    }

    #[test]
    fn test_persistent_handlers_run_before_once_handlers() {
        let bus: EventBus<()> = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let o = order.clone();
        bus.once("tick", move |_| {
            o.lock().push("once");
            Ok(())
        });
        let o = order.clone();
        bus.on("tick", move |_| {
            o.lock().push("persistent");
            Ok(())
        });

        bus.emit("tick", &());
        assert_eq!(*order.lock(), vec!["persistent", "once"]);
    }

    #[test]
    fn test_failing_handler_does_not_block_siblings() {
        let bus: EventBus<()> = EventBus::new();
        let hits = counter();

        bus.on("save", |_| Err("disk full".into()));
        bus.on("save", |_| panic!("handler bug"));
        let h = hits.clone();
        bus.on("save", move |_| {
            h.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let report = bus.emit("save", &());
        assert_eq!(report.failed, 2);
        assert_eq!(report.delivered, 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_and_off() {
        let bus: EventBus<()> = EventBus::new();
        let hits = counter();

        let h = hits.clone();
        let sub = bus.on("x", move |_| {
            h.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let h = hits.clone();
        let once = bus.once("x", move |_| {
            h.fetch_add(10, Ordering::SeqCst);
            Ok(())
        });

        assert!(bus.off("x", once.id(), true));
        sub.unsubscribe();

        bus.emit("x", &());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(bus.listener_count("x"), 0);
    }

    #[test]
    fn test_reentrant_emit_does_not_refire_taken_once_handlers() {
        let bus: EventBus<u32> = EventBus::new();
        let once_hits = counter();

        let inner = bus.clone();
        bus.on("evt", move |depth| {
            if *depth == 0 {
                inner.emit("evt", &1);
            }
            Ok(())
        });
        let h = once_hits.clone();
        bus.once("evt", move |_| {
            h.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        bus.emit("evt", &0);
        assert_eq!(once_hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_once_registered_during_dispatch_fires_on_next_emit() {
        let bus: EventBus<()> = EventBus::new();
        let hits = counter();

        let registrar = bus.clone();
        let h = hits.clone();
        bus.once("evt", move |_| {
            let h = h.clone();
            registrar.once("evt", move |_| {
                h.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
            Ok(())
        });

        bus.emit("evt", &());
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        bus.emit("evt", &());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_handler_added_during_dispatch_waits_for_next_pass() {
        let bus: EventBus<()> = EventBus::new();
        let hits = counter();

        let registrar = bus.clone();
        let h = hits.clone();
        bus.once("evt", move |_| {
            let h = h.clone();
            registrar.on("evt", move |_| {
                h.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
            Ok(())
        });

        bus.emit("evt", &());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        bus.emit("evt", &());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_clear_removes_everything() {
        let bus: EventBus<()> = EventBus::new();
        bus.on("a", |_| Ok(()));
        bus.once("b", |_| Ok(()));

        bus.clear();
        assert_eq!(bus.emit("a", &()).total(), 0);
        assert_eq!(bus.emit("b", &()).total(), 0);
    }
}
