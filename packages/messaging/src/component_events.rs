//! # Component Event System
//!
//! Two-level routing for component trees:
//! - **global** handlers fire on every emission of an event name
//! - **instance** handlers fire only when the event carries their instance id
//!
//! Tree-wide observers (history recorders, inspectors) and component-private
//! listeners can coexist without knowing about each other.

use crate::dispatch::{invoke_isolated, DispatchReport, HandlerId, HandlerResult, Subscription};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Event routed through the component tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentEvent {
    /// Target instance; `None` means tree-wide only
    pub instance_id: Option<String>,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

impl ComponentEvent {
    pub fn global(payload: Value) -> Self {
        Self {
            instance_id: None,
            payload,
            timestamp: Utc::now(),
        }
    }

    pub fn for_instance(instance_id: impl Into<String>, payload: Value) -> Self {
        Self {
            instance_id: Some(instance_id.into()),
            payload,
            timestamp: Utc::now(),
        }
    }
}

type EventHandler = Arc<dyn Fn(&ComponentEvent) -> HandlerResult + Send + Sync>;
type HandlerList = Vec<(HandlerId, EventHandler)>;

#[derive(Default)]
struct Routes {
    global: HashMap<String, HandlerList>,
    /// instance id → event name → handlers
    instance: HashMap<String, HashMap<String, HandlerList>>,
}

fn remove_from(list: &mut HandlerList, id: HandlerId) -> bool {
    let before = list.len();
    list.retain(|(handler_id, _)| *handler_id != id);
    list.len() != before
}

/// Global + per-instance event routing
#[derive(Clone, Default)]
pub struct ComponentEventSystem {
    routes: Arc<Mutex<Routes>>,
}

impl ComponentEventSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handler for every emission of `event_name`
    pub fn on_global<F>(&self, event_name: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(&ComponentEvent) -> HandlerResult + Send + Sync + 'static,
    {
        let event_name = event_name.into();
        let id = HandlerId::next();
        self.routes
            .lock()
            .global
            .entry(event_name.clone())
            .or_default()
            .push((id, Arc::new(handler)));

        let weak = Arc::downgrade(&self.routes);
        Subscription::new(id, move || {
            if let Some(routes) = weak.upgrade() {
                let mut routes = routes.lock();
                if let Some(list) = routes.global.get_mut(&event_name) {
                    remove_from(list, id);
                    if list.is_empty() {
                        routes.global.remove(&event_name);
                    }
                }
            }
        })
    }

    /// Handler for `event_name` addressed to `instance_id`
    pub fn on_instance<F>(
        &self,
        instance_id: impl Into<String>,
        event_name: impl Into<String>,
        handler: F,
    ) -> Subscription
    where
        F: Fn(&ComponentEvent) -> HandlerResult + Send + Sync + 'static,
    {
        let instance_id = instance_id.into();
        let event_name = event_name.into();
        let id = HandlerId::next();
        self.routes
            .lock()
            .instance
            .entry(instance_id.clone())
            .or_default()
            .entry(event_name.clone())
            .or_default()
            .push((id, Arc::new(handler)));

        let weak = Arc::downgrade(&self.routes);
        Subscription::new(id, move || {
            if let Some(routes) = weak.upgrade() {
                let mut routes = routes.lock();
                if let Some(events) = routes.instance.get_mut(&instance_id) {
                    if let Some(list) = events.get_mut(&event_name) {
                        remove_from(list, id);
                        if list.is_empty() {
                            events.remove(&event_name);
                        }
                    }
                    if events.is_empty() {
                        routes.instance.remove(&instance_id);
                    }
                }
            }
        })
    }

    /// Run global handlers for `event_name`, then the instance handlers
    /// matching `event.instance_id` (if any)
    pub fn emit(&self, event_name: &str, event: &ComponentEvent) -> DispatchReport {
        let (global, scoped) = {
            let routes = self.routes.lock();
            let global = routes.global.get(event_name).cloned().unwrap_or_default();
            let scoped = event
                .instance_id
                .as_ref()
                .and_then(|instance_id| routes.instance.get(instance_id))
                .and_then(|events| events.get(event_name))
                .cloned()
                .unwrap_or_default();
            (global, scoped)
        };

        let mut report = DispatchReport::default();
        for (id, handler) in global.iter().chain(scoped.iter()) {
            report.record(invoke_isolated(event_name, *id, || handler(event)));
        }

        debug!(
            event = %event_name,
            instance_id = ?event.instance_id,
            delivered = report.delivered,
            "Emitted component event"
        );
        report
    }

    /// Drop every instance-scoped handler of an unloaded instance
    pub fn remove_instance(&self, instance_id: &str) -> usize {
        self.routes
            .lock()
            .instance
            .remove(instance_id)
            .map(|events| events.values().map(Vec::len).sum())
            .unwrap_or(0)
    }

    pub fn has_instance_handlers(&self, instance_id: &str) -> bool {
        self.routes.lock().instance.contains_key(instance_id)
    }
}
