//! # Message Bus
//!
//! Channel-scoped pub/sub for component plugins.
//!
//! Subscriptions are indexed twice:
//! - **by channel** for dispatch
//! - **by owning component** so [`MessageBus::cleanup_component`] can tear down
//!   every handler a component registered when that component is unloaded

use crate::dispatch::{invoke_isolated, DispatchReport, HandlerId, HandlerResult, Subscription};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

/// Envelope delivered to channel subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Component id (or any label) of the publisher
    pub sender: String,
    pub channel: String,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

type MessageHandler = Arc<dyn Fn(&Message) -> HandlerResult + Send + Sync>;

struct ChannelEntry {
    id: HandlerId,
    component_id: String,
    handler: MessageHandler,
}

#[derive(Default)]
struct Subscriptions {
    by_channel: HashMap<String, Vec<ChannelEntry>>,
    by_component: HashMap<String, HashSet<(String, HandlerId)>>,
}

impl Subscriptions {
    fn remove(&mut self, component_id: &str, channel: &str, id: HandlerId) -> bool {
        let mut removed = false;

        if let Some(entries) = self.by_channel.get_mut(channel) {
            let before = entries.len();
            entries.retain(|entry| !(entry.id == id && entry.component_id == component_id));
            removed = entries.len() != before;
            if entries.is_empty() {
                self.by_channel.remove(channel);
            }
        }

        if let Some(owned) = self.by_component.get_mut(component_id) {
            owned.remove(&(channel.to_string(), id));
            if owned.is_empty() {
                self.by_component.remove(component_id);
            }
        }

        removed
    }
}

/// Channel-scoped message bus with per-component bookkeeping
#[derive(Clone, Default)]
pub struct MessageBus {
    subscriptions: Arc<Mutex<Subscriptions>>,
}

impl MessageBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `component_id` to `channel`
    pub fn subscribe<F>(
        &self,
        component_id: impl Into<String>,
        channel: impl Into<String>,
        handler: F,
    ) -> Subscription
    where
        F: Fn(&Message) -> HandlerResult + Send + Sync + 'static,
    {
        let component_id = component_id.into();
        let channel = channel.into();
        let id = HandlerId::next();

        {
            let mut subs = self.subscriptions.lock();
            subs.by_channel
                .entry(channel.clone())
                .or_default()
                .push(ChannelEntry {
                    id,
                    component_id: component_id.clone(),
                    handler: Arc::new(handler),
                });
            subs.by_component
                .entry(component_id.clone())
                .or_default()
                .insert((channel.clone(), id));
        }
        debug!(component_id = %component_id, channel = %channel, handler = %id, "Subscribed to channel");

        let weak = Arc::downgrade(&self.subscriptions);
        Subscription::new(id, move || {
            if let Some(subs) = weak.upgrade() {
                subs.lock().remove(&component_id, &channel, id);
            }
        })
    }

    /// Remove one handler. Returns whether it was registered.
    pub fn unsubscribe(&self, component_id: &str, channel: &str, id: HandlerId) -> bool {
        self.subscriptions.lock().remove(component_id, channel, id)
    }

    /// Deliver a message to every subscriber of `channel`
    pub fn publish(
        &self,
        sender: impl Into<String>,
        channel: impl Into<String>,
        payload: Value,
    ) -> DispatchReport {
        let message = Message {
            sender: sender.into(),
            channel: channel.into(),
            payload,
            timestamp: Utc::now(),
        };
        self.deliver(&message)
    }

    /// Deliver a pre-built message
    pub fn deliver(&self, message: &Message) -> DispatchReport {
        let handlers: Vec<(HandlerId, MessageHandler)> = {
            let subs = self.subscriptions.lock();
            subs.by_channel
                .get(&message.channel)
                .map(|entries| {
                    entries
                        .iter()
                        .map(|entry| (entry.id, entry.handler.clone()))
                        .collect()
                })
                .unwrap_or_default()
        };

        let mut report = DispatchReport::default();
        for (id, handler) in &handlers {
            report.record(invoke_isolated(&message.channel, *id, || handler(message)));
        }

        debug!(
            sender = %message.sender,
            channel = %message.channel,
            delivered = report.delivered,
            failed = report.failed,
            "Published message"
        );
        report
    }

    /// Remove every handler `component_id` registered, across all channels.
    /// Returns the number of handlers removed.
    pub fn cleanup_component(&self, component_id: &str) -> usize {
        let mut subs = self.subscriptions.lock();
        let Some(owned) = subs.by_component.remove(component_id) else {
            return 0;
        };

        let mut removed = 0;
        for (channel, id) in owned {
            if let Some(entries) = subs.by_channel.get_mut(&channel) {
                let before = entries.len();
                entries.retain(|entry| entry.id != id);
                removed += before - entries.len();
                if entries.is_empty() {
                    subs.by_channel.remove(&channel);
                }
            }
        }

        info!(component_id = %component_id, removed, "Cleaned up component subscriptions");
        removed
    }

    /// Number of live handlers owned by `component_id`
    pub fn subscriptions_for(&self, component_id: &str) -> usize {
        self.subscriptions
            .lock()
            .by_component
            .get(component_id)
            .map_or(0, HashSet::len)
    }

    /// Number of channels with at least one subscriber
    pub fn channel_count(&self) -> usize {
        self.subscriptions.lock().by_channel.len()
    }
}
