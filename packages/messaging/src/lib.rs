//! # Easel Messaging
//!
//! Decoupled notification plumbing shared by the editor runtime.
//!
//! ## Layers
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ EventBus: name → handlers (persistent/once)  │
//! └──────────────────────────────────────────────┘
//! ┌──────────────────────────────────────────────┐
//! │ MessageBus: channel → handlers, indexed by   │
//! │ owning component for bulk teardown           │
//! └──────────────────────────────────────────────┘
//! ┌──────────────────────────────────────────────┐
//! │ ComponentEventSystem: global + per-instance  │
//! │ routing for component trees                  │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! All three share the same dispatch rules:
//!
//! 1. **Snapshot before dispatch**: handlers added or removed while an event is
//!    being delivered do not affect that delivery pass
//! 2. **Isolation**: a handler that fails (returns `Err` or panics) is logged and
//!    counted; sibling handlers still run and the caller never sees the failure
//! 3. **Reentrancy**: no lock is held while a handler runs, so handlers may emit
//!    or publish freely

mod component_events;
mod dispatch;
mod errors;
mod event_bus;
mod message_bus;

pub use component_events::{ComponentEvent, ComponentEventSystem};
pub use dispatch::{DispatchReport, HandlerError, HandlerId, HandlerResult, Subscription};
pub use errors::MessagingError;
pub use event_bus::EventBus;
pub use message_bus::{Message, MessageBus};
