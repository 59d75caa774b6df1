//! # Easel Editor
//!
//! Component runtime for the visual editor.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ Designer: drop → validate → load → place    │
//! └─────────────────────────────────────────────┘
//!          ↓                 ↓              ↓
//! ┌────────────────┐ ┌──────────────┐ ┌───────────────┐
//! │ Registry       │ │ StateManager │ │ HistoryManager│
//! │ loaders +      │ │ Arc<T> store │ │ linear undo/  │
//! │ instances      │ │ + listeners  │ │ redo window   │
//! └────────────────┘ └──────────────┘ └───────────────┘
//!          ↓
//! ┌─────────────────────────────────────────────┐
//! │ easel-messaging: buses + component events   │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Core Principles
//!
//! 1. **Explicit wiring**: the registry is constructed by the application root
//!    and shared by `Arc`, never reached through a global
//! 2. **Immutable snapshots**: state is replaced, never mutated in place, so
//!    history entries stay valid
//! 3. **All-or-nothing edits**: a rejected drop or failed load leaves no trace
//!
//! ## Usage
//!
//! ```rust,ignore
//! use easel_editor::{ComponentRegistry, Designer, DropRules, DropTarget, ManifestLoader};
//!
//! let registry = Arc::new(ComponentRegistry::new(bus, events));
//! registry.register_loader("text", Arc::new(ManifestLoader::new()));
//!
//! let mut designer = Designer::new(registry, canvas, DropRules::new(), 100);
//! designer.handle_drop(descriptor, DropTarget::root()).await?;
//! designer.undo()?;
//! ```

mod designer;
mod errors;
mod history;
mod registry;
mod state;

pub use designer::{
    Canvas, CanvasState, ContainerRule, DesignAction, DesignRecord, Designer, DropRules,
    DropTarget, COMPONENT_ADDED, COMPONENT_REMOVED, ROOT_CONTAINER,
};
pub use errors::{EditorError, LoadError};
pub use history::{HistoryEntry, HistoryManager};
pub use registry::{
    ComponentDescriptor, ComponentInstance, ComponentLoader, ComponentRegistry, ManifestLoader,
};
pub use state::StateManager;
