//! # Component Registry
//!
//! Type-keyed loader table plus the store of loaded component instances.
//!
//! The registry is an ordinary value: the application root constructs one and
//! hands an `Arc<ComponentRegistry>` to whoever needs it. There is no global.
//!
//! ## Registration
//!
//! ```text
//! descriptor ─→ loader for descriptor.kind? ──no──→ UnregisteredLoader
//!                       │ yes
//!                       ↓
//!               loader.load(descriptor) ──err──→ Load error (nothing stored)
//!                       │ ok
//!                       ↓
//!               instance stored under descriptor.id
//! ```
//!
//! Unloading calls the loader's `unload`, then purges the instance's message
//! bus subscriptions and instance-scoped event handlers.

use crate::errors::{EditorError, LoadError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use easel_messaging::{ComponentEventSystem, MessageBus};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Immutable description of a component to load
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentDescriptor {
    /// Unique instance id
    pub id: String,

    /// Component type, used to pick the loader
    pub kind: String,

    /// Capability tag (e.g. "visual", "container", "data")
    pub capability: String,

    /// Plugin-defined implementation manifest
    #[serde(default)]
    pub implementation: Value,
}

impl ComponentDescriptor {
    pub fn new(
        id: impl Into<String>,
        kind: impl Into<String>,
        capability: impl Into<String>,
        implementation: Value,
    ) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            capability: capability.into(),
            implementation,
        }
    }
}

/// A loaded, addressable component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentInstance {
    pub id: String,
    pub kind: String,
    pub capability: String,

    /// Implementation as prepared by the loader
    pub implementation: Value,

    pub loaded_at: DateTime<Utc>,
}

/// Loader plugin for one component kind
#[async_trait]
pub trait ComponentLoader: Send + Sync {
    /// Validate and prepare the implementation. Nothing is stored on error.
    async fn load(&self, component: &ComponentDescriptor) -> Result<Value, LoadError>;

    /// Release whatever `load` acquired
    async fn unload(&self, component_id: &str) -> Result<(), LoadError>;
}

/// Loader for manifest-style implementations.
///
/// Accepts an object with a string `render` entry, an optional object
/// `props`, and an optional `dependencies` array whose names must all be
/// provided by this loader.
#[derive(Debug, Clone, Default)]
pub struct ManifestLoader {
    available: HashSet<String>,
}

impl ManifestLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dependency(mut self, name: impl Into<String>) -> Self {
        self.available.insert(name.into());
        self
    }
}

#[async_trait]
impl ComponentLoader for ManifestLoader {
    async fn load(&self, component: &ComponentDescriptor) -> Result<Value, LoadError> {
        let manifest = component.implementation.as_object().ok_or_else(|| {
            LoadError::MalformedImplementation("implementation must be an object".to_string())
        })?;

        match manifest.get("render") {
            Some(Value::String(_)) => {}
            _ => {
                return Err(LoadError::MalformedImplementation(
                    "missing string 'render' entry".to_string(),
                ))
            }
        }

        if let Some(props) = manifest.get("props") {
            if !props.is_object() {
                return Err(LoadError::MalformedImplementation(
                    "'props' must be an object".to_string(),
                ));
            }
        }

        if let Some(deps) = manifest.get("dependencies") {
            let deps = deps.as_array().ok_or_else(|| {
                LoadError::MalformedImplementation("'dependencies' must be an array".to_string())
            })?;
            for dep in deps {
                let name = dep.as_str().ok_or_else(|| {
                    LoadError::MalformedImplementation("dependency names must be strings".to_string())
                })?;
                if !self.available.contains(name) {
                    return Err(LoadError::MissingDependency(name.to_string()));
                }
            }
        }

        Ok(component.implementation.clone())
    }

    async fn unload(&self, _component_id: &str) -> Result<(), LoadError> {
        Ok(())
    }
}

/// Loader table and instance store
pub struct ComponentRegistry {
    loaders: RwLock<HashMap<String, Arc<dyn ComponentLoader>>>,
    components: RwLock<HashMap<String, ComponentInstance>>,
    message_bus: MessageBus,
    events: ComponentEventSystem,
}

impl ComponentRegistry {
    pub fn new(message_bus: MessageBus, events: ComponentEventSystem) -> Self {
        Self {
            loaders: RwLock::new(HashMap::new()),
            components: RwLock::new(HashMap::new()),
            message_bus,
            events,
        }
    }

    /// Register (or replace) the loader for a component kind
    pub fn register_loader(&self, kind: impl Into<String>, loader: Arc<dyn ComponentLoader>) {
        let kind = kind.into();
        if self.loaders.write().insert(kind.clone(), loader).is_some() {
            debug!(kind = %kind, "Replaced component loader");
        } else {
            debug!(kind = %kind, "Registered component loader");
        }
    }

    pub fn has_loader(&self, kind: &str) -> bool {
        self.loaders.read().contains_key(kind)
    }

    /// Load and store a component. All-or-nothing: on any error the
    /// component map is left untouched.
    pub async fn register_component(
        &self,
        component: ComponentDescriptor,
    ) -> Result<ComponentInstance, EditorError> {
        let loader = self
            .loaders
            .read()
            .get(&component.kind)
            .cloned()
            .ok_or_else(|| EditorError::UnregisteredLoader(component.kind.clone()))?;

        if self.components.read().contains_key(&component.id) {
            return Err(EditorError::DuplicateComponent(component.id));
        }

        let implementation = loader.load(&component).await.map_err(|source| {
            warn!(component_id = %component.id, kind = %component.kind, error = %source, "Component load failed");
            EditorError::Load {
                id: component.id.clone(),
                source,
            }
        })?;

        let instance = ComponentInstance {
            id: component.id,
            kind: component.kind,
            capability: component.capability,
            implementation,
            loaded_at: Utc::now(),
        };

        // Another registration may have landed while the loader was suspended
        let raced = {
            let mut components = self.components.write();
            if components.contains_key(&instance.id) {
                true
            } else {
                components.insert(instance.id.clone(), instance.clone());
                false
            }
        };
        if raced {
            // Release what this load acquired
            if let Err(err) = loader.unload(&instance.id).await {
                warn!(component_id = %instance.id, error = %err, "Unload of losing registration failed");
            }
            return Err(EditorError::DuplicateComponent(instance.id));
        }

        info!(component_id = %instance.id, kind = %instance.kind, "Registered component");
        Ok(instance)
    }

    /// Unload a component: loader `unload`, then drop the instance and
    /// every bus subscription and instance handler it owns
    pub async fn unload_component(&self, id: &str) -> Result<ComponentInstance, EditorError> {
        let kind = self
            .components
            .read()
            .get(id)
            .map(|instance| instance.kind.clone())
            .ok_or_else(|| EditorError::ComponentNotFound(id.to_string()))?;

        let loader = self
            .loaders
            .read()
            .get(&kind)
            .cloned()
            .ok_or_else(|| EditorError::UnregisteredLoader(kind.clone()))?;

        loader.unload(id).await.map_err(|source| EditorError::Load {
            id: id.to_string(),
            source,
        })?;

        let instance = self
            .components
            .write()
            .remove(id)
            .ok_or_else(|| EditorError::ComponentNotFound(id.to_string()))?;

        let subscriptions = self.message_bus.cleanup_component(id);
        let handlers = self.events.remove_instance(id);
        info!(component_id = %id, subscriptions, handlers, "Unloaded component");

        Ok(instance)
    }

    pub fn get_component(&self, id: &str) -> Option<ComponentInstance> {
        self.components.read().get(id).cloned()
    }

    pub fn get_components_by_type(&self, kind: &str) -> Vec<ComponentInstance> {
        let mut found: Vec<ComponentInstance> = self
            .components
            .read()
            .values()
            .filter(|instance| instance.kind == kind)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        found
    }

    pub fn component_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.components.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.components.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.read().is_empty()
    }

    pub fn message_bus(&self) -> &MessageBus {
        &self.message_bus
    }

    pub fn events(&self) -> &ComponentEventSystem {
        &self.events
    }
}
