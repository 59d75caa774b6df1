//! # Designer
//!
//! Turns drop interactions into validated, recorded edits.
//!
//! ## Drop pipeline
//!
//! ```text
//! handle_drop(descriptor, target)
//!   1. validate target against the canvas state + drop rules
//!   2. register the component (loader validates the implementation)
//!   3. hand the instance to the canvas
//!   4. replace the canvas state, push a history record, emit `component:added`
//! ```
//!
//! Any failure before step 4 leaves no trace: a rejected drop creates no
//! instance, no history entry and no canvas change.
//!
//! Undone instances stay loaded so they can be redone. Once the history
//! entries that could bring an instance back are discarded (a new edit drops
//! the redo branch, or the oldest entries are evicted) the instance is
//! unloaded.

use crate::errors::EditorError;
use crate::history::HistoryManager;
use crate::registry::{ComponentDescriptor, ComponentInstance, ComponentRegistry};
use crate::state::StateManager;
use easel_messaging::ComponentEvent;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Id of the implicit top-level container
pub const ROOT_CONTAINER: &str = "root";

pub const COMPONENT_ADDED: &str = "component:added";
pub const COMPONENT_REMOVED: &str = "component:removed";

/// Placement request produced by a drop gesture
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropTarget {
    pub container_id: String,

    /// Insertion index among the container's children (`None` appends)
    pub position: Option<usize>,
}

impl DropTarget {
    pub fn root() -> Self {
        Self::append(ROOT_CONTAINER)
    }

    pub fn append(container_id: impl Into<String>) -> Self {
        Self {
            container_id: container_id.into(),
            position: None,
        }
    }

    pub fn at(container_id: impl Into<String>, position: usize) -> Self {
        Self {
            container_id: container_id.into(),
            position: Some(position),
        }
    }
}

/// What a container kind accepts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerRule {
    /// Accepted child kinds (`None` accepts any kind)
    pub accepts: Option<HashSet<String>>,
    pub max_children: Option<usize>,
}

impl ContainerRule {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn only<I, S>(kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            accepts: Some(kinds.into_iter().map(Into::into).collect()),
            max_children: None,
        }
    }

    pub fn with_max_children(mut self, max: usize) -> Self {
        self.max_children = Some(max);
        self
    }
}

/// Container rules keyed by container component kind. Kinds without a rule
/// cannot hold children; the root container accepts anything unless a rule
/// is set for it.
#[derive(Debug, Clone)]
pub struct DropRules {
    root: ContainerRule,
    containers: HashMap<String, ContainerRule>,
}

impl DropRules {
    pub fn new() -> Self {
        Self {
            root: ContainerRule::any(),
            containers: HashMap::new(),
        }
    }

    pub fn with_root(mut self, rule: ContainerRule) -> Self {
        self.root = rule;
        self
    }

    pub fn with_container(mut self, kind: impl Into<String>, rule: ContainerRule) -> Self {
        self.containers.insert(kind.into(), rule);
        self
    }

    fn rule_for(&self, container_kind: Option<&str>) -> Option<&ContainerRule> {
        match container_kind {
            None => Some(&self.root),
            Some(kind) => self.containers.get(kind),
        }
    }
}

impl Default for DropRules {
    fn default() -> Self {
        Self::new()
    }
}

/// Placement tree: which instance sits where
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasState {
    /// container id → ordered child instance ids
    pub children: BTreeMap<String, Vec<String>>,

    /// instance id → component kind
    pub kinds: BTreeMap<String, String>,
}

impl CanvasState {
    pub fn contains(&self, instance_id: &str) -> bool {
        self.kinds.contains_key(instance_id)
    }

    pub fn kind_of(&self, instance_id: &str) -> Option<&str> {
        self.kinds.get(instance_id).map(String::as_str)
    }

    pub fn children_of(&self, container_id: &str) -> &[String] {
        self.children
            .get(container_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Container currently holding `instance_id`
    pub fn parent_of(&self, instance_id: &str) -> Option<(&str, usize)> {
        self.children.iter().find_map(|(container, children)| {
            children
                .iter()
                .position(|child| child == instance_id)
                .map(|index| (container.as_str(), index))
        })
    }

    fn with_added(&self, instance: &ComponentInstance, container_id: &str, index: usize) -> Self {
        let mut next = self.clone();
        let children = next.children.entry(container_id.to_string()).or_default();
        children.insert(index.min(children.len()), instance.id.clone());
        next.kinds.insert(instance.id.clone(), instance.kind.clone());
        next
    }

    fn with_removed(&self, instance_id: &str) -> Self {
        let mut next = self.clone();
        for children in next.children.values_mut() {
            children.retain(|child| child != instance_id);
        }
        next.children.retain(|_, children| !children.is_empty());
        next.kinds.remove(instance_id);
        next
    }
}

/// Recorded edit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DesignAction {
    /// Initial empty canvas
    Init,
    Add {
        component: ComponentInstance,
        target: DropTarget,
    },
    Remove {
        component: ComponentInstance,
        target: DropTarget,
    },
}

/// History payload: the action plus the canvas state it produced
#[derive(Debug, Clone, PartialEq)]
pub struct DesignRecord {
    pub action: DesignAction,
    pub canvas: Arc<CanvasState>,
}

/// Rendering surface the designer drives
pub trait Canvas: Send {
    fn add_component(
        &mut self,
        instance: &ComponentInstance,
        target: &DropTarget,
    ) -> Result<(), EditorError>;

    fn remove_component(&mut self, instance_id: &str) -> Result<(), EditorError>;

    fn export(&self, format: &str) -> Result<String, EditorError>;
}

/// Drop → validated, history-recorded mutation
pub struct Designer {
    registry: Arc<ComponentRegistry>,
    canvas: Box<dyn Canvas>,
    rules: DropRules,
    state: StateManager<CanvasState>,
    history: HistoryManager<DesignRecord>,
}

impl Designer {
    pub fn new(
        registry: Arc<ComponentRegistry>,
        canvas: Box<dyn Canvas>,
        rules: DropRules,
        max_states: usize,
    ) -> Self {
        let state = StateManager::new(CanvasState::default());
        let history = HistoryManager::new(
            DesignRecord {
                action: DesignAction::Init,
                canvas: state.get_state(),
            },
            max_states,
        );

        Self {
            registry,
            canvas,
            rules,
            state,
            history,
        }
    }

    /// Check a drop without side effects. Returns the resolved insertion index.
    pub fn validate_drop(
        &self,
        component: &ComponentDescriptor,
        target: &DropTarget,
    ) -> Result<usize, EditorError> {
        let canvas = self.state.get_state();

        if canvas.contains(&component.id) {
            return Err(EditorError::InvalidDrop(format!(
                "'{}' is already on the canvas",
                component.id
            )));
        }

        let container_kind = if target.container_id == ROOT_CONTAINER {
            None
        } else {
            Some(canvas.kind_of(&target.container_id).ok_or_else(|| {
                EditorError::InvalidDrop(format!(
                    "container '{}' is not on the canvas",
                    target.container_id
                ))
            })?)
        };

        let rule = self.rules.rule_for(container_kind).ok_or_else(|| {
            EditorError::InvalidDrop(format!(
                "'{}' cannot contain children",
                container_kind.unwrap_or(ROOT_CONTAINER)
            ))
        })?;

        if let Some(accepts) = &rule.accepts {
            if !accepts.contains(&component.kind) {
                return Err(EditorError::InvalidDrop(format!(
                    "'{}' does not accept '{}' components",
                    container_kind.unwrap_or(ROOT_CONTAINER),
                    component.kind
                )));
            }
        }

        let siblings = canvas.children_of(&target.container_id).len();
        if let Some(max) = rule.max_children {
            if siblings >= max {
                return Err(EditorError::InvalidDrop(format!(
                    "container '{}' is full ({} children)",
                    target.container_id, max
                )));
            }
        }

        match target.position {
            Some(position) if position > siblings => Err(EditorError::InvalidDrop(format!(
                "position {} out of range (0..={})",
                position, siblings
            ))),
            Some(position) => Ok(position),
            None => Ok(siblings),
        }
    }

    /// Validate, load, place and record a dropped component
    pub async fn handle_drop(
        &mut self,
        component: ComponentDescriptor,
        target: DropTarget,
    ) -> Result<ComponentInstance, EditorError> {
        let index = self.validate_drop(&component, &target).inspect_err(|err| {
            debug!(component_id = %component.id, error = %err, "Rejected drop");
        })?;

        let instance = self.registry.register_component(component).await?;

        if let Err(err) = self.canvas.add_component(&instance, &target) {
            warn!(component_id = %instance.id, error = %err, "Canvas refused component, unloading");
            // Undo the registration so the drop leaves nothing behind
            if let Err(unload_err) = self.registry.unload_component(&instance.id).await {
                warn!(component_id = %instance.id, error = %unload_err, "Unload after canvas failure failed");
            }
            return Err(err);
        }

        let resolved = DropTarget::at(target.container_id.clone(), index);
        self.state
            .update(|canvas| canvas.with_added(&instance, &target.container_id, index));
        self.record(
            DesignAction::Add {
                component: instance.clone(),
                target: resolved,
            },
            &format!("Add {}", instance.kind),
        )
        .await;

        self.emit(COMPONENT_ADDED, &instance.id, &target.container_id);
        info!(component_id = %instance.id, container = %target.container_id, index, "Dropped component");
        Ok(instance)
    }

    /// Take a leaf instance off the canvas (recorded, undoable). The instance
    /// stays loaded in the registry while the removal can still be undone.
    pub async fn remove(&mut self, instance_id: &str) -> Result<(), EditorError> {
        let canvas = self.state.get_state();
        let (container_id, index) = canvas
            .parent_of(instance_id)
            .map(|(container, index)| (container.to_string(), index))
            .ok_or_else(|| EditorError::ComponentNotFound(instance_id.to_string()))?;

        if !canvas.children_of(instance_id).is_empty() {
            return Err(EditorError::ContainerNotEmpty(instance_id.to_string()));
        }

        let component = self
            .registry
            .get_component(instance_id)
            .ok_or_else(|| EditorError::ComponentNotFound(instance_id.to_string()))?;

        self.canvas.remove_component(instance_id)?;
        self.state.update(|canvas| canvas.with_removed(instance_id));
        self.record(
            DesignAction::Remove {
                component,
                target: DropTarget::at(container_id.clone(), index),
            },
            "Remove component",
        )
        .await;

        self.emit(COMPONENT_REMOVED, instance_id, &container_id);
        Ok(())
    }

    /// Revert the most recent action. Returns `false` when there is nothing to
    /// undo. When the canvas refuses, history and state are left untouched.
    pub fn undo(&mut self) -> Result<bool, EditorError> {
        let Some(previous) = self.history.peek_undo().cloned() else {
            return Ok(false);
        };
        let undone = self.history.current().data.action.clone();

        match &undone {
            DesignAction::Add { component, .. } => self.canvas.remove_component(&component.id)?,
            DesignAction::Remove { component, target } => {
                self.canvas.add_component(component, target)?
            }
            DesignAction::Init => {}
        }

        self.history.undo();
        self.state.set_state(|_| previous.canvas.clone());

        match &undone {
            DesignAction::Add { component, target } => {
                self.emit(COMPONENT_REMOVED, &component.id, &target.container_id)
            }
            DesignAction::Remove { component, target } => {
                self.emit(COMPONENT_ADDED, &component.id, &target.container_id)
            }
            DesignAction::Init => {}
        }
        Ok(true)
    }

    /// Reapply the most recently undone action. Returns `false` when there is
    /// nothing to redo. When the canvas refuses, history and state are left
    /// untouched.
    pub fn redo(&mut self) -> Result<bool, EditorError> {
        let Some(next) = self.history.peek_redo().cloned() else {
            return Ok(false);
        };

        match &next.action {
            DesignAction::Add { component, target } => self.canvas.add_component(component, target)?,
            DesignAction::Remove { component, .. } => self.canvas.remove_component(&component.id)?,
            DesignAction::Init => {}
        }

        self.history.redo();
        self.state.set_state(|_| next.canvas.clone());

        match &next.action {
            DesignAction::Add { component, target } => {
                self.emit(COMPONENT_ADDED, &component.id, &target.container_id)
            }
            DesignAction::Remove { component, target } => {
                self.emit(COMPONENT_REMOVED, &component.id, &target.container_id)
            }
            DesignAction::Init => {}
        }
        Ok(true)
    }

    pub fn export(&self, format: &str) -> Result<String, EditorError> {
        self.canvas.export(format)
    }

    pub fn canvas_state(&self) -> Arc<CanvasState> {
        self.state.get_state()
    }

    /// Store handle for observers (`subscribe`/`select`)
    pub fn state(&self) -> &StateManager<CanvasState> {
        &self.state
    }

    pub fn history(&self) -> &HistoryManager<DesignRecord> {
        &self.history
    }

    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        &self.registry
    }

    /// Push a record for the current canvas state, then unload instances no
    /// surviving history entry can bring back
    async fn record(&mut self, action: DesignAction, description: &str) {
        let discarded = self.history.push(
            DesignRecord {
                action,
                canvas: self.state.get_state(),
            },
            Some(description),
        );
        if discarded.is_empty() {
            return;
        }

        let reachable: HashSet<&str> = self
            .history
            .entries()
            .iter()
            .flat_map(|entry| entry.data.canvas.kinds.keys().map(String::as_str))
            .collect();
        let mut orphans: Vec<String> = discarded
            .iter()
            .flat_map(|entry| {
                let acted_on = match &entry.data.action {
                    DesignAction::Add { component, .. } | DesignAction::Remove { component, .. } => {
                        Some(component.id.clone())
                    }
                    DesignAction::Init => None,
                };
                entry.data.canvas.kinds.keys().cloned().chain(acted_on)
            })
            .filter(|id| !reachable.contains(id.as_str()))
            .collect();
        orphans.sort();
        orphans.dedup();

        for id in orphans {
            if self.registry.get_component(&id).is_none() {
                continue;
            }
            match self.registry.unload_component(&id).await {
                Ok(_) => debug!(component_id = %id, "Unloaded component dropped from history"),
                Err(err) => warn!(component_id = %id, error = %err, "Unload of dropped component failed"),
            }
        }
    }

    fn emit(&self, event_name: &str, instance_id: &str, container_id: &str) {
        self.registry.events().emit(
            event_name,
            &ComponentEvent::for_instance(instance_id, json!({ "containerId": container_id })),
        );
    }
}
