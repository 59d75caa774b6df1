//! Integration tests for the designer workflow

use async_trait::async_trait;
use easel_editor::{
    Canvas, ComponentDescriptor, ComponentInstance, ComponentLoader, ComponentRegistry,
    ContainerRule, DesignAction, Designer, DropRules, DropTarget, EditorError, LoadError,
    ManifestLoader, COMPONENT_ADDED, ROOT_CONTAINER,
};
use easel_messaging::{ComponentEventSystem, MessageBus};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Canvas that records placements in order. `refuse` names a component
/// kind it will not render and can be changed while the designer owns a clone.
#[derive(Clone, Default)]
struct RecordingCanvas {
    placed: Arc<Mutex<Vec<String>>>,
    refuse: Arc<Mutex<Option<String>>>,
}

impl RecordingCanvas {
    fn refusing(kind: &str) -> Self {
        let canvas = Self::default();
        canvas.refuse_kind(Some(kind));
        canvas
    }

    fn refuse_kind(&self, kind: Option<&str>) {
        *self.refuse.lock() = kind.map(str::to_string);
    }
}

impl Canvas for RecordingCanvas {
    fn add_component(
        &mut self,
        instance: &ComponentInstance,
        _target: &DropTarget,
    ) -> Result<(), EditorError> {
        if self.refuse.lock().as_deref() == Some(instance.kind.as_str()) {
            return Err(EditorError::Canvas(format!("cannot render {}", instance.kind)));
        }
        self.placed.lock().push(instance.id.clone());
        Ok(())
    }

    fn remove_component(&mut self, instance_id: &str) -> Result<(), EditorError> {
        self.placed.lock().retain(|id| id != instance_id);
        Ok(())
    }

    fn export(&self, format: &str) -> Result<String, EditorError> {
        match format {
            "json" => Ok(serde_json::to_string(&*self.placed.lock())
                .map_err(|e| EditorError::Canvas(e.to_string()))?),
            other => Err(EditorError::Canvas(format!("unsupported format {}", other))),
        }
    }
}

/// Loader that counts unload calls
#[derive(Default)]
struct CountingLoader {
    unloads: AtomicUsize,
}

#[async_trait]
impl ComponentLoader for CountingLoader {
    async fn load(&self, component: &ComponentDescriptor) -> Result<Value, LoadError> {
        tokio::task::yield_now().await;
        Ok(component.implementation.clone())
    }

    async fn unload(&self, _component_id: &str) -> Result<(), LoadError> {
        self.unloads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn descriptor(id: &str, kind: &str) -> ComponentDescriptor {
    ComponentDescriptor::new(id, kind, "visual", json!({ "render": kind }))
}

fn setup(canvas: RecordingCanvas) -> Designer {
    let registry = Arc::new(ComponentRegistry::new(
        MessageBus::new(),
        ComponentEventSystem::new(),
    ));
    for kind in ["text", "image", "row"] {
        registry.register_loader(kind, Arc::new(ManifestLoader::new()));
    }

    let rules = DropRules::new().with_container(
        "row",
        ContainerRule::only(["text", "image"]).with_max_children(2),
    );
    Designer::new(registry, Box::new(canvas), rules, 50)
}

#[tokio::test]
async fn test_drop_records_history_and_places_component() {
    let canvas = RecordingCanvas::default();
    let mut designer = setup(canvas.clone());

    let instance = designer
        .handle_drop(descriptor("t1", "text"), DropTarget::root())
        .await
        .unwrap();

    assert_eq!(instance.id, "t1");
    assert_eq!(*canvas.placed.lock(), vec!["t1"]);
    assert_eq!(designer.history().len(), 2);
    assert!(matches!(
        designer.history().current().data.action,
        DesignAction::Add { ref component, .. } if component.id == "t1"
    ));
    assert_eq!(designer.canvas_state().children_of(ROOT_CONTAINER), ["t1"]);
}

#[tokio::test]
async fn test_rejected_drop_leaves_no_trace() {
    let canvas = RecordingCanvas::default();
    let mut designer = setup(canvas.clone());

    designer
        .handle_drop(descriptor("r1", "row"), DropTarget::root())
        .await
        .unwrap();

    // Rows only accept text and image
    let err = designer
        .handle_drop(descriptor("r2", "row"), DropTarget::append("r1"))
        .await
        .unwrap_err();
    assert!(matches!(err, EditorError::InvalidDrop(_)));

    // Text cannot hold children at all
    designer
        .handle_drop(descriptor("t1", "text"), DropTarget::append("r1"))
        .await
        .unwrap();
    let err = designer
        .handle_drop(descriptor("t2", "text"), DropTarget::append("t1"))
        .await
        .unwrap_err();
    assert!(matches!(err, EditorError::InvalidDrop(_)));

    assert!(designer.registry().get_component("r2").is_none());
    assert!(designer.registry().get_component("t2").is_none());
    assert_eq!(designer.history().len(), 3);
    assert_eq!(*canvas.placed.lock(), vec!["r1", "t1"]);
}

#[tokio::test]
async fn test_container_limit_and_position_range() {
    let mut designer = setup(RecordingCanvas::default());
    designer
        .handle_drop(descriptor("r1", "row"), DropTarget::root())
        .await
        .unwrap();

    let err = designer
        .handle_drop(descriptor("t0", "text"), DropTarget::at("r1", 3))
        .await
        .unwrap_err();
    assert!(matches!(err, EditorError::InvalidDrop(_)));

    designer
        .handle_drop(descriptor("t1", "text"), DropTarget::append("r1"))
        .await
        .unwrap();
    designer
        .handle_drop(descriptor("i1", "image"), DropTarget::at("r1", 0))
        .await
        .unwrap();
    assert_eq!(designer.canvas_state().children_of("r1"), ["i1", "t1"]);

    let err = designer
        .handle_drop(descriptor("t2", "text"), DropTarget::append("r1"))
        .await
        .unwrap_err();
    assert!(matches!(err, EditorError::InvalidDrop(_)));
}

#[tokio::test]
async fn test_unregistered_type_fails_atomically() {
    let mut designer = setup(RecordingCanvas::default());

    let err = designer
        .handle_drop(descriptor("v1", "video"), DropTarget::root())
        .await
        .unwrap_err();

    assert_eq!(err, EditorError::UnregisteredLoader("video".to_string()));
    assert!(designer.registry().is_empty());
    assert_eq!(designer.history().len(), 1);
}

#[tokio::test]
async fn test_canvas_failure_unloads_instance() {
    let mut designer = setup(RecordingCanvas::refusing("image"));

    let err = designer
        .handle_drop(descriptor("i1", "image"), DropTarget::root())
        .await
        .unwrap_err();

    assert!(matches!(err, EditorError::Canvas(_)));
    assert!(designer.registry().get_component("i1").is_none());
    assert_eq!(designer.history().len(), 1);
}

#[tokio::test]
async fn test_undo_redo_round_trip() {
    let canvas = RecordingCanvas::default();
    let mut designer = setup(canvas.clone());

    designer
        .handle_drop(descriptor("t1", "text"), DropTarget::root())
        .await
        .unwrap();
    designer
        .handle_drop(descriptor("i1", "image"), DropTarget::root())
        .await
        .unwrap();
    let after_both = designer.canvas_state();

    assert!(designer.undo().unwrap());
    assert_eq!(designer.canvas_state().children_of(ROOT_CONTAINER), ["t1"]);
    assert_eq!(*canvas.placed.lock(), vec!["t1"]);

    assert!(designer.redo().unwrap());
    assert_eq!(designer.canvas_state(), after_both);
    assert_eq!(*canvas.placed.lock(), vec!["t1", "i1"]);

    assert!(!designer.redo().unwrap());
    assert!(designer.undo().unwrap());
    assert!(designer.undo().unwrap());
    assert!(!designer.undo().unwrap());
    assert!(canvas.placed.lock().is_empty());
}

#[tokio::test]
async fn test_remove_is_undoable() {
    let canvas = RecordingCanvas::default();
    let mut designer = setup(canvas.clone());

    designer
        .handle_drop(descriptor("r1", "row"), DropTarget::root())
        .await
        .unwrap();
    designer
        .handle_drop(descriptor("t1", "text"), DropTarget::append("r1"))
        .await
        .unwrap();

    assert_eq!(
        designer.remove("r1").await.unwrap_err(),
        EditorError::ContainerNotEmpty("r1".to_string())
    );

    designer.remove("t1").await.unwrap();
    assert!(designer.canvas_state().children_of("r1").is_empty());

    designer.undo().unwrap();
    assert_eq!(designer.canvas_state().children_of("r1"), ["t1"]);
    assert_eq!(*canvas.placed.lock(), vec!["r1", "t1"]);
}

#[tokio::test]
async fn test_refused_undo_keeps_history_and_state() {
    let canvas = RecordingCanvas::default();
    let mut designer = setup(canvas.clone());

    designer
        .handle_drop(descriptor("t1", "text"), DropTarget::root())
        .await
        .unwrap();
    designer.remove("t1").await.unwrap();
    let removed = designer.canvas_state();

    canvas.refuse_kind(Some("text"));
    assert!(matches!(designer.undo(), Err(EditorError::Canvas(_))));
    assert_eq!(designer.history().cursor(), 2);
    assert!(!designer.history().can_redo());
    assert_eq!(designer.canvas_state(), removed);
    assert!(canvas.placed.lock().is_empty());

    // Once the canvas cooperates the same step is undone
    canvas.refuse_kind(None);
    assert!(designer.undo().unwrap());
    assert_eq!(designer.history().cursor(), 1);
    assert_eq!(designer.canvas_state().children_of(ROOT_CONTAINER), ["t1"]);
    assert_eq!(*canvas.placed.lock(), vec!["t1"]);
}

#[tokio::test]
async fn test_refused_redo_keeps_history_and_state() {
    let canvas = RecordingCanvas::default();
    let mut designer = setup(canvas.clone());

    designer
        .handle_drop(descriptor("t1", "text"), DropTarget::root())
        .await
        .unwrap();
    designer.undo().unwrap();

    canvas.refuse_kind(Some("text"));
    assert!(designer.redo().is_err());
    assert_eq!(designer.history().cursor(), 0);
    assert!(designer.history().can_redo());
    assert!(designer.canvas_state().children_of(ROOT_CONTAINER).is_empty());

    canvas.refuse_kind(None);
    assert!(designer.redo().unwrap());
    assert_eq!(designer.canvas_state().children_of(ROOT_CONTAINER), ["t1"]);
}

fn setup_counting(max_states: usize) -> (Designer, Arc<CountingLoader>, MessageBus) {
    let bus = MessageBus::new();
    let registry = Arc::new(ComponentRegistry::new(bus.clone(), ComponentEventSystem::new()));
    let loader = Arc::new(CountingLoader::default());
    registry.register_loader("text", loader.clone());

    let designer = Designer::new(
        registry,
        Box::new(RecordingCanvas::default()),
        DropRules::new(),
        max_states,
    );
    (designer, loader, bus)
}

#[tokio::test]
async fn test_discarded_redo_branch_unloads_undone_instance() {
    let (mut designer, loader, bus) = setup_counting(50);

    designer
        .handle_drop(descriptor("t1", "text"), DropTarget::root())
        .await
        .unwrap();
    bus.subscribe("t1", "theme", |_| Ok(()));
    designer.undo().unwrap();

    // Still loaded while redo can bring it back
    assert!(designer.registry().get_component("t1").is_some());
    assert_eq!(loader.unloads.load(Ordering::SeqCst), 0);

    designer
        .handle_drop(descriptor("t2", "text"), DropTarget::root())
        .await
        .unwrap();

    assert!(designer.registry().get_component("t1").is_none());
    assert_eq!(designer.registry().component_ids(), vec!["t2"]);
    assert_eq!(loader.unloads.load(Ordering::SeqCst), 1);
    assert_eq!(bus.subscriptions_for("t1"), 0);
}

#[tokio::test]
async fn test_evicted_history_unloads_unreachable_instance() {
    let (mut designer, loader, _bus) = setup_counting(2);

    designer
        .handle_drop(descriptor("t1", "text"), DropTarget::root())
        .await
        .unwrap();
    designer.remove("t1").await.unwrap();

    // Undoing the removal is still possible
    assert!(designer.registry().get_component("t1").is_some());

    designer
        .handle_drop(descriptor("t2", "text"), DropTarget::root())
        .await
        .unwrap();

    assert_eq!(designer.history().len(), 2);
    assert!(designer.registry().get_component("t1").is_none());
    assert_eq!(loader.unloads.load(Ordering::SeqCst), 1);

    // On-canvas instances survive eviction
    designer
        .handle_drop(descriptor("t3", "text"), DropTarget::root())
        .await
        .unwrap();
    assert_eq!(designer.registry().component_ids(), vec!["t2", "t3"]);
    assert_eq!(loader.unloads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_observers_see_added_events_and_state() {
    let mut designer = setup(RecordingCanvas::default());
    let added = Arc::new(AtomicUsize::new(0));
    let sizes = Arc::new(Mutex::new(Vec::new()));

    let a = added.clone();
    designer
        .registry()
        .events()
        .on_global(COMPONENT_ADDED, move |_| {
            a.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
    let s = sizes.clone();
    designer
        .state()
        .select(|canvas| canvas.kinds.len(), move |n| s.lock().push(n));

    designer
        .handle_drop(descriptor("t1", "text"), DropTarget::root())
        .await
        .unwrap();

    assert_eq!(added.load(Ordering::SeqCst), 1);
    assert_eq!(*sizes.lock(), vec![0, 1]);
}

#[tokio::test]
async fn test_custom_loader_unload_on_registry() {
    let loader = Arc::new(CountingLoader::default());
    let bus = MessageBus::new();
    let registry = ComponentRegistry::new(bus.clone(), ComponentEventSystem::new());
    registry.register_loader("widget", loader.clone());

    registry
        .register_component(descriptor("w1", "widget"))
        .await
        .unwrap();
    bus.subscribe("w1", "data", |_| Ok(()));

    registry.unload_component("w1").await.unwrap();
    assert_eq!(loader.unloads.load(Ordering::SeqCst), 1);
    assert_eq!(bus.subscriptions_for("w1"), 0);
}

#[tokio::test]
async fn test_export_delegates_to_canvas() {
    let mut designer = setup(RecordingCanvas::default());
    designer
        .handle_drop(descriptor("t1", "text"), DropTarget::root())
        .await
        .unwrap();

    assert_eq!(designer.export("json").unwrap(), r#"["t1"]"#);
    assert!(designer.export("svg").is_err());
}
