//! Error types for the editor

use thiserror::Error;

/// Failure reported by a component loader plugin
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoadError {
    #[error("Malformed implementation: {0}")]
    MalformedImplementation(String),

    #[error("Missing dependency: {0}")]
    MissingDependency(String),

    #[error("Loader failed: {0}")]
    Failed(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EditorError {
    #[error("No loader registered for component type '{0}'")]
    UnregisteredLoader(String),

    #[error("Failed to load component '{id}': {source}")]
    Load {
        id: String,
        #[source]
        source: LoadError,
    },

    #[error("Component already registered: {0}")]
    DuplicateComponent(String),

    #[error("Component not found: {0}")]
    ComponentNotFound(String),

    #[error("Invalid drop: {0}")]
    InvalidDrop(String),

    #[error("Container '{0}' still has children")]
    ContainerNotEmpty(String),

    #[error("Canvas error: {0}")]
    Canvas(String),
}
