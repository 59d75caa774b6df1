//! # Easel Data
//!
//! Schema validation, persistence, import/export and versioning for
//! documents produced by the editor.
//!
//! - [`DataModel`] compiles a [`ModelDefinition`] into per-field validator
//!   chains and reports every failure at once
//! - [`DataPersistenceManager`] puts a write-through cache in front of any
//!   [`StorageAdapter`]
//! - [`DataIo`] runs the export pipeline (format, metadata, encrypt,
//!   compress) and its mirror image on import
//! - [`VersionControl`] keeps a hash-linked commit chain; [`diff`] compares
//!   two documents structurally
//! - [`MigrationManager`] moves data between schema versions and rolls back
//!   on failure

pub mod diff;
mod errors;
pub mod io;
mod migration;
mod model;
mod persistence;
mod semver;
mod storage;
mod validator;
mod version_control;

pub use diff::diff;
pub use errors::{DataError, Result};
pub use io::{
    ChaChaEncryptor, Compressor, DataIo, Encryptor, ExportMetadata, ExportOptions, Format,
    GzipCompressor, ImportOptions, ENVELOPE_KIND,
};
pub use migration::{FnMigration, Migration, MigrationManager};
pub use model::{
    DataModel, FieldDefinition, FieldError, FieldType, IndexDefinition, ModelDefinition,
    RelationDefinition, RelationKind, ValidationReport,
};
pub use persistence::{BulkSaveReport, DataPersistenceManager};
pub use semver::{Bump, SchemaVersion};
pub use storage::{FileStorage, MemoryStorage, StorageAdapter};
pub use validator::{
    MaxLengthValidator, MinLengthValidator, OneOfValidator, PatternValidator, RangeValidator,
    RequiredValidator, Rule, TypeValidator, ValidationResult, Validator,
};
pub use version_control::{VersionControl, VersionInfo, VersionedData};
