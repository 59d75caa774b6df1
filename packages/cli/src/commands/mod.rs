pub mod export;
pub mod import;
pub mod init;
pub mod validate;

pub use export::{export, ExportArgs};
pub use import::{import, ImportArgs};
pub use init::{init, InitArgs};
pub use validate::{validate, ValidateArgs};

use anyhow::{Context, Result};
use serde_json::Value;
use std::path::Path;

/// Read and parse a JSON file
pub(crate) fn read_json(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("{} is not valid JSON", path.display()))
}
