//! Export and import pipelines.
//!
//! Export: format → metadata → encrypt → compress.
//! Import runs the same stages in reverse, then optionally validates.

mod format;
mod hooks;

pub use format::Format;
pub use hooks::{ChaChaEncryptor, Compressor, Encryptor, GzipCompressor, NONCE_SIZE};

use crate::errors::{DataError, Result};
use crate::model::DataModel;
use chrono::{DateTime, Utc};
use easel_common::IoConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// `kind` tag carried by every export envelope
pub const ENVELOPE_KIND: &str = "easel-export";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOptions {
    pub format: Format,
    pub include_metadata: bool,
    pub encrypt: bool,
    pub compress: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            format: Format::Json,
            include_metadata: true,
            encrypt: false,
            compress: false,
        }
    }
}

impl ExportOptions {
    pub fn from_config(config: &IoConfig) -> Result<Self> {
        Ok(Self {
            format: config.format.parse()?,
            include_metadata: config.include_metadata,
            encrypt: config.encrypt,
            compress: config.compress,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOptions {
    /// Used when the payload carries no metadata envelope
    pub format: Format,
    /// Look for an export envelope. When off the text is always decoded
    /// as a plain document.
    pub metadata: bool,
    pub decrypt: bool,
    pub decompress: bool,
    pub validate: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            format: Format::Json,
            metadata: true,
            decrypt: false,
            decompress: false,
            validate: false,
        }
    }
}

impl ImportOptions {
    /// Import options that undo an export made with `options`
    pub fn mirror(options: &ExportOptions) -> Self {
        Self {
            format: options.format,
            metadata: options.include_metadata,
            decrypt: options.encrypt,
            decompress: options.compress,
            validate: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportMetadata {
    pub format: String,
    pub exported_at: DateTime<Utc>,
    pub engine_version: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    kind: String,
    metadata: ExportMetadata,
    /// The formatted document; inline JSON for `json`, text otherwise
    payload: Value,
}

/// Pipeline runner. Hooks and the validation model are optional and only
/// required when an operation asks for them.
#[derive(Default)]
pub struct DataIo {
    compressor: Option<Arc<dyn Compressor>>,
    encryptor: Option<Arc<dyn Encryptor>>,
    model: Option<Arc<DataModel>>,
}

impl DataIo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_compressor(mut self, compressor: Arc<dyn Compressor>) -> Self {
        self.compressor = Some(compressor);
        self
    }

    pub fn with_encryptor(mut self, encryptor: Arc<dyn Encryptor>) -> Self {
        self.encryptor = Some(encryptor);
        self
    }

    pub fn with_model(mut self, model: Arc<DataModel>) -> Self {
        self.model = Some(model);
        self
    }

    pub async fn export(&self, data: &Value, options: &ExportOptions) -> Result<Vec<u8>> {
        let text = options.format.encode(data)?;

        let text = if options.include_metadata {
            let payload = match options.format {
                Format::Json => data.clone(),
                _ => Value::String(text),
            };
            let envelope = Envelope {
                kind: ENVELOPE_KIND.to_string(),
                metadata: ExportMetadata {
                    format: options.format.to_string(),
                    exported_at: Utc::now(),
                    engine_version: ENGINE_VERSION.to_string(),
                },
                payload,
            };
            serde_json::to_string_pretty(&envelope)?
        } else {
            text
        };

        let mut bytes = text.into_bytes();
        if options.encrypt {
            bytes = self.encryptor()?.encrypt(&bytes).await?;
        }
        if options.compress {
            bytes = self.compressor()?.compress(&bytes).await?;
        }

        info!(
            format = %options.format,
            bytes = bytes.len(),
            encrypted = options.encrypt,
            compressed = options.compress,
            "Exported document"
        );
        Ok(bytes)
    }

    pub async fn import(&self, bytes: &[u8], options: &ImportOptions) -> Result<Value> {
        let mut bytes = bytes.to_vec();
        if options.decompress {
            bytes = self.compressor()?.decompress(&bytes).await?;
        }
        if options.decrypt {
            bytes = self.encryptor()?.decrypt(&bytes).await?;
        }

        let text = String::from_utf8(bytes)
            .map_err(|e| DataError::parse(options.format.as_str(), e))?;
        let envelope = if options.metadata {
            unwrap_envelope(&text)?
        } else {
            None
        };
        let data = match envelope {
            Some((format, Value::String(inner))) if format != Format::Json => {
                format.decode(&inner)?
            }
            Some((Format::Json, payload)) => payload,
            Some((format, _)) => {
                return Err(DataError::parse(format.as_str(), "payload must be text"))
            }
            None => options.format.decode(&text)?,
        };

        if options.validate {
            self.validate(&data)?;
        }

        debug!(format = %options.format, "Imported document");
        Ok(data)
    }

    /// Validate a document, or every record of an array, against the model
    pub fn validate(&self, data: &Value) -> Result<()> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| DataError::Schema("no data model configured for validation".to_string()))?;

        let messages: Vec<String> = match data {
            Value::Array(records) => records
                .iter()
                .enumerate()
                .flat_map(|(i, record)| {
                    model
                        .validate(record)
                        .messages()
                        .into_iter()
                        .map(move |m| format!("[{}] {}", i, m))
                })
                .collect(),
            single => model.validate(single).messages(),
        };

        if messages.is_empty() {
            Ok(())
        } else {
            Err(DataError::InvalidData { messages })
        }
    }

    fn compressor(&self) -> Result<&Arc<dyn Compressor>> {
        self.compressor
            .as_ref()
            .ok_or_else(|| DataError::Compression("no compressor configured".to_string()))
    }

    fn encryptor(&self) -> Result<&Arc<dyn Encryptor>> {
        self.encryptor
            .as_ref()
            .ok_or_else(|| DataError::Encryption("no encryptor configured".to_string()))
    }
}

/// Recognise an export envelope by its `kind` tag. Plain documents yield
/// `None`, including ones that happen to have `metadata`/`payload` keys.
fn unwrap_envelope(text: &str) -> Result<Option<(Format, Value)>> {
    let Ok(Value::Object(mut object)) = serde_json::from_str::<Value>(text) else {
        return Ok(None);
    };
    if object.len() != 3
        || !object.contains_key("payload")
        || object.get("kind").and_then(Value::as_str) != Some(ENVELOPE_KIND)
    {
        return Ok(None);
    }
    let Some(metadata) = object
        .get("metadata")
        .and_then(|m| serde_json::from_value::<ExportMetadata>(m.clone()).ok())
    else {
        return Ok(None);
    };

    let format = metadata.format.parse::<Format>()?;
    Ok(object.remove("payload").map(|payload| (format, payload)))
}
