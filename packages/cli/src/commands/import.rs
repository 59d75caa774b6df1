use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use easel_common::EngineConfig;
use easel_data::{
    ChaChaEncryptor, DataIo, DataModel, DataPersistenceManager, FileStorage, GzipCompressor,
    ImportOptions, ModelDefinition,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// Exported file
    pub input: PathBuf,

    /// Format of documents without a metadata envelope; defaults to the configured format
    #[arg(short, long)]
    pub format: Option<String>,

    /// Validate against this model definition
    #[arg(long)]
    pub schema: Option<PathBuf>,

    /// Passphrase the file was encrypted with
    #[arg(long)]
    pub decrypt_key: Option<String>,

    /// Write the JSON here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Also store the document in the configured storage under this key
    #[arg(long)]
    pub save: Option<String>,
}

pub async fn import(args: ImportArgs, config: &EngineConfig, cwd: &Path) -> Result<()> {
    let bytes = std::fs::read(&args.input)
        .with_context(|| format!("Cannot read {}", args.input.display()))?;

    let format = args.format.as_deref().unwrap_or(&config.io.format);
    let mut options = ImportOptions {
        format: format.parse()?,
        decompress: bytes.starts_with(&GZIP_MAGIC),
        ..Default::default()
    };
    debug!(decompress = options.decompress, "Detected input encoding");

    let mut io = DataIo::new().with_compressor(Arc::new(GzipCompressor::default()));
    if let Some(key) = &args.decrypt_key {
        io = io.with_encryptor(Arc::new(ChaChaEncryptor::from_passphrase(key)));
        options.decrypt = true;
    }
    if let Some(schema) = &args.schema {
        let model = DataModel::new(ModelDefinition::from_file(schema)?)?;
        io = io.with_model(Arc::new(model));
        options.validate = true;
    }

    let data = io.import(&bytes, &options).await?;
    let text = serde_json::to_string_pretty(&data)?;

    if let Some(key) = &args.save {
        let storage = FileStorage::new(config.storage_dir(cwd));
        let manager = DataPersistenceManager::new(Arc::new(storage));
        manager.save(key.as_str(), data).await?;
        eprintln!("{} Stored as '{}'", "✓".green(), key);
    }

    match &args.output {
        Some(path) => {
            std::fs::write(path, text)
                .with_context(|| format!("Cannot write {}", path.display()))?;
            eprintln!("{} {} → {}", "✓".green(), args.input.display(), path.display());
        }
        None => println!("{}", text),
    }
    Ok(())
}
