use super::read_json;
use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use easel_common::EngineConfig;
use easel_data::{ChaChaEncryptor, DataIo, ExportOptions, GzipCompressor};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Args)]
pub struct ExportArgs {
    /// JSON document to export
    pub input: PathBuf,

    /// Output file
    #[arg(short, long)]
    pub output: PathBuf,

    /// Format (json, csv, xml); defaults to the configured format
    #[arg(short, long)]
    pub format: Option<String>,

    /// Gzip the result
    #[arg(long)]
    pub compress: bool,

    /// Encrypt with a key derived from this passphrase
    #[arg(long)]
    pub encrypt_key: Option<String>,

    /// Leave out the metadata envelope
    #[arg(long)]
    pub no_metadata: bool,
}

pub async fn export(args: ExportArgs, config: &EngineConfig) -> Result<()> {
    let mut options = ExportOptions::from_config(&config.io)?;
    if let Some(format) = &args.format {
        options.format = format.parse()?;
    }
    options.compress |= args.compress;
    options.include_metadata &= !args.no_metadata;

    let mut io = DataIo::new().with_compressor(Arc::new(GzipCompressor::default()));
    match &args.encrypt_key {
        Some(key) => {
            io = io.with_encryptor(Arc::new(ChaChaEncryptor::from_passphrase(key)));
            options.encrypt = true;
        }
        None if options.encrypt => {
            anyhow::bail!("encryption is enabled in the config but no --encrypt-key was given")
        }
        None => {}
    }

    let data = read_json(&args.input)?;
    let bytes = io.export(&data, &options).await?;
    std::fs::write(&args.output, &bytes)
        .with_context(|| format!("Cannot write {}", args.output.display()))?;

    println!(
        "{} {} → {} ({}, {} bytes)",
        "✓".green(),
        args.input.display(),
        args.output.display(),
        options.format,
        bytes.len()
    );
    Ok(())
}
