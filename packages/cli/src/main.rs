mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use commands::{export, import, init, validate, ExportArgs, ImportArgs, InitArgs, ValidateArgs};
use easel_common::{init_tracing, EngineConfig};

/// Easel CLI - validate, export and import editor documents
#[derive(Parser, Debug)]
#[command(name = "easel")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a default easel.config.json and an example schema
    Init(InitArgs),

    /// Check a JSON document against a model definition
    Validate(ValidateArgs),

    /// Encode a JSON document through the export pipeline
    Export(ExportArgs),

    /// Decode an exported file back into JSON
    Import(ImportArgs),
}

async fn run(cli: Cli) -> Result<()> {
    let cwd = std::env::current_dir()?;
    let config = EngineConfig::load(&cwd)?;
    init_tracing(&config.log.level);

    match cli.command {
        Command::Init(args) => init(args, &cwd),
        Command::Validate(args) => validate(args),
        Command::Export(args) => export(args, &config).await,
        Command::Import(args) => import(args, &config, &cwd).await,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        eprintln!();
        eprintln!("{} {:#}", "Error:".red().bold(), err);
        eprintln!();
        std::process::exit(1);
    }
}

