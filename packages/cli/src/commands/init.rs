use anyhow::Result;
use clap::Args;
use colored::Colorize;
use easel_common::{EngineConfig, DEFAULT_CONFIG_NAME};
use easel_data::{FieldDefinition, FieldType, Format, ModelDefinition, Rule};
use serde_json::json;
use std::fs;
use std::path::Path;

pub const EXAMPLE_SCHEMA: &str = "schemas/contact.json";

#[derive(Debug, Args)]
pub struct InitArgs {
    /// Default export format (json, csv, xml)
    #[arg(short, long, default_value = "json")]
    pub format: String,

    /// Undo window of the editor history
    #[arg(long, default_value_t = 100)]
    pub max_states: usize,

    /// Force overwrite existing config
    #[arg(long)]
    pub force: bool,
}

pub fn init(args: InitArgs, cwd: &Path) -> Result<()> {
    let config_path = EngineConfig::path_in(cwd);

    if config_path.exists() && !args.force {
        println!(
            "{} {} already exists",
            "⚠️".yellow(),
            DEFAULT_CONFIG_NAME.bright_white()
        );
        println!("Use --force to overwrite");
        return Ok(());
    }

    // Reject unknown formats before writing anything
    let format: Format = args.format.parse()?;

    println!("{}", "📝 Initializing Easel project...".bright_blue().bold());

    let mut config = EngineConfig::default();
    config.io.format = format.to_string();
    config.history.max_states = args.max_states.max(1);

    let storage_dir = config.storage_dir(cwd);
    if !storage_dir.exists() {
        fs::create_dir_all(&storage_dir)?;
        println!("  {} Created {}/", "✓".green(), config.storage.dir);
    }

    let schema_path = cwd.join(EXAMPLE_SCHEMA);
    if !schema_path.exists() {
        if let Some(parent) = schema_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let schema = ModelDefinition::new("contact", "Contact", "1.0.0")
            .field(FieldDefinition::new("name", FieldType::String).required())
            .field(
                FieldDefinition::new("email", FieldType::String).with_rule(Rule::Pattern {
                    pattern: r"^[^@\s]+@[^@\s]+$".to_string(),
                }),
            )
            .field(FieldDefinition::new("tags", FieldType::Array).with_default(json!([])));
        fs::write(&schema_path, serde_json::to_string_pretty(&schema)?)?;
        println!("  {} Created {}", "✓".green(), EXAMPLE_SCHEMA);
    }

    config.save(cwd)?;
    println!("  {} Created {}", "✓".green(), DEFAULT_CONFIG_NAME);
    println!();
    println!("{}", "✅ Project initialized!".green().bold());
    println!();
    println!("Next steps:");
    println!("  1. Run: easel validate {} data.json", EXAMPLE_SCHEMA);
    println!("  2. Run: easel export data.json -o data.{}", format);

    Ok(())
}
