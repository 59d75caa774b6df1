use super::read_json;
use anyhow::{bail, Result};
use clap::Args;
use colored::Colorize;
use easel_data::{DataModel, ModelDefinition};
use serde_json::Value;
use std::path::PathBuf;

#[derive(Debug, Args)]
pub struct ValidateArgs {
    /// Model definition (JSON)
    pub schema: PathBuf,

    /// Document to check: one object or an array of objects
    pub data: PathBuf,
}

pub fn validate(args: ValidateArgs) -> Result<()> {
    let model = DataModel::new(ModelDefinition::from_file(&args.schema)?)?;
    let data = read_json(&args.data)?;

    let records: Vec<&Value> = match &data {
        Value::Array(items) => items.iter().collect(),
        single => vec![single],
    };

    let mut failures = 0;
    for (index, record) in records.iter().enumerate() {
        let report = model.validate(record);
        if report.is_valid() {
            continue;
        }
        failures += 1;
        eprintln!("  {} record {}", "✗".red(), index);
        for error in &report.errors {
            eprintln!("      {}: {}", error.field.bright_white(), error.message);
        }
    }

    if failures > 0 {
        bail!("{} of {} records failed validation", failures, records.len());
    }

    println!(
        "{} {} record(s) match {} {}",
        "✓".green(),
        records.len(),
        model.definition().name.bright_white(),
        model.definition().version
    );
    Ok(())
}
