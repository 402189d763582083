//! Validate command - check an enrichment block before running it.

use std::path::PathBuf;

use colored::Colorize;
use magicrows::config::{output_columns, validate, validate_for_dataset};
use magicrows::dataset::Parser;
use magicrows::load_preset;

pub fn run(
    config_path: PathBuf,
    data: Option<PathBuf>,
    verbose: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_preset(&config_path)?;

    let errors = match &data {
        Some(path) => {
            let (table, _) = Parser::new().parse_file(path)?;
            validate_for_dataset(&config, &table.headers, &table.rows)
        }
        None => validate(&config),
    };

    if verbose {
        println!(
            "Integration: {}, model: {}, format: {:?}, mode: {:?}",
            config.integration_name, config.model, config.output_format, config.mode
        );
        println!("Output columns: {}", output_columns(&config).join(", "));
    }

    if errors.is_empty() {
        let target = match &data {
            Some(path) => format!(" against {}", path.display()),
            None => String::new(),
        };
        println!(
            "{} {}{}",
            "Valid".green().bold(),
            config_path.display().to_string().white(),
            target
        );
        return Ok(());
    }

    println!(
        "{} {} ({} problems)",
        "Invalid".red().bold(),
        config_path.display().to_string().white(),
        errors.len()
    );
    for error in &errors {
        println!("  {} {}", "-".red(), error);
    }

    Err(format!("{} validation errors", errors.len()).into())
}
