//! Enrich command - run an enrichment block over a data file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use magicrows::dataset::{self, Parser};
use magicrows::{
    BackendKind, Credential, EngineSettings, EnrichmentEngine, EnrichmentResult, RunFailure,
    RunMode, StaticCredentials, load_preset,
};

/// Errors printed inline before pointing at `--errors`.
const SHOWN_ERRORS: usize = 5;

pub struct EnrichArgs {
    pub data: PathBuf,
    pub config: PathBuf,
    pub credentials: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub full: bool,
    pub preview: Option<usize>,
    pub mock: bool,
    pub concurrency: usize,
    pub timeout: u64,
    pub errors: Option<PathBuf>,
    pub verbose: bool,
}

pub fn run(args: EnrichArgs) -> Result<(), Box<dyn std::error::Error>> {
    if !args.data.exists() {
        return Err(format!("File not found: {}", args.data.display()).into());
    }

    let mut config = load_preset(&args.config)?;
    if args.full {
        config.mode = RunMode::Full;
    } else if let Some(rows) = args.preview {
        config = config.with_preview(rows);
    }

    let credentials = if args.mock {
        StaticCredentials::new().with(
            config.integration_name.clone(),
            Credential::new(BackendKind::Mock, ""),
        )
    } else {
        match &args.credentials {
            Some(path) => StaticCredentials::from_file(path)?,
            None => StaticCredentials::new(),
        }
        .with_env_defaults()
    };

    let (table, source) = Parser::new().parse_file(&args.data)?;

    println!(
        "{} {} ({} rows, {} columns) with {}",
        "Enriching".cyan().bold(),
        source.file.white(),
        table.row_count(),
        table.column_count(),
        args.config.display().to_string().white()
    );
    if args.verbose {
        println!("  Source hash: {}", source.hash);
        println!(
            "  Mode: {:?}, outputs: {}",
            config.mode,
            config
                .outputs
                .iter()
                .map(|o| o.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    let settings = EngineSettings::default()
        .with_max_concurrency(args.concurrency)
        .with_request_timeout(Duration::from_secs(args.timeout));
    let engine = EnrichmentEngine::new(Arc::new(credentials))?.with_settings(settings);
    if args.verbose {
        let settings = engine.settings();
        println!(
            "  Concurrency: {}, timeout: {}s, attempts: {}",
            settings.max_concurrency,
            settings.request_timeout.as_secs(),
            settings.max_attempts
        );
    }

    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(async {
        let handle = engine.spawn(config, table.headers.clone(), table.rows.clone());
        let token = handle.cancellation_token();
        ctrlc::set_handler(move || {
            eprintln!("{}", "Cancelling...".yellow());
            token.cancel();
        })?;
        handle.join().await.map_err(Box::<dyn std::error::Error>::from)
    })?;

    print_summary(&result);

    if let Some(path) = &args.errors {
        std::fs::write(path, serde_json::to_string_pretty(&result.errors)?)?;
        println!(
            "{} {}",
            "Errors written to".green().bold(),
            path.display().to_string().white()
        );
    }

    match result.failure {
        Some(RunFailure::InvalidConfig) | Some(RunFailure::CredentialsUnavailable) => {
            let message = result
                .errors
                .first()
                .map(|e| e.message.clone())
                .unwrap_or_default();
            return Err(message.into());
        }
        Some(RunFailure::Cancelled) | None => {}
    }

    let output_path = args
        .output
        .unwrap_or_else(|| default_output_path(&args.data));
    dataset::write_file(&output_path, &result.new_headers, &result.new_rows, table.delimiter)?;

    println!(
        "{} {}",
        "Saved to".green().bold(),
        output_path.display().to_string().white()
    );

    Ok(())
}

fn print_summary(result: &EnrichmentResult) {
    println!();
    println!(
        "Processed {} rows into {} rows x {} columns",
        result.processed_row_count.to_string().white().bold(),
        result.new_rows.len(),
        result.new_headers.len()
    );

    if result.usage.requests > 0 {
        println!(
            "Requests: {}, tokens: {} in / {} out, estimated cost: {:.4}",
            result.usage.requests,
            result.usage.input_tokens,
            result.usage.output_tokens,
            result.spent
        );
    }

    if result.errors.is_empty() {
        println!("{}", "No errors".green());
        return;
    }

    let mut by_kind: BTreeMap<String, usize> = BTreeMap::new();
    for error in &result.errors {
        *by_kind.entry(format!("{:?}", error.kind)).or_default() += 1;
    }
    let counts: Vec<String> = by_kind
        .iter()
        .map(|(kind, count)| format!("{} {}", count, kind))
        .collect();
    println!(
        "{} {} ({})",
        result.errors.len().to_string().red().bold(),
        "errors".red(),
        counts.join(", ")
    );

    for error in result.errors.iter().take(SHOWN_ERRORS) {
        let location = match (error.row_index, &error.output_name) {
            (Some(row), Some(output)) => format!("row {} / {}", row + 1, output),
            (Some(row), None) => format!("row {}", row + 1),
            (None, _) => "run".to_string(),
        };
        println!("  {} {}", location.yellow(), error.message);
    }
    if result.errors.len() > SHOWN_ERRORS {
        println!("  ... and {} more", result.errors.len() - SHOWN_ERRORS);
    }
}

/// `<stem>.enriched.<ext>` next to the input.
fn default_output_path(data: &Path) -> PathBuf {
    let stem = data.file_stem().unwrap_or_default().to_string_lossy();
    let extension = data
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "csv".to_string());
    data.with_file_name(format!("{}.enriched.{}", stem, extension))
}
