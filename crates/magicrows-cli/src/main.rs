//! MagicRows CLI - AI enrichment for tabular data.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "magicrows=debug" } else { "magicrows=warn" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let result = match cli.command {
        Commands::Enrich {
            data,
            config,
            credentials,
            output,
            full,
            preview,
            mock,
            concurrency,
            timeout,
            errors,
        } => commands::enrich::run(commands::enrich::EnrichArgs {
            data,
            config,
            credentials,
            output,
            full,
            preview,
            mock,
            concurrency,
            timeout,
            errors,
            verbose: cli.verbose,
        }),

        Commands::Validate { config, data } => commands::validate::run(config, data, cli.verbose),

        Commands::Contract { config } => commands::contract::run(config),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
