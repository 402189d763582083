//! MagicRows: AI enrichment engine for tabular datasets.
//!
//! An enrichment block describes which values to generate for each row of a
//! table: a prompt template per output, its type and cardinality, and how
//! the results are laid out. The engine resolves the prompts, asks a
//! provider for structured output constrained to a JSON contract, checks
//! every value against that contract and merges the results back into the
//! table, either as new columns or as new rows.
//!
//! Failures of single rows never abort a run; they are collected in
//! [`EnrichmentResult::errors`] next to the enriched table.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use magicrows::{
//!     BackendKind, Credential, EnrichmentBlockConfig, EnrichmentEngine, OutputFormat, OutputSpec,
//!     StaticCredentials,
//! };
//!
//! # async fn run() -> magicrows::Result<()> {
//! let credentials = StaticCredentials::new().with("mock", Credential::new(BackendKind::Mock, ""));
//! let engine = EnrichmentEngine::new(Arc::new(credentials))?;
//!
//! let config = EnrichmentBlockConfig::new("mock", "any-model", OutputFormat::NewColumns)
//!     .with_context_columns(["text"])
//!     .with_output(OutputSpec::category(
//!         "Sentiment",
//!         "Classify the sentiment of: {{text}}",
//!         ["positive", "negative", "neutral"],
//!     ));
//!
//! let headers = vec!["id".to_string(), "text".to_string()];
//! let rows = vec![vec!["1".to_string(), "great".to_string()]];
//!
//! let result = engine.process_dataset(&config, &headers, &rows).await;
//! println!("{:?}", result.new_headers);
//! # Ok(())
//! # }
//! ```

pub mod budget;
pub mod config;
pub mod contract;
pub mod dataset;
pub mod error;
pub mod gateway;
pub mod merge;
pub mod orchestrator;
pub mod template;
pub mod usage;

mod engine;

pub use budget::{BudgetTracker, CostEstimator, FlatRateEstimator, TokenRateEstimator};
pub use config::{
    Cardinality, EngineSettings, EnrichmentBlockConfig, OutputCategory, OutputFormat, OutputKind,
    OutputSpec, OutputType, RunMode, ValidationError, load_preset,
};
pub use contract::{Contract, build_contract};
pub use engine::{EnrichmentEngine, EnrichmentResult, RunFailure, RunHandle, RunState};
pub use error::{EnrichError, ErrorKind, Result, RowError};
pub use gateway::{
    BackendKind, Credential, CredentialResolver, Gateway, GatewayError, GatewayRequest,
    GatewayResponse, ProviderGateway, StaticCredentials,
};
pub use usage::Usage;
