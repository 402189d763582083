//! Enrichment block configuration, validation and preset loading.

mod block;
mod loader;
mod settings;
mod validator;

pub use block::{
    Cardinality, EnrichmentBlockConfig, OutputCategory, OutputFormat, OutputKind, OutputSpec,
    OutputType, RunMode,
};
pub use loader::load_preset;
pub use settings::EngineSettings;
pub use validator::{ValidationError, output_columns, validate, validate_for_dataset};
