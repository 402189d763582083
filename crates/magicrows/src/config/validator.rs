//! Configuration and dataset validation.
//!
//! Validation runs in two stages. [`validate`] checks the block on its own
//! and can be used when a preset is loaded; [`validate_for_dataset`] adds the
//! checks that need the dataset's headers and runs just before orchestration.

use std::collections::HashSet;

use thiserror::Error;

use crate::template;

use super::block::{EnrichmentBlockConfig, OutputFormat, OutputKind};

/// A single violation of the enrichment block contract.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// The block could not be parsed (includes unknown enumeration members).
    #[error("invalid configuration: {0}")]
    Parse(String),

    #[error("configuration has no outputs")]
    NoOutputs,

    #[error("output name '{0}' is used more than once")]
    DuplicateOutputName(String),

    #[error("category output '{0}' has no outputCategories")]
    MissingCategories(String),

    #[error("category output '{output}' lists category '{category}' more than once")]
    DuplicateCategory { output: String, category: String },

    #[error("prompt of output '{output}' references '{placeholder}', which is not a context column")]
    UnknownPlaceholder { output: String, placeholder: String },

    #[error("field '{0}' must not be empty")]
    EmptyField(&'static str),

    #[error("temperature {0} is outside [0, 1]")]
    TemperatureOutOfRange(f64),

    #[error("budget {0} must be a non-negative number")]
    InvalidBudget(f64),

    #[error("previewRowCount must be at least 1")]
    ZeroPreviewRows,

    #[error("context column '{0}' is not a dataset header")]
    UnknownContextColumn(String),

    #[error("dataset header '{0}' appears more than once")]
    DuplicateHeader(String),

    #[error("row {row} has {found} cells, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("output column '{0}' collides with an existing column")]
    ColumnCollision(String),
}

/// Check a block on its own, without the dataset.
pub fn validate(config: &EnrichmentBlockConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if config.integration_name.trim().is_empty() {
        errors.push(ValidationError::EmptyField("integrationName"));
    }
    if config.model.trim().is_empty() {
        errors.push(ValidationError::EmptyField("model"));
    }
    if !(0.0..=1.0).contains(&config.temperature) {
        errors.push(ValidationError::TemperatureOutOfRange(config.temperature));
    }
    if let Some(budget) = config.budget {
        if !budget.is_finite() || budget < 0.0 {
            errors.push(ValidationError::InvalidBudget(budget));
        }
    }
    if config.preview_row_count == 0 {
        errors.push(ValidationError::ZeroPreviewRows);
    }

    // (a) outputs present
    if config.outputs.is_empty() {
        errors.push(ValidationError::NoOutputs);
    }

    // (b) unique output names, including reasoning companions
    let mut seen = HashSet::new();
    for column in output_columns(config) {
        if !seen.insert(column.clone()) {
            errors.push(ValidationError::DuplicateOutputName(column));
        }
    }

    // (c) category sets present and without duplicates
    for output in &config.outputs {
        if let OutputKind::Category(categories) = &output.kind {
            if categories.is_empty() {
                errors.push(ValidationError::MissingCategories(output.name.clone()));
            }
            let mut names = HashSet::new();
            for category in categories {
                if !names.insert(category.name.as_str()) {
                    errors.push(ValidationError::DuplicateCategory {
                        output: output.name.clone(),
                        category: category.name.clone(),
                    });
                }
            }
        }
    }

    // (d) placeholders resolve to context columns
    for output in &config.outputs {
        let context = output.effective_context_columns(&config.context_columns);
        for placeholder in template::placeholders(&output.prompt) {
            if !context.contains(&placeholder) {
                errors.push(ValidationError::UnknownPlaceholder {
                    output: output.name.clone(),
                    placeholder,
                });
            }
        }
    }

    // (e) enumerations are enforced by the types; unknown members fail in
    // `EnrichmentBlockConfig::from_json`.

    errors
}

/// Check a block against the dataset it is about to enrich.
pub fn validate_for_dataset(
    config: &EnrichmentBlockConfig,
    headers: &[String],
    rows: &[Vec<String>],
) -> Vec<ValidationError> {
    let mut errors = validate(config);

    let mut unique = HashSet::new();
    for header in headers {
        if !unique.insert(header.as_str()) {
            errors.push(ValidationError::DuplicateHeader(header.clone()));
        }
    }

    for (index, row) in rows.iter().enumerate() {
        if row.len() != headers.len() {
            errors.push(ValidationError::RaggedRow {
                row: index,
                expected: headers.len(),
                found: row.len(),
            });
        }
    }

    // (f) every context column, block-level or per output, is a header
    let mut reported = HashSet::new();
    let per_output = config
        .outputs
        .iter()
        .filter_map(|o| o.context_columns.as_ref())
        .flatten();
    for column in config.context_columns.iter().chain(per_output) {
        if !unique.contains(column.as_str()) && reported.insert(column.as_str()) {
            errors.push(ValidationError::UnknownContextColumn(column.clone()));
        }
    }

    // Output columns are written next to either all headers or the context columns.
    let neighbours: Vec<&str> = match config.output_format {
        OutputFormat::NewColumns => headers.iter().map(String::as_str).collect(),
        OutputFormat::NewRows => config.context_columns.iter().map(String::as_str).collect(),
    };
    for column in output_columns(config) {
        if neighbours.contains(&column.as_str()) {
            errors.push(ValidationError::ColumnCollision(column));
        }
    }

    errors
}

/// Output column names in table order, including reasoning companions.
pub fn output_columns(config: &EnrichmentBlockConfig) -> Vec<String> {
    let mut columns = Vec::with_capacity(config.outputs.len());
    for output in &config.outputs {
        columns.push(output.name.clone());
        if output.include_reasoning {
            columns.push(output.reasoning_name());
        }
    }
    columns
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OutputFormat, OutputKind, OutputSpec};

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn sentiment_config() -> EnrichmentBlockConfig {
        EnrichmentBlockConfig::new("myOpenAI", "gpt-4o-mini", OutputFormat::NewColumns)
            .with_context_columns(["text"])
            .with_output(OutputSpec::category(
                "Sentiment",
                "Classify {{text}}",
                ["positive", "negative", "neutral"],
            ))
    }

    #[test]
    fn test_valid_config_has_no_errors() {
        assert!(validate(&sentiment_config()).is_empty());
    }

    #[test]
    fn test_no_outputs() {
        let config = EnrichmentBlockConfig::new("x", "m", OutputFormat::NewColumns);
        assert_eq!(validate(&config), vec![ValidationError::NoOutputs]);
    }

    #[test]
    fn test_duplicate_output_names() {
        let config = sentiment_config().with_output(OutputSpec::text("Sentiment", "again"));
        assert!(
            validate(&config).contains(&ValidationError::DuplicateOutputName("Sentiment".into()))
        );
    }

    #[test]
    fn test_reasoning_column_collides_with_output() {
        let config = sentiment_config()
            .with_output(OutputSpec::text("Topic", "t").with_reasoning())
            .with_output(OutputSpec::text("Topic_reasoning", "t"));
        assert!(validate(&config)
            .contains(&ValidationError::DuplicateOutputName("Topic_reasoning".into())));
    }

    #[test]
    fn test_missing_categories() {
        let mut config = sentiment_config();
        config.outputs[0].kind = OutputKind::Category(Vec::new());
        assert_eq!(
            validate(&config),
            vec![ValidationError::MissingCategories("Sentiment".into())]
        );
    }

    #[test]
    fn test_unknown_placeholder() {
        let config = sentiment_config().with_output(OutputSpec::text("Summary", "{{body}}"));
        assert_eq!(
            validate(&config),
            vec![ValidationError::UnknownPlaceholder {
                output: "Summary".into(),
                placeholder: "body".into(),
            }]
        );
    }

    #[test]
    fn test_per_output_context_columns_override() {
        let config = sentiment_config()
            .with_output(OutputSpec::text("Summary", "{{body}}").with_context_columns(["body"]));
        assert!(validate(&config).is_empty());

        let errors = validate_for_dataset(&config, &strings(&["id", "text"]), &[]);
        assert_eq!(errors, vec![ValidationError::UnknownContextColumn("body".into())]);
    }

    #[test]
    fn test_scalar_ranges() {
        let mut config = sentiment_config().with_temperature(1.5).with_budget(-1.0);
        config.preview_row_count = 0;
        config.model = " ".into();

        let errors = validate(&config);
        assert!(errors.contains(&ValidationError::TemperatureOutOfRange(1.5)));
        assert!(errors.contains(&ValidationError::InvalidBudget(-1.0)));
        assert!(errors.contains(&ValidationError::ZeroPreviewRows));
        assert!(errors.contains(&ValidationError::EmptyField("model")));
    }

    #[test]
    fn test_context_columns_must_be_headers() {
        let config = sentiment_config();
        let errors = validate_for_dataset(&config, &strings(&["id", "body"]), &[]);
        assert_eq!(errors, vec![ValidationError::UnknownContextColumn("text".into())]);
    }

    #[test]
    fn test_dataset_shape_checks() {
        let config = sentiment_config();
        let headers = strings(&["id", "text", "id"]);
        let rows = vec![strings(&["1", "a", "x"]), strings(&["2"])];

        let errors = validate_for_dataset(&config, &headers, &rows);
        assert!(errors.contains(&ValidationError::DuplicateHeader("id".into())));
        assert!(errors.contains(&ValidationError::RaggedRow {
            row: 1,
            expected: 3,
            found: 1
        }));
    }

    #[test]
    fn test_output_collides_with_header() {
        let config = sentiment_config();
        let errors = validate_for_dataset(&config, &strings(&["text", "Sentiment"]), &[]);
        assert_eq!(errors, vec![ValidationError::ColumnCollision("Sentiment".into())]);
    }

    #[test]
    fn test_new_rows_only_collides_with_context_columns() {
        let mut config = sentiment_config();
        config.output_format = OutputFormat::NewRows;
        let errors = validate_for_dataset(&config, &strings(&["text", "Sentiment"]), &[]);
        assert!(errors.is_empty());
    }
}
