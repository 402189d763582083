//! Enrichment block configuration types.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::validator::ValidationError;

/// Execution mode of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RunMode {
    /// Process only the first `previewRowCount` rows.
    #[default]
    Preview,
    /// Process every row.
    Full,
}

/// Shape of the enriched table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OutputFormat {
    /// Widen every source row with one column per output.
    NewColumns,
    /// Replace each source row with context columns plus outputs, expanding
    /// multi-valued outputs into several rows.
    NewRows,
}

/// Declared type of an output value, as it appears in JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OutputType {
    Text,
    Number,
    Url,
    Date,
    Category,
}

impl fmt::Display for OutputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Text => "text",
            Self::Number => "number",
            Self::Url => "url",
            Self::Date => "date",
            Self::Category => "category",
        };
        f.write_str(name)
    }
}

/// Whether an output yields one value or a list of values per row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Cardinality {
    #[default]
    Single,
    Multiple,
}

/// One member of a closed category set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputCategory {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl OutputCategory {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Typed kind of an output. Category outputs carry their closed value set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputKind {
    Text,
    Number,
    Url,
    Date,
    Category(Vec<OutputCategory>),
}

impl OutputKind {
    /// The JSON vocabulary name of this kind.
    pub fn output_type(&self) -> OutputType {
        match self {
            Self::Text => OutputType::Text,
            Self::Number => OutputType::Number,
            Self::Url => OutputType::Url,
            Self::Date => OutputType::Date,
            Self::Category(_) => OutputType::Category,
        }
    }
}

/// One named value generated per row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawOutputSpec", into = "RawOutputSpec")]
pub struct OutputSpec {
    /// Destination column name, unique within the block.
    pub name: String,

    /// Prompt template with `{{ column }}` placeholders.
    pub prompt: String,

    pub kind: OutputKind,

    pub cardinality: Cardinality,

    /// Overrides the block-level context columns for this output's prompt.
    pub context_columns: Option<Vec<String>>,

    /// Request a `<name>_reasoning` field alongside the value.
    pub include_reasoning: bool,
}

impl OutputSpec {
    fn with_kind(name: impl Into<String>, prompt: impl Into<String>, kind: OutputKind) -> Self {
        Self {
            name: name.into(),
            prompt: prompt.into(),
            kind,
            cardinality: Cardinality::Single,
            context_columns: None,
            include_reasoning: false,
        }
    }

    pub fn text(name: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self::with_kind(name, prompt, OutputKind::Text)
    }

    pub fn number(name: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self::with_kind(name, prompt, OutputKind::Number)
    }

    pub fn url(name: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self::with_kind(name, prompt, OutputKind::Url)
    }

    pub fn date(name: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self::with_kind(name, prompt, OutputKind::Date)
    }

    /// Create a category output from plain category names.
    pub fn category<I, S>(name: impl Into<String>, prompt: impl Into<String>, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let categories = categories.into_iter().map(OutputCategory::new).collect();
        Self::with_kind(name, prompt, OutputKind::Category(categories))
    }

    /// Expect a list of values instead of one.
    pub fn multiple(mut self) -> Self {
        self.cardinality = Cardinality::Multiple;
        self
    }

    pub fn with_context_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.context_columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_reasoning(mut self) -> Self {
        self.include_reasoning = true;
        self
    }

    /// Name of the companion reasoning field/column.
    pub fn reasoning_name(&self) -> String {
        format!("{}_reasoning", self.name)
    }

    /// Context columns in effect for this output's prompt.
    pub fn effective_context_columns<'a>(&'a self, block_columns: &'a [String]) -> &'a [String] {
        self.context_columns.as_deref().unwrap_or(block_columns)
    }
}

/// Flat JSON shape of an output, as written in presets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawOutputSpec {
    name: String,
    prompt: String,
    output_type: OutputType,
    #[serde(default)]
    output_cardinality: Cardinality,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    output_categories: Vec<OutputCategory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    context_columns: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    include_reasoning: bool,
}

impl From<RawOutputSpec> for OutputSpec {
    fn from(raw: RawOutputSpec) -> Self {
        // Categories on non-category outputs carry no meaning and are dropped.
        let kind = match raw.output_type {
            OutputType::Text => OutputKind::Text,
            OutputType::Number => OutputKind::Number,
            OutputType::Url => OutputKind::Url,
            OutputType::Date => OutputKind::Date,
            OutputType::Category => OutputKind::Category(raw.output_categories),
        };

        Self {
            name: raw.name,
            prompt: raw.prompt,
            kind,
            cardinality: raw.output_cardinality,
            context_columns: raw.context_columns,
            include_reasoning: raw.include_reasoning,
        }
    }
}

impl From<OutputSpec> for RawOutputSpec {
    fn from(spec: OutputSpec) -> Self {
        let output_type = spec.kind.output_type();
        let output_categories = match spec.kind {
            OutputKind::Category(categories) => categories,
            _ => Vec::new(),
        };

        Self {
            name: spec.name,
            prompt: spec.prompt,
            output_type,
            output_cardinality: spec.cardinality,
            output_categories,
            context_columns: spec.context_columns,
            include_reasoning: spec.include_reasoning,
        }
    }
}

fn default_temperature() -> f64 {
    0.2
}

fn default_preview_row_count() -> usize {
    3
}

fn default_combine_outputs() -> bool {
    true
}

/// A single declarative enrichment run description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EnrichmentBlockConfig {
    /// Identifier resolved to a backend and credential.
    pub integration_name: String,

    /// Model identifier passed opaquely to the backend.
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f64,

    #[serde(default)]
    pub mode: RunMode,

    #[serde(default = "default_preview_row_count")]
    pub preview_row_count: usize,

    pub output_format: OutputFormat,

    #[serde(default = "default_combine_outputs")]
    pub combine_outputs: bool,

    #[serde(default)]
    pub context_columns: Vec<String>,

    /// Optional spend ceiling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<f64>,

    pub outputs: Vec<OutputSpec>,
}

impl EnrichmentBlockConfig {
    /// Create a block with defaults and no outputs.
    pub fn new(
        integration_name: impl Into<String>,
        model: impl Into<String>,
        output_format: OutputFormat,
    ) -> Self {
        Self {
            integration_name: integration_name.into(),
            model: model.into(),
            temperature: default_temperature(),
            mode: RunMode::default(),
            preview_row_count: default_preview_row_count(),
            output_format,
            combine_outputs: default_combine_outputs(),
            context_columns: Vec::new(),
            budget: None,
            outputs: Vec::new(),
        }
    }

    /// Parse a block from JSON.
    ///
    /// Unknown enumeration members and unknown fields are rejected here.
    pub fn from_json(json: &str) -> std::result::Result<Self, ValidationError> {
        serde_json::from_str(json).map_err(|e| ValidationError::Parse(e.to_string()))
    }

    pub fn with_output(mut self, output: OutputSpec) -> Self {
        self.outputs.push(output);
        self
    }

    pub fn with_context_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.context_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }

    /// Switch to preview mode capped at `rows`.
    pub fn with_preview(mut self, rows: usize) -> Self {
        self.mode = RunMode::Preview;
        self.preview_row_count = rows;
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_budget(mut self, budget: f64) -> Self {
        self.budget = Some(budget);
        self
    }

    pub fn with_combine_outputs(mut self, combine: bool) -> Self {
        self.combine_outputs = combine;
        self
    }

    /// Number of leading rows a run over `total_rows` rows will process.
    pub fn working_row_count(&self, total_rows: usize) -> usize {
        match self.mode {
            RunMode::Full => total_rows,
            RunMode::Preview => self.preview_row_count.min(total_rows),
        }
    }
}
