//! Typed values parsed from provider responses.

use std::fmt;

use chrono::NaiveDate;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use thiserror::Error;
use url::Url;

use crate::config::{Cardinality, OutputKind};

use super::{Contract, ContractField};

/// Separator used when a list of values is written into a single cell.
pub const LIST_SEPARATOR: &str = "; ";

/// A single validated value.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputValue {
    Text(String),
    Number(f64),
    Url(Url),
    Date(NaiveDate),
    Category(String),
}

impl fmt::Display for OutputValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) | Self::Category(s) => f.write_str(s),
            Self::Number(n) => write!(f, "{}", n),
            Self::Url(u) => f.write_str(u.as_str()),
            Self::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

/// The value of one field, shaped by its cardinality.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Single(OutputValue),
    Multiple(Vec<OutputValue>),
}

impl FieldValue {
    /// Serialize as one cell; lists are joined with [`LIST_SEPARATOR`].
    pub fn to_cell(&self) -> String {
        match self {
            Self::Single(value) => value.to_string(),
            Self::Multiple(values) => values
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(LIST_SEPARATOR),
        }
    }

    /// Serialize each element as its own cell.
    pub fn to_cells(&self) -> Vec<String> {
        match self {
            Self::Single(value) => vec![value.to_string()],
            Self::Multiple(values) => values.iter().map(ToString::to_string).collect(),
        }
    }
}

/// A parsed field with its optional reasoning.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedField {
    pub value: FieldValue,
    /// The `<name>_reasoning` text, when requested and returned.
    pub reasoning: Option<String>,
}

/// Parsed response keyed by output name, in contract order.
pub type ParsedValues = IndexMap<String, ParsedField>;

/// Why a provider response does not satisfy its contract.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ContractViolation {
    #[error("response is not valid JSON: {0}")]
    NotJson(String),

    #[error("response is not a JSON object")]
    NotObject,

    #[error("field '{0}' is missing")]
    MissingField(String),

    #[error("field '{field}' should be {expected}, got {found}")]
    WrongType {
        field: String,
        expected: &'static str,
        found: String,
    },

    #[error("field '{field}' value '{value}' is not one of the allowed categories")]
    NotInCategories { field: String, value: String },

    #[error("field '{field}' value '{value}' is not an absolute http(s) URL")]
    InvalidUrl { field: String, value: String },

    #[error("field '{field}' value '{value}' is not a YYYY-MM-DD date")]
    InvalidDate { field: String, value: String },
}

impl Contract {
    /// Parse a raw response body and validate every field against the contract.
    ///
    /// The body is parsed as plain JSON first; markdown code fences around
    /// the JSON are only stripped when that fails. Unknown extra fields are
    /// ignored.
    pub fn parse_response(&self, raw: &str) -> Result<ParsedValues, ContractViolation> {
        let value: Value = match serde_json::from_str(raw.trim()) {
            Ok(value) => value,
            Err(_) => serde_json::from_str(extract_json(raw))
                .map_err(|e| ContractViolation::NotJson(e.to_string()))?,
        };
        let Value::Object(object) = value else {
            return Err(ContractViolation::NotObject);
        };
        self.validate_object(&object)
    }

    /// Validate an already-decoded JSON object.
    pub fn validate_object(&self, object: &Map<String, Value>) -> Result<ParsedValues, ContractViolation> {
        let mut parsed = ParsedValues::with_capacity(self.fields.len());

        for field in &self.fields {
            let raw = object
                .get(&field.name)
                .ok_or_else(|| ContractViolation::MissingField(field.name.clone()))?;
            let value = parse_field(field, raw)?;

            let reasoning = if field.reasoning {
                match object.get(&field.reasoning_name()) {
                    Some(Value::String(s)) => Some(s.clone()),
                    Some(Value::Null) | None => None,
                    Some(other) => {
                        return Err(ContractViolation::WrongType {
                            field: field.reasoning_name(),
                            expected: "a string",
                            found: type_name(other).to_string(),
                        });
                    }
                }
            } else {
                None
            };

            parsed.insert(field.name.clone(), ParsedField { value, reasoning });
        }

        Ok(parsed)
    }
}

/// Strip markdown code fences if present.
fn extract_json(response: &str) -> &str {
    if response.contains("```json") {
        response
            .split("```json")
            .nth(1)
            .and_then(|s| s.split("```").next())
            .map(|s| s.trim())
            .unwrap_or(response)
    } else if response.contains("```") {
        response
            .split("```")
            .nth(1)
            .map(|s| s.trim())
            .unwrap_or(response)
    } else {
        response.trim()
    }
}

fn parse_field(field: &ContractField, raw: &Value) -> Result<FieldValue, ContractViolation> {
    match field.cardinality {
        Cardinality::Single => {
            if raw.is_array() {
                return Err(wrong_type(field, "a single value", raw));
            }
            parse_item(field, raw).map(FieldValue::Single)
        }
        Cardinality::Multiple => {
            let Value::Array(items) = raw else {
                return Err(wrong_type(field, "a list", raw));
            };
            items
                .iter()
                .map(|item| parse_item(field, item))
                .collect::<Result<Vec<_>, _>>()
                .map(FieldValue::Multiple)
        }
    }
}

fn parse_item(field: &ContractField, raw: &Value) -> Result<OutputValue, ContractViolation> {
    match &field.kind {
        OutputKind::Text => match raw {
            Value::String(s) => Ok(OutputValue::Text(s.clone())),
            other => Err(wrong_type(field, "a string", other)),
        },
        OutputKind::Number => match raw.as_f64() {
            Some(n) if raw.is_number() => Ok(OutputValue::Number(n)),
            _ => Err(wrong_type(field, "a number", raw)),
        },
        OutputKind::Url => {
            let s = raw.as_str().ok_or_else(|| wrong_type(field, "a string", raw))?;
            match Url::parse(s.trim()) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(OutputValue::Url(url)),
                _ => Err(ContractViolation::InvalidUrl {
                    field: field.name.clone(),
                    value: s.to_string(),
                }),
            }
        }
        OutputKind::Date => {
            let s = raw.as_str().ok_or_else(|| wrong_type(field, "a string", raw))?;
            NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .map(OutputValue::Date)
                .map_err(|_| ContractViolation::InvalidDate {
                    field: field.name.clone(),
                    value: s.to_string(),
                })
        }
        OutputKind::Category(categories) => {
            let s = raw.as_str().ok_or_else(|| wrong_type(field, "a string", raw))?;
            let value = s.trim();
            if categories.iter().any(|c| c.name == value) {
                Ok(OutputValue::Category(value.to_string()))
            } else {
                Err(ContractViolation::NotInCategories {
                    field: field.name.clone(),
                    value: s.to_string(),
                })
            }
        }
    }
}

fn wrong_type(field: &ContractField, expected: &'static str, found: &Value) -> ContractViolation {
    ContractViolation::WrongType {
        field: field.name.clone(),
        expected,
        found: type_name(found).to_string(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
