//! Structured-output contracts.
//!
//! A [`Contract`] describes the JSON object a provider must return for one
//! unit of work: one field per requested output, typed by the output's kind
//! and cardinality, plus optional reasoning companions. The same contract
//! renders the JSON Schema sent to the backend and validates the response.

mod value;

use serde_json::{Map, Value, json};

use crate::config::{Cardinality, OutputKind, OutputSpec};

pub use value::{ContractViolation, FieldValue, LIST_SEPARATOR, OutputValue, ParsedField, ParsedValues};

/// Expected shape of one field in a provider response.
#[derive(Debug, Clone, PartialEq)]
pub struct ContractField {
    /// Field name, equal to the output name.
    pub name: String,
    /// Value type, with the allowed names for categories.
    pub kind: OutputKind,
    /// One value or a list.
    pub cardinality: Cardinality,
    /// Whether a `<name>_reasoning` string accompanies the value.
    pub reasoning: bool,
    /// Instruction shown to the model for this field.
    pub description: String,
}

impl ContractField {
    pub fn reasoning_name(&self) -> String {
        format!("{}_reasoning", self.name)
    }
}

/// Machine-checkable description of a provider response.
#[derive(Debug, Clone, PartialEq)]
pub struct Contract {
    /// Fields in request order.
    pub fields: Vec<ContractField>,
}

/// Build the contract for a set of outputs requested in one call.
pub fn build_contract(outputs: &[&OutputSpec]) -> Contract {
    let fields = outputs
        .iter()
        .map(|output| ContractField {
            name: output.name.clone(),
            kind: output.kind.clone(),
            cardinality: output.cardinality,
            reasoning: output.include_reasoning,
            description: field_description(output),
        })
        .collect();

    Contract { fields }
}

fn field_description(output: &OutputSpec) -> String {
    let shape = match (&output.kind, output.cardinality) {
        (OutputKind::Text, Cardinality::Single) => "Text value",
        (OutputKind::Text, Cardinality::Multiple) => "List of text values",
        (OutputKind::Number, Cardinality::Single) => "Numeric value",
        (OutputKind::Number, Cardinality::Multiple) => "List of numeric values",
        (OutputKind::Url, Cardinality::Single) => "Absolute http(s) URL",
        (OutputKind::Url, Cardinality::Multiple) => "List of absolute http(s) URLs",
        (OutputKind::Date, Cardinality::Single) => "Date formatted YYYY-MM-DD",
        (OutputKind::Date, Cardinality::Multiple) => "List of dates formatted YYYY-MM-DD",
        (OutputKind::Category(_), Cardinality::Single) => "One of the allowed categories",
        (OutputKind::Category(_), Cardinality::Multiple) => "List of allowed categories",
    };
    format!("{} for {}", shape, output.name)
}

impl Contract {
    /// Render the contract as a strict JSON Schema object.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for field in &self.fields {
            let item = item_schema(&field.kind);
            let schema = match field.cardinality {
                Cardinality::Single => with_description(item, &field.description),
                Cardinality::Multiple => json!({
                    "type": "array",
                    "description": field.description,
                    "items": item,
                }),
            };
            properties.insert(field.name.clone(), schema);
            required.push(Value::String(field.name.clone()));

            if field.reasoning {
                let name = field.reasoning_name();
                properties.insert(
                    name.clone(),
                    json!({
                        "type": "string",
                        "description": format!("Reasoning for {}", field.name),
                    }),
                );
                required.push(Value::String(name));
            }
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        })
    }

    /// Human-readable notes on category meanings, if any output defines them.
    pub fn category_notes(&self) -> Option<String> {
        let mut lines = Vec::new();
        for field in &self.fields {
            if let OutputKind::Category(categories) = &field.kind {
                for category in categories {
                    if let Some(description) = &category.description {
                        lines.push(format!("- {} / {}: {}", field.name, category.name, description));
                    }
                }
            }
        }
        if lines.is_empty() {
            None
        } else {
            Some(lines.join("\n"))
        }
    }

    /// Build a response that satisfies this contract, used by the mock backend.
    pub fn sample_response(&self, seed: usize) -> Value {
        let mut object = Map::new();
        for field in &self.fields {
            let sample = |offset: usize| sample_value(&field.kind, &field.name, seed + offset);
            let value = match field.cardinality {
                Cardinality::Single => sample(0),
                Cardinality::Multiple => Value::Array((0..2).map(sample).collect()),
            };
            object.insert(field.name.clone(), value);
            if field.reasoning {
                object.insert(
                    field.reasoning_name(),
                    Value::String(format!("Mock reasoning for {}", field.name)),
                );
            }
        }
        Value::Object(object)
    }
}

fn item_schema(kind: &OutputKind) -> Value {
    match kind {
        OutputKind::Text | OutputKind::Url => json!({ "type": "string" }),
        OutputKind::Number => json!({ "type": "number" }),
        OutputKind::Date => json!({ "type": "string", "format": "date" }),
        OutputKind::Category(categories) => {
            let names: Vec<&str> = categories.iter().map(|c| c.name.as_str()).collect();
            json!({ "type": "string", "enum": names })
        }
    }
}

fn with_description(mut schema: Value, description: &str) -> Value {
    if let Value::Object(map) = &mut schema {
        map.insert("description".into(), Value::String(description.to_string()));
    }
    schema
}

fn sample_value(kind: &OutputKind, name: &str, seed: usize) -> Value {
    match kind {
        OutputKind::Text => Value::String(format!("{} sample {}", name, seed + 1)),
        OutputKind::Number => json!(seed + 1),
        OutputKind::Url => Value::String(format!("https://example.com/{}/{}", name, seed + 1)),
        OutputKind::Date => Value::String(format!("2024-01-{:02}", seed % 28 + 1)),
        OutputKind::Category(categories) => categories
            .get(seed % categories.len().max(1))
            .map(|c| Value::String(c.name.clone()))
            .unwrap_or(Value::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_category_schema() {
        let output = OutputSpec::category("Sentiment", "p", ["positive", "negative"]);
        let schema = build_contract(&[&output]).to_json_schema();

        assert_eq!(schema["type"], "object");
        assert_eq!(schema["additionalProperties"], false);
        assert_eq!(schema["required"], json!(["Sentiment"]));
        assert_eq!(
            schema["properties"]["Sentiment"]["enum"],
            json!(["positive", "negative"])
        );
    }

    #[test]
    fn test_combined_schema_with_reasoning_and_lists() {
        let tags = OutputSpec::text("Tags", "p").multiple();
        let founded = OutputSpec::date("Founded", "p").with_reasoning();
        let schema = build_contract(&[&tags, &founded]).to_json_schema();

        assert_eq!(schema["properties"]["Tags"]["type"], "array");
        assert_eq!(schema["properties"]["Tags"]["items"]["type"], "string");
        assert_eq!(schema["properties"]["Founded"]["format"], "date");
        assert_eq!(schema["properties"]["Founded_reasoning"]["type"], "string");
        assert_eq!(
            schema["required"],
            json!(["Tags", "Founded", "Founded_reasoning"])
        );
    }

    #[test]
    fn test_sample_response_satisfies_contract() {
        let outputs = [
            OutputSpec::text("Summary", "p"),
            OutputSpec::number("Score", "p"),
            OutputSpec::url("Site", "p").multiple(),
            OutputSpec::date("Founded", "p"),
            OutputSpec::category("Tier", "p", ["gold", "silver"]).with_reasoning(),
        ];
        let refs: Vec<&OutputSpec> = outputs.iter().collect();
        let contract = build_contract(&refs);

        for seed in 0..5 {
            let raw = contract.sample_response(seed).to_string();
            let parsed = contract.parse_response(&raw).unwrap();
            assert_eq!(parsed.len(), 5);
        }
    }

    #[test]
    fn test_category_notes() {
        let mut output = OutputSpec::category("Tier", "p", ["gold"]);
        if let OutputKind::Category(categories) = &mut output.kind {
            categories[0].description = Some("Top customers".into());
        }
        let contract = build_contract(&[&output]);
        assert_eq!(
            contract.category_notes().as_deref(),
            Some("- Tier / gold: Top customers")
        );
        assert!(build_contract(&[&OutputSpec::text("a", "p")]).category_notes().is_none());
    }
}
