//! Prompt templates for structured-output calls.

use serde_json::Value;

use crate::contract::Contract;

/// System prompt instructing the model to answer with the contract's JSON.
pub fn system_prompt(contract: &Contract, schema: &Value) -> String {
    let schema_str = serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string());

    let mut prompt = format!(
        r#"You are a data enrichment assistant. You receive information about one row of a table and answer with a single JSON object.

## Response Format
Respond ONLY with a valid JSON object matching this JSON Schema:
{}

## Rules
- Include every required field.
- Use exactly the allowed values for fields with an enum.
- Dates use the format YYYY-MM-DD.
- URLs are absolute and start with http:// or https://.
- Do not add commentary outside the JSON object."#,
        schema_str
    );

    if let Some(notes) = contract.category_notes() {
        prompt.push_str("\n\n## Category Meanings\n");
        prompt.push_str(&notes);
    }

    prompt
}
