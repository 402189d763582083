//! Prompt template resolution.
//!
//! Templates reference context columns with `{{ column }}` placeholders.
//! Whitespace inside the braces is ignored, so `{{Job Title}}` and
//! `{{ Job Title }}` both bind the `Job Title` column.

use std::borrow::Cow;
use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([^{}]*?)\s*\}\}").unwrap());

/// Names referenced by placeholders in `template`, in order of first use.
pub fn placeholders(template: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for caps in PLACEHOLDER.captures_iter(template) {
        let name = &caps[1];
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Bind a row's context-column values into a prompt template.
///
/// Placeholders without a binding are left untouched.
pub fn resolve(
    template: &str,
    headers: &[String],
    row: &[String],
    context_columns: &[String],
) -> String {
    let bindings: HashMap<&str, &str> = context_columns
        .iter()
        .filter_map(|column| {
            let index = headers.iter().position(|h| h == column)?;
            let value = row.get(index).map(String::as_str).unwrap_or("");
            Some((column.as_str(), value))
        })
        .collect();

    let resolved: Cow<'_, str> = PLACEHOLDER.replace_all(template, |caps: &Captures<'_>| {
        match bindings.get(&caps[1]) {
            Some(value) => (*value).to_string(),
            None => caps[0].to_string(),
        }
    });
    resolved.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_placeholders_in_order_without_duplicates() {
        let names = placeholders("{{b}} then {{ a }} then {{b}} and {{ Job Title }}");
        assert_eq!(names, strings(&["b", "a", "Job Title"]));
    }

    #[test]
    fn test_no_placeholders() {
        assert!(placeholders("plain prompt").is_empty());
        assert!(placeholders("single {brace}").is_empty());
    }

    #[test]
    fn test_resolve_binds_context_columns() {
        let headers = strings(&["id", "text", "lang"]);
        let row = strings(&["1", "great product", "en"]);
        let context = strings(&["text", "lang"]);

        let prompt = resolve("Classify '{{ text }}' ({{lang}})", &headers, &row, &context);
        assert_eq!(prompt, "Classify 'great product' (en)");
    }

    #[test]
    fn test_resolve_ignores_non_context_columns() {
        let headers = strings(&["id", "text"]);
        let row = strings(&["1", "hello"]);
        let context = strings(&["text"]);

        let prompt = resolve("{{id}}: {{text}}", &headers, &row, &context);
        assert_eq!(prompt, "{{id}}: hello");
    }

    #[test]
    fn test_resolve_does_not_reexpand_values() {
        let headers = strings(&["a", "b"]);
        let row = strings(&["{{b}}", "x"]);
        let context = strings(&["a", "b"]);

        assert_eq!(resolve("{{a}}", &headers, &row, &context), "{{b}}");
    }
}
