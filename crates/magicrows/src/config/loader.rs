//! Loading enrichment blocks from preset files.
//!
//! Presets are either plain JSON or TypeScript/JavaScript modules that
//! export a JSON-compatible object literal:
//!
//! ```text
//! export const sentimentPreset: AIEnrichmentBlockConfig = {
//!   "integrationName": "myOpenAI",
//!   ...
//! };
//! ```

use std::fs;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::error::{EnrichError, Result};

use super::block::EnrichmentBlockConfig;

static EXPORT_START: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"export\s+const\s+(\w+)(?:\s*:\s*[\w.<>\[\]]+)?\s*=\s*\{").unwrap()
});

/// Load and parse a preset file.
pub fn load_preset(path: impl AsRef<Path>) -> Result<EnrichmentBlockConfig> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| EnrichError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;

    let is_module = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| matches!(ext, "ts" | "js" | "mjs"));

    let json = if is_module {
        extract_object_literal(&content).map_err(|message| EnrichError::Preset {
            path: path.to_path_buf(),
            message,
        })?
    } else {
        content
    };

    debug!(path = %path.display(), module = is_module, "Parsing preset");

    EnrichmentBlockConfig::from_json(&json).map_err(|e| EnrichError::Preset {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Extract the first exported object literal as JSON text.
///
/// Trailing commas before `]` or `}` are dropped; string contents are
/// copied untouched.
fn extract_object_literal(source: &str) -> std::result::Result<String, String> {
    let start_match = EXPORT_START
        .find(source)
        .ok_or_else(|| "no `export const name = {` assignment found".to_string())?;
    let literal = &source[start_match.end() - 1..];

    let mut json = String::with_capacity(literal.len());
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    let mut closed = false;

    for (offset, ch) in literal.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            json.push(ch);
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => depth -= 1,
            ',' if closes_next(&literal[offset + 1..]) => continue,
            _ => {}
        }
        json.push(ch);
        if depth == 0 {
            closed = true;
            break;
        }
    }

    if !closed {
        return Err("unbalanced braces in exported object".to_string());
    }
    Ok(json)
}

/// Whether the next non-whitespace character closes an array or object.
fn closes_next(rest: &str) -> bool {
    matches!(rest.trim_start().chars().next(), Some(']' | '}'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    use crate::config::{OutputFormat, RunMode};

    const TS_PRESET: &str = r#"
import { AIEnrichmentBlockConfig } from "../types";

// Classifies task descriptions.
export const tasksPreset: AIEnrichmentBlockConfig = {
  "integrationName": "myOpenAI",
  "model": "gpt-4o-mini",
  "mode": "full",
  "outputFormat": "newRows",
  "contextColumns": ["Task"],
  "outputs": [
    {
      "name": "Skills",
      "prompt": "List skills for {{Task}} (use {braces} freely)",
      "outputType": "text",
      "outputCardinality": "multiple",
    },
  ],
};
"#;

    #[test]
    fn test_extract_object_literal_strips_trailing_commas() {
        let json = extract_object_literal(TS_PRESET).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["outputs"][0]["name"], "Skills");
    }

    #[test]
    fn test_trailing_comma_pattern_inside_strings_is_kept() {
        let source = r#"export const p = {
  "prompt": "Pick one of [a, b, ] or {x, }",
  "contextColumns": ["Task", ],
}"#;
        let json = extract_object_literal(source).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["prompt"], "Pick one of [a, b, ] or {x, }");
        assert_eq!(value["contextColumns"], serde_json::json!(["Task"]));
    }

    #[test]
    fn test_unbalanced_object_fails() {
        assert!(extract_object_literal(r#"export const p = { "a": { "b": 1 }"#).is_err());
    }

    #[test]
    fn test_extract_without_export_fails() {
        assert!(extract_object_literal("const x = {}").is_err());
    }

    #[test]
    fn test_load_ts_preset() {
        let mut file = Builder::new().suffix(".ts").tempfile().unwrap();
        file.write_all(TS_PRESET.as_bytes()).unwrap();

        let config = load_preset(file.path()).unwrap();
        assert_eq!(config.mode, RunMode::Full);
        assert_eq!(config.output_format, OutputFormat::NewRows);
        assert_eq!(config.outputs.len(), 1);
    }

    #[test]
    fn test_load_json_preset_reports_parse_errors() {
        let mut file = Builder::new().suffix(".json").tempfile().unwrap();
        file.write_all(br#"{"integrationName": "x"}"#).unwrap();

        let err = load_preset(file.path()).unwrap_err();
        assert!(matches!(err, EnrichError::Preset { .. }));
    }

    #[test]
    fn test_missing_file() {
        let err = load_preset("/nonexistent/preset.json").unwrap_err();
        assert!(matches!(err, EnrichError::Io { .. }));
    }
}
