//! Assemble provider results into the final table.
//!
//! Merging is a pure function of its inputs: rows are emitted in source
//! order, whatever order the units completed in.

use serde::{Deserialize, Serialize};

use crate::config::{Cardinality, EnrichmentBlockConfig, OutputFormat, OutputSpec, output_columns};
use crate::orchestrator::RowResults;

/// Cell written where a unit failed or a list has no value at a position.
pub const EMPTY_CELL: &str = "";

/// Final headers and rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedTable {
    pub new_headers: Vec<String>,
    pub new_rows: Vec<Vec<String>>,
}

/// Merge per-row results into `headers`/`rows` according to the output format.
///
/// `working_rows` is the number of leading rows that were eligible for
/// enrichment; in `newRows` format only those rows appear in the result.
pub fn merge(
    headers: &[String],
    rows: &[Vec<String>],
    config: &EnrichmentBlockConfig,
    results: &RowResults,
    working_rows: usize,
) -> MergedTable {
    match config.output_format {
        OutputFormat::NewColumns => merge_columns(headers, rows, config, results),
        OutputFormat::NewRows => merge_rows(headers, rows, config, results, working_rows),
    }
}

fn merge_columns(
    headers: &[String],
    rows: &[Vec<String>],
    config: &EnrichmentBlockConfig,
    results: &RowResults,
) -> MergedTable {
    let mut new_headers = headers.to_vec();
    new_headers.extend(output_columns(config));

    let new_rows = rows
        .iter()
        .enumerate()
        .map(|(row_index, row)| {
            let mut cells = row.clone();
            for output in &config.outputs {
                let field = results.get(row_index, &output.name);
                cells.push(
                    field
                        .map(|f| f.value.to_cell())
                        .unwrap_or_else(|| EMPTY_CELL.to_string()),
                );
                if output.include_reasoning {
                    cells.push(reasoning_cell(field.and_then(|f| f.reasoning.as_deref())));
                }
            }
            cells
        })
        .collect();

    MergedTable {
        new_headers,
        new_rows,
    }
}

/// Values of one output for one source row, prepared for expansion.
struct OutputCells<'a> {
    output: &'a OutputSpec,
    values: Vec<String>,
    reasoning: String,
}

impl OutputCells<'_> {
    fn cell_at(&self, position: usize) -> String {
        match self.output.cardinality {
            Cardinality::Single => self.values.first().cloned(),
            Cardinality::Multiple => self.values.get(position).cloned(),
        }
        .unwrap_or_else(|| EMPTY_CELL.to_string())
    }
}

fn merge_rows(
    headers: &[String],
    rows: &[Vec<String>],
    config: &EnrichmentBlockConfig,
    results: &RowResults,
    working_rows: usize,
) -> MergedTable {
    let mut new_headers = config.context_columns.clone();
    new_headers.extend(output_columns(config));

    let context_positions: Vec<Option<usize>> = config
        .context_columns
        .iter()
        .map(|column| headers.iter().position(|h| h == column))
        .collect();

    let mut new_rows = Vec::new();

    for (row_index, row) in rows.iter().take(working_rows).enumerate() {
        let context: Vec<String> = context_positions
            .iter()
            .map(|position| {
                position
                    .and_then(|i| row.get(i))
                    .cloned()
                    .unwrap_or_else(|| EMPTY_CELL.to_string())
            })
            .collect();

        let outputs: Vec<OutputCells<'_>> = config
            .outputs
            .iter()
            .map(|output| {
                let field = results.get(row_index, &output.name);
                OutputCells {
                    output,
                    values: field.map(|f| f.value.to_cells()).unwrap_or_default(),
                    reasoning: reasoning_cell(field.and_then(|f| f.reasoning.as_deref())),
                }
            })
            .collect();

        let expansion = outputs
            .iter()
            .filter(|cells| cells.output.cardinality == Cardinality::Multiple)
            .map(|cells| cells.values.len())
            .max()
            .unwrap_or(1)
            .max(1);

        for position in 0..expansion {
            let mut cells = context.clone();
            for output in &outputs {
                cells.push(output.cell_at(position));
                if output.output.include_reasoning {
                    cells.push(output.reasoning.clone());
                }
            }
            new_rows.push(cells);
        }
    }

    MergedTable {
        new_headers,
        new_rows,
    }
}

fn reasoning_cell(reasoning: Option<&str>) -> String {
    reasoning.unwrap_or(EMPTY_CELL).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{FieldValue, OutputValue, ParsedField, ParsedValues};

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn text(s: &str) -> OutputValue {
        OutputValue::Text(s.to_string())
    }

    fn single(s: &str) -> ParsedField {
        ParsedField {
            value: FieldValue::Single(text(s)),
            reasoning: None,
        }
    }

    fn multiple(values: &[&str]) -> ParsedField {
        ParsedField {
            value: FieldValue::Multiple(values.iter().map(|s| text(s)).collect()),
            reasoning: None,
        }
    }

    fn results(entries: Vec<(usize, &str, ParsedField)>) -> RowResults {
        let mut results = RowResults::new();
        for (row, name, field) in entries {
            let mut values = ParsedValues::new();
            values.insert(name.to_string(), field);
            results.insert(row, values);
        }
        results
    }

    fn dataset() -> (Vec<String>, Vec<Vec<String>>) {
        (
            strings(&["id", "company"]),
            vec![strings(&["1", "Acme"]), strings(&["2", "Globex"])],
        )
    }

    #[test]
    fn test_new_columns_appends_and_joins_lists() {
        let (headers, rows) = dataset();
        let config = EnrichmentBlockConfig::new("mock", "m", OutputFormat::NewColumns)
            .with_context_columns(["company"])
            .with_output(OutputSpec::text("Tags", "p").multiple())
            .with_output(OutputSpec::text("Summary", "p"));
        let results = results(vec![
            (0, "Tags", multiple(&["b2b", "saas"])),
            (0, "Summary", single("Widgets")),
        ]);

        let merged = merge(&headers, &rows, &config, &results, 1);
        assert_eq!(merged.new_headers, strings(&["id", "company", "Tags", "Summary"]));
        assert_eq!(merged.new_rows[0], strings(&["1", "Acme", "b2b; saas", "Widgets"]));
        // Unprocessed rows pass through with empty cells
        assert_eq!(merged.new_rows[1], strings(&["2", "Globex", "", ""]));
    }

    #[test]
    fn test_new_columns_reasoning_follows_output() {
        let (headers, rows) = dataset();
        let config = EnrichmentBlockConfig::new("mock", "m", OutputFormat::NewColumns)
            .with_output(OutputSpec::text("Summary", "p").with_reasoning());
        let mut field = single("Widgets");
        field.reasoning = Some("From the name".into());
        let results = results(vec![(0, "Summary", field)]);

        let merged = merge(&headers, &rows, &config, &results, 2);
        assert_eq!(
            merged.new_headers,
            strings(&["id", "company", "Summary", "Summary_reasoning"])
        );
        assert_eq!(merged.new_rows[0][3], "From the name");
        assert_eq!(merged.new_rows[1][3], "");
    }

    #[test]
    fn test_new_rows_cross_expansion() {
        let (headers, rows) = dataset();
        let config = EnrichmentBlockConfig::new("mock", "m", OutputFormat::NewRows)
            .with_context_columns(["company"])
            .with_output(OutputSpec::text("Product", "p").multiple())
            .with_output(OutputSpec::text("Industry", "p"));
        let results = results(vec![
            (0, "Product", multiple(&["a", "b", "c"])),
            (0, "Industry", single("Retail")),
            (1, "Product", multiple(&["x"])),
            (1, "Industry", single("Energy")),
        ]);

        let merged = merge(&headers, &rows, &config, &results, 2);
        assert_eq!(merged.new_headers, strings(&["company", "Product", "Industry"]));
        assert_eq!(
            merged.new_rows,
            vec![
                strings(&["Acme", "a", "Retail"]),
                strings(&["Acme", "b", "Retail"]),
                strings(&["Acme", "c", "Retail"]),
                strings(&["Globex", "x", "Energy"]),
            ]
        );
    }

    #[test]
    fn test_new_rows_uneven_lists_pad_with_empty_cells() {
        let (headers, rows) = dataset();
        let config = EnrichmentBlockConfig::new("mock", "m", OutputFormat::NewRows)
            .with_context_columns(["company"])
            .with_output(OutputSpec::text("Product", "p").multiple())
            .with_output(OutputSpec::url("Site", "p").multiple());
        let results = results(vec![
            (0, "Product", multiple(&["a", "b", "c"])),
            (0, "Site", multiple(&["s1"])),
        ]);

        let merged = merge(&headers, &rows, &config, &results, 1);
        assert_eq!(
            merged.new_rows,
            vec![
                strings(&["Acme", "a", "s1"]),
                strings(&["Acme", "b", ""]),
                strings(&["Acme", "c", ""]),
            ]
        );
    }

    #[test]
    fn test_new_rows_only_working_rows_and_failed_rows_kept() {
        let headers = strings(&["company"]);
        let rows = vec![strings(&["A"]), strings(&["B"]), strings(&["C"])];
        let config = EnrichmentBlockConfig::new("mock", "m", OutputFormat::NewRows)
            .with_context_columns(["company"])
            .with_output(OutputSpec::text("Tags", "p").multiple());
        let results = results(vec![(0, "Tags", multiple(&["t"]))]);

        let merged = merge(&headers, &rows, &config, &results, 2);
        assert_eq!(
            merged.new_rows,
            vec![strings(&["A", "t"]), strings(&["B", ""])]
        );
    }
}
