//! Delimited file parser with delimiter detection.

use std::io::{BufRead, BufReader};
use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::debug;

use super::table::{DataTable, SourceMetadata};
use crate::error::{EnrichError, Result};

/// Delimiters to try when auto-detecting.
const DELIMITERS: &[u8] = &[b'\t', b',', b';', b'|'];

/// Lines inspected when detecting the delimiter.
const SNIFF_LINES: usize = 10;

/// Parser configuration.
#[derive(Debug, Clone)]
pub struct ParserConfig {
    /// Delimiter to use (None = auto-detect).
    pub delimiter: Option<u8>,
    /// Maximum rows to read (None = all).
    pub max_rows: Option<usize>,
    pub quote: u8,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            delimiter: None,
            max_rows: None,
            quote: b'"',
        }
    }
}

impl ParserConfig {
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = Some(delimiter);
        self
    }

    pub fn with_max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = Some(max_rows);
        self
    }
}

/// Reads headed, delimited files into a [`DataTable`].
#[derive(Debug, Clone, Default)]
pub struct Parser {
    config: ParserConfig,
}

impl Parser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ParserConfig) -> Self {
        Self { config }
    }

    /// Parse a file and describe where it came from.
    pub fn parse_file(&self, path: impl AsRef<Path>) -> Result<(DataTable, SourceMetadata)> {
        let path = path.as_ref();
        let contents = std::fs::read(path).map_err(|e| EnrichError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        let hash = format!("sha256:{:x}", Sha256::digest(&contents));
        let table = self.parse_bytes(&contents)?;
        let metadata = SourceMetadata::new(path.to_path_buf(), hash, contents.len() as u64, &table);

        debug!(
            file = %metadata.file,
            format = %metadata.format,
            rows = metadata.row_count,
            columns = metadata.column_count,
            "Parsed dataset"
        );

        Ok((table, metadata))
    }

    /// Parse in-memory contents. The first record is the header row.
    pub fn parse_bytes(&self, bytes: &[u8]) -> Result<DataTable> {
        let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
        let delimiter = match self.config.delimiter {
            Some(d) => d,
            None => detect_delimiter(bytes)?,
        };

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .quote(self.config.quote)
            .flexible(true)
            .from_reader(bytes);

        let headers: Vec<String> = reader.headers()?.iter().map(|s| s.trim().to_string()).collect();
        if headers.iter().all(String::is_empty) {
            return Err(EnrichError::EmptyData("No columns found".to_string()));
        }

        let limit = self.config.max_rows.unwrap_or(usize::MAX);
        let mut rows = Vec::new();
        for result in reader.records().take(limit) {
            let record = result?;
            let mut row: Vec<String> = record.iter().map(str::to_string).collect();
            // Short rows are padded, long rows truncated to the header width
            row.resize(headers.len(), String::new());
            rows.push(row);
        }

        if rows.is_empty() {
            return Err(EnrichError::EmptyData("No data rows found".to_string()));
        }

        Ok(DataTable::new(headers, rows, delimiter))
    }
}

/// Pick the delimiter that splits the first lines most consistently.
pub fn detect_delimiter(bytes: &[u8]) -> Result<u8> {
    let lines: Vec<String> = BufReader::new(bytes)
        .lines()
        .map_while(|l| l.ok())
        .filter(|l| !l.trim().is_empty())
        .take(SNIFF_LINES)
        .collect();

    if lines.is_empty() {
        return Err(EnrichError::EmptyData("No lines to analyze".to_string()));
    }

    let mut best = (b',', 0usize);
    for &delimiter in DELIMITERS {
        let counts: Vec<usize> = lines
            .iter()
            .map(|line| count_unquoted(line, delimiter))
            .collect();
        let first = counts[0];
        if first == 0 {
            continue;
        }

        // Consistent counts across lines dominate; tabs win ties
        let score = if counts.iter().all(|&c| c == first) {
            first * 1000 + usize::from(delimiter == b'\t') * 100
        } else {
            first
        };

        if score > best.1 {
            best = (delimiter, score);
        }
    }

    Ok(best.0)
}

fn count_unquoted(line: &str, delimiter: u8) -> usize {
    let delimiter = delimiter as char;
    let mut in_quotes = false;
    line.chars()
        .filter(|&ch| {
            if ch == '"' {
                in_quotes = !in_quotes;
            }
            ch == delimiter && !in_quotes
        })
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_delimiter() {
        assert_eq!(detect_delimiter(b"a,b,c\n1,2,3\n4,5,6").unwrap(), b',');
        assert_eq!(detect_delimiter(b"a\tb\tc\n1\t2\t3").unwrap(), b'\t');
        assert_eq!(detect_delimiter(b"a;b\n\"x;y\";2\n3;4").unwrap(), b';');
        assert!(detect_delimiter(b"\n\n").is_err());
    }

    #[test]
    fn test_parse_pads_short_rows() {
        let table = Parser::new()
            .parse_bytes(b"id,company,notes\n1,Acme\n2,Globex,big,extra")
            .unwrap();

        assert_eq!(table.headers, vec!["id", "company", "notes"]);
        assert_eq!(table.rows[0], vec!["1", "Acme", ""]);
        assert_eq!(table.rows[1], vec!["2", "Globex", "big"]);
    }

    #[test]
    fn test_parse_strips_bom_and_respects_max_rows() {
        let parser = Parser::with_config(ParserConfig::default().with_max_rows(1));
        let table = parser.parse_bytes(b"\xEF\xBB\xBFname\nA\nB").unwrap();
        assert_eq!(table.headers, vec!["name"]);
        assert_eq!(table.row_count(), 1);
    }

    #[test]
    fn test_header_only_is_empty_data() {
        assert!(matches!(
            Parser::new().parse_bytes(b"a,b\n"),
            Err(EnrichError::EmptyData(_))
        ));
    }

    #[test]
    fn test_parse_file_hashes_contents() {
        use std::io::Write;

        let mut file = tempfile::Builder::new().suffix(".tsv").tempfile().unwrap();
        file.write_all(b"id\ttext\n1\tgreat\n2\tbad\n").unwrap();

        let (table, metadata) = Parser::new().parse_file(file.path()).unwrap();
        assert_eq!(table.delimiter, b'\t');
        assert_eq!(metadata.format, "tsv");
        assert_eq!(metadata.row_count, 2);
        assert!(metadata.hash.starts_with("sha256:"));
        assert_eq!(metadata.hash.len(), "sha256:".len() + 64);
    }
}
