//! Delimited output for enriched tables.

use std::path::Path;

use crate::error::{EnrichError, Result};

/// Write headers and rows to `path` with the given delimiter.
pub fn write_file(
    path: impl AsRef<Path>,
    headers: &[String],
    rows: &[Vec<String>],
    delimiter: u8,
) -> Result<()> {
    let path = path.as_ref();
    let file = std::fs::File::create(path).map_err(|e| EnrichError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    write_to(file, headers, rows, delimiter)
}

/// Write headers and rows to any writer.
pub fn write_to<W: std::io::Write>(
    writer: W,
    headers: &[String],
    rows: &[Vec<String>],
    delimiter: u8,
) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_writer(writer);

    writer.write_record(headers)?;
    for row in rows {
        writer.write_record(row)?;
    }
    writer.flush().map_err(|e| EnrichError::Csv(e.into()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Parser;

    #[test]
    fn test_written_table_reads_back() {
        let headers = vec!["company".to_string(), "Tags".to_string()];
        let rows = vec![vec!["Acme, Inc".to_string(), "b2b; saas".to_string()]];

        let mut buffer = Vec::new();
        write_to(&mut buffer, &headers, &rows, b',').unwrap();
        assert_eq!(
            String::from_utf8(buffer.clone()).unwrap(),
            "company,Tags\n\"Acme, Inc\",b2b; saas\n"
        );

        let table = Parser::new().parse_bytes(&buffer).unwrap();
        assert_eq!(table.rows, rows);
    }
}
