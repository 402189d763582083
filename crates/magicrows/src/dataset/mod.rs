//! Reading and writing delimited datasets.
//!
//! The engine only sees headers and rows; this module is the file layer
//! used by the command line.

mod parser;
mod table;
mod writer;

pub use parser::{Parser, ParserConfig, detect_delimiter};
pub use table::{DataTable, SourceMetadata, format_name};
pub use writer::{write_file, write_to};
