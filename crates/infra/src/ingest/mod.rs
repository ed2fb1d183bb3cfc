//! Input readers for ingestion jobs.

pub mod csv;

pub use self::csv::{validate_header, ColumnMap, CsvChunkReader, CsvError, REQUIRED_COLUMNS};
