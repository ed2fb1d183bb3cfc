//! CSV access for ingestion jobs: header validation, row counting and
//! bounded chunk reads.
//!
//! All functions here block on file I/O; async callers run them through
//! `tokio::task::spawn_blocking`.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::{ByteRecord, Reader, ReaderBuilder};

use catalog_products::ProductDraft;

/// Columns every upload must carry (case-insensitive, any order).
pub const REQUIRED_COLUMNS: [&str; 3] = ["name", "sku", "description"];

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CsvError {
    #[error("file is empty or has no header row")]
    Empty,
    #[error("header is not valid UTF-8")]
    NotUtf8,
    #[error("missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),
    #[error("source not found: {0}")]
    SourceMissing(String),
    #[error("i/o error: {0}")]
    Io(String),
    #[error("malformed csv: {0}")]
    Parse(String),
}

impl From<csv::Error> for CsvError {
    fn from(err: csv::Error) -> Self {
        if err.is_io_error() {
            CsvError::Io(err.to_string())
        } else {
            CsvError::Parse(err.to_string())
        }
    }
}

/// Positions of the required columns within a header row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMap {
    name: usize,
    sku: usize,
    description: usize,
}

impl ColumnMap {
    pub fn from_header(header: &ByteRecord) -> Result<Self, CsvError> {
        if header.is_empty() {
            return Err(CsvError::Empty);
        }

        let mut titles = Vec::with_capacity(header.len());
        for (i, field) in header.iter().enumerate() {
            let field = if i == 0 {
                field.strip_prefix(UTF8_BOM).unwrap_or(field)
            } else {
                field
            };
            let title = std::str::from_utf8(field).map_err(|_| CsvError::NotUtf8)?;
            titles.push(title.trim().to_lowercase());
        }

        let position = |col: &str| titles.iter().position(|t| t == col);
        let missing: Vec<String> = REQUIRED_COLUMNS
            .iter()
            .filter(|c| position(c).is_none())
            .map(|c| c.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(CsvError::MissingColumns(missing));
        }

        match (position("name"), position("sku"), position("description")) {
            (Some(name), Some(sku), Some(description)) => Ok(Self {
                name,
                sku,
                description,
            }),
            _ => Err(CsvError::MissingColumns(
                REQUIRED_COLUMNS.iter().map(|c| c.to_string()).collect(),
            )),
        }
    }

    /// Build a draft from one record; `None` when name or SKU is blank.
    pub fn draft(&self, record: &ByteRecord) -> Option<ProductDraft> {
        let field = |i: usize| {
            record
                .get(i)
                .map(String::from_utf8_lossy)
                .unwrap_or_default()
        };
        ProductDraft::from_fields(&field(self.name), &field(self.sku), &field(self.description))
    }
}

fn builder() -> ReaderBuilder {
    let mut b = ReaderBuilder::new();
    b.has_headers(true).flexible(true);
    b
}

fn read_columns<R: Read>(reader: &mut Reader<R>) -> Result<ColumnMap, CsvError> {
    let header = reader.byte_headers()?.clone();
    ColumnMap::from_header(&header)
}

fn open(path: &Path) -> Result<File, CsvError> {
    File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => CsvError::SourceMissing(path.display().to_string()),
        _ => CsvError::Io(e.to_string()),
    })
}

/// Check that an upload has a UTF-8 header carrying every required column.
pub fn validate_header(bytes: &[u8]) -> Result<ColumnMap, CsvError> {
    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(CsvError::Empty);
    }
    let mut reader = builder().from_reader(bytes);
    read_columns(&mut reader)
}

/// Number of data rows (header excluded).
pub fn count_data_rows(path: &Path) -> Result<u64, CsvError> {
    let mut reader = builder().from_reader(open(path)?);
    read_columns(&mut reader)?;

    let mut record = ByteRecord::new();
    let mut count = 0u64;
    while reader.read_byte_record(&mut record)? {
        count += 1;
    }
    Ok(count)
}

/// One chunk of input: how many records were consumed and which survived
/// the required-field filter.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Chunk {
    pub consumed: u64,
    pub rows: Vec<ProductDraft>,
}

/// Sequential reader yielding bounded chunks of a CSV file.
pub struct CsvChunkReader {
    reader: Reader<File>,
    columns: ColumnMap,
    record: ByteRecord,
}

impl CsvChunkReader {
    pub fn open(path: &Path) -> Result<Self, CsvError> {
        let mut reader = builder().from_reader(open(path)?);
        let columns = read_columns(&mut reader)?;
        Ok(Self {
            reader,
            columns,
            record: ByteRecord::new(),
        })
    }

    /// Read up to `size` records. `None` once the input is exhausted.
    pub fn next_chunk(&mut self, size: usize) -> Result<Option<Chunk>, CsvError> {
        let mut chunk = Chunk::default();
        while (chunk.consumed as usize) < size {
            if !self.reader.read_byte_record(&mut self.record)? {
                break;
            }
            chunk.consumed += 1;
            if let Some(draft) = self.columns.draft(&self.record) {
                chunk.rows.push(draft);
            }
        }

        if chunk.consumed == 0 {
            Ok(None)
        } else {
            Ok(Some(chunk))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn fixture(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn header_is_case_insensitive_and_order_independent() {
        assert!(validate_header(b"SKU,Description,NAME\n").is_ok());
        assert!(validate_header(b"\xEF\xBB\xBFname,sku,description,price\n").is_ok());
    }

    #[test]
    fn missing_columns_are_reported() {
        let err = validate_header(b"name,price\n").unwrap_err();
        assert_eq!(
            err,
            CsvError::MissingColumns(vec!["sku".to_string(), "description".to_string()])
        );
    }

    #[test]
    fn empty_and_binary_headers_are_rejected() {
        assert_eq!(validate_header(b"").unwrap_err(), CsvError::Empty);
        assert_eq!(validate_header(b"  \n").unwrap_err(), CsvError::Empty);
        assert_eq!(
            validate_header(b"name,\xFF\xFEsku,description\n").unwrap_err(),
            CsvError::NotUtf8
        );
    }

    #[test]
    fn counts_rows_excluding_header() {
        let file = fixture("name,sku,description\nA,sku-1,d1\nB,sku-2,\"multi\nline\"\n,sku-3,d3\n");
        assert_eq!(count_data_rows(file.path()).unwrap(), 3);

        let header_only = fixture("name,sku,description\n");
        assert_eq!(count_data_rows(header_only.path()).unwrap(), 0);
    }

    #[test]
    fn missing_file_is_distinguished() {
        let err = count_data_rows(Path::new("/definitely/not/here.csv")).unwrap_err();
        assert!(matches!(err, CsvError::SourceMissing(_)));
    }

    #[test]
    fn chunks_drop_rows_without_name_or_sku() {
        let file = fixture(
            "sku,name,description\nsku-1,A,d1\n,B,d2\nsku-3,,d3\nsku-4,D\nsku-5,E,d5\n",
        );
        let mut reader = CsvChunkReader::open(file.path()).unwrap();

        let first = reader.next_chunk(3).unwrap().unwrap();
        assert_eq!(first.consumed, 3);
        assert_eq!(first.rows.len(), 1);
        assert_eq!(first.rows[0].sku, "sku-1");

        let second = reader.next_chunk(3).unwrap().unwrap();
        assert_eq!(second.consumed, 2);
        assert_eq!(second.rows.len(), 2);
        assert_eq!(second.rows[0].description, "");

        assert!(reader.next_chunk(3).unwrap().is_none());
    }
}
