//! Error types and the related `Result<T>`

use camino::Utf8PathBuf;
use thiserror::Error;

pub type DzipResult<T> = Result<T, DzipError>;

#[derive(Debug, Error)]
pub enum DzipError {
    /// An error from underlying I/O, including a source path that doesn't exist.
    #[error("I/O Error: {0}")]
    Io(#[from] std::io::Error),

    /// The bytes aren't a ZIP archive, or its records are corrupt.
    #[error("Invalid Zip archive: {0}")]
    InvalidArchive(&'static str),

    /// Decoding a UTF-8 member name failed
    #[error("Invalid UTF-8")]
    Encoding(#[from] std::str::Utf8Error),

    /// The ZIP archive uses an unsupported feature
    #[error("Unsupported Zip archive: {0}")]
    UnsupportedArchive(String),

    /// The ZIP archive is prepended with some unknown bytes.
    #[error("Archive prepended with {0} unknown bytes")]
    PrependedWithUnknownBytes(usize),

    /// One of the fixed members (`data.csv`, `meta.json`) is missing.
    #[error("No member in the archive named {0}")]
    NoSuchMember(Utf8PathBuf),

    /// A cast from a 64-bit int to a usize failed, probably on a 32-bit system.
    #[error("Zip archive too large for address space")]
    InsufficientAddressSpace,

    /// `meta.json` is malformed JSON, or doesn't have exactly the four metadata fields.
    #[error("Invalid dzip metadata: {0}")]
    Metadata(#[from] serde_json::Error),

    /// `Metadata::from_config()` was handed something that isn't a mapping.
    #[error("Expected a metadata mapping, got {0}")]
    InvalidConfig(String),

    /// The CSV payload couldn't be decoded or encoded.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A CSV record had more fields than the header.
    #[error("Line {line}: expected {expected} fields, saw {found}")]
    RaggedRow {
        line: u64,
        expected: usize,
        found: usize,
    },

    /// Frames with different columns can't be combined.
    #[error("Column mismatch: expected {expected:?}, got {found:?}")]
    ColumnMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },

    /// Rows need at least one column to be written as CSV.
    #[error("{0} rows but no columns")]
    RowsWithoutColumns(usize),

    /// The SPSS system file is malformed.
    #[error("Invalid SPSS system file: {0}")]
    InvalidSav(String),

    /// The SPSS system file uses a feature we can't decode.
    #[error("Unsupported SPSS system file: {0}")]
    UnsupportedSav(String),
}
