use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, IrError>;

#[derive(Debug, Error)]
pub enum IrError {
    /// A collection or index file could not be opened.
    #[error("cannot open {path}: {source}")]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A collection line violated the record structure. Recorded by the
    /// parser and reported, never raised out of a parse.
    #[error("malformed collection record at line {line}: {reason}")]
    MalformedRecord { line: usize, reason: String },

    /// A persisted index line could not be trusted. Aborts the whole load.
    #[error("malformed index record at line {line}: {reason}")]
    MalformedIndexRecord { line: usize, reason: String },

    #[error("degenerate idf for term {term:?}: df={df}, n={n}")]
    DegenerateIdf { term: String, df: u32, n: u32 },

    #[error("term {term:?} has no postings")]
    EmptyPostings { term: String },

    /// An in-memory term that the index file format cannot represent.
    #[error("cannot persist term {term:?}: {reason}")]
    InvalidTerm { term: String, reason: String },

    #[error("invalid collection markers: {0}")]
    InvalidMarkers(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl IrError {
    pub fn source_unavailable(path: impl Into<PathBuf>, source: io::Error) -> Self {
        IrError::SourceUnavailable { path: path.into(), source }
    }

    pub fn malformed_index(line: usize, reason: impl Into<String>) -> Self {
        IrError::MalformedIndexRecord { line, reason: reason.into() }
    }
}
