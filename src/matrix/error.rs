use std::{io, path::PathBuf};

use thiserror::Error;

use crate::matrix::lexicon::TermId;

/// Failure to pull terms out of a single document.
/// Recorded by the builder; the rest of the corpus keeps going.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("malformed document: {0}")]
    Malformed(String),
    #[error("failed to read document: {0}")]
    Io(#[from] io::Error),
    #[error("extractor panicked: {0}")]
    Panicked(String),
    #[error(transparent)]
    LexiconFull(#[from] LexiconFullError),
}

impl ExtractionError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        ExtractionError::Malformed(reason.into())
    }
}

/// Every term id is taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("lexicon is full ({capacity} terms)")]
pub struct LexiconFullError {
    pub capacity: usize,
}

/// Failure to restore a lexicon from its newline-delimited save
#[derive(Debug, Error)]
pub enum LexiconLoadError {
    #[error("failed to read lexicon {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("lexicon line {line} repeats term '{term}'")]
    DuplicateTerm { term: String, line: usize },
    #[error(transparent)]
    Full(#[from] LexiconFullError),
}

/// Broken CCS layout.
/// Raised on load and on construction, never repaired by truncating or padding.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DimensionMismatchError {
    #[error("{what}: expected length {expected}, found {actual}")]
    Length {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("colptr[{index}] = {value} is out of order or past the end of rowidx")]
    ColumnPointer { index: usize, value: u64 },
    #[error("row indices of column {column} are not strictly increasing")]
    UnsortedColumn { column: usize },
    #[error("rowidx[{position}] = {row} is outside the lexicon ({num_terms} terms)")]
    RowOutOfRange {
        position: usize,
        row: TermId,
        num_terms: usize,
    },
    #[error("val[{position}] = {value} is not a positive count")]
    InvalidValue { position: usize, value: f64 },
}

/// Failure to restore a term-document matrix from its saved artifacts
#[derive(Debug, Error)]
pub enum CorpusLoadError {
    #[error("missing matrix artifact {}", path.display())]
    MissingArtifact { path: PathBuf },
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to decode {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_cbor::Error,
    },
    #[error(transparent)]
    Lexicon(#[from] LexiconLoadError),
    #[error("inconsistent matrix artifacts: {0}")]
    Dimension(#[from] DimensionMismatchError),
}

/// Failure to write a lexicon or a matrix to disk
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode {}: {source}", path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_cbor::Error,
    },
    #[error("entry {id} ({term:?}) contains a line break and cannot be saved line-delimited")]
    UnencodableTerm { id: usize, term: String },
}

/// Failure of a whole build. Per-document problems never end up here.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("failed to start worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
    #[error("assembled matrix is inconsistent: {0}")]
    Dimension(#[from] DimensionMismatchError),
}
