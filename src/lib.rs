/// This crate builds sparse term-document occurrence matrices from large
/// document streams and derives term-term cooccurrence matrices from them.
pub mod matrix;
pub mod utils;

/// Lexicon
/// Thread-safe, append-only bijection between term strings and dense ids.
///
/// Ids start at 0 and follow insertion order. Once handed out an id never
/// changes, so the lexicon can be shared between a matrix and any consumer
/// that needs term <-> id translation.
///
/// # Thread Safety
/// Safe to extend from many threads at once.
/// Implemented using DashMap and an RwLock-guarded reverse table.
///
/// # Persistence
/// Saved newline-delimited, the line number being the id.
pub use matrix::lexicon::{Lexicon, TermId};

/// Term-Document Matrix Builder
/// Turns a single-pass document sequence into a `TermDocMatrix`, extracting
/// terms on a pool of worker threads.
///
/// Columns are committed in input order whatever order the workers finish
/// in, and new terms are registered at commit time, so the result does not
/// depend on the number of workers.
///
/// Documents without an id are skipped. Documents whose extraction fails
/// are skipped as well and listed in the `BuildReport`.
pub use matrix::builder::{BuildConfig, BuildReport, ExtractionFailure, TermDocBuilder};

/// Term-Document Matrix
/// Immutable term x document count matrix in compressed column form.
///
/// Supports per-term totals, pairwise cooccurrence counts, per-document
/// term counts and derivation of the term-term matrix.
///
/// # Persistence
/// `save` / `load` write and read the artifact group
/// `<dir>/<name>.{lex,colptr,rowidx,val,doc}`.
pub use matrix::TermDocMatrix;

/// Term-Term Matrix
/// Symmetric matrix M · Mᵗ of weighted cooccurrence counts, derived from a
/// `TermDocMatrix`. Materialized eagerly, upper triangle only.
pub use matrix::term_term::TermTermMatrix;

/// Term Extraction Strategy
/// The narrow interface through which the builder sees documents: an id and
/// a list of terms per document.
///
/// Provided strategies:
/// - `FnExtractor`: two closures
/// - `WhitespaceExtractor`: `(id, text)` pairs split on whitespace
/// - `LinkLineExtractor`: `<prefix>_<id>\t<entity> ...` link records
/// - `Fallible`: wraps another strategy for `io::Result` documents, turning
///   read errors into per-document failures
pub use matrix::extract::{Fallible, FnExtractor, LinkLineExtractor, TermExtractor, WhitespaceExtractor};

/// Line-per-document file source
pub use matrix::source::LineDocuments;

/// Term Frequency structure
/// Occurrence counts of the terms of one document, in first-seen order.
pub use matrix::term::TermFrequency;

/// Error types
pub use matrix::error::{
    BuildError, CorpusLoadError, DimensionMismatchError, ExtractionError, LexiconFullError,
    LexiconLoadError, PersistenceError,
};

/// Sparse vectors returned by row and column queries
pub use utils::math::vector::{SparseVec, SparseView};
