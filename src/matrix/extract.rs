use std::io;

use crate::matrix::error::ExtractionError;

/// Term Extraction Strategy Trait
/// Turns one opaque document into the terms it contains.
///
/// Implementations are shared by all builder workers, so both methods take
/// `&self` and must not depend on call order.
pub trait TermExtractor<D>: Send + Sync {
    /// Terms of `doc` in document order. Duplicates are meaningful and
    /// each one counts.
    fn extract_terms(&self, doc: &D) -> Result<Vec<String>, ExtractionError>;

    /// Caller-facing id of `doc`. `None` skips the document entirely:
    /// it gets no column.
    fn document_id(&self, doc: &D) -> Option<String>;
}

/// Strategy assembled from two closures
///
/// # Examples
/// ```
/// use cooc_matrix::matrix::{error::ExtractionError, extract::{FnExtractor, TermExtractor}};
/// let ex = FnExtractor::new(
///     |doc: &String| Ok::<_, ExtractionError>(doc.split(',').map(str::to_string).collect()),
///     |doc: &String| (!doc.is_empty()).then(|| doc.len().to_string()),
/// );
/// assert_eq!(ex.extract_terms(&"a,b".to_string()).unwrap(), vec!["a", "b"]);
/// ```
#[derive(Debug, Clone)]
pub struct FnExtractor<T, I> {
    terms: T,
    id: I,
}

impl<T, I> FnExtractor<T, I> {
    pub fn new(terms: T, id: I) -> Self {
        FnExtractor { terms, id }
    }
}

impl<D, T, I> TermExtractor<D> for FnExtractor<T, I>
where
    T: Fn(&D) -> Result<Vec<String>, ExtractionError> + Send + Sync,
    I: Fn(&D) -> Option<String> + Send + Sync,
{
    #[inline]
    fn extract_terms(&self, doc: &D) -> Result<Vec<String>, ExtractionError> {
        (self.terms)(doc)
    }

    #[inline]
    fn document_id(&self, doc: &D) -> Option<String> {
        (self.id)(doc)
    }
}

/// Splits `(id, text)` documents on whitespace
#[derive(Debug, Clone, Copy, Default)]
pub struct WhitespaceExtractor;

impl<K, S> TermExtractor<(K, S)> for WhitespaceExtractor
where
    K: ToString,
    S: AsRef<str>,
{
    fn extract_terms(&self, doc: &(K, S)) -> Result<Vec<String>, ExtractionError> {
        Ok(doc.1.as_ref().split_whitespace().map(str::to_string).collect())
    }

    fn document_id(&self, doc: &(K, S)) -> Option<String> {
        Some(doc.0.to_string())
    }
}

/// Entity-link records, one per line:
/// `<prefix>_<id>\t<entity> <entity> ...`
///
/// The id is the text after the first `_` of the first field. Trailing empty
/// tab fields are ignored, and a line that then does not have exactly two
/// fields carries no id and is skipped; so is `page_7\t` with no links.
///
/// Entities are separated by single spaces. Empty entities (from doubled,
/// leading or trailing spaces) are dropped rather than counted as a term.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkLineExtractor;

impl LinkLineExtractor {
    fn fields(line: &str) -> Option<(&str, &str)> {
        let mut parts = line.trim_end_matches('\t').split('\t');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(key), Some(links), None) => Some((key, links)),
            _ => None,
        }
    }
}

impl<S> TermExtractor<S> for LinkLineExtractor
where
    S: AsRef<str>,
{
    fn extract_terms(&self, doc: &S) -> Result<Vec<String>, ExtractionError> {
        let (_, links) = Self::fields(doc.as_ref())
            .ok_or_else(|| ExtractionError::malformed("expected `<key>\\t<links>`"))?;
        Ok(links
            .split(' ')
            .filter(|entity| !entity.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn document_id(&self, doc: &S) -> Option<String> {
        let (key, _) = Self::fields(doc.as_ref())?;
        key.split('_').nth(1).map(str::to_string)
    }
}

/// Lifts an extractor over documents that may have failed to load, such as
/// the lines of `LineDocuments`.
///
/// An unreadable document is not skipped: it is recorded as an
/// `ExtractionError::Io` failure with an empty id, and the build goes on.
#[derive(Debug, Clone, Copy, Default)]
pub struct Fallible<E>(pub E);

impl<D, E> TermExtractor<io::Result<D>> for Fallible<E>
where
    E: TermExtractor<D>,
{
    fn extract_terms(&self, doc: &io::Result<D>) -> Result<Vec<String>, ExtractionError> {
        match doc {
            Ok(doc) => self.0.extract_terms(doc),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string()).into()),
        }
    }

    fn document_id(&self, doc: &io::Result<D>) -> Option<String> {
        match doc {
            Ok(doc) => self.0.document_id(doc),
            Err(_) => Some(String::new()),
        }
    }
}
