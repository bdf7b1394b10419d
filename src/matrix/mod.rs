pub mod builder;
pub mod error;
pub mod extract;
pub mod lexicon;
pub mod serde;
pub mod source;
pub mod term;
pub mod term_term;

use std::{fmt, sync::Arc};

use crate::matrix::error::DimensionMismatchError;
use crate::matrix::lexicon::{Lexicon, TermId};
use crate::matrix::term_term::TermTermMatrix;
use crate::utils::math::vector::{SparseVec, SparseView};

/// Immutable term x document count matrix in compressed column (CCS) form.
///
/// Column `d` holds the terms of the d-th accepted document:
/// `rowidx[colptr[d]..colptr[d + 1]]` are its term ids (strictly ascending)
/// and `val[..]` the matching occurrence counts. Zero counts are never stored.
///
/// Cooccurrence queries are row oriented, so a compressed row copy of the
/// same entries is built once at construction. That costs O(nnz) time and
/// doubles index memory, and buys O(row nnz) row access.
#[derive(Debug, Clone)]
pub struct TermDocMatrix {
    num_terms: usize,
    num_docs: usize,
    colptr: Vec<u64>,
    rowidx: Vec<TermId>,
    val: Vec<f64>,
    doc_ids: Option<Vec<Box<str>>>,
    lexicon: Arc<Lexicon>,
    rows: RowIndex,
}

/// CSR transpose of the CCS arrays; column ids inside a row are ascending
#[derive(Debug, Clone)]
struct RowIndex {
    rowptr: Vec<u64>,
    colidx: Vec<u32>,
    val: Vec<f64>,
}

impl RowIndex {
    fn transpose(num_terms: usize, colptr: &[u64], rowidx: &[TermId], val: &[f64]) -> Self {
        let mut rowptr = vec![0u64; num_terms + 1];
        for &row in rowidx {
            rowptr[row as usize + 1] += 1;
        }
        for t in 0..num_terms {
            rowptr[t + 1] += rowptr[t];
        }

        let mut next: Vec<u64> = rowptr[..num_terms].to_vec();
        let mut colidx = vec![0u32; rowidx.len()];
        let mut row_val = vec![0f64; rowidx.len()];
        for (col, bounds) in colptr.windows(2).enumerate() {
            for k in bounds[0] as usize..bounds[1] as usize {
                let row = rowidx[k] as usize;
                let pos = next[row] as usize;
                colidx[pos] = col as u32;
                row_val[pos] = val[k];
                next[row] += 1;
            }
        }
        RowIndex {
            rowptr,
            colidx,
            val: row_val,
        }
    }
}

impl TermDocMatrix {
    /// Wrap raw CCS arrays.
    ///
    /// The matrix has one row per term of `lexicon` and `colptr.len() - 1`
    /// columns. Every structural invariant is checked; nothing is truncated
    /// or padded to make a broken layout fit.
    pub fn from_raw_parts(
        lexicon: Arc<Lexicon>,
        colptr: Vec<u64>,
        rowidx: Vec<TermId>,
        val: Vec<f64>,
        doc_ids: Option<Vec<Box<str>>>,
    ) -> Result<Self, DimensionMismatchError> {
        let num_terms = lexicon.len();
        validate_layout(num_terms, &colptr, &rowidx, &val, doc_ids.as_deref())?;
        let num_docs = colptr.len() - 1;
        let rows = RowIndex::transpose(num_terms, &colptr, &rowidx, &val);
        Ok(TermDocMatrix {
            num_terms,
            num_docs,
            colptr,
            rowidx,
            val,
            doc_ids,
            lexicon,
            rows,
        })
    }

    #[inline]
    pub fn num_terms(&self) -> usize {
        self.num_terms
    }

    #[inline]
    pub fn num_documents(&self) -> usize {
        self.num_docs
    }

    /// Number of stored (nonzero) cells
    #[inline]
    pub fn nnz(&self) -> usize {
        self.val.len()
    }

    pub fn lexicon(&self) -> &Arc<Lexicon> {
        &self.lexicon
    }

    /// Id of `term` if it is one of this matrix's rows
    pub fn term_id(&self, term: &str) -> Option<TermId> {
        self.lexicon
            .lookup(term)
            .filter(|&id| (id as usize) < self.num_terms)
    }

    pub fn term(&self, id: TermId) -> Option<Arc<str>> {
        if (id as usize) < self.num_terms {
            self.lexicon.id_to_term(id)
        } else {
            None
        }
    }

    /// Id the extractor gave the document stored in column `col`
    pub fn document_id(&self, col: usize) -> Option<&str> {
        self.doc_ids.as_ref()?.get(col).map(|id| &**id)
    }

    pub fn document_ids(&self) -> Option<&[Box<str>]> {
        self.doc_ids.as_deref()
    }

    #[inline]
    pub fn colptr(&self) -> &[u64] {
        &self.colptr
    }

    #[inline]
    pub fn rowidx(&self) -> &[TermId] {
        &self.rowidx
    }

    #[inline]
    pub fn values(&self) -> &[f64] {
        &self.val
    }
}

/// queries
impl TermDocMatrix {
    /// Counts of `term` over all documents. Out of range terms give an empty row.
    pub fn row(&self, term: TermId) -> SparseView<'_, f64> {
        let t = term as usize;
        if t >= self.num_terms {
            return SparseView::new(self.num_docs, &[], &[]);
        }
        let (start, end) = (self.rows.rowptr[t] as usize, self.rows.rowptr[t + 1] as usize);
        SparseView::new(self.num_docs, &self.rows.colidx[start..end], &self.rows.val[start..end])
    }

    /// Term counts of the document in column `col`
    pub fn column(&self, col: usize) -> SparseView<'_, f64> {
        if col >= self.num_docs {
            return SparseView::new(self.num_terms, &[], &[]);
        }
        let (start, end) = (self.colptr[col] as usize, self.colptr[col + 1] as usize);
        SparseView::new(self.num_terms, &self.rowidx[start..end], &self.val[start..end])
    }

    /// Count of `term` in document `col`
    pub fn get(&self, term: TermId, col: usize) -> f64 {
        self.column(col).get(term)
    }

    /// Total occurrences of `term` across the corpus
    pub fn term_total_count(&self, term: TermId) -> f64 {
        self.row(term).sum()
    }

    /// Σ_d count(a, d) · count(b, d)
    pub fn cooccurrence_count(&self, term_a: TermId, term_b: TermId) -> f64 {
        self.row(term_a).dot(&self.row(term_b))
    }

    /// Per-document counts of `term` as a sparse vector over columns
    pub fn docwise_term_count(&self, term: TermId) -> SparseVec<f64> {
        self.row(term).to_sparse_vec()
    }

    /// Derive the term x term matrix M · Mᵗ
    pub fn cooccurrence_matrix(&self) -> TermTermMatrix {
        TermTermMatrix::from_term_doc_matrix(self)
    }
}

impl fmt::Display for TermDocMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TermDocMatrix({} terms x {} documents, nnz {})",
            self.num_terms,
            self.num_docs,
            self.nnz()
        )
    }
}

fn validate_layout(
    num_terms: usize,
    colptr: &[u64],
    rowidx: &[TermId],
    val: &[f64],
    doc_ids: Option<&[Box<str>]>,
) -> Result<(), DimensionMismatchError> {
    if rowidx.len() != val.len() {
        return Err(DimensionMismatchError::Length {
            what: "val",
            expected: rowidx.len(),
            actual: val.len(),
        });
    }
    let Some(num_docs) = colptr.len().checked_sub(1) else {
        return Err(DimensionMismatchError::Length {
            what: "colptr",
            expected: doc_ids.map_or(1, |ids| ids.len() + 1),
            actual: 0,
        });
    };
    if let Some(ids) = doc_ids {
        if ids.len() != num_docs {
            return Err(DimensionMismatchError::Length {
                what: "document ids",
                expected: num_docs,
                actual: ids.len(),
            });
        }
    }
    if num_docs > u32::MAX as usize {
        return Err(DimensionMismatchError::Length {
            what: "columns",
            expected: u32::MAX as usize,
            actual: num_docs,
        });
    }
    if colptr[0] != 0 {
        return Err(DimensionMismatchError::ColumnPointer {
            index: 0,
            value: colptr[0],
        });
    }
    let nnz = rowidx.len() as u64;
    for (col, bounds) in colptr.windows(2).enumerate() {
        let (start, end) = (bounds[0], bounds[1]);
        if end < start || end > nnz {
            return Err(DimensionMismatchError::ColumnPointer {
                index: col + 1,
                value: end,
            });
        }
        let rows = &rowidx[start as usize..end as usize];
        if rows.windows(2).any(|w| w[0] >= w[1]) {
            return Err(DimensionMismatchError::UnsortedColumn { column: col });
        }
    }
    if colptr[num_docs] != nnz {
        return Err(DimensionMismatchError::Length {
            what: "rowidx",
            expected: colptr[num_docs] as usize,
            actual: rowidx.len(),
        });
    }
    if let Some((position, &row)) = rowidx
        .iter()
        .enumerate()
        .find(|&(_, &row)| row as usize >= num_terms)
    {
        return Err(DimensionMismatchError::RowOutOfRange {
            position,
            row,
            num_terms,
        });
    }
    if let Some((position, &value)) = val
        .iter()
        .enumerate()
        .find(|&(_, &value)| !(value.is_finite() && value > 0.0))
    {
        return Err(DimensionMismatchError::InvalidValue { position, value });
    }
    Ok(())
}
