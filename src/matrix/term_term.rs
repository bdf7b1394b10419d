use std::{sync::Arc, time::Instant};

use rayon::prelude::*;

use crate::matrix::{
    lexicon::{Lexicon, TermId},
    TermDocMatrix,
};
use crate::utils::math::vector::SparseView;

/// Term x term cooccurrence matrix, M · Mᵗ of a term-document matrix M.
///
/// Cell (i, j) is Σ_d count(i, d) · count(j, d): a term seen 3 times in a
/// document adds 3 to every pair it forms there and 9 to its own diagonal.
///
/// Materialized eagerly. Only the upper triangle (j >= i) is stored, in
/// compressed row form; lookups mirror (i, j) onto (min, max). Memory is one
/// entry per cooccurring pair, which for a large vocabulary can be far more
/// than the nnz of the source matrix.
#[derive(Debug, Clone)]
pub struct TermTermMatrix {
    num_terms: usize,
    rowptr: Vec<u64>,
    colidx: Vec<TermId>,
    val: Vec<f64>,
    lexicon: Arc<Lexicon>,
}

/// Dense scatter row plus the list of touched slots
struct Accumulator {
    sums: Vec<f64>,
    touched: Vec<TermId>,
}

impl Accumulator {
    fn new(num_terms: usize) -> Self {
        Accumulator {
            sums: vec![0.0; num_terms],
            touched: Vec::new(),
        }
    }

    /// Upper-triangle row `i` of M · Mᵗ
    fn row(&mut self, td: &TermDocMatrix, i: TermId) -> (Vec<TermId>, Vec<f64>) {
        for (doc, weight) in td.row(i).iter() {
            let column = td.column(doc as usize);
            let from = column.indices().partition_point(|&j| j < i);
            for (&j, &count) in column.indices()[from..].iter().zip(&column.values()[from..]) {
                let slot = &mut self.sums[j as usize];
                if *slot == 0.0 {
                    self.touched.push(j);
                }
                *slot += weight * count;
            }
        }
        self.touched.sort_unstable();
        let mut cols = Vec::with_capacity(self.touched.len());
        let mut vals = Vec::with_capacity(self.touched.len());
        for &j in &self.touched {
            cols.push(j);
            vals.push(std::mem::take(&mut self.sums[j as usize]));
        }
        self.touched.clear();
        (cols, vals)
    }
}

impl TermTermMatrix {
    /// Multiply `td` with its transpose. Rows are computed in parallel on the
    /// current rayon pool.
    pub fn from_term_doc_matrix(td: &TermDocMatrix) -> Self {
        let start = Instant::now();
        let num_terms = td.num_terms();
        let rows: Vec<(Vec<TermId>, Vec<f64>)> = (0..num_terms as TermId)
            .into_par_iter()
            .map_init(|| Accumulator::new(num_terms), |acc, i| acc.row(td, i))
            .collect();

        let nnz: usize = rows.iter().map(|(cols, _)| cols.len()).sum();
        let mut rowptr = Vec::with_capacity(num_terms + 1);
        let mut colidx = Vec::with_capacity(nnz);
        let mut val = Vec::with_capacity(nnz);
        rowptr.push(0u64);
        for (cols, vals) in rows {
            colidx.extend(cols);
            val.extend(vals);
            rowptr.push(colidx.len() as u64);
        }

        tracing::info!(
            terms = num_terms,
            nnz,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "term-term matrix built"
        );
        TermTermMatrix {
            num_terms,
            rowptr,
            colidx,
            val,
            lexicon: Arc::clone(td.lexicon()),
        }
    }

    #[inline]
    pub fn num_terms(&self) -> usize {
        self.num_terms
    }

    /// Stored entries of the upper triangle, diagonal included
    #[inline]
    pub fn nnz(&self) -> usize {
        self.val.len()
    }

    pub fn lexicon(&self) -> &Arc<Lexicon> {
        &self.lexicon
    }

    /// Entries (i, j) with j >= i of row `i`. Empty when `i` is out of range.
    pub fn upper_row(&self, i: TermId) -> SparseView<'_, f64> {
        let i = i as usize;
        if i >= self.num_terms {
            return SparseView::new(self.num_terms, &[], &[]);
        }
        let (start, end) = (self.rowptr[i] as usize, self.rowptr[i + 1] as usize);
        SparseView::new(self.num_terms, &self.colidx[start..end], &self.val[start..end])
    }

    /// Weighted cooccurrence of `a` and `b`, symmetric in its arguments
    pub fn get(&self, a: TermId, b: TermId) -> f64 {
        let (i, j) = if a <= b { (a, b) } else { (b, a) };
        self.upper_row(i).get(j)
    }

    /// Σ_d count(t, d)², not the raw total count of `t`
    pub fn diagonal(&self, t: TermId) -> f64 {
        self.get(t, t)
    }

    /// `get` by term strings; `None` if either term is not a row
    pub fn get_by_terms(&self, a: &str, b: &str) -> Option<f64> {
        let id = |term: &str| {
            self.lexicon
                .lookup(term)
                .filter(|&id| (id as usize) < self.num_terms)
        };
        Some(self.get(id(a)?, id(b)?))
    }

    /// Stored upper-triangle entries as (i, j, value), row-major
    pub fn iter(&self) -> impl Iterator<Item = (TermId, TermId, f64)> + '_ {
        self.rowptr.windows(2).enumerate().flat_map(move |(i, bounds)| {
            let (start, end) = (bounds[0] as usize, bounds[1] as usize);
            self.colidx[start..end]
                .iter()
                .zip(&self.val[start..end])
                .map(move |(&j, &v)| (i as TermId, j, v))
        })
    }
}
