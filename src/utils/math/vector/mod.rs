pub mod math;
pub mod serde;

use std::fmt::Debug;

use num::Num;

/// SparseVec is an owned sparse vector that stores only its nonzero entries.
/// `ind` holds the positions and `val` the values at those positions.
///
/// Entries are kept in strictly ascending `ind` order, which is what the
/// merge-join in `dot` relies on.
#[derive(Clone, PartialEq)]
pub struct SparseVec<N>
where
    N: Num + Copy,
{
    len: usize,
    ind: Vec<u32>,
    val: Vec<N>,
}

/// Borrowed view over a sorted (index, value) slice pair,
/// e.g. one row or one column of a compressed matrix
#[derive(Clone, Copy)]
pub struct SparseView<'a, N>
where
    N: Num + Copy,
{
    len: usize,
    ind: &'a [u32],
    val: &'a [N],
}

impl<N> SparseVec<N>
where
    N: Num + Copy,
{
    /// All-zero vector of dimension `len`
    pub fn new(len: usize) -> Self {
        SparseVec {
            len,
            ind: Vec::new(),
            val: Vec::new(),
        }
    }

    /// Caller guarantees `ind` is strictly ascending, `< len`, and parallel to `val`
    pub(crate) fn from_sorted_parts(len: usize, ind: Vec<u32>, val: Vec<N>) -> Self {
        debug_assert_eq!(ind.len(), val.len());
        debug_assert!(ind.windows(2).all(|w| w[0] < w[1]));
        debug_assert!(ind.last().map_or(true, |&i| (i as usize) < len));
        SparseVec { len, ind, val }
    }

    /// Build from unordered pairs. Zero values are dropped, repeated indices are summed.
    /// `None` if an index is not below `len`.
    pub fn from_pairs<I>(len: usize, pairs: I) -> Option<Self>
    where
        I: IntoIterator<Item = (u32, N)>,
    {
        let mut pairs: Vec<(u32, N)> = pairs.into_iter().collect();
        if pairs.iter().any(|&(i, _)| i as usize >= len) {
            return None;
        }
        pairs.sort_by_key(|&(i, _)| i);
        pairs.dedup_by(|next, kept| {
            if next.0 == kept.0 {
                kept.1 = kept.1 + next.1;
                true
            } else {
                false
            }
        });
        // summing may cancel entries out
        pairs.retain(|&(_, v)| !v.is_zero());
        let (ind, val) = pairs.into_iter().unzip();
        Some(SparseVec { len, ind, val })
    }

    #[inline]
    pub fn as_view(&self) -> SparseView<'_, N> {
        SparseView {
            len: self.len,
            ind: &self.ind,
            val: &self.val,
        }
    }

    /// Dimension of the vector (not the number of stored entries)
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn nnz(&self) -> usize {
        self.ind.len()
    }

    #[inline]
    pub fn indices(&self) -> &[u32] {
        &self.ind
    }

    #[inline]
    pub fn values(&self) -> &[N] {
        &self.val
    }

    #[inline]
    pub fn get(&self, index: u32) -> N {
        self.as_view().get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, N)> + '_ {
        self.ind.iter().copied().zip(self.val.iter().copied())
    }

    #[inline]
    pub fn sum(&self) -> N {
        self.as_view().sum()
    }

    #[inline]
    pub fn dot(&self, other: &SparseVec<N>) -> N {
        self.as_view().dot(&other.as_view())
    }
}

impl<'a, N> SparseView<'a, N>
where
    N: Num + Copy,
{
    pub(crate) fn new(len: usize, ind: &'a [u32], val: &'a [N]) -> Self {
        debug_assert_eq!(ind.len(), val.len());
        SparseView { len, ind, val }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn nnz(&self) -> usize {
        self.ind.len()
    }

    #[inline]
    pub fn indices(&self) -> &'a [u32] {
        self.ind
    }

    #[inline]
    pub fn values(&self) -> &'a [N] {
        self.val
    }

    /// Value at `index`, zero when not stored
    pub fn get(&self, index: u32) -> N {
        match self.ind.binary_search(&index) {
            Ok(pos) => self.val[pos],
            Err(_) => N::zero(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, N)> + 'a {
        self.ind.iter().copied().zip(self.val.iter().copied())
    }

    pub fn to_sparse_vec(&self) -> SparseVec<N> {
        SparseVec::from_sorted_parts(self.len, self.ind.to_vec(), self.val.to_vec())
    }
}

impl<N> Debug for SparseVec<N>
where
    N: Num + Copy + Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.as_view().fmt(f)
    }
}

impl<N> Debug for SparseView<'_, N>
where
    N: Num + Copy + Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sparse")
            .field("len", &self.len)
            .field("nnz", &self.nnz())
            .field("entries", &self.iter().collect::<Vec<_>>())
            .finish()
    }
}
