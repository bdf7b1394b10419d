use num::Num;

use super::SparseView;

/// When the longer operand has at least this many times the entries of the
/// shorter one, `dot` looks its entries up by binary search instead of walking it.
const SEARCH_RATIO: usize = 8;

impl<N> SparseView<'_, N>
where
    N: Num + Copy,
{
    /// Σ v_i
    #[inline]
    pub fn sum(&self) -> N {
        self.val.iter().fold(N::zero(), |acc, &v| acc + v)
    }

    /// Sparse inner product
    /// d(a, b) = Σ(a_i * b_i)
    ///
    /// Cost is O(min(nnz_a, nnz_b) · log(max)) when the operands are very
    /// unbalanced, O(nnz_a + nnz_b) merge-join otherwise.
    pub fn dot(&self, other: &SparseView<'_, N>) -> N {
        let (short, long) = if self.nnz() <= other.nnz() {
            (self, other)
        } else {
            (other, self)
        };
        if short.nnz() == 0 {
            return N::zero();
        }
        if long.nnz() / short.nnz() >= SEARCH_RATIO {
            search_dot(short.ind, short.val, long.ind, long.val)
        } else {
            merge_dot(short.ind, short.val, long.ind, long.val)
        }
    }
}

#[inline]
fn merge_dot<N>(a_ind: &[u32], a_val: &[N], b_ind: &[u32], b_val: &[N]) -> N
where
    N: Num + Copy,
{
    let mut acc = N::zero();
    let (mut i, mut j) = (0, 0);
    while i < a_ind.len() && j < b_ind.len() {
        match a_ind[i].cmp(&b_ind[j]) {
            std::cmp::Ordering::Equal => {
                acc = acc + a_val[i] * b_val[j];
                i += 1;
                j += 1;
            }
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
        }
    }
    acc
}

/// walk `a`, binary search each index in the unread tail of `b`
#[inline]
fn search_dot<N>(a_ind: &[u32], a_val: &[N], b_ind: &[u32], b_val: &[N]) -> N
where
    N: Num + Copy,
{
    let mut acc = N::zero();
    let mut lo = 0;
    for (k, idx) in a_ind.iter().enumerate() {
        if lo >= b_ind.len() {
            break;
        }
        match b_ind[lo..].binary_search(idx) {
            Ok(p) => {
                acc = acc + a_val[k] * b_val[lo + p];
                lo += p + 1;
            }
            Err(p) => lo += p,
        }
    }
    acc
}
