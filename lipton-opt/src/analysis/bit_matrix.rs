//! Dense, growable bit vectors and matrices backing the reachability
//! relation.
use bitvec::vec::BitVec;

/// A growable vector of bits. The logical length only ever grows.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BitVector {
    bits: BitVec,
}

impl BitVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_len(len: usize) -> Self {
        let mut v = Self::new();
        v.ensure(len);
        v
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Grow the vector to `len` bits. New bits are unset and the backing
    /// storage at least doubles whenever it has to grow.
    ///
    /// # Panics
    /// If `len` is smaller than the current length.
    pub fn ensure(&mut self, len: usize) {
        let cur = self.bits.len();
        assert!(
            len >= cur,
            "cannot shrink a bit vector from {cur} to {len} bits"
        );
        let cap = self.bits.capacity();
        if len > cap {
            self.bits.reserve(len.max(cap * 2) - cur);
        }
        self.bits.resize(len, false);
    }

    pub fn set(&mut self, idx: usize) {
        assert!(idx < self.len(), "bit {idx} out of range {}", self.len());
        self.bits.set(idx, true);
    }

    pub fn get(&self, idx: usize) -> bool {
        assert!(idx < self.len(), "bit {idx} out of range {}", self.len());
        self.bits[idx]
    }

    /// `self |= other`.
    pub fn union_with(&mut self, other: &BitVector) {
        assert!(other.len() <= self.len(), "union with a longer bit vector");
        self.bits[..other.len()] |= other.bits.as_bitslice();
    }

    /// Indices of the set bits in increasing order.
    pub fn ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.bits.iter_ones()
    }
}

/// A boolean matrix made of [BitVector] rows. Rows and columns are addressed
/// by dense indices and are never deleted.
#[derive(Clone, Debug, Default)]
pub struct BitMatrix {
    rows: Vec<BitVector>,
    cols: usize,
}

impl BitMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> usize {
        self.rows.len()
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Grow the matrix to `rows` x `cols`.
    ///
    /// # Panics
    /// If either dimension is smaller than the current one.
    pub fn ensure(&mut self, rows: usize, cols: usize) {
        assert!(
            rows >= self.rows.len() && cols >= self.cols,
            "cannot shrink a bit matrix from {}x{} to {rows}x{cols}",
            self.rows.len(),
            self.cols
        );
        if cols > self.cols {
            for row in &mut self.rows {
                row.ensure(cols);
            }
            self.cols = cols;
        }
        if rows > self.rows.len() {
            self.rows.resize_with(rows, || BitVector::with_len(cols));
        }
    }

    pub fn set(&mut self, row: usize, col: usize) {
        self.rows[row].set(col)
    }

    pub fn get(&self, row: usize, col: usize) -> bool {
        self.rows[row].get(col)
    }

    pub fn row(&self, row: usize) -> &BitVector {
        &self.rows[row]
    }

    /// Union row `src` into row `dst`.
    pub fn copy_row_or(&mut self, dst: usize, src: usize) {
        if dst == src {
            return;
        }
        let (d, s) = if dst < src {
            let (lo, hi) = self.rows.split_at_mut(src);
            (&mut lo[dst], &hi[0])
        } else {
            let (lo, hi) = self.rows.split_at_mut(dst);
            (&mut hi[0], &lo[src])
        };
        d.union_with(s);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_across_word_boundaries() {
        let mut v = BitVector::new();
        v.ensure(3);
        v.set(2);
        v.ensure(130);
        v.set(129);
        assert_eq!(v.len(), 130);
        assert!(v.get(2));
        assert!(v.get(129));
        assert!(!v.get(64));
        assert_eq!(v.ones().collect::<Vec<_>>(), vec![2, 129]);
    }

    #[test]
    #[should_panic(expected = "cannot shrink")]
    fn shrinking_panics() {
        let mut m = BitMatrix::new();
        m.ensure(4, 4);
        m.ensure(2, 4);
    }

    #[test]
    fn row_union() {
        let mut m = BitMatrix::new();
        m.ensure(3, 3);
        m.set(1, 2);
        m.set(2, 0);
        m.copy_row_or(0, 1);
        m.copy_row_or(0, 2);
        assert!(m.get(0, 0) && m.get(0, 2));
        assert!(!m.get(0, 1));
        m.ensure(100, 100);
        m.set(99, 98);
        m.copy_row_or(0, 99);
        assert!(m.get(0, 98));
        assert!(m.get(0, 2));
    }
}
