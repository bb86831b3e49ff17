/// A copyable handle that wraps a dense, zero-based integer index.
///
/// Implement this with [`impl_index!`](crate::impl_index) rather than by
/// hand.
pub trait IndexRef: Copy + Eq {
    fn index(&self) -> usize;
    fn new(input: usize) -> Self;
}
