use lipton_idx::impl_index;

/// Index of a [Procedure](crate::Procedure) in a [Program](crate::Program).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcIdx(u32);
impl_index!(ProcIdx);

/// Index of a [Block](crate::Block) in a [Program](crate::Program).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockIdx(u32);
impl_index!(BlockIdx);

/// Index of an [Operation](crate::Operation) in a [Program](crate::Program).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpIdx(u32);
impl_index!(OpIdx);
