use crate::{BlockIdx, Id, OpIdx, ProcIdx};

/// A straight-line sequence of operations ending in a terminator.
#[derive(Debug, Clone)]
pub struct Block {
    pub name: Id,
    /// Procedure that owns this block.
    pub proc: ProcIdx,
    /// Operations in program order. The last one is the terminator.
    pub ops: Vec<OpIdx>,
    /// Successors of the terminating branch. Empty for returning blocks.
    pub succs: Vec<BlockIdx>,
}

impl Block {
    /// Operation at `position`, if any.
    pub fn op_at(&self, position: u32) -> Option<OpIdx> {
        self.ops.get(position as usize).copied()
    }

    pub fn terminator(&self) -> Option<OpIdx> {
        self.ops.last().copied()
    }
}

/// A procedure with a body.
#[derive(Debug, Clone)]
pub struct Procedure {
    pub name: Id,
    pub blocks: Vec<BlockIdx>,
    pub entry: BlockIdx,
}

impl crate::GetName for Procedure {
    fn name(&self) -> Id {
        self.name
    }
}

impl crate::GetName for Block {
    fn name(&self) -> Id {
        self.name
    }
}
