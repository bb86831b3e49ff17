use crate::{
    Block, BlockIdx, Id, OpIdx, Operation, ProcIdx, Procedure, Terminator,
};
use lipton_idx::maps::IndexedMap;
use lipton_utils::{Error, LiptonResult};

/// A whole program: the procedures with a body and everything they own.
#[derive(Debug, Clone)]
pub struct Program {
    pub procs: IndexedMap<ProcIdx, Procedure>,
    pub blocks: IndexedMap<BlockIdx, Block>,
    pub ops: IndexedMap<OpIdx, Operation>,
    /// Name of the procedure that runs as thread 0.
    pub entrypoint: Id,
    /// Extra options passed to the passes (`-x pass:opt`).
    pub extra_opts: Vec<String>,
}

impl Default for Program {
    fn default() -> Self {
        Self {
            procs: IndexedMap::new(),
            blocks: IndexedMap::new(),
            ops: IndexedMap::new(),
            entrypoint: Id::new("main"),
            extra_opts: vec![],
        }
    }
}

impl Program {
    /// The entrypoint procedure.
    pub fn main(&self) -> LiptonResult<ProcIdx> {
        self.find_proc(self.entrypoint)
            .ok_or_else(|| Error::missing_main().with_post_msg(Some(format!(
                "expected a procedure named `{}`",
                self.entrypoint
            ))))
    }

    pub fn find_proc<S>(&self, name: S) -> Option<ProcIdx>
    where
        S: Into<Id>,
    {
        let name = name.into();
        self.procs
            .iter()
            .find(|(_, p)| p.name == name)
            .map(|(idx, _)| idx)
    }

    /// Find a block by procedure and block name.
    pub fn find_block<S>(&self, proc: ProcIdx, name: S) -> Option<BlockIdx>
    where
        S: Into<Id>,
    {
        let name = name.into();
        self.procs[proc]
            .blocks
            .iter()
            .copied()
            .find(|b| self.blocks[*b].name == name)
    }

    pub fn block_of(&self, op: OpIdx) -> BlockIdx {
        self.ops[op].block
    }

    pub fn proc_of_op(&self, op: OpIdx) -> ProcIdx {
        self.blocks[self.ops[op].block].proc
    }

    /// First operation of the entry block of `proc`.
    pub fn entry_op(&self, proc: ProcIdx) -> OpIdx {
        self.blocks[self.procs[proc].entry].ops[0]
    }

    pub fn op_at(&self, block: BlockIdx, position: u32) -> Option<OpIdx> {
        self.blocks[block].op_at(position)
    }

    /// The terminator kind of `block`.
    pub fn terminator(&self, block: BlockIdx) -> Option<Terminator> {
        self.blocks[block]
            .terminator()
            .and_then(|op| match self.ops[op].kind {
                crate::OpKind::Terminator(t) => Some(t),
                _ => None,
            })
    }

    /// Human readable location of an operation: `proc.block[position]`.
    pub fn describe(&self, op: OpIdx) -> String {
        let o = &self.ops[op];
        let block = &self.blocks[o.block];
        format!(
            "{}.{}[{}]",
            self.procs[block.proc].name, block.name, o.position
        )
    }

    /// All operations of `proc` in block order.
    pub fn proc_ops(
        &self,
        proc: ProcIdx,
    ) -> impl Iterator<Item = OpIdx> + '_ {
        self.procs[proc]
            .blocks
            .iter()
            .flat_map(|b| self.blocks[*b].ops.iter().copied())
    }
}
