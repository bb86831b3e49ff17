//! Program builder. Provides convenience methods to assemble a [Program]
//! procedure by procedure and block by block.
use crate::{
    AccessKind, Block, BlockIdx, Callee, Id, LibCall, Location, OpIdx,
    OpKind, Operation, ProcIdx, Procedure, Program, Terminator,
};
use lipton_utils::{Error, LiptonResult};

/// Program builder.
///
/// Procedures are declared with [ProgramBuilder::add_proc] before their
/// bodies are filled in so that calls and thread creations can refer to
/// procedures defined later. The first block added to a procedure is its
/// entry block. [ProgramBuilder::finish] validates the shape of every block.
#[derive(Default)]
pub struct ProgramBuilder {
    program: Program,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `name` instead of `main` as the program entrypoint.
    pub fn entrypoint<S: AsRef<str>>(mut self, name: S) -> Self {
        self.program.entrypoint = Id::new(name);
        self
    }

    pub fn add_proc<S: AsRef<str>>(&mut self, name: S) -> ProcIdx {
        self.program.procs.push(Procedure {
            name: Id::new(name),
            blocks: vec![],
            // Patched by the first call to `add_block`.
            entry: BlockIdx::from(u32::MAX),
        })
    }

    pub fn add_block<S: AsRef<str>>(
        &mut self,
        proc: ProcIdx,
        name: S,
    ) -> BlockIdx {
        let idx = self.program.blocks.push(Block {
            name: Id::new(name),
            proc,
            ops: vec![],
            succs: vec![],
        });
        let p = &mut self.program.procs[proc];
        if p.blocks.is_empty() {
            p.entry = idx;
        }
        p.blocks.push(idx);
        idx
    }

    /// Append an operation of the given kind to `block`.
    pub fn push(&mut self, block: BlockIdx, kind: OpKind) -> OpIdx {
        let position = self.program.blocks[block].ops.len() as u32;
        let op = self.program.ops.push(Operation {
            block,
            position,
            kind,
        });
        self.program.blocks[block].ops.push(op);
        op
    }

    fn memory<S: AsRef<str>>(
        &mut self,
        block: BlockIdx,
        access: AccessKind,
        loc: S,
    ) -> OpIdx {
        let loc = Location::named(loc);
        self.push(block, OpKind::Memory { access, loc })
    }

    pub fn read<S: AsRef<str>>(&mut self, block: BlockIdx, loc: S) -> OpIdx {
        self.memory(block, AccessKind::Read, loc)
    }

    pub fn write<S: AsRef<str>>(&mut self, block: BlockIdx, loc: S) -> OpIdx {
        self.memory(block, AccessKind::Write, loc)
    }

    /// Non-atomic read-modify-write such as `x += 1`.
    pub fn update<S: AsRef<str>>(
        &mut self,
        block: BlockIdx,
        loc: S,
    ) -> OpIdx {
        self.memory(block, AccessKind::ReadWrite, loc)
    }

    pub fn atomic_update<S: AsRef<str>>(
        &mut self,
        block: BlockIdx,
        loc: S,
    ) -> OpIdx {
        self.memory(block, AccessKind::AtomicUpdate, loc)
    }

    /// Memory access whose location is not known statically.
    pub fn unknown_access(
        &mut self,
        block: BlockIdx,
        access: AccessKind,
    ) -> OpIdx {
        self.push(
            block,
            OpKind::Memory {
                access,
                loc: Location::Unknown,
            },
        )
    }

    pub fn local(&mut self, block: BlockIdx) -> OpIdx {
        self.push(block, OpKind::Local)
    }

    pub fn debug(&mut self, block: BlockIdx) -> OpIdx {
        self.push(block, OpKind::Debug)
    }

    pub fn call(&mut self, block: BlockIdx, callee: ProcIdx) -> OpIdx {
        self.push(block, OpKind::Call(Callee::Procedure(callee)))
    }

    pub fn lib(&mut self, block: BlockIdx, call: LibCall) -> OpIdx {
        self.push(block, OpKind::Call(Callee::Library(call)))
    }

    pub fn lock<S: AsRef<str>>(&mut self, block: BlockIdx, lock: S) -> OpIdx {
        self.lib(block, LibCall::MutexLock(Location::named(lock)))
    }

    pub fn unlock<S: AsRef<str>>(
        &mut self,
        block: BlockIdx,
        lock: S,
    ) -> OpIdx {
        self.lib(block, LibCall::MutexUnlock(Location::named(lock)))
    }

    pub fn spawn(&mut self, block: BlockIdx, target: ProcIdx) -> OpIdx {
        self.lib(block, LibCall::ThreadCreate(target))
    }

    pub fn atomic_begin(&mut self, block: BlockIdx) -> OpIdx {
        self.lib(block, LibCall::AtomicBegin)
    }

    pub fn atomic_end(&mut self, block: BlockIdx) -> OpIdx {
        self.lib(block, LibCall::AtomicEnd)
    }

    pub fn yield_now(&mut self, block: BlockIdx) -> OpIdx {
        self.lib(block, LibCall::Yield)
    }

    /// Terminate `block` with a branch to `succs`.
    pub fn branch(&mut self, block: BlockIdx, succs: &[BlockIdx]) -> OpIdx {
        self.program.blocks[block].succs = succs.to_vec();
        self.push(block, OpKind::Terminator(Terminator::Branch))
    }

    /// Terminate `block` with a return.
    pub fn ret(&mut self, block: BlockIdx) -> OpIdx {
        self.push(block, OpKind::Terminator(Terminator::Return))
    }

    /// Validate and return the program.
    pub fn finish(self) -> LiptonResult<Program> {
        validate(&self.program)?;
        Ok(self.program)
    }
}

/// Check the structural invariants of the program model: every procedure has
/// a body, every block ends in exactly one terminator, only branches have
/// successors and successors stay inside the owning procedure.
pub fn validate(program: &Program) -> LiptonResult<()> {
    for (pidx, proc) in program.procs.iter() {
        if proc.blocks.is_empty() {
            return Err(Error::malformed_program(format!(
                "procedure `{}` has no blocks",
                proc.name
            )));
        }
        for &bidx in &proc.blocks {
            let block = &program.blocks[bidx];
            let at = || format!("{}.{}", proc.name, block.name);
            let Some((last, body)) = block.ops.split_last() else {
                return Err(Error::malformed_program(format!(
                    "block `{}` is empty",
                    at()
                )));
            };
            if let Some(op) =
                body.iter().find(|op| program.ops[**op].is_terminator())
            {
                return Err(Error::malformed_program(format!(
                    "terminator in the middle of block `{}` at position {}",
                    at(),
                    program.ops[*op].position
                )));
            }
            match program.ops[*last].kind {
                OpKind::Terminator(Terminator::Branch) => {
                    if block.succs.is_empty() {
                        return Err(Error::malformed_program(format!(
                            "block `{}` branches without successors",
                            at()
                        )));
                    }
                }
                OpKind::Terminator(Terminator::Return) => {
                    if !block.succs.is_empty() {
                        return Err(Error::malformed_program(format!(
                            "returning block `{}` has successors",
                            at()
                        )));
                    }
                }
                _ => {
                    return Err(Error::malformed_program(format!(
                        "block `{}` does not end in a terminator",
                        at()
                    )));
                }
            }
            if let Some(s) =
                block.succs.iter().find(|s| program.blocks[**s].proc != pidx)
            {
                return Err(Error::malformed_program(format!(
                    "block `{}` branches to `{}` in another procedure",
                    at(),
                    program.blocks[*s].name
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_block_is_entry() {
        let mut b = ProgramBuilder::new();
        let main = b.add_proc("main");
        let entry = b.add_block(main, "entry");
        let exit = b.add_block(main, "exit");
        b.write(entry, "x");
        b.branch(entry, &[exit]);
        b.ret(exit);
        let prog = b.finish().unwrap();
        assert_eq!(prog.procs[main].entry, entry);
        assert_eq!(prog.main().unwrap(), main);
        assert_eq!(prog.blocks[entry].ops.len(), 2);
        assert_eq!(prog.describe(prog.blocks[exit].ops[0]), "main.exit[0]");
    }

    #[test]
    fn unterminated_block_is_rejected() {
        let mut b = ProgramBuilder::new();
        let main = b.add_proc("main");
        let entry = b.add_block(main, "entry");
        b.write(entry, "x");
        let err = b.finish().unwrap_err();
        assert!(matches!(
            err.kind(),
            lipton_utils::ErrorKind::MalformedProgram(_)
        ));
    }

    #[test]
    fn cross_procedure_branch_is_rejected() {
        let mut b = ProgramBuilder::new();
        let main = b.add_proc("main");
        let other = b.add_proc("other");
        let m = b.add_block(main, "entry");
        let o = b.add_block(other, "entry");
        b.branch(m, &[o]);
        b.ret(o);
        assert!(b.finish().is_err());
    }
}
