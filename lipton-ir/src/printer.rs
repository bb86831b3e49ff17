//! Textual rendering of a [Program]. The printer never mutates the program.
use crate::{
    AccessKind, Callee, LibCall, OpIdx, OpKind, Program, Terminator,
};
use itertools::Itertools;
use lipton_idx::IndexRef;
use std::io;

/// Printer for the IR.
pub struct Printer;

impl Printer {
    /// Formats and writes the program.
    pub fn write_program<F: io::Write>(
        program: &Program,
        f: &mut F,
    ) -> io::Result<()> {
        Self::write_annotated(program, |_| None, f)
    }

    /// Formats and writes the program, appending `annotate(op)` as a trailing
    /// comment after every operation for which it returns something.
    pub fn write_annotated<F, A>(
        program: &Program,
        annotate: A,
        f: &mut F,
    ) -> io::Result<()>
    where
        F: io::Write,
        A: Fn(OpIdx) -> Option<String>,
    {
        for (idx, proc) in program.procs.iter() {
            let main = if proc.name == program.entrypoint {
                "@main "
            } else {
                ""
            };
            writeln!(f, "{main}proc {} {{", proc.name)?;
            for block in proc.blocks.iter().map(|b| &program.blocks[*b]) {
                writeln!(f, "  {}:", block.name)?;
                for op in &block.ops {
                    let text = Self::format_op(program, *op);
                    match annotate(*op) {
                        Some(note) => writeln!(f, "    {text}; // {note}")?,
                        None => writeln!(f, "    {text};")?,
                    }
                }
            }
            writeln!(f, "}}")?;
            if idx.index() + 1 < program.procs.len() {
                writeln!(f)?;
            }
        }
        Ok(())
    }

    /// Format a single operation.
    pub fn format_op(program: &Program, op: OpIdx) -> String {
        let operation = &program.ops[op];
        match &operation.kind {
            OpKind::Memory { access, loc } => {
                let access = match access {
                    AccessKind::Read => "read",
                    AccessKind::Write => "write",
                    AccessKind::ReadWrite => "update",
                    AccessKind::AtomicUpdate => "atomic_update",
                };
                format!("{access} {loc}")
            }
            OpKind::Call(Callee::Procedure(p)) => {
                format!("call {}()", program.procs[*p].name)
            }
            OpKind::Call(Callee::Library(lc)) => {
                Self::format_lib_call(program, lc)
            }
            OpKind::Local => "local".to_string(),
            OpKind::Debug => "debug".to_string(),
            OpKind::Terminator(Terminator::Return) => "return".to_string(),
            OpKind::Terminator(Terminator::Branch) => {
                let block = &program.blocks[operation.block];
                format!(
                    "branch {}",
                    block
                        .succs
                        .iter()
                        .map(|s| program.blocks[*s].name)
                        .join(", ")
                )
            }
        }
    }

    fn format_lib_call(program: &Program, lc: &LibCall) -> String {
        let arg = match lc {
            LibCall::ThreadCreate(p) => program.procs[*p].name.to_string(),
            LibCall::MutexLock(l)
            | LibCall::MutexUnlock(l)
            | LibCall::ReadLock(l)
            | LibCall::WriteLock(l)
            | LibCall::RwUnlock(l)
            | LibCall::MutexInit(l) => l.to_string(),
            LibCall::Unknown(name) => return format!("call {name}()"),
            _ => String::new(),
        };
        let name = lc
            .kind()
            .map(|k| k.canonical_name())
            .unwrap_or_default();
        format!("call {name}({arg})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProgramBuilder;

    #[test]
    fn prints_blocks_and_annotations() {
        let mut b = ProgramBuilder::new();
        let main = b.add_proc("main");
        let worker = b.add_proc("worker");
        let entry = b.add_block(main, "entry");
        let exit = b.add_block(main, "exit");
        let spawn = b.spawn(entry, worker);
        b.lock(entry, "m");
        b.update(entry, "x");
        b.branch(entry, &[exit]);
        b.ret(exit);
        let w = b.add_block(worker, "entry");
        b.ret(w);
        let prog = b.finish().unwrap();

        let mut out = Vec::new();
        Printer::write_annotated(
            &prog,
            |op| (op == spawn).then(|| "Left".to_string()),
            &mut out,
        )
        .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "@main proc main {\n  entry:\n    call pthread_create(worker); // Left\n    call pthread_mutex_lock(m);\n    update x;\n    branch exit;\n  exit:\n    return;\n}\n\nproc worker {\n  entry:\n    return;\n}\n"
        );
    }
}
