//! Classification of operations as Lipton movers.
use super::{ConflictIndex, Threads};
use lipton_ir::{Callee, LibCall, OpIdx, OpKind, ProcIdx, Program};
use lipton_utils::Id;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// How an operation commutes with the operations of other threads.
///
/// Forms the lattice `Both ⊑ Left, Right ⊑ None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MoverKind {
    /// Commutes in both directions.
    Both,
    /// Commutes to the left of other threads' operations (releases).
    Left,
    /// Commutes to the right of other threads' operations (acquires).
    Right,
    /// May race: commutes with nothing.
    None,
}

impl MoverKind {
    pub fn join(self, other: MoverKind) -> MoverKind {
        match (self, other) {
            (MoverKind::Both, x) | (x, MoverKind::Both) => x,
            (MoverKind::Left, MoverKind::Left) => MoverKind::Left,
            (MoverKind::Right, MoverKind::Right) => MoverKind::Right,
            _ => MoverKind::None,
        }
    }
}

impl std::fmt::Display for MoverKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MoverKind::Both => "both",
            MoverKind::Left => "left",
            MoverKind::Right => "right",
            MoverKind::None => "none",
        };
        write!(f, "{s}")
    }
}

/// Mover kinds of every operation, and of every procedure as a whole.
#[derive(Debug, Default)]
pub struct Movability {
    movers: HashMap<OpIdx, MoverKind>,
    summaries: HashMap<ProcIdx, MoverKind>,
}

impl Movability {
    pub fn new(
        program: &Program,
        post_order: &[ProcIdx],
        threads: &Threads,
        conflicts: &ConflictIndex,
    ) -> Self {
        let sequential = threads.is_sequential();
        let mut reported = HashSet::new();
        let mut movers = HashMap::new();
        let mut summaries = HashMap::new();
        for &proc in post_order {
            let mut summary = MoverKind::Both;
            for op in program.proc_ops(proc) {
                let kind = if sequential {
                    MoverKind::Both
                } else {
                    classify(program, op, conflicts, &mut reported)
                };
                summary = summary.join(kind);
                if let Some(callee) = program.ops[op].callee() {
                    summary = summary.join(
                        summaries.get(&callee).copied().unwrap_or(MoverKind::Both),
                    );
                }
                movers.insert(op, kind);
            }
            summaries.insert(proc, summary);
        }
        Self { movers, summaries }
    }

    pub fn movable(&self, op: OpIdx) -> MoverKind {
        self.movers.get(&op).copied().unwrap_or(MoverKind::Both)
    }

    /// Join of every operation in `proc` and its callees.
    pub fn summary(&self, proc: ProcIdx) -> MoverKind {
        self.summaries
            .get(&proc)
            .copied()
            .unwrap_or(MoverKind::Both)
    }
}

fn classify(
    program: &Program,
    op: OpIdx,
    conflicts: &ConflictIndex,
    reported: &mut HashSet<Id>,
) -> MoverKind {
    match &program.ops[op].kind {
        OpKind::Memory { .. } => {
            if conflicts.has_conflicts(op) {
                MoverKind::None
            } else {
                MoverKind::Both
            }
        }
        OpKind::Call(Callee::Library(lc)) => match lc {
            LibCall::MutexLock(_)
            | LibCall::ReadLock(_)
            | LibCall::WriteLock(_)
            | LibCall::ThreadJoin => MoverKind::Right,
            LibCall::MutexUnlock(_)
            | LibCall::RwUnlock(_)
            | LibCall::ThreadCreate(_) => MoverKind::Left,
            LibCall::Unknown(name) => {
                if reported.insert(*name) {
                    log::info!(
                        "treating unknown library call `{name}` as a both-mover"
                    );
                }
                MoverKind::Both
            }
            // Atomic markers are handled as a region by the phase tracker.
            LibCall::Yield
            | LibCall::MutexInit(_)
            | LibCall::AtomicBegin
            | LibCall::AtomicEnd
            | LibCall::Assert => MoverKind::Both,
        },
        OpKind::Call(Callee::Procedure(_))
        | OpKind::Local
        | OpKind::Debug
        | OpKind::Terminator(_) => MoverKind::Both,
    }
}

#[cfg(test)]
mod tests {
    use super::MoverKind::*;
    use super::*;

    #[test]
    fn lattice_join() {
        assert_eq!(Both.join(Both), Both);
        assert_eq!(Both.join(Left), Left);
        assert_eq!(Right.join(Both), Right);
        assert_eq!(Left.join(Right), MoverKind::None);
        assert_eq!(MoverKind::None.join(Both), MoverKind::None);
        assert_eq!(Right.join(Right), Right);
    }
}
