use super::{AliasOracle, AliasSetTracker, LockSets, ThreadIdx, Threads};
use lipton_ir::{AccessKind, OpIdx, OpKind, Program};
use std::collections::HashMap;

fn is_atomic_update(program: &Program, op: OpIdx) -> bool {
    matches!(
        program.ops[op].kind,
        OpKind::Memory {
            access: AccessKind::AtomicUpdate,
            ..
        }
    )
}

/// For every memory operation, the operations of concurrently running
/// threads it may race with.
#[derive(Debug, Default)]
pub struct ConflictIndex {
    conflicts: HashMap<OpIdx, Vec<OpIdx>>,
    owners: HashMap<OpIdx, ThreadIdx>,
}

impl ConflictIndex {
    /// `owners` maps every reachable operation to its thread and
    /// `alias_sets` holds the alias sets of every thread.
    pub fn new(
        program: &Program,
        threads: &Threads,
        owners: &HashMap<OpIdx, ThreadIdx>,
        alias_sets: &HashMap<ThreadIdx, AliasSetTracker>,
        locks: &LockSets,
        oracle: &dyn AliasOracle,
    ) -> Self {
        let mut conflicts = HashMap::new();
        for (&op, &thread) in owners {
            if !program.ops[op].is_memory() {
                continue;
            }
            let mut found: Vec<OpIdx> = vec![];
            for other in threads.iter() {
                if other.idx == thread && !other.multi_instance {
                    continue;
                }
                let Some(tracker) = alias_sets.get(&other.idx) else {
                    continue;
                };
                for set in tracker.aliasing(program, oracle, op) {
                    found.extend(set.ops().iter().copied().filter(|j| {
                        !(is_atomic_update(program, op)
                            && is_atomic_update(program, *j))
                            && !locks.protected(op, *j)
                    }));
                }
            }
            found.sort();
            found.dedup();
            if !found.is_empty() {
                log::debug!(
                    "{} conflicts with {} operations",
                    program.describe(op),
                    found.len()
                );
                conflicts.insert(op, found);
            }
        }
        Self {
            conflicts,
            owners: owners.clone(),
        }
    }

    /// Operations that may race with `op`.
    pub fn conflicts_with(&self, op: OpIdx) -> &[OpIdx] {
        self.conflicts.get(&op).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_conflicts(&self, op: OpIdx) -> bool {
        self.conflicts.contains_key(&op)
    }

    /// Thread that executes `op`, if the operation is reachable at all.
    pub fn owner(&self, op: OpIdx) -> Option<ThreadIdx> {
        self.owners.get(&op).copied()
    }
}

#[cfg(test)]
mod tests {
    use crate::analysis::{LocationAliasing, MoverKind};
    use crate::pipeline::Analysis;
    use lipton_ir::ProgramBuilder;

    #[test]
    fn atomic_updates_only_race_with_plain_accesses() {
        let mut b = ProgramBuilder::new();
        let main = b.add_proc("main");
        let worker = b.add_proc("worker");
        let entry = b.add_block(main, "entry");
        b.spawn(entry, worker);
        let main_c = b.atomic_update(entry, "c");
        let main_d = b.write(entry, "d");
        b.ret(entry);
        let wb = b.add_block(worker, "entry");
        let worker_c = b.atomic_update(wb, "c");
        let worker_d = b.atomic_update(wb, "d");
        b.ret(wb);
        let prog = b.finish().unwrap();

        let cx = Analysis::build(&prog, &LocationAliasing).unwrap();
        for op in [main_c, worker_c] {
            assert!(!cx.conflicts.has_conflicts(op));
            assert_eq!(cx.movability.movable(op), MoverKind::Both);
        }
        assert_eq!(cx.conflicts.conflicts_with(main_d), &[worker_d]);
        assert_eq!(cx.conflicts.conflicts_with(worker_d), &[main_d]);
        assert_eq!(cx.movability.movable(main_d), MoverKind::None);
        assert_eq!(cx.movability.movable(worker_d), MoverKind::None);
    }
}
