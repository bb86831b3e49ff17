//! Must-held locks at every operation.
//!
//! A forward intersection dataflow over each procedure's CFG. Procedures are
//! processed callers first: the locks held on entry to a procedure are the
//! locks held at all of its call sites, and thread bodies start with no lock
//! held. After a call returns, the locks the callee may release are dropped.
use lipton_ir::{
    BlockIdx, Callee, LibCall, Location, OpIdx, OpKind, Operation, ProcIdx,
    Program,
};
use std::collections::{BTreeSet, HashMap, VecDeque};

/// A lock held in exclusive (mutex, write lock) or shared (read lock) mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HeldLock {
    pub lock: Location,
    pub exclusive: bool,
}

pub type LockSet = BTreeSet<HeldLock>;

/// Locks a procedure may release, including through its callees.
#[derive(Debug, Clone, Default)]
struct Release {
    all: bool,
    locks: BTreeSet<Location>,
}

impl Release {
    fn add(&mut self, lock: Location) {
        match lock {
            Location::Unknown => self.all = true,
            named => {
                self.locks.insert(named);
            }
        }
    }

    fn merge(&mut self, other: &Release) {
        self.all |= other.all;
        self.locks.extend(other.locks.iter().copied());
    }

    fn apply(&self, state: &mut LockSet) {
        if self.all {
            state.clear();
        } else {
            state.retain(|h| !self.locks.contains(&h.lock));
        }
    }
}

fn released(op: &Operation) -> Option<Location> {
    match op.lib_call()? {
        LibCall::MutexUnlock(l) | LibCall::RwUnlock(l) => Some(*l),
        _ => None,
    }
}

#[derive(Debug, Default)]
pub struct LockSets {
    held: HashMap<OpIdx, LockSet>,
}

impl LockSets {
    pub fn new(program: &Program, post_order: &[ProcIdx]) -> Self {
        let mut release: HashMap<ProcIdx, Release> = HashMap::new();
        for &proc in post_order {
            let mut r = Release::default();
            for op in program.proc_ops(proc) {
                let op = &program.ops[op];
                if let Some(lock) = released(op) {
                    r.add(lock);
                }
                if let Some(callee) = op.callee() {
                    if let Some(cr) = release.get(&callee) {
                        r.merge(cr);
                    }
                }
            }
            release.insert(proc, r);
        }

        let mut sets = LockSets::default();
        let mut entries: HashMap<ProcIdx, LockSet> = HashMap::new();
        for &proc in post_order.iter().rev() {
            let entry = entries.remove(&proc).unwrap_or_default();
            sets.add_proc(program, proc, entry, &release, &mut entries);
        }
        sets
    }

    fn add_proc(
        &mut self,
        program: &Program,
        proc: ProcIdx,
        entry: LockSet,
        release: &HashMap<ProcIdx, Release>,
        entries: &mut HashMap<ProcIdx, LockSet>,
    ) {
        let transfer = |state: &mut LockSet, op: &Operation| match &op.kind {
            OpKind::Call(Callee::Library(lc)) => match lc {
                LibCall::MutexLock(l @ Location::Named(_))
                | LibCall::WriteLock(l @ Location::Named(_)) => {
                    state.insert(HeldLock {
                        lock: *l,
                        exclusive: true,
                    });
                }
                LibCall::ReadLock(l @ Location::Named(_)) => {
                    state.insert(HeldLock {
                        lock: *l,
                        exclusive: false,
                    });
                }
                LibCall::MutexUnlock(l) | LibCall::RwUnlock(l) => {
                    let mut r = Release::default();
                    r.add(*l);
                    r.apply(state);
                }
                _ => {}
            },
            OpKind::Call(Callee::Procedure(p)) => {
                if let Some(r) = release.get(p) {
                    r.apply(state);
                }
            }
            _ => {}
        };

        let entry_block = program.procs[proc].entry;
        let mut ins: HashMap<BlockIdx, LockSet> = HashMap::new();
        ins.insert(entry_block, entry);
        let mut worklist = VecDeque::from([entry_block]);
        while let Some(block) = worklist.pop_front() {
            let mut state = ins[&block].clone();
            for op in &program.blocks[block].ops {
                transfer(&mut state, &program.ops[*op]);
            }
            for succ in &program.blocks[block].succs {
                let changed = match ins.get_mut(succ) {
                    None => {
                        ins.insert(*succ, state.clone());
                        true
                    }
                    Some(old) => {
                        let meet: LockSet =
                            old.intersection(&state).copied().collect();
                        let changed = meet.len() != old.len();
                        *old = meet;
                        changed
                    }
                };
                if changed && !worklist.contains(succ) {
                    worklist.push_back(*succ);
                }
            }
        }

        for (block, mut state) in ins {
            for op in &program.blocks[block].ops {
                let operation = &program.ops[*op];
                match operation.kind {
                    OpKind::Call(Callee::Procedure(callee)) => {
                        let merged = match entries.remove(&callee) {
                            Some(prev) => {
                                prev.intersection(&state).copied().collect()
                            }
                            None => state.clone(),
                        };
                        entries.insert(callee, merged);
                    }
                    OpKind::Call(Callee::Library(LibCall::ThreadCreate(
                        target,
                    ))) => {
                        entries.insert(target, LockSet::new());
                    }
                    _ => {}
                }
                self.held.insert(*op, state.clone());
                transfer(&mut state, operation);
            }
        }
    }

    /// Locks certainly held right before `op` executes.
    pub fn held(&self, op: OpIdx) -> Option<&LockSet> {
        self.held.get(&op)
    }

    /// Are `a` and `b` serialized by a common lock? At least one of them has
    /// to hold it exclusively.
    pub fn protected(&self, a: OpIdx, b: OpIdx) -> bool {
        let (Some(ha), Some(hb)) = (self.held(a), self.held(b)) else {
            return false;
        };
        ha.iter().any(|x| {
            hb.iter()
                .any(|y| x.lock == y.lock && (x.exclusive || y.exclusive))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::CallGraph;
    use lipton_ir::ProgramBuilder;

    #[test]
    fn locks_flow_into_callees_and_branches() {
        let mut b = ProgramBuilder::new();
        let main = b.add_proc("main");
        let inc = b.add_proc("inc");
        let entry = b.add_block(main, "entry");
        let left = b.add_block(main, "left");
        let right = b.add_block(main, "right");
        let join = b.add_block(main, "join");
        b.lock(entry, "m");
        b.branch(entry, &[left, right]);
        let call = b.call(left, inc);
        b.branch(left, &[join]);
        b.unlock(right, "m");
        b.branch(right, &[join]);
        let after = b.write(join, "x");
        b.ret(join);
        let ib = b.add_block(inc, "entry");
        let in_callee = b.update(ib, "x");
        b.ret(ib);
        let prog = b.finish().unwrap();

        let order = CallGraph::from(&prog).post_order(&prog).unwrap();
        let sets = LockSets::new(&prog, &order);
        let m = HeldLock {
            lock: Location::named("m"),
            exclusive: true,
        };
        assert!(sets.held(call).unwrap().contains(&m));
        assert!(sets.held(in_callee).unwrap().contains(&m));
        // Released on one of the incoming paths.
        assert!(sets.held(after).unwrap().is_empty());
        assert!(sets.protected(call, in_callee));
        assert!(!sets.protected(call, after));
    }

    #[test]
    fn read_locks_do_not_exclude_each_other() {
        let mut b = ProgramBuilder::new();
        let main = b.add_proc("main");
        let entry = b.add_block(main, "entry");
        b.lib(entry, LibCall::ReadLock(Location::named("rw")));
        let r1 = b.read(entry, "x");
        let r2 = b.read(entry, "x");
        b.lib(entry, LibCall::RwUnlock(Location::named("rw")));
        b.lib(entry, LibCall::WriteLock(Location::named("rw")));
        let w = b.write(entry, "x");
        b.ret(entry);
        let prog = b.finish().unwrap();
        let order = CallGraph::from(&prog).post_order(&prog).unwrap();
        let sets = LockSets::new(&prog, &order);
        assert!(!sets.protected(r1, r2));
        assert!(sets.protected(r1, w));
    }
}
