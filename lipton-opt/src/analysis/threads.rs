use super::{CallGraph, Reachability};
use lipton_idx::{impl_index, maps::IndexedMap};
use lipton_ir::{LibCall, OpIdx, ProcIdx, Program};
use lipton_utils::{Id, LiptonResult};
use std::collections::{HashMap, HashSet};

/// Index of a [Thread]. Thread 0 is always the entrypoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadIdx(u32);
impl_index!(ThreadIdx);

impl std::fmt::Display for ThreadIdx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A procedure that runs as one or more concurrent instances.
#[derive(Debug, Clone)]
pub struct Thread {
    pub idx: ThreadIdx,
    pub proc: ProcIdx,
    pub name: Id,
    /// More than one instance of the thread may run at the same time.
    pub multi_instance: bool,
    /// Thread creations that start this thread.
    pub spawn_sites: Vec<OpIdx>,
}

impl Thread {
    /// Name of the variable tracking the commit phase of this thread in
    /// dynamically instrumented programs.
    pub fn phase_var(&self) -> String {
        format!("__lipton_phase_{}", self.name)
    }
}

/// All threads of a program.
pub struct Threads {
    threads: IndexedMap<ThreadIdx, Thread>,
    by_proc: HashMap<ProcIdx, ThreadIdx>,
}

impl Threads {
    /// Discover the threads of `program`: the entrypoint plus every
    /// procedure started by a thread creation.
    ///
    /// A thread may have several instances when one of its spawn sites
    /// reaches another (or itself), or when a spawn site lives in a
    /// procedure that can run more than once.
    pub fn discover(
        program: &Program,
        call_graph: &CallGraph,
        post_order: &[ProcIdx],
        reach: &Reachability<'_>,
    ) -> LiptonResult<Self> {
        let main = program.main()?;
        // Thread creations in procedures nothing executes are ignored.
        let live = call_graph.reachable_from(main);
        let mut sites: Vec<(ProcIdx, Vec<OpIdx>)> = vec![(main, vec![])];
        for (idx, op) in program.ops.iter() {
            if !live.contains(&program.proc_of_op(idx)) {
                continue;
            }
            if let Some(LibCall::ThreadCreate(target)) = op.lib_call() {
                match sites.iter_mut().find(|(p, _)| p == target) {
                    Some((_, s)) => s.push(idx),
                    None => sites.push((*target, vec![idx])),
                }
            }
        }

        let mut repeated: HashSet<ProcIdx> = HashSet::new();
        let mut multi: HashSet<ProcIdx> = HashSet::new();
        // Callers before callees.
        for &proc in post_order.iter().rev() {
            if proc == main {
                continue;
            }
            let (spawns, calls): (Vec<OpIdx>, Vec<OpIdx>) =
                call_graph
                    .call_sites(proc)
                    .into_iter()
                    .filter(|op| live.contains(&program.proc_of_op(*op)))
                    .partition(|op| {
                        matches!(
                            program.ops[*op].lib_call(),
                            Some(LibCall::ThreadCreate(_))
                        )
                    });
            let in_repeated =
                |op: &OpIdx| repeated.contains(&program.proc_of_op(*op));
            let is_multi = spawns
                .iter()
                .any(|s| spawns.iter().any(|t| reach.reach(*s, *t)))
                || spawns.iter().any(in_repeated);
            if is_multi {
                multi.insert(proc);
            }
            if is_multi
                || calls.len() > 1
                || calls.iter().any(|c| reach.reach(*c, *c))
                || calls.iter().any(in_repeated)
            {
                repeated.insert(proc);
            }
        }

        let mut threads = IndexedMap::new();
        let mut by_proc = HashMap::new();
        for (proc, spawn_sites) in sites {
            let idx = threads.peek_next_idx();
            let thread = Thread {
                idx,
                proc,
                name: program.procs[proc].name,
                multi_instance: multi.contains(&proc),
                spawn_sites,
            };
            log::debug!(
                "thread {idx}: {} ({} spawn sites{})",
                thread.name,
                thread.spawn_sites.len(),
                if thread.multi_instance {
                    ", multi-instance"
                } else {
                    ""
                }
            );
            threads.push(thread);
            by_proc.insert(proc, idx);
        }
        Ok(Self { threads, by_proc })
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Thread> {
        self.threads.values()
    }

    pub fn get(&self, idx: ThreadIdx) -> &Thread {
        &self.threads[idx]
    }

    /// Thread whose body is `proc`.
    pub fn of_proc(&self, proc: ProcIdx) -> Option<ThreadIdx> {
        self.by_proc.get(&proc).copied()
    }

    /// Does the program run a single instance of a single thread?
    pub fn is_sequential(&self) -> bool {
        self.threads.len() == 1 && self.threads.values().all(|t| !t.multi_instance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lipton_idx::IndexRef;
    use lipton_ir::ProgramBuilder;

    fn discover(prog: &Program) -> Threads {
        let cg = CallGraph::from(prog);
        let order = cg.post_order(prog).unwrap();
        let reach = Reachability::new(prog, &order).unwrap();
        Threads::discover(prog, &cg, &order, &reach).unwrap()
    }

    #[test]
    fn spawn_in_loop_is_multi_instance() {
        let mut b = ProgramBuilder::new();
        let main = b.add_proc("main");
        let once = b.add_proc("once");
        let many = b.add_proc("many");
        let entry = b.add_block(main, "entry");
        let body = b.add_block(main, "loop");
        let exit = b.add_block(main, "exit");
        b.spawn(entry, once);
        b.branch(entry, &[body]);
        b.spawn(body, many);
        b.branch(body, &[body, exit]);
        b.ret(exit);
        for p in [once, many] {
            let blk = b.add_block(p, "entry");
            b.write(blk, "x");
            b.ret(blk);
        }
        let prog = b.finish().unwrap();
        let threads = discover(&prog);

        assert_eq!(threads.len(), 3);
        let t0 = threads.get(ThreadIdx::new(0));
        assert_eq!(t0.proc, main);
        assert!(!t0.multi_instance);
        let once_t = threads.get(threads.of_proc(once).unwrap());
        assert!(!once_t.multi_instance);
        assert_eq!(once_t.phase_var(), "__lipton_phase_once");
        assert!(threads.get(threads.of_proc(many).unwrap()).multi_instance);
        assert!(!threads.is_sequential());
    }

    #[test]
    fn sequential_spawns_and_repeated_callers() {
        let mut b = ProgramBuilder::new();
        let main = b.add_proc("main");
        let starter = b.add_proc("starter");
        let twice = b.add_proc("twice");
        let worker = b.add_proc("worker");
        let entry = b.add_block(main, "entry");
        b.spawn(entry, twice);
        b.spawn(entry, twice);
        b.call(entry, starter);
        b.call(entry, starter);
        b.ret(entry);
        let sb = b.add_block(starter, "entry");
        b.spawn(sb, worker);
        b.ret(sb);
        for p in [twice, worker] {
            let blk = b.add_block(p, "entry");
            b.ret(blk);
        }
        let prog = b.finish().unwrap();
        let threads = discover(&prog);

        assert!(threads.get(threads.of_proc(twice).unwrap()).multi_instance);
        assert!(threads.get(threads.of_proc(worker).unwrap()).multi_instance);
    }

    #[test]
    fn exclusive_spawns_are_single_instance() {
        let mut b = ProgramBuilder::new();
        let main = b.add_proc("main");
        let worker = b.add_proc("worker");
        let entry = b.add_block(main, "entry");
        let left = b.add_block(main, "left");
        let right = b.add_block(main, "right");
        b.branch(entry, &[left, right]);
        b.spawn(left, worker);
        b.ret(left);
        b.spawn(right, worker);
        b.ret(right);
        let wb = b.add_block(worker, "entry");
        b.ret(wb);
        let prog = b.finish().unwrap();
        let threads = discover(&prog);
        let w = threads.get(threads.of_proc(worker).unwrap());
        assert_eq!(w.spawn_sites.len(), 2);
        assert!(!w.multi_instance);
    }
}
