//! Whole-program reachability between operations.
//!
//! The oracle is built bottom-up over the call graph. Each procedure's CFG is
//! decomposed into strongly connected components and contracted twice: once
//! at block granularity and once at operation granularity. In the operation
//! graph a loop (non-trivial block SCC) becomes a single self-reaching node,
//! while a loop-free block is cut into segments that end at calls and thread
//! creations, so that the continuation of a call is only reachable if the
//! callee can return.
use super::scc_graph::{SccGraph, SccIdx};
use lipton_ir::{
    BlockIdx, LibCall, OpIdx, OpKind, ProcIdx, Program, Terminator,
};
use lipton_utils::{Error, LiptonResult};
use petgraph::{algo, graph::DiGraph};
use std::collections::{HashMap, HashSet};

pub struct Reachability<'p> {
    program: &'p Program,
    blocks: SccGraph<BlockIdx>,
    ops: SccGraph<OpIdx>,
    returns: HashMap<ProcIdx, bool>,
}

impl<'p> Reachability<'p> {
    /// Build the oracle. `post_order` must list callees before callers; see
    /// [CallGraph::post_order](super::CallGraph::post_order).
    pub fn new(
        program: &'p Program,
        post_order: &[ProcIdx],
    ) -> LiptonResult<Self> {
        let mut reach = Reachability {
            program,
            blocks: SccGraph::new(),
            ops: SccGraph::new(),
            returns: HashMap::new(),
        };
        for &proc in post_order {
            reach.add_proc(proc)?;
        }
        log::debug!(
            "reachability: {} block nodes, {} operation nodes",
            reach.blocks.len(),
            reach.ops.len()
        );
        Ok(reach)
    }

    /// Can control flow from `a` to `b`? An operation only reaches itself
    /// when it sits inside a loop.
    pub fn reach(&self, a: OpIdx, b: OpIdx) -> bool {
        let (Some(na), Some(nb)) = (self.ops.node_of(a), self.ops.node_of(b))
        else {
            return false;
        };
        if na == nb {
            self.ops.is_non_trivial(na)
                || self.program.ops[a].position < self.program.ops[b].position
        } else {
            self.ops.reach_nodes(na, nb)
        }
    }

    /// Block-granularity version of [Reachability::reach].
    pub fn reach_block(&self, a: BlockIdx, b: BlockIdx) -> bool {
        let (Some(na), Some(nb)) =
            (self.blocks.node_of(a), self.blocks.node_of(b))
        else {
            return false;
        };
        if na == nb {
            self.blocks.is_non_trivial(na)
        } else {
            self.blocks.reach_nodes(na, nb)
        }
    }

    /// Can a call to `proc` ever return?
    pub fn may_return(&self, proc: ProcIdx) -> bool {
        self.returns.get(&proc).copied().unwrap_or(false)
    }

    fn entry_node(&self, proc: ProcIdx) -> LiptonResult<(SccIdx, SccIdx)> {
        let program = self.program;
        let entry = program.procs[proc].entry;
        let missing = || {
            Error::ordering(format!(
                "`{}` has not been processed before its callers",
                program.procs[proc].name
            ))
        };
        let block = self.blocks.node_of(entry).ok_or_else(missing)?;
        let op = self
            .ops
            .node_of(program.blocks[entry].ops[0])
            .ok_or_else(missing)?;
        Ok((block, op))
    }

    fn add_proc(&mut self, proc: ProcIdx) -> LiptonResult<()> {
        let program = self.program;
        let p = &program.procs[proc];
        let mut cfg = DiGraph::<BlockIdx, ()>::new();
        let nodes: HashMap<_, _> =
            p.blocks.iter().map(|b| (*b, cfg.add_node(*b))).collect();
        for b in &p.blocks {
            for s in &program.blocks[*b].succs {
                cfg.add_edge(nodes[b], nodes[s], ());
            }
        }

        // Successor components come first.
        for scc in algo::tarjan_scc(&cfg) {
            let members: Vec<BlockIdx> = scc.iter().map(|n| cfg[*n]).collect();
            let non_trivial = members.len() > 1
                || program.blocks[members[0]].succs.contains(&members[0]);
            let block_node = self.add_block_scc(&members, non_trivial)?;
            if non_trivial {
                self.add_loop_ops(&members, block_node)?;
            } else {
                self.add_segments(members[0], block_node)?;
            }
        }

        let entry = program.entry_op(proc);
        let returns = program.proc_ops(proc).any(|op| {
            matches!(
                program.ops[op].kind,
                OpKind::Terminator(Terminator::Return)
            ) && (op == entry || self.reach(entry, op))
        });
        log::debug!("{}: may return: {returns}", p.name);
        self.returns.insert(proc, returns);
        Ok(())
    }

    fn add_block_scc(
        &mut self,
        members: &[BlockIdx],
        non_trivial: bool,
    ) -> LiptonResult<SccIdx> {
        let program = self.program;
        let node = self.blocks.create_node(non_trivial);
        for b in members {
            self.blocks.add_member(node, *b)?;
        }
        let inside: HashSet<_> = members.iter().collect();
        for b in members {
            for s in &program.blocks[*b].succs {
                if !inside.contains(s) {
                    let to = self.block_node(*s)?;
                    self.blocks.link(node, to)?;
                }
            }
            for op in &program.blocks[*b].ops {
                if let Some(callee) = program.ops[*op].call_edge() {
                    let (to, _) = self.entry_node(callee)?;
                    self.blocks.link(node, to)?;
                }
            }
        }
        self.blocks.lock(node);
        Ok(node)
    }

    fn block_node(&self, block: BlockIdx) -> LiptonResult<SccIdx> {
        self.blocks.node_of(block).ok_or_else(|| {
            Error::ordering("successor block processed after its predecessor")
        })
    }

    fn first_segment(&self, block: BlockIdx) -> LiptonResult<SccIdx> {
        self.ops.node_of(self.program.blocks[block].ops[0]).ok_or_else(|| {
            Error::ordering("successor block processed after its predecessor")
        })
    }

    /// A whole loop becomes a single operation node.
    fn add_loop_ops(
        &mut self,
        members: &[BlockIdx],
        block_node: SccIdx,
    ) -> LiptonResult<()> {
        let program = self.program;
        let node = self.ops.create_node(true);
        self.ops.set_parent(node, block_node);
        let inside: HashSet<_> = members.iter().collect();
        for b in members {
            for op in &program.blocks[*b].ops {
                self.ops.add_member(node, *op)?;
                if let Some(callee) = program.ops[*op].call_edge() {
                    let (_, to) = self.entry_node(callee)?;
                    self.ops.link(node, to)?;
                }
            }
            for s in &program.blocks[*b].succs {
                if !inside.contains(s) {
                    let to = self.first_segment(*s)?;
                    self.ops.link(node, to)?;
                }
            }
        }
        self.ops.lock(node);
        Ok(())
    }

    /// Cut a loop-free block after every call edge and link the segments
    /// back to front.
    fn add_segments(
        &mut self,
        block: BlockIdx,
        block_node: SccIdx,
    ) -> LiptonResult<()> {
        let program = self.program;
        let ops = &program.blocks[block].ops;
        let mut segments: Vec<&[OpIdx]> = vec![];
        let mut start = 0;
        for (i, op) in ops.iter().enumerate() {
            if program.ops[*op].call_edge().is_some() {
                segments.push(&ops[start..=i]);
                start = i + 1;
            }
        }
        if start < ops.len() {
            segments.push(&ops[start..]);
        }

        let mut next: Option<SccIdx> = None;
        for segment in segments.into_iter().rev() {
            let node = self.ops.create_node(false);
            self.ops.set_parent(node, block_node);
            for op in segment {
                self.ops.add_member(node, *op)?;
            }
            let last = &program.ops[segment[segment.len() - 1]];
            match last.call_edge() {
                Some(target) => {
                    let (_, to) = self.entry_node(target)?;
                    self.ops.link(node, to)?;
                    let spawn = matches!(
                        last.lib_call(),
                        Some(LibCall::ThreadCreate(_))
                    );
                    if let Some(cont) = next {
                        if spawn || self.may_return(target) {
                            self.ops.link(node, cont)?;
                        }
                    }
                }
                None => {
                    for s in &program.blocks[block].succs {
                        let to = self.first_segment(*s)?;
                        self.ops.link(node, to)?;
                    }
                }
            }
            self.ops.lock(node);
            next = Some(node);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::CallGraph;
    use lipton_ir::ProgramBuilder;

    fn oracle(prog: &Program) -> Reachability<'_> {
        let order = CallGraph::from(prog).post_order(prog).unwrap();
        Reachability::new(prog, &order).unwrap()
    }

    #[test]
    fn diamond() {
        let mut b = ProgramBuilder::new();
        let main = b.add_proc("main");
        let entry = b.add_block(main, "entry");
        let left = b.add_block(main, "left");
        let right = b.add_block(main, "right");
        let join = b.add_block(main, "join");
        let e = b.write(entry, "x");
        b.branch(entry, &[left, right]);
        let l = b.write(left, "x");
        b.branch(left, &[join]);
        let r = b.write(right, "x");
        b.branch(right, &[join]);
        let j = b.read(join, "x");
        b.ret(join);
        let prog = b.finish().unwrap();
        let reach = oracle(&prog);

        assert!(reach.reach(e, j));
        assert!(reach.reach(l, j));
        assert!(!reach.reach(l, r));
        assert!(!reach.reach(r, l));
        assert!(!reach.reach(j, e));
        assert!(!reach.reach(e, e));
        assert!(reach.reach_block(entry, join));
        assert!(!reach.reach_block(left, right));
        assert!(reach.may_return(main));
    }

    #[test]
    fn self_loop_reaches_itself() {
        let mut b = ProgramBuilder::new();
        let main = b.add_proc("main");
        let entry = b.add_block(main, "entry");
        let body = b.add_block(main, "loop");
        let exit = b.add_block(main, "exit");
        let before = b.write(entry, "x");
        b.branch(entry, &[body]);
        let inside = b.write(body, "x");
        let back = b.branch(body, &[body, exit]);
        let after = b.write(exit, "x");
        b.ret(exit);
        let prog = b.finish().unwrap();
        let reach = oracle(&prog);

        assert!(reach.reach(inside, inside));
        assert!(reach.reach(back, inside));
        assert!(!reach.reach(before, before));
        assert!(!reach.reach(after, after));
        assert!(reach.reach(before, after));
        assert!(reach.reach_block(body, body));
    }

    #[test]
    fn calls_split_blocks() {
        let mut b = ProgramBuilder::new();
        let main = b.add_proc("main");
        let f = b.add_proc("f");
        let spin = b.add_proc("spin");
        let entry = b.add_block(main, "entry");
        let a = b.write(entry, "x");
        let call = b.call(entry, f);
        let c = b.write(entry, "y");
        let stuck = b.call(entry, spin);
        let d = b.write(entry, "z");
        b.ret(entry);
        let fb = b.add_block(f, "entry");
        let inner = b.read(fb, "x");
        b.ret(fb);
        let sb = b.add_block(spin, "entry");
        b.branch(sb, &[sb]);
        let prog = b.finish().unwrap();
        let reach = oracle(&prog);

        assert!(reach.reach(a, call));
        assert!(!reach.reach(call, a));
        assert!(reach.reach(a, inner));
        assert!(!reach.reach(inner, inner));
        assert!(reach.reach(a, c));
        assert!(reach.reach(c, stuck));
        // `spin` never returns so the rest of the block is dead.
        assert!(!reach.may_return(spin));
        assert!(!reach.reach(stuck, d));
        assert!(!reach.reach(a, d));
        // Callees don't reach back into their callers.
        assert!(!reach.reach(inner, c));
        assert!(!reach.may_return(main));
    }

    #[test]
    fn spawn_continues_and_reaches_thread() {
        let mut b = ProgramBuilder::new();
        let main = b.add_proc("main");
        let worker = b.add_proc("worker");
        let entry = b.add_block(main, "entry");
        let spawn = b.spawn(entry, worker);
        let after = b.write(entry, "x");
        b.ret(entry);
        let wb = b.add_block(worker, "entry");
        let w = b.write(wb, "x");
        b.branch(wb, &[wb]);
        let prog = b.finish().unwrap();
        let reach = oracle(&prog);

        assert!(!reach.may_return(worker));
        assert!(reach.reach(spawn, after));
        assert!(reach.reach(spawn, w));
        assert!(!reach.reach(w, after));
    }
}
