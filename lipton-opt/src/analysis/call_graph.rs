use lipton_ir::{OpIdx, ProcIdx, Program};
use lipton_utils::{Error, Id, LiptonResult};
use petgraph::{
    algo,
    graph::{DiGraph, NodeIndex},
    visit::{Dfs, EdgeRef},
};
use std::collections::{HashMap, HashSet};

/// Call graph of a program. Nodes are procedures; every call to a procedure
/// and every thread creation contributes an edge labelled with the operation
/// that performs it.
pub struct CallGraph {
    graph: DiGraph<ProcIdx, OpIdx>,
    nodes: HashMap<ProcIdx, NodeIndex>,
}

impl From<&Program> for CallGraph {
    fn from(program: &Program) -> Self {
        let mut graph = DiGraph::new();
        let nodes: HashMap<_, _> = program
            .procs
            .keys()
            .map(|p| (p, graph.add_node(p)))
            .collect();
        for (idx, op) in program.ops.iter() {
            if let Some(target) = op.call_edge() {
                let from = nodes[&program.proc_of_op(idx)];
                graph.add_edge(from, nodes[&target], idx);
            }
        }
        Self { graph, nodes }
    }
}

impl CallGraph {
    /// Procedures ordered so that every callee (and thread body) comes
    /// before its callers. Fails if any procedure can reach itself through
    /// calls or thread creations.
    pub fn post_order(&self, program: &Program) -> LiptonResult<Vec<ProcIdx>> {
        let sccs = algo::tarjan_scc(&self.graph);
        let mut order = Vec::with_capacity(self.graph.node_count());
        for scc in sccs {
            let recursive = scc.len() > 1
                || self.graph.contains_edge(scc[0], scc[0]);
            if recursive {
                let mut names: Vec<Id> = scc
                    .iter()
                    .map(|n| program.procs[self.graph[*n]].name)
                    .collect();
                names.sort();
                return Err(Error::recursion(names));
            }
            order.push(self.graph[scc[0]]);
        }
        Ok(order)
    }

    /// Operations that call or spawn `proc`.
    pub fn call_sites(&self, proc: ProcIdx) -> Vec<OpIdx> {
        let mut sites: Vec<_> = self
            .graph
            .edges_directed(self.nodes[&proc], petgraph::Direction::Incoming)
            .map(|e| *e.weight())
            .collect();
        sites.sort();
        sites
    }

    /// Procedures that run when `root` runs, `root` included.
    pub fn reachable_from(&self, root: ProcIdx) -> HashSet<ProcIdx> {
        let mut dfs = Dfs::new(&self.graph, self.nodes[&root]);
        let mut procs = HashSet::new();
        while let Some(n) = dfs.next(&self.graph) {
            procs.insert(self.graph[n]);
        }
        procs
    }

    /// Procedures directly called or spawned by `proc`.
    pub fn callees(&self, proc: ProcIdx) -> Vec<ProcIdx> {
        let mut callees: Vec<_> = self
            .graph
            .neighbors(self.nodes[&proc])
            .map(|n| self.graph[n])
            .collect();
        callees.sort();
        callees.dedup();
        callees
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lipton_ir::ProgramBuilder;
    use lipton_utils::ErrorKind;

    #[test]
    fn callees_come_first() {
        let mut b = ProgramBuilder::new();
        let main = b.add_proc("main");
        let f = b.add_proc("f");
        let g = b.add_proc("g");
        let m = b.add_block(main, "entry");
        b.call(m, f);
        b.spawn(m, g);
        b.ret(m);
        let fb = b.add_block(f, "entry");
        b.call(fb, g);
        b.ret(fb);
        let gb = b.add_block(g, "entry");
        b.ret(gb);
        let prog = b.finish().unwrap();

        let cg = CallGraph::from(&prog);
        let order = cg.post_order(&prog).unwrap();
        let pos = |p: ProcIdx| order.iter().position(|x| *x == p).unwrap();
        assert!(pos(g) < pos(f));
        assert!(pos(f) < pos(main));
        assert_eq!(cg.callees(main), vec![f, g]);
        assert_eq!(cg.call_sites(g).len(), 2);
    }

    #[test]
    fn mutual_recursion_is_fatal() {
        let mut b = ProgramBuilder::new();
        let main = b.add_proc("main");
        let a = b.add_proc("A");
        let bb = b.add_proc("B");
        let m = b.add_block(main, "entry");
        b.call(m, a);
        b.ret(m);
        let ab = b.add_block(a, "entry");
        b.call(ab, bb);
        b.ret(ab);
        let bbb = b.add_block(bb, "entry");
        b.call(bbb, a);
        b.ret(bbb);
        let prog = b.finish().unwrap();

        let err = CallGraph::from(&prog).post_order(&prog).unwrap_err();
        assert_eq!(
            err.kind(),
            &ErrorKind::Recursion(vec![Id::new("A"), Id::new("B")])
        );
    }

    #[test]
    fn direct_recursion_is_fatal() {
        let mut b = ProgramBuilder::new();
        let main = b.add_proc("main");
        let m = b.add_block(main, "entry");
        b.call(m, main);
        b.ret(m);
        let prog = b.finish().unwrap();
        assert!(CallGraph::from(&prog).post_order(&prog).is_err());
    }
}
