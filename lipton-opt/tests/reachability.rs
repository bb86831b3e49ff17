use lipton_ir::{BlockIdx, OpIdx, Program, ProgramBuilder};
use lipton_opt::analysis::{CallGraph, Reachability};
use proptest::prelude::*;
use std::collections::{HashSet, VecDeque};

/// Successor lists of a random single-procedure control-flow graph.
fn cfg() -> impl Strategy<Value = Vec<Vec<usize>>> {
    (1usize..8).prop_flat_map(|n| {
        prop::collection::vec(prop::collection::vec(0..n, 0..3), n)
    })
}

/// Every block holds a write followed by its terminator.
fn build(succs: &[Vec<usize>]) -> (Program, Vec<BlockIdx>, Vec<OpIdx>) {
    let mut b = ProgramBuilder::new();
    let main = b.add_proc("main");
    let blocks: Vec<_> = (0..succs.len())
        .map(|i| b.add_block(main, format!("b{i}")))
        .collect();
    let mut writes = vec![];
    for (i, s) in succs.iter().enumerate() {
        writes.push(b.write(blocks[i], "x"));
        let mut targets: Vec<_> = s.iter().map(|t| blocks[*t]).collect();
        targets.sort();
        targets.dedup();
        if targets.is_empty() {
            b.ret(blocks[i]);
        } else {
            b.branch(blocks[i], &targets);
        }
    }
    (b.finish().unwrap(), blocks, writes)
}

/// Is there a path of at least one edge from `a` to `b`?
fn naive(succs: &[Vec<usize>], a: usize, b: usize) -> bool {
    let mut seen = HashSet::new();
    let mut todo: VecDeque<usize> = succs[a].iter().copied().collect();
    while let Some(n) = todo.pop_front() {
        if n == b {
            return true;
        }
        if seen.insert(n) {
            todo.extend(succs[n].iter().copied());
        }
    }
    false
}

fn oracle(program: &Program) -> Reachability<'_> {
    let order = CallGraph::from(program).post_order(program).unwrap();
    Reachability::new(program, &order).unwrap()
}

proptest! {
    #[test]
    fn agrees_with_search(succs in cfg()) {
        let (program, blocks, writes) = build(&succs);
        let reach = oracle(&program);
        for a in 0..succs.len() {
            for b in 0..succs.len() {
                let expected = naive(&succs, a, b);
                prop_assert_eq!(reach.reach_block(blocks[a], blocks[b]), expected);
                prop_assert_eq!(reach.reach(writes[a], writes[b]), expected);
            }
        }
    }

    #[test]
    fn transitive(succs in cfg()) {
        let (program, _, _) = build(&succs);
        let reach = oracle(&program);
        let ops: Vec<OpIdx> = program.ops.keys().collect();
        for &a in &ops {
            for &b in &ops {
                if !reach.reach(a, b) {
                    continue;
                }
                for &c in &ops {
                    if reach.reach(b, c) {
                        prop_assert!(reach.reach(a, c));
                    }
                }
            }
        }
    }
}

#[test]
fn calls_that_never_return_cut_the_caller() {
    let mut b = ProgramBuilder::new();
    let main = b.add_proc("main");
    let spin = b.add_proc("spin");
    let entry = b.add_block(main, "entry");
    let before = b.write(entry, "x");
    b.call(entry, spin);
    let after = b.write(entry, "x");
    b.ret(entry);
    let body = b.add_block(spin, "body");
    let inner = b.read(body, "y");
    b.branch(body, &[body]);
    let program = b.finish().unwrap();
    let reach = oracle(&program);

    assert!(reach.reach(before, inner));
    assert!(!reach.reach(before, after));
    assert!(!reach.may_return(spin));
    assert!(!reach.may_return(main));
}
