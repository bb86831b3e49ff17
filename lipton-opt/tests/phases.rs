use lipton_ir::{LibCall, Program, ProgramBuilder};
use lipton_opt::analysis::{LocationAliasing, MoverKind};
use lipton_opt::passes::{Liptonize, Mode};
use lipton_opt::pipeline::Analysis;
use lipton_opt::traversal::first_point;
use proptest::prelude::*;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy)]
enum Op {
    Read,
    Write,
    Lock,
    Unlock,
    Yield,
    Local,
    Helper,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::Read),
        Just(Op::Write),
        Just(Op::Lock),
        Just(Op::Unlock),
        Just(Op::Yield),
        Just(Op::Local),
        Just(Op::Helper),
    ]
}

/// Blocks of `main` as (operations, successors).
fn blocks() -> impl Strategy<Value = Vec<(Vec<Op>, Vec<usize>)>> {
    (1usize..6).prop_flat_map(|n| {
        prop::collection::vec(
            (
                prop::collection::vec(op(), 0..4),
                prop::collection::vec(0..n, 0..3),
            ),
            n,
        )
    })
}

/// `main` spawns `worker` and then runs the random blocks. `worker` writes
/// `x` under `m` in a loop, `helper` updates `x` without locking.
fn build(blocks: &[(Vec<Op>, Vec<usize>)]) -> Program {
    let mut b = ProgramBuilder::new();
    let main = b.add_proc("main");
    let worker = b.add_proc("worker");
    let helper = b.add_proc("helper");
    let ids: Vec<_> = (0..blocks.len())
        .map(|i| b.add_block(main, format!("b{i}")))
        .collect();
    b.spawn(ids[0], worker);
    for (i, (ops, succs)) in blocks.iter().enumerate() {
        for op in ops {
            match op {
                Op::Read => b.read(ids[i], "x"),
                Op::Write => b.write(ids[i], "x"),
                Op::Lock => b.lock(ids[i], "m"),
                Op::Unlock => b.unlock(ids[i], "m"),
                Op::Yield => b.yield_now(ids[i]),
                Op::Local => b.local(ids[i]),
                Op::Helper => b.call(ids[i], helper),
            };
        }
        let mut targets: Vec<_> = succs.iter().map(|s| ids[*s]).collect();
        targets.sort();
        targets.dedup();
        if targets.is_empty() {
            b.ret(ids[i]);
        } else {
            b.branch(ids[i], &targets);
        }
    }

    let head = b.add_block(worker, "head");
    let exit = b.add_block(worker, "exit");
    b.lock(head, "m");
    b.write(head, "x");
    b.unlock(head, "m");
    b.branch(head, &[head, exit]);
    b.ret(exit);

    let body = b.add_block(helper, "entry");
    b.update(body, "x");
    b.ret(body);
    b.finish().unwrap()
}

proptest! {
    #[test]
    fn first_point_owns_id_zero(blocks in blocks(), dynamic: bool) {
        let program = build(&blocks);
        let cx = Analysis::build(&program, &LocationAliasing).unwrap();
        let mode = if dynamic { Mode::Dynamic } else { Mode::Static };
        let mut pass = Liptonize::new(&cx, mode);
        pass.run().unwrap();
        let result = pass.finish();
        for thread in cx.threads.iter() {
            let first = first_point(&program, thread.proc).op(&program);
            let reqs: Vec<_> = result.requests.of_thread(thread.idx).collect();
            let zero: Vec<_> = reqs.iter().filter(|r| r.id == 0).collect();
            prop_assert_eq!(zero.len(), 1);
            prop_assert_eq!(zero[0].op, first);
            let ids: HashSet<_> = reqs.iter().map(|r| r.id).collect();
            prop_assert_eq!(ids.len(), reqs.len());
        }
    }

    #[test]
    fn rerun_files_nothing(blocks in blocks(), dynamic: bool) {
        let program = build(&blocks);
        let cx = Analysis::build(&program, &LocationAliasing).unwrap();
        let mode = if dynamic { Mode::Dynamic } else { Mode::Static };
        let mut pass = Liptonize::new(&cx, mode);
        pass.run().unwrap();
        let before = pass.result().requests.len();
        prop_assert_eq!(pass.rerun().unwrap(), 0);
        prop_assert_eq!(pass.result().requests.len(), before);
    }

    #[test]
    fn lock_acquires_are_right_movers(blocks in blocks()) {
        let program = build(&blocks);
        let cx = Analysis::build(&program, &LocationAliasing).unwrap();
        for (idx, op) in program.ops.iter() {
            if matches!(op.lib_call(), Some(LibCall::MutexLock(_))) {
                prop_assert_eq!(cx.movability.movable(idx), MoverKind::Right);
            }
            if !op.is_memory() && op.call_edge().is_none() && op.lib_call().is_none() {
                prop_assert_eq!(cx.movability.movable(idx), MoverKind::Both);
            }
        }
    }
}
