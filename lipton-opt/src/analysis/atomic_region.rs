use super::{MoverKind, Movability};
use crate::traversal::Point;
use lipton_ir::{Callee, LibCall, OpIdx, OpKind, Program, Terminator};
use lipton_utils::{Error, LiptonResult};
use std::collections::HashSet;

/// A user-marked atomic region, from an atomic-begin marker to all of its
/// matching atomic-end markers.
#[derive(Debug, Clone)]
pub struct AtomicRegion {
    pub begin: OpIdx,
    /// Join of the mover kinds of everything strictly inside the region.
    pub kind: MoverKind,
    /// Matching atomic-end markers.
    pub ends: Vec<OpIdx>,
    /// Points right after each matching end.
    pub exits: Vec<Point>,
    /// Operations strictly inside the region, including calls.
    pub ops: Vec<OpIdx>,
}

impl AtomicRegion {
    /// Scan forward from `begin` through every branch, counting nested
    /// regions, until the matching end markers.
    pub fn scan(
        program: &Program,
        movability: &Movability,
        begin: OpIdx,
    ) -> LiptonResult<Self> {
        let start = &program.ops[begin];
        let proc = program.blocks[start.block].proc;
        let unmatched = || Error::unmatched_atomic(program.describe(begin));
        // Deeper nesting than there are operations means some loop opens
        // regions without closing them.
        let max_depth = program.proc_ops(proc).count();

        let mut region = AtomicRegion {
            begin,
            kind: MoverKind::Both,
            ends: vec![],
            exits: vec![],
            ops: vec![],
        };
        let mut seen: HashSet<(Point, usize)> = HashSet::new();
        let mut inside: HashSet<OpIdx> = HashSet::new();
        let mut todo = vec![(
            Point {
                block: start.block,
                start: start.position + 1,
            },
            0,
        )];

        while let Some((point, mut depth)) = todo.pop() {
            if !seen.insert((point, depth)) {
                continue;
            }
            let block = &program.blocks[point.block];
            for op in &block.ops[point.start as usize..] {
                let operation = &program.ops[*op];
                match &operation.kind {
                    OpKind::Call(Callee::Library(
                        LibCall::AtomicBegin,
                    )) => {
                        depth += 1;
                        if depth > max_depth {
                            return Err(unmatched());
                        }
                        continue;
                    }
                    OpKind::Call(Callee::Library(
                        LibCall::AtomicEnd,
                    )) => {
                        if depth == 0 {
                            if !region.ends.contains(op) {
                                region.ends.push(*op);
                                region.exits.push(Point {
                                    block: point.block,
                                    start: operation.position + 1,
                                });
                            }
                            break;
                        }
                        depth -= 1;
                        continue;
                    }
                    OpKind::Terminator(Terminator::Return) => {
                        return Err(unmatched().with_post_msg(Some(format!(
                            "returns at {} inside the region",
                            program.describe(*op)
                        ))));
                    }
                    OpKind::Terminator(Terminator::Branch) => {
                        todo.extend(
                            block.succs.iter().map(|s| (Point::entry(*s), depth)),
                        );
                    }
                    _ => {}
                }
                region.kind = region.kind.join(movability.movable(*op));
                if let Some(callee) = operation.callee() {
                    region.kind = region.kind.join(movability.summary(callee));
                }
                if inside.insert(*op) {
                    region.ops.push(*op);
                }
            }
        }

        if region.ends.is_empty() {
            return Err(unmatched());
        }
        region.ops.sort();
        Ok(region)
    }
}
