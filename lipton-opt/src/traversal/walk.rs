//! Depth-first walk over the control-flow points of one thread.
//!
//! The walk keeps its own stack of frames on the heap. A point may have
//! several frames on the stack at once: when a point is reached again with an
//! area that enlarges the recorded one, it is explored again with the join
//! even if an earlier frame for it is still active.
use super::{Area, Edge, Point};
use lipton_ir::{OpIdx, OpKind, ProcIdx, Program, Terminator};
use lipton_utils::LiptonResult;
use smallvec::SmallVec;
use std::collections::{HashMap, HashSet};

pub type Successors = SmallVec<[Point; 2]>;

/// What the walk does after visiting an operation.
#[derive(Debug)]
pub enum Step {
    /// Go on with the next operation in the given area.
    Continue(Area),
    /// Leave the block and resume at the given points.
    Jump(Area, Successors),
}

/// Strategy driving a [walk].
pub trait Processor {
    /// Visit `op` in `area`.
    fn visit_op(&mut self, op: OpIdx, area: Area) -> LiptonResult<Step>;

    /// Points following a call to `callee`. `cont` is the operation after
    /// the call in the caller.
    fn call_successors(
        &mut self,
        call: OpIdx,
        callee: ProcIdx,
        cont: Point,
    ) -> Successors;

    /// Points following a return from `proc`.
    fn return_successors(&mut self, proc: ProcIdx) -> Successors;

    /// `point` was recorded with area `recorded` and is reached again with
    /// `incoming`, which enlarges it. The walk explores the point again
    /// with the join afterwards.
    fn revisit(
        &mut self,
        point: Point,
        recorded: Area,
        incoming: Area,
        edge: Edge,
    ) -> LiptonResult<()>;
}

/// First point of a procedure run as a thread: the entry block, skipping
/// blocks that do nothing but jump to their only successor.
pub fn first_point(program: &Program, proc: ProcIdx) -> Point {
    let mut block = program.procs[proc].entry;
    let mut seen = HashSet::new();
    while seen.insert(block) {
        let b = &program.blocks[block];
        if b.ops.len() == 1
            && b.succs.len() == 1
            && program.terminator(block) == Some(Terminator::Branch)
        {
            block = b.succs[0];
        } else {
            break;
        }
    }
    Point::entry(block)
}

struct Frame {
    point: Point,
    succs: Successors,
    next: usize,
    out: Area,
}

/// Walk every point reachable from `first`. `areas` holds the area recorded
/// for every point and persists across walks.
pub fn walk<P: Processor>(
    program: &Program,
    first: Point,
    initial: Area,
    processor: &mut P,
    areas: &mut HashMap<Point, Area>,
) -> LiptonResult<()> {
    let mut w = Walk {
        program,
        processor,
        areas,
        stack: vec![],
        on_stack: HashMap::new(),
        visited: HashSet::new(),
    };
    if let Some(area) = w.enter(first, initial)? {
        w.push(first, area)?;
    }
    while let Some(frame) = w.stack.last_mut() {
        if frame.next < frame.succs.len() {
            let succ = frame.succs[frame.next];
            let out = frame.out;
            frame.next += 1;
            if let Some(area) = w.enter(succ, out)? {
                w.push(succ, area)?;
            }
        } else {
            let point = frame.point;
            w.stack.pop();
            if let Some(n) = w.on_stack.get_mut(&point) {
                *n -= 1;
            }
        }
    }
    Ok(())
}

struct Walk<'a, P> {
    program: &'a Program,
    processor: &'a mut P,
    areas: &'a mut HashMap<Point, Area>,
    stack: Vec<Frame>,
    on_stack: HashMap<Point, u32>,
    /// Points explored by this walk.
    visited: HashSet<Point>,
}

impl<P: Processor> Walk<'_, P> {
    /// Decide whether `point` has to be explored when reached with
    /// `incoming`, and with which area.
    fn enter(
        &mut self,
        point: Point,
        incoming: Area,
    ) -> LiptonResult<Option<Area>> {
        let Some(&recorded) = self.areas.get(&point) else {
            self.areas.insert(point, incoming);
            self.visited.insert(point);
            return Ok(Some(incoming));
        };
        let joined = recorded.join(incoming);
        if joined != recorded {
            let edge = if self.on_stack.get(&point).copied().unwrap_or(0) > 0 {
                Edge::Back
            } else {
                Edge::Cross
            };
            self.processor.revisit(point, recorded, incoming, edge)?;
            self.areas.insert(point, joined);
            self.visited.insert(point);
            Ok(Some(joined))
        } else if self.visited.insert(point) {
            Ok(Some(recorded))
        } else {
            Ok(None)
        }
    }

    /// Run the operations of the block at `point` and push a frame holding
    /// its successors.
    fn push(&mut self, point: Point, mut area: Area) -> LiptonResult<()> {
        let block = &self.program.blocks[point.block];
        let mut succs = Successors::new();
        for op in &block.ops[point.start as usize..] {
            let operation = &self.program.ops[*op];
            match self.processor.visit_op(*op, area)? {
                Step::Continue(a) => area = a,
                Step::Jump(a, points) => {
                    area = a;
                    succs = points;
                    break;
                }
            }
            if let Some(callee) = operation.callee() {
                let cont = Point {
                    block: point.block,
                    start: operation.position + 1,
                };
                succs = self.processor.call_successors(*op, callee, cont);
                break;
            }
            match operation.kind {
                OpKind::Terminator(Terminator::Branch) => {
                    succs = block.succs.iter().copied().map(Point::entry).collect();
                }
                OpKind::Terminator(Terminator::Return) => {
                    succs = self.processor.return_successors(block.proc);
                }
                _ => {}
            }
        }
        *self.on_stack.entry(point).or_default() += 1;
        self.stack.push(Frame {
            point,
            succs,
            next: 0,
            out: area,
        });
        Ok(())
    }
}
