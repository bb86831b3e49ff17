//! Turns block-start requests into an instrumentation plan: what to splice
//! into the program, and where.
use super::liptonize::{BlockKind, BlockStart, LiptonizeResult, Mode, Placement};
use crate::analysis::{Thread, ThreadIdx};
use crate::pipeline::Analysis;
use crate::traversal::Named;
use itertools::Itertools;
use lipton_idx::IndexRef;
use lipton_ir::{OpIdx, OpKind, Terminator};
use lipton_utils::{Id, LiptonResult};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Pre,
    Post,
}

/// A block of another thread whose activity is tested at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictCheck {
    pub thread: Id,
    pub block: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum Action {
    /// Unconditional yield.
    Yield,
    /// Initialize the phase variable to `Pre`.
    InitPhase,
    /// Store a phase into the phase variable.
    SetPhase { phase: Phase },
    /// If the phase variable is `Post`: reset it to `Pre` and yield. Then
    /// set it to `Post`.
    PhaseGuardedYield,
    /// Like [Action::PhaseGuardedYield], but only when one of `checks` is
    /// currently active.
    ConflictGuardedYield { checks: Vec<ConflictCheck> },
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Yield => write!(f, "yield"),
            Action::InitPhase => write!(f, "init-phase"),
            Action::SetPhase { phase: Phase::Pre } => write!(f, "set-phase pre"),
            Action::SetPhase { phase: Phase::Post } => {
                write!(f, "set-phase post")
            }
            Action::PhaseGuardedYield => write!(f, "phase-guarded-yield"),
            Action::ConflictGuardedYield { checks } => write!(
                f,
                "conflict-guarded-yield [{}]",
                checks
                    .iter()
                    .map(|c| format!("{}#{}", c.thread, c.block))
                    .join(", ")
            ),
        }
    }
}

/// One action spliced next to an operation.
#[derive(Debug, Clone, Serialize)]
pub struct Instrumentation {
    #[serde(skip)]
    pub op: OpIdx,
    /// Location of the operation, `proc.block[position]`.
    pub at: String,
    pub placement: Placement,
    /// Id of the block-start request this action implements.
    pub block: u32,
    #[serde(flatten)]
    pub action: Action,
}

#[derive(Debug, Clone, Serialize)]
pub struct ThreadPlan {
    pub thread: usize,
    pub proc: Id,
    pub multi_instance: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase_var: Option<String>,
    pub actions: Vec<Instrumentation>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstrumentationPlan {
    pub mode: Mode,
    pub threads: Vec<ThreadPlan>,
}

impl InstrumentationPlan {
    pub fn write_json<F: io::Write>(&self, f: &mut F) -> LiptonResult<()> {
        serde_json::to_writer_pretty(&mut *f, self)?;
        writeln!(f)?;
        Ok(())
    }

    pub fn write_text<F: io::Write>(&self, f: &mut F) -> io::Result<()> {
        writeln!(f, "mode: {}", self.mode)?;
        for t in &self.threads {
            write!(f, "thread {} {}", t.thread, t.proc)?;
            if t.multi_instance {
                write!(f, " (multi-instance)")?;
            }
            if let Some(var) = &t.phase_var {
                write!(f, " phase={var}")?;
            }
            writeln!(f)?;
            for i in &t.actions {
                writeln!(f, "  {} {} #{}: {}", i.placement, i.at, i.block, i.action)?;
            }
        }
        Ok(())
    }
}

/// Builds the [InstrumentationPlan].
pub struct Instrument;

impl Named for Instrument {
    fn name() -> &'static str {
        "instrument"
    }

    fn description() -> &'static str {
        "turn block-start requests into yields and phase updates"
    }
}

impl Instrument {
    pub fn plan(cx: &Analysis, result: &LiptonizeResult) -> InstrumentationPlan {
        let threads = cx
            .threads
            .iter()
            .map(|thread| Self::thread_plan(cx, result, thread))
            .collect();
        InstrumentationPlan {
            mode: result.mode,
            threads,
        }
    }

    fn thread_plan(
        cx: &Analysis,
        result: &LiptonizeResult,
        thread: &Thread,
    ) -> ThreadPlan {
        let program = cx.program;
        let mut actions = vec![];
        let mut add = |req: &BlockStart, placement, action| {
            actions.push(Instrumentation {
                op: req.op,
                at: program.describe(req.op),
                placement,
                block: req.id,
                action,
            })
        };
        let dynamic = result.mode == Mode::Dynamic;
        for req in result.requests.of_thread(thread.idx) {
            match (req.kind, result.mode) {
                // The first point of a thread only needs its id.
                (BlockKind::LoopBreak, _) if req.id == 0 => {
                    if dynamic {
                        add(req, Placement::Before, Action::InitPhase);
                    }
                }
                (BlockKind::LoopBreak, Mode::Static) => {
                    add(req, Placement::Before, Action::Yield)
                }
                (BlockKind::LoopBreak, Mode::Dynamic) => {
                    add(req, Placement::Before, Action::Yield);
                    add(req, Placement::Before, Action::SetPhase {
                        phase: Phase::Pre,
                    });
                }
                (BlockKind::Static, _) => add(req, req.placement, Action::Yield),
                (_, Mode::Static) => {}
                (BlockKind::PhaseShift, Mode::Dynamic) => {
                    add(req, req.placement, Action::SetPhase {
                        phase: Phase::Post,
                    })
                }
                (BlockKind::PhaseDynamic, Mode::Dynamic) => {
                    add(req, req.placement, Action::PhaseGuardedYield)
                }
                (BlockKind::DynamicConflict, Mode::Dynamic) => {
                    let checks = conflict_checks(cx, result, req);
                    add(req, req.placement, Action::ConflictGuardedYield {
                        checks,
                    })
                }
            }
        }
        if dynamic && !actions.iter().any(|a| a.action == Action::InitPhase) {
            // The first request was strengthened: initialize the phase
            // before anything else happens.
            if let Some(first) = result.requests.of_thread(thread.idx).next() {
                actions.insert(0, Instrumentation {
                    op: first.op,
                    at: program.describe(first.op),
                    placement: Placement::Before,
                    block: first.id,
                    action: Action::InitPhase,
                });
            }
        }
        ThreadPlan {
            thread: thread.idx.index(),
            proc: thread.name,
            multi_instance: thread.multi_instance,
            phase_var: dynamic.then(|| thread.phase_var()),
            actions,
        }
    }
}

/// Can a block starting at `start` in `thread` still be running when `j`
/// executes? Blocks stay open across returns, so a block that reaches the
/// end of its procedure also reaches whatever follows the call sites of
/// that procedure in the same thread.
fn active_at(cx: &Analysis, thread: ThreadIdx, start: OpIdx, j: OpIdx) -> bool {
    let program = cx.program;
    let mut todo = vec![start];
    let mut seen = HashSet::new();
    while let Some(op) = todo.pop() {
        if !seen.insert(op) {
            continue;
        }
        if op == j || cx.reach.reach(op, j) {
            return true;
        }
        let proc = program.proc_of_op(op);
        let returns = program.proc_ops(proc).any(|r| {
            matches!(
                program.ops[r].kind,
                OpKind::Terminator(Terminator::Return)
            ) && (r == op || cx.reach.reach(op, r))
        });
        if !returns {
            continue;
        }
        let Some(sites) = cx.collected.return_sites.get(&proc) else {
            continue;
        };
        todo.extend(
            sites
                .iter()
                .map(|site| site.op(program))
                .filter(|cont| cx.conflicts.owner(*cont) == Some(thread)),
        );
    }
    false
}

/// Blocks that may be executing an operation conflicting with `req`: for
/// every conflicting operation `J`, every block of `J`'s thread that is
/// still active when `J` runs.
fn conflict_checks(
    cx: &Analysis,
    result: &LiptonizeResult,
    req: &BlockStart,
) -> Vec<ConflictCheck> {
    let mut blocks: BTreeSet<(ThreadIdx, u32)> = BTreeSet::new();
    for &j in &req.sources {
        let Some(owner) = cx.conflicts.owner(j) else {
            continue;
        };
        for other in result.requests.of_thread(owner) {
            if active_at(cx, owner, other.op, j) {
                blocks.insert((owner, other.id));
            }
        }
    }
    blocks
        .into_iter()
        .map(|(t, block)| ConflictCheck {
            thread: cx.threads.get(t).name,
            block,
        })
        .collect()
}
