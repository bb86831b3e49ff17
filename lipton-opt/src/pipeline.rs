//! Runs the analyses and passes in order.
use crate::analysis::{
    AliasOracle, CallGraph, ConflictIndex, LocationAliasing, LockSets,
    Movability, Reachability, Threads,
};
use crate::passes::{
    Collect, Collected, Instrument, InstrumentationPlan, Liptonize,
    LiptonizeResult, Mode, WellFormed,
};
use crate::traversal::Named;
use lipton_ir::{ProcIdx, Program};
use lipton_utils::LiptonResult;
use std::fmt::Write as _;
use std::time::Instant;

/// Run `stage` and log how long it took.
fn timed<T>(name: &str, stage: impl FnOnce() -> T) -> T {
    let start = Instant::now();
    let out = stage();
    let elapsed = start.elapsed();
    if elapsed.as_secs() > 5 {
        log::warn!("{name}: {}ms", elapsed.as_millis());
    } else {
        log::info!("{name}: {}ms", elapsed.as_millis());
    }
    out
}

/// Every whole-program fact the phase tracker and the instrumenter need.
pub struct Analysis<'p> {
    pub program: &'p Program,
    /// Callees before callers.
    pub post_order: Vec<ProcIdx>,
    pub reach: Reachability<'p>,
    pub threads: Threads,
    pub collected: Collected,
    pub locks: LockSets,
    pub conflicts: ConflictIndex,
    pub movability: Movability,
}

impl<'p> Analysis<'p> {
    pub fn build(
        program: &'p Program,
        oracle: &dyn AliasOracle,
    ) -> LiptonResult<Self> {
        timed(WellFormed::name(), || WellFormed::check(program))?;
        let call_graph = CallGraph::from(program);
        let post_order =
            timed("call-graph", || call_graph.post_order(program))?;
        let reach =
            timed("reachability", || Reachability::new(program, &post_order))?;
        let threads = timed("threads", || {
            Threads::discover(program, &call_graph, &post_order, &reach)
        })?;
        let collected = timed(Collect::name(), || {
            Collect::run(program, &reach, &threads, oracle)
        })?;
        let locks = timed("locksets", || LockSets::new(program, &post_order));
        let conflicts = timed("conflicts", || {
            ConflictIndex::new(
                program,
                &threads,
                &collected.owners,
                &collected.alias_sets,
                &locks,
                oracle,
            )
        });
        let movability = timed("movability", || {
            Movability::new(program, &post_order, &threads, &conflicts)
        });
        Ok(Self {
            program,
            post_order,
            reach,
            threads,
            collected,
            locks,
            conflicts,
            movability,
        })
    }
}

/// Result of [run].
pub struct Reduction<'p> {
    pub analysis: Analysis<'p>,
    pub result: LiptonizeResult,
    pub plan: InstrumentationPlan,
}

/// Analyze `program` with location-based aliasing, track phases to a fixed
/// point and plan the instrumentation.
pub fn run(program: &Program, mode: Mode) -> LiptonResult<Reduction<'_>> {
    let analysis = Analysis::build(program, &LocationAliasing)?;
    let result = timed(Liptonize::name(), || {
        let mut pass = Liptonize::new(&analysis, mode);
        pass.run()?;
        LiptonResult::Ok(pass.finish())
    })?;
    let plan = timed(Instrument::name(), || Instrument::plan(&analysis, &result));
    Ok(Reduction {
        analysis,
        result,
        plan,
    })
}

fn help<P: Named>(out: &mut String) {
    let _ = write!(out, "- {}: {}", P::name(), P::description());
    for opt in P::opts() {
        let _ = write!(
            out,
            "\n  * {}: {} (default: {})",
            opt.name(),
            opt.description(),
            opt.default()
        );
    }
    out.push('\n');
}

/// Help text listing every pass and its options.
pub fn complete_help() -> String {
    let mut ret = String::with_capacity(1000);
    ret.push_str("Passes:\n");
    help::<Collect>(&mut ret);
    help::<Instrument>(&mut ret);
    help::<Liptonize>(&mut ret);
    help::<WellFormed>(&mut ret);
    ret
}
