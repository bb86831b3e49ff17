use crate::analysis::{
    AliasOracle, AliasSetTracker, Reachability, ThreadIdx, Threads,
};
use crate::traversal::{
    self, Area, ConstructPass, Edge, Named, ParseVal, PassOpt, Point,
    Processor, Step, Successors,
};
use itertools::Itertools;
use lipton_ir::{OpIdx, ProcIdx, Program};
use lipton_utils::{Error, LiptonResult, OutputFile};
use std::collections::HashMap;
use std::io::Write;

/// Facts gathered by walking every thread once.
#[derive(Debug, Default)]
pub struct Collected {
    /// Thread executing each reachable operation.
    pub owners: HashMap<OpIdx, ThreadIdx>,
    /// Alias sets of each thread.
    pub alias_sets: HashMap<ThreadIdx, AliasSetTracker>,
    /// Continuations of the calls to each procedure.
    pub return_sites: HashMap<ProcIdx, Vec<Point>>,
}

/// Walks every thread to assign operations to threads, build the alias sets
/// and record where calls return to.
pub struct Collect<'a> {
    program: &'a Program,
    reach: &'a Reachability<'a>,
    threads: &'a Threads,
    oracle: &'a dyn AliasOracle,
    thread: ThreadIdx,
    result: &'a mut Collected,
}

impl Named for Collect<'_> {
    fn name() -> &'static str {
        "collect"
    }

    fn description() -> &'static str {
        "assign operations to threads and build per-thread alias sets"
    }

    fn opts() -> Vec<PassOpt> {
        vec![PassOpt::new(
            "dump-alias-sets",
            "write the alias sets of every thread to the given stream",
            ParseVal::OutStream(OutputFile::Null),
            PassOpt::parse_outstream,
        )]
    }
}

impl Collect<'_> {
    pub fn run(
        program: &Program,
        reach: &Reachability<'_>,
        threads: &Threads,
        oracle: &dyn AliasOracle,
    ) -> LiptonResult<Collected> {
        let mut result = Collected::default();
        for thread in threads.iter() {
            let mut collect = Collect {
                program,
                reach,
                threads,
                oracle,
                thread: thread.idx,
                result: &mut result,
            };
            let mut areas = HashMap::new();
            traversal::walk(
                program,
                traversal::first_point(program, thread.proc),
                Area::Pre,
                &mut collect,
                &mut areas,
            )?;
        }
        log::debug!("collect: {} reachable operations", result.owners.len());

        let opts = Collect::get_opts(program);
        if let Some(out) = opts["dump-alias-sets"].not_null_outstream() {
            dump_alias_sets(program, threads, &result, &mut out.get_write()?)?;
        }
        Ok(result)
    }
}

fn dump_alias_sets(
    program: &Program,
    threads: &Threads,
    collected: &Collected,
    f: &mut dyn Write,
) -> LiptonResult<()> {
    for thread in threads.iter() {
        writeln!(f, "thread {} ({}):", thread.idx, thread.name)?;
        let Some(tracker) = collected.alias_sets.get(&thread.idx) else {
            continue;
        };
        for set in tracker.sets() {
            writeln!(
                f,
                "  {{{}}}",
                set.ops().iter().map(|op| program.describe(*op)).join(", ")
            )?;
        }
    }
    f.flush()?;
    Ok(())
}

impl Processor for Collect<'_> {
    fn visit_op(&mut self, op: OpIdx, area: Area) -> LiptonResult<Step> {
        match self.result.owners.get(&op) {
            Some(owner) if *owner == self.thread => {}
            Some(owner) => {
                return Err(Error::duplicate_owner(
                    self.program.describe(op),
                    self.threads.get(*owner).name,
                    self.threads.get(self.thread).name,
                ));
            }
            None => {
                self.result.owners.insert(op, self.thread);
                self.result
                    .alias_sets
                    .entry(self.thread)
                    .or_default()
                    .insert(self.program, self.oracle, op);
            }
        }
        Ok(Step::Continue(area))
    }

    fn call_successors(
        &mut self,
        _call: OpIdx,
        callee: ProcIdx,
        cont: Point,
    ) -> Successors {
        let sites = self.result.return_sites.entry(callee).or_default();
        if !sites.contains(&cont) {
            sites.push(cont);
        }
        let mut succs =
            Successors::from_elem(Point::entry(self.program.procs[callee].entry), 1);
        if self.reach.may_return(callee) {
            succs.push(cont);
        }
        succs
    }

    fn return_successors(&mut self, _proc: ProcIdx) -> Successors {
        Successors::new()
    }

    fn revisit(
        &mut self,
        _point: Point,
        _recorded: Area,
        _incoming: Area,
        _edge: Edge,
    ) -> LiptonResult<()> {
        Ok(())
    }
}
