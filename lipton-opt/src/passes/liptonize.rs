//! Phase tracking and block-start requests.
//!
//! Every thread is walked from its first point. The walk tracks whether the
//! thread is before (`Pre`) or after (`Post`) the commit point of its current
//! transaction, and files a block-start request wherever a mover would leave
//! the thread in the wrong phase.
use crate::analysis::{AtomicRegion, MoverKind, ThreadIdx};
use crate::pipeline::Analysis;
use crate::traversal::{
    self, Area, ConstructPass, Edge, Named, ParseVal, PassOpt, Point,
    Processor, Step, Successors,
};
use itertools::Itertools;
use linked_hash_map::LinkedHashMap;
use lipton_ir::{LibCall, OpIdx, ProcIdx};
use lipton_utils::{Error, LiptonResult};
use serde::Serialize;
use smallvec::smallvec;
use std::collections::{HashMap, HashSet};
use std::str::FromStr;

/// How synchronization is inserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Unconditional yields.
    #[default]
    Static,
    /// Yields guarded by a per-thread phase variable and, optionally, by a
    /// runtime conflict check.
    Dynamic,
}

impl FromStr for Mode {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "static" => Ok(Mode::Static),
            "dynamic" => Ok(Mode::Dynamic),
            _ => Err(Error::misc(format!(
                "unknown mode `{s}`, expected `static` or `dynamic`"
            ))),
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Static => write!(f, "static"),
            Mode::Dynamic => write!(f, "dynamic"),
        }
    }
}

/// Severity of a block-start request, weakest first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum BlockKind {
    /// Break a loop or a re-converging path.
    LoopBreak,
    /// Record that the thread has passed its commit point.
    PhaseShift,
    /// Yield if the thread is past its commit point.
    PhaseDynamic,
    /// Yield if the thread is past its commit point and a conflicting block
    /// of another thread is active.
    DynamicConflict,
    /// Always yield.
    Static,
}

impl BlockKind {
    pub fn is_dynamic(self) -> bool {
        matches!(
            self,
            BlockKind::PhaseShift
                | BlockKind::PhaseDynamic
                | BlockKind::DynamicConflict
        )
    }
}

impl std::fmt::Display for BlockKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BlockKind::LoopBreak => "loop-break",
            BlockKind::PhaseShift => "phase-shift",
            BlockKind::PhaseDynamic => "phase-dynamic",
            BlockKind::DynamicConflict => "dynamic-conflict",
            BlockKind::Static => "static",
        };
        write!(f, "{s}")
    }
}

/// Where a request is placed relative to its operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Placement {
    Before,
    After,
}

impl std::fmt::Display for Placement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Placement::Before => write!(f, "before"),
            Placement::After => write!(f, "after"),
        }
    }
}

/// A request to start a new block at an operation.
#[derive(Debug, Clone)]
pub struct BlockStart {
    pub op: OpIdx,
    pub kind: BlockKind,
    /// Unique within the thread. The first point of a thread has id 0.
    pub id: u32,
    pub placement: Placement,
    /// Operations of other threads checked at runtime by dynamic-conflict
    /// requests.
    pub sources: Vec<OpIdx>,
}

/// Outcome of [BlockStarts::file].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filed {
    New,
    /// An existing request of the given kind was strengthened.
    Upgraded(BlockKind),
    /// An existing request was at least as strong.
    Dropped,
}

/// Block-start requests of every thread, in filing order.
#[derive(Debug, Default)]
pub struct BlockStarts {
    threads: HashMap<ThreadIdx, LinkedHashMap<OpIdx, BlockStart>>,
    next_id: HashMap<ThreadIdx, u32>,
}

impl BlockStarts {
    /// File a request. A weaker or equal request at the same operation is
    /// dropped; a stronger one replaces the kind and placement but keeps the
    /// id.
    pub fn file(
        &mut self,
        thread: ThreadIdx,
        op: OpIdx,
        kind: BlockKind,
        placement: Placement,
        sources: &[OpIdx],
    ) -> Filed {
        let requests = self.threads.entry(thread).or_default();
        if let Some(existing) = requests.get_mut(&op) {
            let merge = |into: &mut Vec<OpIdx>| {
                into.extend_from_slice(sources);
                into.sort();
                into.dedup();
            };
            if kind > existing.kind {
                let from = existing.kind;
                existing.kind = kind;
                existing.placement = placement;
                merge(&mut existing.sources);
                return Filed::Upgraded(from);
            }
            if kind == existing.kind {
                merge(&mut existing.sources);
            }
            return Filed::Dropped;
        }
        let next = self.next_id.entry(thread).or_default();
        let id = *next;
        *next += 1;
        requests.insert(
            op,
            BlockStart {
                op,
                kind,
                id,
                placement,
                sources: sources.to_vec(),
            },
        );
        Filed::New
    }

    pub fn get(&self, thread: ThreadIdx, op: OpIdx) -> Option<&BlockStart> {
        self.threads.get(&thread)?.get(&op)
    }

    /// Requests of `thread` ordered by id.
    pub fn of_thread(
        &self,
        thread: ThreadIdx,
    ) -> impl Iterator<Item = &BlockStart> {
        self.threads
            .get(&thread)
            .into_iter()
            .flat_map(|reqs| reqs.values())
    }

    pub fn len(&self) -> usize {
        self.threads.values().map(LinkedHashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Everything the phase tracker computes.
#[derive(Debug, Default)]
pub struct LiptonizeResult {
    pub mode: Mode,
    pub conflict_checks: bool,
    pub requests: BlockStarts,
    /// Area recorded for every control-flow point of every thread.
    pub areas: HashMap<ThreadIdx, HashMap<Point, Area>>,
    /// Join of the areas each operation was visited in.
    pub op_areas: HashMap<OpIdx, Area>,
}

impl LiptonizeResult {
    pub fn area(&self, op: OpIdx) -> Option<Area> {
        self.op_areas.get(&op).copied()
    }
}

/// The phase tracker.
pub struct Liptonize<'a> {
    cx: &'a Analysis<'a>,
    regions: HashMap<OpIdx, AtomicRegion>,
    /// Operations strictly inside some atomic region.
    in_region: HashSet<OpIdx>,
    stray_ends: HashSet<OpIdx>,
    result: LiptonizeResult,
}

impl Named for Liptonize<'_> {
    fn name() -> &'static str {
        "liptonize"
    }

    fn description() -> &'static str {
        "track commit phases and compute block-start requests"
    }

    fn opts() -> Vec<PassOpt> {
        vec![PassOpt::new(
            "no-conflict-check",
            "dynamic mode: guard yields on non-movers by the phase only",
            ParseVal::Bool(false),
            PassOpt::parse_bool,
        )]
    }
}

impl<'a> Liptonize<'a> {
    pub fn new(cx: &'a Analysis<'a>, mode: Mode) -> Self {
        let opts = Liptonize::get_opts(cx.program);
        Self {
            cx,
            regions: HashMap::new(),
            in_region: HashSet::new(),
            stray_ends: HashSet::new(),
            result: LiptonizeResult {
                mode,
                conflict_checks: !opts["no-conflict-check"].bool(),
                ..Default::default()
            },
        }
    }

    /// Walk every thread to a fixed point. Returns the number of requests
    /// filed or strengthened.
    pub fn run(&mut self) -> LiptonResult<usize> {
        self.scan_regions()?;
        let changes = self.walk_threads()?;
        log::info!(
            "liptonize: {} block-start requests in {} threads",
            self.result.requests.len(),
            self.cx.threads.len()
        );
        Ok(changes)
    }

    /// Walk every thread again on top of the recorded areas and requests.
    /// Once [Liptonize::run] has finished this files nothing new.
    pub fn rerun(&mut self) -> LiptonResult<usize> {
        self.walk_threads()
    }

    pub fn result(&self) -> &LiptonizeResult {
        &self.result
    }

    pub fn finish(self) -> LiptonizeResult {
        self.result
    }

    /// Scan every reachable atomic region up front. Returns from procedures
    /// called inside a region must not lead back into it, even when the
    /// region has not been reached yet.
    fn scan_regions(&mut self) -> LiptonResult<()> {
        let cx = self.cx;
        for (idx, op) in cx.program.ops.iter() {
            if !matches!(op.lib_call(), Some(LibCall::AtomicBegin))
                || cx.conflicts.owner(idx).is_none()
                || self.regions.contains_key(&idx)
            {
                continue;
            }
            let region = scan_region(cx, idx)?;
            self.in_region.extend(region.ops.iter().copied());
            self.regions.insert(idx, region);
        }
        Ok(())
    }

    fn walk_threads(&mut self) -> LiptonResult<usize> {
        let cx = self.cx;
        let mut changes = 0;
        for thread in cx.threads.iter() {
            let first = traversal::first_point(cx.program, thread.proc);
            let mut areas =
                self.result.areas.remove(&thread.idx).unwrap_or_default();
            let mut walker = ThreadWalker {
                cx,
                mode: self.result.mode,
                conflict_checks: self.result.conflict_checks,
                thread: thread.idx,
                root: thread.proc,
                regions: &self.regions,
                in_region: &self.in_region,
                stray_ends: &mut self.stray_ends,
                requests: &mut self.result.requests,
                op_areas: &mut self.result.op_areas,
                changes: 0,
            };
            walker.file(
                first.op(cx.program),
                BlockKind::LoopBreak,
                Placement::Before,
                &[],
            );
            traversal::walk(
                cx.program,
                first,
                Area::Pre,
                &mut walker,
                &mut areas,
            )?;
            changes += walker.changes;
            self.result.areas.insert(thread.idx, areas);
        }
        Ok(changes)
    }
}

fn scan_region(cx: &Analysis, begin: OpIdx) -> LiptonResult<AtomicRegion> {
    let region = AtomicRegion::scan(cx.program, &cx.movability, begin)?;
    log::debug!(
        "atomic region at {}: {} with {} exits",
        cx.program.describe(begin),
        region.kind,
        region.exits.len()
    );
    Ok(region)
}

/// [Processor] tracking the phase of a single thread.
struct ThreadWalker<'w, 'a> {
    cx: &'a Analysis<'a>,
    mode: Mode,
    conflict_checks: bool,
    thread: ThreadIdx,
    root: ProcIdx,
    regions: &'w HashMap<OpIdx, AtomicRegion>,
    in_region: &'w HashSet<OpIdx>,
    stray_ends: &'w mut HashSet<OpIdx>,
    requests: &'w mut BlockStarts,
    op_areas: &'w mut HashMap<OpIdx, Area>,
    changes: usize,
}

type Request = Option<(BlockKind, Placement)>;

impl ThreadWalker<'_, '_> {
    /// Phase after a mover of kind `mover` runs in `area`, and the request
    /// needed to keep the reduction sound.
    fn transition(&self, mover: MoverKind, area: Area) -> (Area, Request) {
        let dynamic = self.mode == Mode::Dynamic;
        match mover {
            MoverKind::Both => (area, None),
            MoverKind::Right => {
                let req = area.may_be_post().then(|| {
                    let kind = if dynamic {
                        BlockKind::PhaseDynamic
                    } else {
                        BlockKind::Static
                    };
                    (kind, Placement::After)
                });
                (Area::Pre, req)
            }
            MoverKind::Left => {
                let req = (dynamic && area != Area::Post)
                    .then_some((BlockKind::PhaseShift, Placement::After));
                (Area::Post, req)
            }
            // Ends in Post even when the request resets the phase.
            MoverKind::None => {
                let req = if area.may_be_post() {
                    let kind = match self.mode {
                        Mode::Static => BlockKind::Static,
                        Mode::Dynamic if self.conflict_checks => {
                            BlockKind::DynamicConflict
                        }
                        Mode::Dynamic => BlockKind::PhaseDynamic,
                    };
                    Some((kind, Placement::After))
                } else {
                    dynamic.then_some((BlockKind::PhaseShift, Placement::After))
                };
                (Area::Post, req)
            }
        }
    }

    fn file(
        &mut self,
        op: OpIdx,
        kind: BlockKind,
        placement: Placement,
        sources: &[OpIdx],
    ) {
        let sources = if kind == BlockKind::DynamicConflict {
            sources
        } else {
            &[]
        };
        let program = self.cx.program;
        let at = || program.describe(op);
        match self.requests.file(self.thread, op, kind, placement, sources) {
            Filed::New => {
                log::debug!("{kind} request {placement} {}", at());
                self.changes += 1;
            }
            Filed::Upgraded(from) => {
                if from.is_dynamic() {
                    log::warn!("upgrading {from} request at {} to {kind}", at());
                } else {
                    log::debug!("upgrading {from} request at {} to {kind}", at());
                }
                self.changes += 1;
            }
            Filed::Dropped => {}
        }
    }

    /// Apply the joined kind of the atomic region starting at `begin` and
    /// resume at its exits.
    fn region(&mut self, begin: OpIdx, area: Area) -> LiptonResult<Step> {
        let region = match self.regions.get(&begin) {
            Some(region) => region.clone(),
            None => scan_region(self.cx, begin)?,
        };
        let (next, req) = self.transition(region.kind, area);
        if let Some((kind, placement)) = req {
            let sources = region
                .ops
                .iter()
                .flat_map(|op| self.cx.conflicts.conflicts_with(*op))
                .copied()
                .sorted()
                .dedup()
                .collect_vec();
            // Mover requests follow the operation, so they land on the
            // closing markers.
            for end in &region.ends {
                self.file(*end, kind, placement, &sources);
            }
        }
        Ok(Step::Jump(next, region.exits.iter().copied().collect()))
    }
}

impl Processor for ThreadWalker<'_, '_> {
    fn visit_op(&mut self, op: OpIdx, area: Area) -> LiptonResult<Step> {
        self.op_areas
            .entry(op)
            .and_modify(|a| *a = a.join(area))
            .or_insert(area);
        match self.cx.program.ops[op].lib_call() {
            Some(LibCall::Yield) => return Ok(Step::Continue(Area::Pre)),
            Some(LibCall::AtomicBegin) => return self.region(op, area),
            Some(LibCall::AtomicEnd) => {
                if self.stray_ends.insert(op) {
                    log::warn!(
                        "ignoring atomic end outside of any atomic region at {}",
                        self.cx.program.describe(op)
                    );
                }
                return Ok(Step::Continue(area));
            }
            _ => {}
        }
        let mover = self.cx.movability.movable(op);
        let (next, req) = self.transition(mover, area);
        if let Some((kind, placement)) = req {
            let cx = self.cx;
            self.file(op, kind, placement, cx.conflicts.conflicts_with(op));
        }
        Ok(Step::Continue(next))
    }

    fn call_successors(
        &mut self,
        _call: OpIdx,
        callee: ProcIdx,
        _cont: Point,
    ) -> Successors {
        smallvec![Point::entry(self.cx.program.procs[callee].entry)]
    }

    fn return_successors(&mut self, proc: ProcIdx) -> Successors {
        if proc == self.root {
            return Successors::new();
        }
        let program = self.cx.program;
        // Calls inside an atomic region resume at the region's exits.
        self.cx
            .collected
            .return_sites
            .get(&proc)
            .map(|sites| {
                sites
                    .iter()
                    .filter(|site| {
                        let call = program.blocks[site.block].ops
                            [site.start as usize - 1];
                        !self.in_region.contains(&call)
                    })
                    .copied()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn revisit(
        &mut self,
        point: Point,
        _recorded: Area,
        incoming: Area,
        edge: Edge,
    ) -> LiptonResult<()> {
        if incoming == Area::Pre {
            return Ok(());
        }
        let kind = match (edge, self.mode) {
            (Edge::Back, _) | (Edge::Cross, Mode::Static) => BlockKind::LoopBreak,
            (Edge::Cross, Mode::Dynamic) => BlockKind::PhaseDynamic,
        };
        self.file(point.op(self.cx.program), kind, Placement::Before, &[]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(i: u32) -> OpIdx {
        OpIdx::from(i)
    }

    #[test]
    fn weaker_requests_are_dropped() {
        let t = ThreadIdx::from(0u32);
        let mut reqs = BlockStarts::default();
        let filed = reqs.file(t, op(1), BlockKind::Static, Placement::After, &[]);
        assert_eq!(filed, Filed::New);
        let filed =
            reqs.file(t, op(1), BlockKind::LoopBreak, Placement::Before, &[]);
        assert_eq!(filed, Filed::Dropped);
        let filed = reqs.file(t, op(1), BlockKind::Static, Placement::Before, &[]);
        assert_eq!(filed, Filed::Dropped);

        let req = reqs.get(t, op(1)).unwrap();
        assert_eq!(req.kind, BlockKind::Static);
        assert_eq!(req.placement, Placement::After);
        assert_eq!(reqs.len(), 1);
    }

    #[test]
    fn stronger_requests_keep_the_id() {
        let t = ThreadIdx::from(0u32);
        let other = ThreadIdx::from(1u32);
        let mut reqs = BlockStarts::default();
        reqs.file(t, op(0), BlockKind::LoopBreak, Placement::Before, &[]);
        reqs.file(t, op(4), BlockKind::PhaseShift, Placement::After, &[]);
        reqs.file(other, op(9), BlockKind::LoopBreak, Placement::Before, &[]);

        let filed = reqs.file(t, op(0), BlockKind::Static, Placement::After, &[]);
        assert_eq!(filed, Filed::Upgraded(BlockKind::LoopBreak));
        let req = reqs.get(t, op(0)).unwrap();
        assert_eq!((req.id, req.kind), (0, BlockKind::Static));
        assert_eq!(req.placement, Placement::After);

        let ids: Vec<_> = reqs.of_thread(t).map(|r| (r.op, r.id)).collect();
        assert_eq!(ids, vec![(op(0), 0), (op(4), 1)]);
        // Ids are per thread.
        assert_eq!(reqs.get(other, op(9)).unwrap().id, 0);
    }

    #[test]
    fn upgrades_report_the_replaced_kind() {
        let t = ThreadIdx::from(0u32);
        let mut reqs = BlockStarts::default();
        reqs.file(t, op(2), BlockKind::PhaseDynamic, Placement::After, &[]);
        let filed = reqs.file(
            t,
            op(2),
            BlockKind::DynamicConflict,
            Placement::After,
            &[op(7)],
        );
        // Replacing a dynamic request is what the phase tracker warns about.
        let Filed::Upgraded(from) = filed else {
            panic!("expected an upgrade, got {filed:?}");
        };
        assert!(from.is_dynamic());
        assert!(!BlockKind::LoopBreak.is_dynamic());
        assert!(!BlockKind::Static.is_dynamic());
        assert_eq!(reqs.get(t, op(2)).unwrap().sources, vec![op(7)]);
    }

    #[test]
    fn conflict_sources_are_merged() {
        let t = ThreadIdx::from(0u32);
        let mut reqs = BlockStarts::default();
        let kind = BlockKind::DynamicConflict;
        reqs.file(t, op(3), kind, Placement::After, &[op(8), op(5)]);
        let filed = reqs.file(t, op(3), kind, Placement::After, &[op(6), op(5)]);
        assert_eq!(filed, Filed::Dropped);
        assert_eq!(
            reqs.get(t, op(3)).unwrap().sources,
            vec![op(5), op(6), op(8)]
        );

        // A weaker request leaves the sources alone.
        reqs.file(t, op(3), BlockKind::PhaseDynamic, Placement::After, &[op(1)]);
        assert_eq!(reqs.get(t, op(3)).unwrap().sources.len(), 3);
    }

    #[test]
    fn mode_names() {
        assert_eq!("dynamic".parse::<Mode>().unwrap(), Mode::Dynamic);
        assert!("lazy".parse::<Mode>().is_err());
        assert_eq!(BlockKind::DynamicConflict.to_string(), "dynamic-conflict");
        assert!(BlockKind::LoopBreak < BlockKind::PhaseShift);
        assert!(BlockKind::DynamicConflict < BlockKind::Static);
    }
}
