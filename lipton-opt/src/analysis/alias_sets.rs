use lipton_ir::{Location, OpIdx, OpKind, Operation, Program};
use smallvec::SmallVec;

/// Answers may-alias queries between memory operations.
pub trait AliasOracle {
    /// May `a` and `b` access overlapping storage? Only called on memory
    /// operations.
    fn may_alias(&self, a: &Operation, b: &Operation) -> bool;
}

/// Two accesses alias when they name the same location or when either
/// location is unknown.
#[derive(Default, Clone, Copy, Debug)]
pub struct LocationAliasing;

fn location(op: &Operation) -> Option<Location> {
    match op.kind {
        OpKind::Memory { loc, .. } => Some(loc),
        _ => None,
    }
}

impl AliasOracle for LocationAliasing {
    fn may_alias(&self, a: &Operation, b: &Operation) -> bool {
        match (location(a), location(b)) {
            (Some(Location::Unknown), Some(_))
            | (Some(_), Some(Location::Unknown)) => true,
            (Some(x), Some(y)) => x == y,
            _ => false,
        }
    }
}

/// Memory operations of one thread that may touch overlapping storage.
#[derive(Debug, Clone, Default)]
pub struct AliasSet {
    ops: SmallVec<[OpIdx; 4]>,
}

impl AliasSet {
    pub fn ops(&self) -> &[OpIdx] {
        &self.ops
    }

    fn may_alias(
        &self,
        program: &Program,
        oracle: &dyn AliasOracle,
        op: OpIdx,
    ) -> bool {
        self.ops
            .iter()
            .any(|o| oracle.may_alias(&program.ops[*o], &program.ops[op]))
    }
}

/// The alias sets of one thread. Sets are kept disjoint: inserting an
/// operation merges every set it may alias.
#[derive(Debug, Clone, Default)]
pub struct AliasSetTracker {
    sets: Vec<AliasSet>,
}

impl AliasSetTracker {
    /// Add a memory operation. Anything else is ignored.
    pub fn insert(
        &mut self,
        program: &Program,
        oracle: &dyn AliasOracle,
        op: OpIdx,
    ) {
        if !program.ops[op].is_memory() || self.contains(op) {
            return;
        }
        let (aliasing, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.sets)
            .into_iter()
            .partition(|set| set.may_alias(program, oracle, op));
        self.sets = rest;
        let mut merged = AliasSet::default();
        for set in aliasing {
            merged.ops.extend(set.ops);
        }
        merged.ops.push(op);
        merged.ops.sort();
        self.sets.push(merged);
    }

    pub fn contains(&self, op: OpIdx) -> bool {
        self.sets.iter().any(|s| s.ops.contains(&op))
    }

    pub fn sets(&self) -> &[AliasSet] {
        &self.sets
    }

    /// Sets containing an operation that may alias `op`. `op` itself does
    /// not have to belong to this tracker.
    pub fn aliasing<'a>(
        &'a self,
        program: &'a Program,
        oracle: &'a dyn AliasOracle,
        op: OpIdx,
    ) -> impl Iterator<Item = &'a AliasSet> + 'a {
        self.sets
            .iter()
            .filter(move |s| s.may_alias(program, oracle, op))
    }
}
