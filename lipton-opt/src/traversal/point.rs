use lipton_ir::{BlockIdx, OpIdx, Program};
use serde::Serialize;

/// A control-flow point: a block entered at some operation offset. Offsets
/// other than 0 are the continuations of calls and the exits of atomic
/// regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Point {
    pub block: BlockIdx,
    pub start: u32,
}

impl Point {
    /// The beginning of `block`.
    pub fn entry(block: BlockIdx) -> Self {
        Point { block, start: 0 }
    }

    /// The operation executed first at this point.
    pub fn op(&self, program: &Program) -> OpIdx {
        program.blocks[self.block].ops[self.start as usize]
    }
}

/// Commit phase of a thread at some point of its execution.
///
/// `Top` means either phase, depending on the path taken. Joining the two
/// phases gives `Top`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Area {
    /// Before the commit point of the current transaction.
    Pre,
    /// After the commit point.
    Post,
    Top,
}

impl Area {
    pub fn join(self, other: Area) -> Area {
        if self == other { self } else { Area::Top }
    }

    /// Could the thread be past its commit point?
    pub fn may_be_post(self) -> bool {
        matches!(self, Area::Post | Area::Top)
    }
}

impl std::fmt::Display for Area {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Area::Pre => "pre",
            Area::Post => "post",
            Area::Top => "top",
        };
        write!(f, "{s}")
    }
}

/// How the walk arrived again at an already recorded point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    /// The point is still on the walk stack: a loop.
    Back,
    /// The point was fully explored before: paths re-converge.
    Cross,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn area_join() {
        assert_eq!(Area::Pre.join(Area::Pre), Area::Pre);
        assert_eq!(Area::Pre.join(Area::Post), Area::Top);
        assert_eq!(Area::Top.join(Area::Post), Area::Top);
        assert!(Area::Top.may_be_post());
        assert!(!Area::Pre.may_be_post());
    }
}
