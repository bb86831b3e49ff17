//! Analyses over [Program](lipton_ir::Program)s.
//!
//! The analyses build the oracles the passes query: whole-program
//! reachability, threads, alias sets, locksets, conflicts and mover kinds.
mod alias_sets;
mod atomic_region;
mod bit_matrix;
mod call_graph;
mod conflicts;
mod lockset;
mod movability;
mod reachability;
mod scc_graph;
mod threads;

pub use alias_sets::{AliasOracle, AliasSet, AliasSetTracker, LocationAliasing};
pub use atomic_region::AtomicRegion;
pub use bit_matrix::{BitMatrix, BitVector};
pub use call_graph::CallGraph;
pub use conflicts::ConflictIndex;
pub use lockset::{HeldLock, LockSet, LockSets};
pub use movability::{Movability, MoverKind};
pub use reachability::Reachability;
pub use scc_graph::{SccGraph, SccIdx};
pub use threads::{Thread, ThreadIdx, Threads};
