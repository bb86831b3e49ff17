//! Quotient graph over strongly connected components with an incrementally
//! maintained transitive closure.
//!
//! Nodes must be created and linked in post-order of the underlying graph:
//! every node a link points to has to be [locked](SccGraph::lock) first, so
//! its reachability row is final and can simply be OR-ed into the source
//! row. This makes the cost of building the closure linear in the number of
//! links.
use super::bit_matrix::BitMatrix;
use lipton_idx::{IndexRef, impl_index, maps::IndexedMap};
use lipton_utils::{Error, LiptonResult};
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

/// Index of a node in an [SccGraph].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SccIdx(u32);
impl_index!(SccIdx);

#[derive(Debug)]
struct SccNode<E> {
    non_trivial: bool,
    locked: bool,
    members: Vec<E>,
    parent: Option<SccIdx>,
}

#[derive(Debug)]
pub struct SccGraph<E> {
    nodes: IndexedMap<SccIdx, SccNode<E>>,
    reach: BitMatrix,
    node_of: HashMap<E, SccIdx>,
}

impl<E> Default for SccGraph<E> {
    fn default() -> Self {
        Self {
            nodes: IndexedMap::new(),
            reach: BitMatrix::new(),
            node_of: HashMap::new(),
        }
    }
}

impl<E> SccGraph<E>
where
    E: Copy + Eq + Hash + Debug,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Allocate a node. Non-trivial nodes reach themselves.
    pub fn create_node(&mut self, non_trivial: bool) -> SccIdx {
        let idx = self.nodes.push(SccNode {
            non_trivial,
            locked: false,
            members: vec![],
            parent: None,
        });
        let n = self.nodes.len();
        self.reach.ensure(n, n);
        if non_trivial {
            self.reach.set(idx.index(), idx.index());
        }
        idx
    }

    pub fn add_member(&mut self, node: SccIdx, elem: E) -> LiptonResult<()> {
        if let Some(prev) = self.node_of.insert(elem, node) {
            return Err(Error::ordering(format!(
                "{elem:?} was added to node {} and again to node {}",
                prev.index(),
                node.index()
            )));
        }
        self.nodes[node].members.push(elem);
        Ok(())
    }

    pub fn set_parent(&mut self, node: SccIdx, parent: SccIdx) {
        self.nodes[node].parent = Some(parent);
    }

    pub fn parent(&self, node: SccIdx) -> Option<SccIdx> {
        self.nodes[node].parent
    }

    pub fn members(&self, node: SccIdx) -> &[E] {
        &self.nodes[node].members
    }

    pub fn is_non_trivial(&self, node: SccIdx) -> bool {
        self.nodes[node].non_trivial
    }

    pub fn is_locked(&self, node: SccIdx) -> bool {
        self.nodes[node].locked
    }

    /// Node that `elem` belongs to.
    pub fn node_of(&self, elem: E) -> Option<SccIdx> {
        self.node_of.get(&elem).copied()
    }

    /// Record that `from` reaches `to` and everything `to` reaches.
    pub fn link(&mut self, from: SccIdx, to: SccIdx) -> LiptonResult<()> {
        if from == to {
            if self.nodes[from].non_trivial {
                return Ok(());
            }
            return Err(Error::ordering(format!(
                "self link on trivial node {}",
                from.index()
            )));
        }
        if self.nodes[from].locked {
            return Err(Error::ordering(format!(
                "link {} -> {}: source node is already locked",
                from.index(),
                to.index()
            )));
        }
        if !self.nodes[to].locked {
            return Err(Error::ordering(format!(
                "link {} -> {}: target node is not locked yet",
                from.index(),
                to.index()
            )));
        }
        self.reach.set(from.index(), to.index());
        self.reach.copy_row_or(from.index(), to.index());
        Ok(())
    }

    /// Mark the outgoing links of `node` as complete.
    pub fn lock(&mut self, node: SccIdx) {
        self.nodes[node].locked = true;
    }

    /// Does node `a` reach node `b`?
    ///
    /// # Panics
    /// If `a` is still unlocked: its row may be incomplete.
    pub fn reach_nodes(&self, a: SccIdx, b: SccIdx) -> bool {
        assert!(
            self.nodes[a].locked,
            "reachability queried from unlocked node {}",
            a.index()
        );
        self.reach.get(a.index(), b.index())
    }
}
