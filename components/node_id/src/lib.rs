//! Stable node identity.
//!
//! A [`NodeId`] is an opaque, monotonically assigned integer: the document
//! root is assigned first, ids are never reused once retired, and every
//! observed (recorder) or materialized (player) node carries exactly one.
//! [`NodeIdMap`] is the single source of truth binding ids to whatever
//! handle type a host tree uses to identify its nodes.

use rustc_hash::FxHashMap;
use std::hash::Hash;

/// Opaque, non-negative, monotonically assigned node identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u64);

impl NodeId {
    /// Only `NodeIdMap` and wire decoders should construct a `NodeId` from a
    /// raw value; everyone else receives ids from `assign_if_absent`.
    pub fn from_raw(value: u64) -> Self {
        NodeId(value)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Bidirectional association between [`NodeId`]s and a host's node handles.
///
/// `H` is whatever a host tree uses to name one of its nodes (an arena
/// index, for instance). Equality and hashing on `H` must reflect node
/// identity, not node content — two distinct nodes with identical content
/// must compare unequal.
pub struct NodeIdMap<H> {
    by_handle: FxHashMap<H, NodeId>,
    by_id: Vec<Option<H>>,
    next: u64,
}

impl<H> Default for NodeIdMap<H>
where
    H: Clone + Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<H> NodeIdMap<H>
where
    H: Clone + Eq + Hash,
{
    pub fn new() -> Self {
        NodeIdMap {
            by_handle: FxHashMap::default(),
            by_id: Vec::new(),
            next: 0,
        }
    }

    /// Returns the existing id for `handle`, or assigns and returns a fresh
    /// one. Idempotent.
    pub fn assign_if_absent(&mut self, handle: H) -> NodeId {
        if let Some(&id) = self.by_handle.get(&handle) {
            return id;
        }
        let id = NodeId(self.next);
        self.next += 1;
        self.by_handle.insert(handle.clone(), id);
        self.by_id.push(Some(handle));
        id
    }

    pub fn get_id(&self, handle: &H) -> Option<NodeId> {
        self.by_handle.get(handle).copied()
    }

    pub fn get_handle(&self, id: NodeId) -> Option<&H> {
        self.by_id.get(id.0 as usize).and_then(|slot| slot.as_ref())
    }

    pub fn contains_id(&self, id: NodeId) -> bool {
        self.get_handle(id).is_some()
    }

    /// Assigns ids, in order, to every handle in `handles_in_document_order`
    /// that doesn't already have one. Returns the id for each handle, in
    /// the same order they were given.
    pub fn adopt_subtree<I>(&mut self, handles_in_document_order: I) -> Vec<NodeId>
    where
        I: IntoIterator<Item = H>,
    {
        handles_in_document_order
            .into_iter()
            .map(|handle| self.assign_if_absent(handle))
            .collect()
    }

    /// Retires every handle in `handles`. Order does not matter. After this
    /// call, `get_id`/`get_handle` return `None` for each retired handle/id.
    pub fn remove_subtree<I>(&mut self, handles: I)
    where
        I: IntoIterator<Item = H>,
    {
        for handle in handles {
            if let Some(id) = self.by_handle.remove(&handle) {
                if let Some(slot) = self.by_id.get_mut(id.0 as usize) {
                    *slot = None;
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.by_handle.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_handle.is_empty()
    }
}
