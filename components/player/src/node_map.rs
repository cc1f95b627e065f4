//! [`PlayerNodeMap`]: binds wire-declared [`NodeId`]s to this side's
//! `dom_model::Slot` handles.
//!
//! `node_id::NodeIdMap` always mints its own id on first sight of a
//! handle — exactly right for the recorder, which is the side that
//! invents ids in the first place, but wrong here: every id a player
//! sees arrives already assigned, over the wire, and must be recorded
//! verbatim rather than replaced with a freshly-minted one. This is a
//! plain bidirectional table with that one discipline, not a
//! `NodeIdMap` generalization.

use dom_model::Slot;
use node_id::NodeId;
use rustc_hash::FxHashMap;

#[derive(Default)]
pub struct PlayerNodeMap {
    by_slot: FxHashMap<Slot, NodeId>,
    by_id: FxHashMap<NodeId, Slot>,
}

impl PlayerNodeMap {
    pub fn new() -> Self {
        PlayerNodeMap { by_slot: FxHashMap::default(), by_id: FxHashMap::default() }
    }

    /// Records that `id` names `slot` in this document. Overwrites any
    /// prior binding for either side, matching a materializer that never
    /// rebinds an id it has already seen for a live node.
    pub fn bind(&mut self, slot: Slot, id: NodeId) {
        self.by_slot.insert(slot, id);
        self.by_id.insert(id, slot);
    }

    pub fn slot_for(&self, id: NodeId) -> Option<Slot> {
        self.by_id.get(&id).copied()
    }

    pub fn id_for(&self, slot: Slot) -> Option<NodeId> {
        self.by_slot.get(&slot).copied()
    }

    pub fn contains_id(&self, id: NodeId) -> bool {
        self.by_id.contains_key(&id)
    }

    /// Retires every slot in `slots` (and its bound id, if any). Called
    /// with the full preorder subtree `LiveDocument::remove` returns.
    pub fn retire_subtree(&mut self, slots: impl IntoIterator<Item = Slot>) {
        for slot in slots {
            if let Some(id) = self.by_slot.remove(&slot) {
                self.by_id.remove(&id);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.by_slot.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_slot.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dom_model::LiveDocument;

    #[test]
    fn bind_is_queryable_from_both_directions() {
        let mut map = PlayerNodeMap::new();
        let doc = LiveDocument::new();
        let root = doc.root();
        let id = NodeId::from_raw(42);
        map.bind(root, id);
        assert_eq!(map.slot_for(id), Some(root));
        assert_eq!(map.id_for(root), Some(id));
        assert!(map.contains_id(id));
    }

    #[test]
    fn retire_subtree_drops_both_directions() {
        let mut map = PlayerNodeMap::new();
        let doc = LiveDocument::new();
        let root = doc.root();
        let id = NodeId::from_raw(1);
        map.bind(root, id);
        map.retire_subtree([root]);
        assert_eq!(map.slot_for(id), None);
        assert_eq!(map.id_for(root), None);
        assert!(map.is_empty());
    }

    #[test]
    fn unknown_id_or_slot_is_none() {
        let map = PlayerNodeMap::new();
        assert_eq!(map.slot_for(NodeId::from_raw(7)), None);
    }
}
