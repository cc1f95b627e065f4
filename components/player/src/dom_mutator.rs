//! [`DomMutator`] (spec.md §4.8): applies the five structural/attribute/text
//! operations a `DomMutator` op list carries, one at a time. Every op whose
//! required state doesn't hold logs and is skipped rather than aborting the
//! whole batch — a single malformed op must never take the rest of the
//! frame down with it.

use crate::asset_host::AssetHost;
use crate::dom_materializer::DomMaterializer;
use crate::node_map::PlayerNodeMap;
use asset_pipeline::AssetRegistry;
use dom_model::{LiveDocument, LiveNodeKind, VNode};
use node_id::NodeId;
use text_diff::TextOp;

pub struct DomMutator<'a> {
    ids: &'a mut PlayerNodeMap,
    assets: &'a mut AssetRegistry<AssetHost>,
}

impl<'a> DomMutator<'a> {
    pub fn new(ids: &'a mut PlayerNodeMap, assets: &'a mut AssetRegistry<AssetHost>) -> Self {
        DomMutator { ids, assets }
    }

    /// `insert { parentId, index, node }`. A `node` id already bound to a
    /// live slot (should not normally happen — every materialized node is
    /// freshly constructed) is detached first, matching the spec's literal
    /// "detach from any prior parent" wording.
    pub fn insert(&mut self, doc: &mut LiveDocument, parent_id: NodeId, index: usize, node: &VNode) {
        let Some(parent) = self.ids.slot_for(parent_id) else {
            log::error!("insert: unknown parent node id {parent_id:?}");
            return;
        };
        if let Some(old_slot) = self.ids.slot_for(node.id()) {
            match doc.remove(old_slot) {
                Ok(removed) => self.ids.retire_subtree(removed),
                Err(err) => log::error!("insert: failed to detach prior instance of {:?}: {err}", node.id()),
            }
        }
        let mut materializer = DomMaterializer::new(self.ids, self.assets);
        if let Err(err) = materializer.materialize_node(doc, parent, index, node) {
            log::error!("insert: {err}");
        }
    }

    /// `remove { nodeId }`. A node already absent (already detached) is a
    /// no-op, not an error.
    pub fn remove(&mut self, doc: &mut LiveDocument, node_id: NodeId) {
        let Some(slot) = self.ids.slot_for(node_id) else {
            return;
        };
        match doc.remove(slot) {
            Ok(removed) => self.ids.retire_subtree(removed),
            Err(err) => log::error!("remove: {err}"),
        }
    }

    /// `updateAttribute { nodeId, name, value }`. Rebinds `name` through
    /// `AssetRegistry` using the new raw value; `AssetRegistry` has no
    /// single-attribute release primitive to pair with this literal
    /// "rebind", so a changed attribute that drops an old asset reference
    /// without adopting a new one can over-count — documented as an
    /// accepted limitation.
    pub fn update_attribute(&mut self, doc: &mut LiveDocument, node_id: NodeId, name: &str, value: &str) {
        let Some(slot) = self.ids.slot_for(node_id) else {
            log::error!("updateAttribute: unknown node id {node_id:?}");
            return;
        };
        match doc.kind(slot) {
            Ok(LiveNodeKind::Element { .. }) => {
                let rewritten = self.assets.bind_element_attribute(AssetHost::Node(slot), name, value);
                if let Err(err) = doc.set_attribute(slot, name, &rewritten) {
                    log::error!("updateAttribute: {err}");
                }
            },
            Ok(_) => {}, // attribute ops silently skip non-element nodes
            Err(err) => log::error!("updateAttribute: {err}"),
        }
    }

    /// `removeAttribute { nodeId, name }`. Idempotent; silently skips
    /// non-element nodes.
    pub fn remove_attribute(&mut self, doc: &mut LiveDocument, node_id: NodeId, name: &str) {
        let Some(slot) = self.ids.slot_for(node_id) else {
            log::error!("removeAttribute: unknown node id {node_id:?}");
            return;
        };
        match doc.kind(slot) {
            Ok(LiveNodeKind::Element { .. }) => {
                if let Err(err) = doc.remove_attribute(slot, name) {
                    log::error!("removeAttribute: {err}");
                }
            },
            Ok(_) => {},
            Err(err) => log::error!("removeAttribute: {err}"),
        }
    }

    /// `updateText { nodeId, ops }`. Requires a text, comment, or CDATA
    /// node; applies the diff ops against the node's current content.
    pub fn update_text(&mut self, doc: &mut LiveDocument, node_id: NodeId, ops: &[TextOp]) {
        let Some(slot) = self.ids.slot_for(node_id) else {
            log::error!("updateText: unknown node id {node_id:?}");
            return;
        };
        let current = match doc.kind(slot) {
            Ok(LiveNodeKind::Text(s) | LiveNodeKind::Cdata(s) | LiveNodeKind::Comment(s)) => s.clone(),
            Ok(_) => {
                log::error!("updateText: node {node_id:?} is not a text, comment, or CDATA node");
                return;
            },
            Err(err) => {
                log::error!("updateText: {err}");
                return;
            },
        };
        match text_diff::apply(&current, ops) {
            Ok(new_text) => {
                if let Err(err) = doc.set_character_data(slot, new_text) {
                    log::error!("updateText: {err}");
                }
            },
            Err(err) => log::error!("updateText: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dom_model::{StyleSheetId, VCharacterData, VElement, VStyleSheet};

    fn el(id: u64, tag: &str) -> VNode {
        VNode::Element(VElement {
            id: NodeId::from_raw(id),
            tag: tag.to_string(),
            namespace: None,
            attrs: vec![],
            children: vec![],
            shadow: None,
        })
    }

    fn text(id: u64, data: &str) -> VNode {
        VNode::Text(VCharacterData { id: NodeId::from_raw(id), data: data.to_string() })
    }

    fn harness() -> (LiveDocument, PlayerNodeMap, AssetRegistry<AssetHost>) {
        let doc = LiveDocument::new();
        let ids = PlayerNodeMap::new();
        let assets = AssetRegistry::new();
        (doc, ids, assets)
    }

    #[test]
    fn insert_materializes_and_binds_the_new_subtree() {
        let (mut doc, mut ids, mut assets) = harness();
        let root_id = NodeId::from_raw(0);
        ids.bind(doc.root(), root_id);
        let node = el(1, "div");

        DomMutator::new(&mut ids, &mut assets).insert(&mut doc, root_id, 0, &node);

        let slot = ids.slot_for(NodeId::from_raw(1)).unwrap();
        assert!(matches!(doc.kind(slot).unwrap(), LiveNodeKind::Element { tag, .. } if tag == "div"));
    }

    #[test]
    fn insert_with_unknown_parent_is_skipped_without_panicking() {
        let (mut doc, mut ids, mut assets) = harness();
        let node = el(1, "div");
        DomMutator::new(&mut ids, &mut assets).insert(&mut doc, NodeId::from_raw(999), 0, &node);
        assert!(ids.slot_for(NodeId::from_raw(1)).is_none());
    }

    #[test]
    fn remove_retires_the_subtree_and_is_idempotent() {
        let (mut doc, mut ids, mut assets) = harness();
        let root_id = NodeId::from_raw(0);
        ids.bind(doc.root(), root_id);
        DomMutator::new(&mut ids, &mut assets).insert(&mut doc, root_id, 0, &el(1, "div"));

        let mut mutator = DomMutator::new(&mut ids, &mut assets);
        mutator.remove(&mut doc, NodeId::from_raw(1));
        assert!(doc.children(doc.root()).unwrap().is_empty());
        assert!(ids.slot_for(NodeId::from_raw(1)).is_none());

        // Removing again is a no-op, not an error.
        mutator.remove(&mut doc, NodeId::from_raw(1));
    }

    #[test]
    fn update_attribute_rewrites_through_asset_registry() {
        let (mut doc, mut ids, mut assets) = harness();
        let root_id = NodeId::from_raw(0);
        ids.bind(doc.root(), root_id);
        DomMutator::new(&mut ids, &mut assets).insert(&mut doc, root_id, 0, &el(1, "img"));

        DomMutator::new(&mut ids, &mut assets).update_attribute(&mut doc, NodeId::from_raw(1), "src", "asset:7");

        let slot = ids.slot_for(NodeId::from_raw(1)).unwrap();
        let value = doc.attribute(slot, "src").unwrap().unwrap();
        assert!(value.starts_with("asset-placeholder:"));
    }

    #[test]
    fn update_attribute_on_text_node_is_silently_skipped() {
        let (mut doc, mut ids, mut assets) = harness();
        let root_id = NodeId::from_raw(0);
        ids.bind(doc.root(), root_id);
        DomMutator::new(&mut ids, &mut assets).insert(&mut doc, root_id, 0, &text(1, "hi"));

        DomMutator::new(&mut ids, &mut assets).update_attribute(&mut doc, NodeId::from_raw(1), "src", "x");
    }

    #[test]
    fn remove_attribute_is_idempotent() {
        let (mut doc, mut ids, mut assets) = harness();
        let root_id = NodeId::from_raw(0);
        ids.bind(doc.root(), root_id);
        DomMutator::new(&mut ids, &mut assets).insert(&mut doc, root_id, 0, &el(1, "div"));
        DomMutator::new(&mut ids, &mut assets).update_attribute(&mut doc, NodeId::from_raw(1), "class", "a");

        let mut mutator = DomMutator::new(&mut ids, &mut assets);
        mutator.remove_attribute(&mut doc, NodeId::from_raw(1), "class");
        mutator.remove_attribute(&mut doc, NodeId::from_raw(1), "class");

        let slot = ids.slot_for(NodeId::from_raw(1)).unwrap();
        assert_eq!(doc.attribute(slot, "class").unwrap(), None);
    }

    #[test]
    fn update_text_applies_diff_ops() {
        let (mut doc, mut ids, mut assets) = harness();
        let root_id = NodeId::from_raw(0);
        ids.bind(doc.root(), root_id);
        DomMutator::new(&mut ids, &mut assets).insert(&mut doc, root_id, 0, &text(1, "hello"));

        let ops = text_diff::diff("hello", "hello world");
        DomMutator::new(&mut ids, &mut assets).update_text(&mut doc, NodeId::from_raw(1), &ops);

        let slot = ids.slot_for(NodeId::from_raw(1)).unwrap();
        assert!(matches!(doc.kind(slot).unwrap(), LiveNodeKind::Text(s) if s == "hello world"));
    }

    #[test]
    fn update_text_on_element_node_is_skipped_without_panicking() {
        let (mut doc, mut ids, mut assets) = harness();
        let root_id = NodeId::from_raw(0);
        ids.bind(doc.root(), root_id);
        DomMutator::new(&mut ids, &mut assets).insert(&mut doc, root_id, 0, &el(1, "div"));

        let ops = text_diff::diff("", "x");
        DomMutator::new(&mut ids, &mut assets).update_text(&mut doc, NodeId::from_raw(1), &ops);
    }

    #[test]
    fn adopted_style_sheet_host_rebind_is_unaffected_by_attribute_ops() {
        // Sanity check that AssetHost::Sheet and AssetHost::Node are
        // distinguishable in the same registry.
        let mut assets: AssetRegistry<AssetHost> = AssetRegistry::new();
        let sheet_id = StyleSheetId::Adopted(1);
        let rewritten = assets.bind_stylesheet_text(AssetHost::Sheet(sheet_id), "url(asset:1)");
        assert!(rewritten.contains("asset-placeholder:"));
        let _ = VStyleSheet { id: sheet_id, media: None, text: rewritten };
    }
}
