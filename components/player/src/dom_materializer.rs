//! [`DomMaterializer`] (spec.md §4.7): builds a real `LiveDocument` subtree
//! out of a decoded `VDocument`/`VNode`, binding every URL-bearing
//! attribute and stylesheet text through `AssetRegistry` along the way.
//!
//! `VNode` is a closed enum, so "failure on unknown node type is a hard
//! error for that node" (spec.md §4.7) is enforced by the match below
//! being exhaustive — there is no variant left over to reject.

use crate::asset_host::AssetHost;
use crate::node_map::PlayerNodeMap;
use asset_pipeline::AssetRegistry;
use dom_model::{LiveDocument, LiveNodeKind, ModelError, Slot, VDocument, VNode, VStyleSheet};
use node_id::NodeId;

#[derive(Debug)]
pub struct MaterializeError(ModelError);

impl std::fmt::Display for MaterializeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "materialization failed: {}", self.0)
    }
}

impl std::error::Error for MaterializeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

impl From<ModelError> for MaterializeError {
    fn from(err: ModelError) -> Self {
        MaterializeError(err)
    }
}

pub struct DomMaterializer<'a> {
    ids: &'a mut PlayerNodeMap,
    assets: &'a mut AssetRegistry<AssetHost>,
}

impl<'a> DomMaterializer<'a> {
    pub fn new(ids: &'a mut PlayerNodeMap, assets: &'a mut AssetRegistry<AssetHost>) -> Self {
        DomMaterializer { ids, assets }
    }

    /// Full materialization (spec.md §4.7's `Keyframe` apply action):
    /// clears `doc`'s existing children, rebuilds the whole tree from
    /// `document`, and applies its adopted stylesheets.
    pub fn materialize_document(
        &mut self,
        doc: &mut LiveDocument,
        document: &VDocument,
    ) -> Result<(), MaterializeError> {
        self.clear(doc)?;
        let root = doc.root();
        self.ids.bind(root, document.id);
        for (index, child) in document.children.iter().enumerate() {
            self.materialize(doc, root, index, child, false)?;
        }
        self.apply_adopted_style_sheets(doc, root, &document.adopted_style_sheets);
        Ok(())
    }

    /// A single node's worth of materialization (spec.md §4.7's
    /// `DomNodeAdded` apply action) — builds `node` and its whole subtree
    /// as the `index`-th child of `parent`. Since every materialized node
    /// is freshly constructed, there is no prior parent to detach from.
    pub fn materialize_node(
        &mut self,
        doc: &mut LiveDocument,
        parent: Slot,
        index: usize,
        node: &VNode,
    ) -> Result<Slot, MaterializeError> {
        self.materialize(doc, parent, index, node, false)
    }

    /// Removes and retires every existing child of `doc`'s root.
    /// `LiveDocument::remove` mutates the children list it operates on, so
    /// the existing set is snapshotted first.
    fn clear(&mut self, doc: &mut LiveDocument) -> Result<(), MaterializeError> {
        let root = doc.root();
        let existing: Vec<Slot> = doc.children(root)?.to_vec();
        for child in existing {
            let removed = doc.remove(child)?;
            self.ids.retire_subtree(removed);
        }
        Ok(())
    }

    fn materialize(
        &mut self,
        doc: &mut LiveDocument,
        parent: Slot,
        index: usize,
        vnode: &VNode,
        into_shadow: bool,
    ) -> Result<Slot, MaterializeError> {
        match vnode {
            VNode::Element(el) => {
                let kind = LiveNodeKind::Element {
                    tag: el.tag.clone(),
                    namespace: el.namespace.clone(),
                    attrs: Vec::new(),
                    children: Vec::new(),
                    shadow: None,
                };
                let slot = self.insert(doc, parent, index, into_shadow, kind)?;
                self.ids.bind(slot, el.id);

                for (name, raw_value) in &el.attrs {
                    let rewritten = self.assets.bind_element_attribute(AssetHost::Node(slot), name, raw_value);
                    doc.set_attribute(slot, name, &rewritten)?;
                }

                if el.tag.eq_ignore_ascii_case("style") {
                    // The CSS text of a <style> element lives as its sole
                    // text child (dom_model's convention, matching how
                    // asset_pipeline's inliner reads it back on the
                    // recorder side).
                    let css_text = sole_text(&el.children);
                    let rewritten = self.assets.bind_stylesheet_text(AssetHost::Node(slot), &css_text);
                    doc.insert_child(slot, 0, LiveNodeKind::Text(rewritten))?;
                } else {
                    for (child_index, child) in el.children.iter().enumerate() {
                        self.materialize(doc, slot, child_index, child, false)?;
                    }
                }

                if let Some(shadow_children) = &el.shadow {
                    doc.attach_shadow(slot)?;
                    for (child_index, child) in shadow_children.iter().enumerate() {
                        self.materialize(doc, slot, child_index, child, true)?;
                    }
                }
                Ok(slot)
            },
            VNode::Text(t) => self.insert_leaf(doc, parent, index, into_shadow, LiveNodeKind::Text(t.data.clone()), t.id),
            VNode::Cdata(t) => {
                self.insert_leaf(doc, parent, index, into_shadow, LiveNodeKind::Cdata(t.data.clone()), t.id)
            },
            VNode::Comment(t) => {
                self.insert_leaf(doc, parent, index, into_shadow, LiveNodeKind::Comment(t.data.clone()), t.id)
            },
            VNode::ProcessingInstruction(p) => self.insert_leaf(
                doc,
                parent,
                index,
                into_shadow,
                LiveNodeKind::ProcessingInstruction { target: p.target.clone(), data: p.data.clone() },
                p.id,
            ),
            VNode::DocumentType(d) => self.insert_leaf(
                doc,
                parent,
                index,
                into_shadow,
                LiveNodeKind::DocumentType {
                    name: d.name.clone(),
                    public_id: d.public_id.clone(),
                    system_id: d.system_id.clone(),
                },
                d.id,
            ),
        }
    }

    fn insert(
        &self,
        doc: &mut LiveDocument,
        parent: Slot,
        index: usize,
        into_shadow: bool,
        kind: LiveNodeKind,
    ) -> Result<Slot, ModelError> {
        if into_shadow {
            doc.insert_shadow_child(parent, index, kind)
        } else {
            doc.insert_child(parent, index, kind)
        }
    }

    fn insert_leaf(
        &mut self,
        doc: &mut LiveDocument,
        parent: Slot,
        index: usize,
        into_shadow: bool,
        kind: LiveNodeKind,
        id: NodeId,
    ) -> Result<Slot, MaterializeError> {
        let slot = self.insert(doc, parent, index, into_shadow, kind)?;
        self.ids.bind(slot, id);
        Ok(slot)
    }

    /// Applies `sheets` as `root`'s adopted-stylesheet set (spec.md §4.7's
    /// `Keyframe`/`AdoptedStyleSheetsChanged` apply actions), binding each
    /// sheet's CSS text through `AssetRegistry` first. Returns the rewritten
    /// list so callers (`PagePlayer`) can seed their own sheet-text cache.
    pub fn apply_adopted_style_sheets(
        &mut self,
        doc: &mut LiveDocument,
        root: Slot,
        sheets: &[VStyleSheet],
    ) -> Vec<VStyleSheet> {
        let rewritten: Vec<VStyleSheet> = sheets
            .iter()
            .map(|sheet| {
                let text = self.assets.bind_stylesheet_text(AssetHost::Sheet(sheet.id), &sheet.text);
                VStyleSheet { id: sheet.id, media: sheet.media.clone(), text }
            })
            .collect();
        doc.set_adopted_style_sheets(root, rewritten.clone());
        rewritten
    }
}

fn sole_text(children: &[VNode]) -> String {
    children
        .iter()
        .filter_map(|c| match c {
            VNode::Text(t) => Some(t.data.clone()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use dom_model::{StyleSheetId, VCharacterData, VElement};

    fn el(id: u64, tag: &str, attrs: Vec<(&str, &str)>, children: Vec<VNode>) -> VNode {
        VNode::Element(VElement {
            id: NodeId::from_raw(id),
            tag: tag.to_string(),
            namespace: None,
            attrs: attrs.into_iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            children,
            shadow: None,
        })
    }

    fn text(id: u64, data: &str) -> VNode {
        VNode::Text(VCharacterData { id: NodeId::from_raw(id), data: data.to_string() })
    }

    #[test]
    fn materializes_minimal_document_and_binds_node_ids() {
        let mut doc = LiveDocument::new();
        let mut ids = PlayerNodeMap::new();
        let mut assets: AssetRegistry<AssetHost> = AssetRegistry::new();
        let document = VDocument {
            id: NodeId::from_raw(0),
            children: vec![el(1, "html", vec![], vec![el(2, "body", vec![], vec![text(3, "hello")])])],
            adopted_style_sheets: vec![],
        };

        DomMaterializer::new(&mut ids, &mut assets).materialize_document(&mut doc, &document).unwrap();

        let root = doc.root();
        assert_eq!(ids.id_for(root), Some(NodeId::from_raw(0)));
        let html = doc.children(root).unwrap()[0];
        assert_eq!(ids.id_for(html), Some(NodeId::from_raw(1)));
        let body = doc.children(html).unwrap()[0];
        assert_eq!(ids.id_for(body), Some(NodeId::from_raw(2)));
        let text_slot = doc.children(body).unwrap()[0];
        assert_eq!(ids.id_for(text_slot), Some(NodeId::from_raw(3)));
        assert!(matches!(doc.kind(text_slot).unwrap(), LiveNodeKind::Text(s) if s == "hello"));
    }

    #[test]
    fn element_attribute_referencing_an_asset_is_rewritten_to_a_placeholder() {
        let mut doc = LiveDocument::new();
        let mut ids = PlayerNodeMap::new();
        let mut assets: AssetRegistry<AssetHost> = AssetRegistry::new();
        let root = doc.root();
        let img = el(4, "img", vec![("src", "asset:7")], vec![]);

        let slot = DomMaterializer::new(&mut ids, &mut assets)
            .materialize_node(&mut doc, root, 0, &img)
            .unwrap();

        let src = doc.attribute(slot, "src").unwrap().unwrap();
        assert!(src.starts_with("asset-placeholder:"));
        assert_eq!(assets.reference_count(asset_pipeline::AssetId::from_raw(7)), 1);
    }

    #[test]
    fn style_element_css_text_is_bound_as_its_text_child() {
        let mut doc = LiveDocument::new();
        let mut ids = PlayerNodeMap::new();
        let mut assets: AssetRegistry<AssetHost> = AssetRegistry::new();
        let root = doc.root();
        let style = el(5, "style", vec![], vec![text(6, "a{background:url(asset:2)}")]);

        let slot = DomMaterializer::new(&mut ids, &mut assets)
            .materialize_node(&mut doc, root, 0, &style)
            .unwrap();

        let text_slot = doc.children(slot).unwrap()[0];
        let LiveNodeKind::Text(css) = doc.kind(text_slot).unwrap() else { panic!() };
        assert!(css.contains("asset-placeholder:"));
    }

    #[test]
    fn shadow_children_are_attached_and_distinct_from_light_children() {
        let mut doc = LiveDocument::new();
        let mut ids = PlayerNodeMap::new();
        let mut assets: AssetRegistry<AssetHost> = AssetRegistry::new();
        let root = doc.root();
        let mut host_el = VElement {
            id: NodeId::from_raw(1),
            tag: "custom-widget".to_string(),
            namespace: None,
            attrs: vec![],
            children: vec![],
            shadow: Some(vec![el(2, "template-content", vec![], vec![])]),
        };
        host_el.children = vec![el(3, "span", vec![], vec![])];
        let node = VNode::Element(host_el);

        let slot = DomMaterializer::new(&mut ids, &mut assets).materialize_node(&mut doc, root, 0, &node).unwrap();

        assert_eq!(doc.children(slot).unwrap().len(), 1);
        assert_eq!(doc.shadow_children(slot).unwrap().len(), 1);
    }

    #[test]
    fn adopted_style_sheets_are_applied_with_bound_text() {
        let mut doc = LiveDocument::new();
        let mut ids = PlayerNodeMap::new();
        let mut assets: AssetRegistry<AssetHost> = AssetRegistry::new();
        let root = doc.root();
        let sheet = VStyleSheet { id: StyleSheetId::Adopted(0), media: None, text: "a{}".to_string() };

        DomMaterializer::new(&mut ids, &mut assets).apply_adopted_style_sheets(&mut doc, root, &[sheet.clone()]);

        assert_eq!(doc.adopted_style_sheets(root).len(), 1);
        assert_eq!(doc.adopted_style_sheets(root)[0].text, "a{}");
    }

    #[test]
    fn re_materializing_clears_prior_children() {
        let mut doc = LiveDocument::new();
        let mut ids = PlayerNodeMap::new();
        let mut assets: AssetRegistry<AssetHost> = AssetRegistry::new();
        let first = VDocument { id: NodeId::from_raw(0), children: vec![el(1, "div", vec![], vec![])], adopted_style_sheets: vec![] };
        let second = VDocument { id: NodeId::from_raw(0), children: vec![el(9, "span", vec![], vec![])], adopted_style_sheets: vec![] };
        let mut materializer = DomMaterializer::new(&mut ids, &mut assets);
        materializer.materialize_document(&mut doc, &first).unwrap();
        materializer.materialize_document(&mut doc, &second).unwrap();

        let root = doc.root();
        let children = doc.children(root).unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(ids.id_for(children[0]), Some(NodeId::from_raw(9)));
        assert_eq!(ids.slot_for(NodeId::from_raw(1)), None);
    }
}
