//! The mutable tree both sides of the pipe operate on: the recorder treats
//! it as the thing a host embedder mutates in place of a real DOM, and the
//! player treats it as the materialization target for decoded frames.
//!
//! `LiveDocument` intentionally does not know about [`node_id::NodeId`]:
//! its [`Slot`] handles are a private arena detail, and the id <-> slot
//! correspondence lives in a `node_id::NodeIdMap<Slot>` that the recorder
//! and player each keep alongside their own `LiveDocument`. That keeps the
//! id-assignment policy (who assigns, when, and in what order) entirely
//! out of this crate.

use crate::vnode::{
    VCharacterData, VDocument, VDocumentType, VElement, VNode, VProcessingInstruction, VStyleSheet,
};
use node_id::NodeId;
use rustc_hash::FxHashMap;
use std::fmt;

/// An arena handle. Never reused while the slot it names is occupied;
/// `LiveDocument` does recycle retired slot indices, but only once nothing
/// else can still be holding that exact `Slot` value (the owner must have
/// drained it out of any `NodeIdMap` first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Slot(usize);

impl Slot {
    /// Exposed for callers (recorder/player) that key their own
    /// `NodeIdMap<Slot>` or test fixtures off of it; `LiveDocument` itself
    /// never interprets the raw value.
    pub fn raw(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelError {
    UnknownSlot,
    NotAnElement,
    NotCharacterData,
    ShadowAlreadyAttached,
    NoShadowRoot,
    IndexOutOfRange,
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            ModelError::UnknownSlot => "slot does not name a live node",
            ModelError::NotAnElement => "operation requires an element node",
            ModelError::NotCharacterData => "operation requires a text/cdata/comment node",
            ModelError::ShadowAlreadyAttached => "element already has a shadow root",
            ModelError::NoShadowRoot => "element has no shadow root attached",
            ModelError::IndexOutOfRange => "child index out of range",
        };
        write!(f, "{msg}")
    }
}

impl std::error::Error for ModelError {}

#[derive(Debug, Clone)]
pub enum LiveNodeKind {
    Element {
        tag: String,
        namespace: Option<String>,
        attrs: Vec<(String, String)>,
        children: Vec<Slot>,
        /// `Some` once a closed shadow root has been attached; the shadow
        /// root's own children live in this list, distinct from `children`.
        shadow: Option<Vec<Slot>>,
    },
    Text(String),
    Cdata(String),
    Comment(String),
    ProcessingInstruction { target: String, data: String },
    DocumentType { name: String, public_id: String, system_id: String },
}

struct LiveNodeData {
    kind: LiveNodeKind,
    parent: Option<Slot>,
}

/// A single notification of something that changed since the last drain.
/// `DomChangeDetector` (in the recorder crate) turns a batch of these into
/// frames; `style_watch`'s watcher drains `AdoptedStyleSheetsChanged` the
/// same way.
#[derive(Debug, Clone)]
pub enum MutationRecord {
    SubtreeAdded { parent: Slot, index: usize, root: Slot },
    SubtreeRemoved { parent: Slot, root: Slot },
    AttributeChanged { node: Slot, name: String, value: String },
    AttributeRemoved { node: Slot, name: String },
    TextChanged { node: Slot, old: String, new: String },
    AdoptedStyleSheetsChanged { root: Slot },
}

pub struct LiveDocument {
    arena: Vec<Option<LiveNodeData>>,
    free: Vec<Slot>,
    root: Slot,
    /// Adopted-stylesheet sets, keyed by `self.root` for the document
    /// itself or by a shadow-hosting element's slot.
    adopted: FxHashMap<Slot, Vec<VStyleSheet>>,
    mutations: Vec<MutationRecord>,
}

impl LiveDocument {
    pub fn new() -> Self {
        let root = LiveNodeData {
            kind: LiveNodeKind::Element {
                tag: String::new(),
                namespace: None,
                attrs: Vec::new(),
                children: Vec::new(),
                shadow: None,
            },
            parent: None,
        };
        LiveDocument {
            arena: vec![Some(root)],
            free: Vec::new(),
            root: Slot(0),
            adopted: FxHashMap::default(),
            mutations: Vec::new(),
        }
    }

    pub fn root(&self) -> Slot {
        self.root
    }

    fn alloc(&mut self, data: LiveNodeData) -> Slot {
        if let Some(slot) = self.free.pop() {
            self.arena[slot.0] = Some(data);
            slot
        } else {
            self.arena.push(Some(data));
            Slot(self.arena.len() - 1)
        }
    }

    fn get(&self, slot: Slot) -> Result<&LiveNodeData, ModelError> {
        self.arena.get(slot.0).and_then(|s| s.as_ref()).ok_or(ModelError::UnknownSlot)
    }

    fn get_mut(&mut self, slot: Slot) -> Result<&mut LiveNodeData, ModelError> {
        self.arena.get_mut(slot.0).and_then(|s| s.as_mut()).ok_or(ModelError::UnknownSlot)
    }

    pub fn kind(&self, slot: Slot) -> Result<&LiveNodeKind, ModelError> {
        self.get(slot).map(|d| &d.kind)
    }

    pub fn parent(&self, slot: Slot) -> Result<Option<Slot>, ModelError> {
        self.get(slot).map(|d| d.parent)
    }

    pub fn children(&self, parent: Slot) -> Result<&[Slot], ModelError> {
        match &self.get(parent)?.kind {
            LiveNodeKind::Element { children, .. } => Ok(children),
            _ => Err(ModelError::NotAnElement),
        }
    }

    pub fn shadow_children(&self, host: Slot) -> Result<&[Slot], ModelError> {
        match &self.get(host)?.kind {
            LiveNodeKind::Element { shadow: Some(children), .. } => Ok(children),
            LiveNodeKind::Element { shadow: None, .. } => Err(ModelError::NoShadowRoot),
            _ => Err(ModelError::NotAnElement),
        }
    }

    /// Inserts a freshly allocated node as the `index`-th child of `parent`.
    /// Returns the new node's slot.
    pub fn insert_child(
        &mut self,
        parent: Slot,
        index: usize,
        kind: LiveNodeKind,
    ) -> Result<Slot, ModelError> {
        self.insert_into(parent, index, kind, false)
    }

    /// Like `insert_child`, but targets `host`'s shadow root rather than
    /// its ordinary children. `attach_shadow` must have been called first.
    pub fn insert_shadow_child(
        &mut self,
        host: Slot,
        index: usize,
        kind: LiveNodeKind,
    ) -> Result<Slot, ModelError> {
        self.insert_into(host, index, kind, true)
    }

    fn insert_into(
        &mut self,
        parent: Slot,
        index: usize,
        kind: LiveNodeKind,
        into_shadow: bool,
    ) -> Result<Slot, ModelError> {
        {
            let siblings = if into_shadow {
                match &self.get(parent)?.kind {
                    LiveNodeKind::Element { shadow: Some(c), .. } => c,
                    LiveNodeKind::Element { shadow: None, .. } => return Err(ModelError::NoShadowRoot),
                    _ => return Err(ModelError::NotAnElement),
                }
            } else {
                match &self.get(parent)?.kind {
                    LiveNodeKind::Element { children, .. } => children,
                    _ => return Err(ModelError::NotAnElement),
                }
            };
            if index > siblings.len() {
                return Err(ModelError::IndexOutOfRange);
            }
        }
        let child = self.alloc(LiveNodeData { kind, parent: Some(parent) });
        let siblings = match &mut self.get_mut(parent)?.kind {
            LiveNodeKind::Element { children, .. } if !into_shadow => children,
            LiveNodeKind::Element { shadow: Some(children), .. } if into_shadow => children,
            _ => unreachable!("checked above"),
        };
        siblings.insert(index, child);
        self.mutations.push(MutationRecord::SubtreeAdded { parent, index, root: child });
        Ok(child)
    }

    /// Detaches `node` from its parent (or shadow host) and frees the whole
    /// subtree rooted at it. Returns the subtree's slots in preorder,
    /// root first, so the caller can retire them from its `NodeIdMap`.
    pub fn remove(&mut self, node: Slot) -> Result<Vec<Slot>, ModelError> {
        let parent = self.get(node)?.parent;
        if let Some(parent) = parent {
            self.detach_from_lists(parent, node);
            self.mutations.push(MutationRecord::SubtreeRemoved { parent, root: node });
        }
        let removed = self.preorder(node)?;
        for &slot in &removed {
            self.arena[slot.0] = None;
            self.adopted.remove(&slot);
            self.free.push(slot);
        }
        Ok(removed)
    }

    fn detach_from_lists(&mut self, parent: Slot, child: Slot) {
        if let Ok(data) = self.get_mut(parent) {
            if let LiveNodeKind::Element { children, shadow, .. } = &mut data.kind {
                children.retain(|&s| s != child);
                if let Some(shadow) = shadow {
                    shadow.retain(|&s| s != child);
                }
            }
        }
    }

    /// `root` and every descendant reachable via ordinary children or a
    /// shadow root, in document order, root first.
    pub fn preorder(&self, root: Slot) -> Result<Vec<Slot>, ModelError> {
        let mut out = Vec::new();
        self.preorder_into(root, &mut out)?;
        Ok(out)
    }

    fn preorder_into(&self, slot: Slot, out: &mut Vec<Slot>) -> Result<(), ModelError> {
        out.push(slot);
        if let LiveNodeKind::Element { children, shadow, .. } = &self.get(slot)?.kind {
            for &child in children {
                self.preorder_into(child, out)?;
            }
            if let Some(shadow) = shadow {
                for &child in shadow {
                    self.preorder_into(child, out)?;
                }
            }
        }
        Ok(())
    }

    pub fn set_attribute(&mut self, node: Slot, name: &str, value: &str) -> Result<(), ModelError> {
        let data = self.get_mut(node)?;
        let LiveNodeKind::Element { attrs, .. } = &mut data.kind else {
            return Err(ModelError::NotAnElement);
        };
        match attrs.iter_mut().find(|(k, _)| k == name) {
            Some((_, v)) => *v = value.to_string(),
            None => attrs.push((name.to_string(), value.to_string())),
        }
        self.mutations.push(MutationRecord::AttributeChanged {
            node,
            name: name.to_string(),
            value: value.to_string(),
        });
        Ok(())
    }

    pub fn remove_attribute(&mut self, node: Slot, name: &str) -> Result<(), ModelError> {
        let data = self.get_mut(node)?;
        let LiveNodeKind::Element { attrs, .. } = &mut data.kind else {
            return Err(ModelError::NotAnElement);
        };
        attrs.retain(|(k, _)| k != name);
        self.mutations.push(MutationRecord::AttributeRemoved { node, name: name.to_string() });
        Ok(())
    }

    pub fn attribute(&self, node: Slot, name: &str) -> Result<Option<&str>, ModelError> {
        let LiveNodeKind::Element { attrs, .. } = &self.get(node)?.kind else {
            return Err(ModelError::NotAnElement);
        };
        Ok(attrs.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str()))
    }

    /// Replaces the character data of a text/cdata/comment node, recording
    /// the prior value so the recorder can hand both halves to `text_diff`.
    pub fn set_character_data(&mut self, node: Slot, data: String) -> Result<(), ModelError> {
        let slot_data = self.get_mut(node)?;
        let target = match &mut slot_data.kind {
            LiveNodeKind::Text(s) | LiveNodeKind::Cdata(s) | LiveNodeKind::Comment(s) => s,
            _ => return Err(ModelError::NotCharacterData),
        };
        let old = std::mem::replace(target, data.clone());
        if old != data {
            self.mutations.push(MutationRecord::TextChanged { node, old, new: data });
        }
        Ok(())
    }

    pub fn attach_shadow(&mut self, host: Slot) -> Result<(), ModelError> {
        let data = self.get_mut(host)?;
        let LiveNodeKind::Element { shadow, .. } = &mut data.kind else {
            return Err(ModelError::NotAnElement);
        };
        if shadow.is_some() {
            return Err(ModelError::ShadowAlreadyAttached);
        }
        *shadow = Some(Vec::new());
        Ok(())
    }

    /// `root` is either `self.root()` (the document itself) or the slot of
    /// an element with a shadow root attached.
    pub fn set_adopted_style_sheets(&mut self, root: Slot, sheets: Vec<VStyleSheet>) {
        self.adopted.insert(root, sheets);
        self.mutations.push(MutationRecord::AdoptedStyleSheetsChanged { root });
    }

    pub fn adopted_style_sheets(&self, root: Slot) -> &[VStyleSheet] {
        self.adopted.get(&root).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Drains every mutation recorded since the last call, in the order
    /// they happened.
    pub fn take_mutations(&mut self) -> Vec<MutationRecord> {
        std::mem::take(&mut self.mutations)
    }

    /// Builds the wire-shaped snapshot of the subtree rooted at `slot`,
    /// resolving each live node's id via `id_of`. Does not consult or
    /// mutate `NodeIdMap` itself — the caller supplies the mapping.
    pub fn to_vnode(&self, slot: Slot, id_of: &impl Fn(Slot) -> NodeId) -> Result<VNode, ModelError> {
        let data = self.get(slot)?;
        let id = id_of(slot);
        Ok(match &data.kind {
            LiveNodeKind::Element { tag, namespace, attrs, children, shadow } => {
                let children = children
                    .iter()
                    .map(|&c| self.to_vnode(c, id_of))
                    .collect::<Result<Vec<_>, _>>()?;
                let shadow = shadow
                    .as_ref()
                    .map(|shadow_children| {
                        shadow_children.iter().map(|&c| self.to_vnode(c, id_of)).collect::<Result<Vec<_>, _>>()
                    })
                    .transpose()?;
                VNode::Element(VElement {
                    id,
                    tag: tag.clone(),
                    namespace: namespace.clone(),
                    attrs: attrs.clone(),
                    children,
                    shadow,
                })
            },
            LiveNodeKind::Text(data) => VNode::Text(VCharacterData { id, data: data.clone() }),
            LiveNodeKind::Cdata(data) => VNode::Cdata(VCharacterData { id, data: data.clone() }),
            LiveNodeKind::Comment(data) => VNode::Comment(VCharacterData { id, data: data.clone() }),
            LiveNodeKind::ProcessingInstruction { target, data } => {
                VNode::ProcessingInstruction(VProcessingInstruction {
                    id,
                    target: target.clone(),
                    data: data.clone(),
                })
            },
            LiveNodeKind::DocumentType { name, public_id, system_id } => {
                VNode::DocumentType(VDocumentType {
                    id,
                    name: name.clone(),
                    public_id: public_id.clone(),
                    system_id: system_id.clone(),
                })
            },
        })
    }

    pub fn to_vdocument(&self, id_of: &impl Fn(Slot) -> NodeId) -> Result<VDocument, ModelError> {
        let children = self.children(self.root)?;
        let children =
            children.iter().map(|&c| self.to_vnode(c, id_of)).collect::<Result<Vec<_>, _>>()?;
        Ok(VDocument {
            id: id_of(self.root),
            children,
            adopted_style_sheets: self.adopted_style_sheets(self.root).to_vec(),
        })
    }
}

impl Default for LiveDocument {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn elem(tag: &str) -> LiveNodeKind {
        LiveNodeKind::Element {
            tag: tag.to_string(),
            namespace: None,
            attrs: Vec::new(),
            children: Vec::new(),
            shadow: None,
        }
    }

    fn id_of_slot(slot: Slot) -> NodeId {
        NodeId::from_raw(slot.0 as u64)
    }

    #[test]
    fn insert_and_snapshot_round_trips_structure() {
        let mut doc = LiveDocument::new();
        let root = doc.root();
        let html = doc.insert_child(root, 0, elem("html")).unwrap();
        let body = doc.insert_child(html, 0, elem("body")).unwrap();
        doc.insert_child(body, 0, LiveNodeKind::Text("hi".into())).unwrap();
        doc.set_attribute(body, "class", "main").unwrap();

        let snapshot = doc.to_vdocument(&id_of_slot).unwrap();
        assert_eq!(snapshot.children.len(), 1);
        let VNode::Element(html_el) = &snapshot.children[0] else { panic!() };
        assert_eq!(html_el.tag, "html");
        let VNode::Element(body_el) = &html_el.children[0] else { panic!() };
        assert_eq!(body_el.attrs, vec![("class".to_string(), "main".to_string())]);
        assert!(matches!(&body_el.children[0], VNode::Text(t) if t.data == "hi"));
    }

    #[test]
    fn remove_returns_whole_subtree_in_preorder() {
        let mut doc = LiveDocument::new();
        let root = doc.root();
        let parent = doc.insert_child(root, 0, elem("div")).unwrap();
        let child_a = doc.insert_child(parent, 0, elem("span")).unwrap();
        let _child_b = doc.insert_child(parent, 1, elem("span")).unwrap();
        doc.take_mutations();

        let removed = doc.remove(parent).unwrap();
        assert_eq!(removed[0], parent);
        assert!(removed.contains(&child_a));
        assert_eq!(removed.len(), 3);
        assert!(doc.children(root).unwrap().is_empty());

        let mutations = doc.take_mutations();
        assert!(matches!(mutations[0], MutationRecord::SubtreeRemoved { root: r, .. } if r == parent));
    }

    #[test]
    fn text_change_records_old_and_new() {
        let mut doc = LiveDocument::new();
        let root = doc.root();
        let text = doc.insert_child(root, 0, LiveNodeKind::Text("hello".into())).unwrap();
        doc.take_mutations();

        doc.set_character_data(text, "hello world".into()).unwrap();
        let mutations = doc.take_mutations();
        assert!(matches!(
            &mutations[0],
            MutationRecord::TextChanged { old, new, .. } if old == "hello" && new == "hello world"
        ));
    }

    #[test]
    fn setting_identical_text_is_not_a_mutation() {
        let mut doc = LiveDocument::new();
        let root = doc.root();
        let text = doc.insert_child(root, 0, LiveNodeKind::Text("same".into())).unwrap();
        doc.take_mutations();
        doc.set_character_data(text, "same".into()).unwrap();
        assert!(doc.take_mutations().is_empty());
    }

    #[test]
    fn shadow_root_children_are_distinct_from_light_children() {
        let mut doc = LiveDocument::new();
        let root = doc.root();
        let host = doc.insert_child(root, 0, elem("custom-widget")).unwrap();
        doc.insert_child(host, 0, elem("span")).unwrap();
        doc.attach_shadow(host).unwrap();
        doc.insert_shadow_child(host, 0, elem("template-content")).unwrap();

        assert_eq!(doc.children(host).unwrap().len(), 1);
        assert_eq!(doc.shadow_children(host).unwrap().len(), 1);

        let snapshot = doc.to_vdocument(&id_of_slot).unwrap();
        let VNode::Element(host_el) = &snapshot.children[0] else { panic!() };
        assert_eq!(host_el.children.len(), 1);
        assert_eq!(host_el.shadow.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn attaching_shadow_twice_is_an_error() {
        let mut doc = LiveDocument::new();
        let root = doc.root();
        let host = doc.insert_child(root, 0, elem("custom-widget")).unwrap();
        doc.attach_shadow(host).unwrap();
        assert_eq!(doc.attach_shadow(host), Err(ModelError::ShadowAlreadyAttached));
    }

    #[test]
    fn adopted_style_sheets_are_tracked_per_root() {
        let mut doc = LiveDocument::new();
        let root = doc.root();
        let sheet = VStyleSheet { id: crate::StyleSheetId::Adopted(0), media: None, text: "a{}".into() };
        doc.set_adopted_style_sheets(root, vec![sheet.clone()]);
        assert_eq!(doc.adopted_style_sheets(root), &[sheet]);
        assert!(matches!(
            doc.take_mutations()[0],
            MutationRecord::AdoptedStyleSheetsChanged { root: r } if r == root
        ));
    }

    #[test]
    fn freed_slots_are_recycled_but_not_while_occupied() {
        let mut doc = LiveDocument::new();
        let root = doc.root();
        let a = doc.insert_child(root, 0, elem("a")).unwrap();
        doc.remove(a).unwrap();
        let b = doc.insert_child(root, 0, elem("b")).unwrap();
        assert_eq!(a, b, "freed slot should be recycled for the next allocation");
    }
}
