//! The wire-shaped virtual tree: the document shape a recorder emits and a
//! player materializes. Every node carries the [`NodeId`] it was assigned
//! when first observed or first applied; nothing here knows how to mutate
//! itself; mutation is [`crate::live::LiveDocument`]'s job.

use node_id::NodeId;

/// A stylesheet snapshot, either the document's own `<style>`/`<link>`
/// sheet or one member of an adopted-stylesheet set.
#[derive(Debug, Clone, PartialEq)]
pub struct VStyleSheet {
    pub id: StyleSheetId,
    pub media: Option<String>,
    pub text: String,
}

/// Stylesheets owned by a node (e.g. a `<style>` element's own sheet) are
/// keyed by that node's id; stylesheets that only exist as members of an
/// adopted set have no owning node and get an independently allocated id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StyleSheetId {
    Owned(NodeId),
    Adopted(u64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct VElement {
    pub id: NodeId,
    pub tag: String,
    pub namespace: Option<String>,
    /// Insertion-ordered; duplicates are not possible once `LiveDocument`
    /// has normalized them, but nothing here re-checks that.
    pub attrs: Vec<(String, String)>,
    pub children: Vec<VNode>,
    /// `Some` for elements with a closed shadow root attached, `None`
    /// otherwise. A shadow root's own adopted stylesheets travel out of
    /// band as `AdoptedStyleSheetsChanged` frames targeting this element's
    /// id, not as part of this snapshot.
    pub shadow: Option<Vec<VNode>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VCharacterData {
    pub id: NodeId,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VProcessingInstruction {
    pub id: NodeId,
    pub target: String,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VDocumentType {
    pub id: NodeId,
    pub name: String,
    pub public_id: String,
    pub system_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VNode {
    Element(VElement),
    Text(VCharacterData),
    Cdata(VCharacterData),
    Comment(VCharacterData),
    ProcessingInstruction(VProcessingInstruction),
    DocumentType(VDocumentType),
}

impl VNode {
    pub fn id(&self) -> NodeId {
        match self {
            VNode::Element(e) => e.id,
            VNode::Text(t) | VNode::Cdata(t) | VNode::Comment(t) => t.id,
            VNode::ProcessingInstruction(p) => p.id,
            VNode::DocumentType(d) => d.id,
        }
    }
}

/// The document root. Its own id is assigned before any of its children's,
/// matching `NodeIdMap`'s "document root first" rule.
#[derive(Debug, Clone, PartialEq)]
pub struct VDocument {
    pub id: NodeId,
    pub children: Vec<VNode>,
    pub adopted_style_sheets: Vec<VStyleSheet>,
}
