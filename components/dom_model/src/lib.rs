//! The document model shared by the recorder and the player: a wire-shaped
//! virtual tree ([`VDocument`]/[`VNode`]) plus the mutable arena tree
//! ([`LiveDocument`]) both sides mutate in place of a real browser DOM.

mod live;
mod vnode;

pub use live::{LiveDocument, LiveNodeKind, ModelError, MutationRecord, Slot};
pub use vnode::{
    StyleSheetId, VCharacterData, VDocument, VDocumentType, VElement, VNode, VProcessingInstruction,
    VStyleSheet,
};
