//! [`AssetHost`]: the host-handle type `player`'s `AssetRegistry<AssetHost>`
//! binds against. An asset is bound either to an element's attribute (a
//! live `Slot`) or to a stylesheet's own text (a `StyleSheetId`, which has
//! no backing `Slot` at all for an adopted sheet that was never attached
//! to a `<style>` element).

use dom_model::{Slot, StyleSheetId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetHost {
    Node(Slot),
    Sheet(StyleSheetId),
}
