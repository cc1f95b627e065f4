//! [`PagePlayer`] (spec.md §4.12): the multi-phase "open frame" state
//! machine that ties `DomMaterializer`, `DomMutator`, and `AssetRegistry`
//! together into one frame-at-a-time consumer.
//!
//! An open frame is an event that cannot be applied yet because it is
//! still waiting on assets (or, for an adopted-stylesheet-set change, on
//! sheets it hasn't seen the text of). `PagePlayer` keeps these as an
//! explicit stack rather than a callback chain, per spec.md §9's "the
//! open-frame stack is deliberately a data structure" design note — tests
//! below introspect it directly.

use crate::asset_host::AssetHost;
use crate::dom_materializer::DomMaterializer;
use crate::dom_mutator::DomMutator;
use crate::node_map::PlayerNodeMap;
use crate::playback_queue::{BoxFuture, FrameHandler};
use asset_pipeline::{AssetId, AssetRegistry, ReceivedAsset};
use dom_model::{LiveDocument, Slot, StyleSheetId, VDocument, VNode, VStyleSheet};
use frame_protocol::{node_id_from_wire, Frame};
use node_id::NodeId;
use rustc_hash::{FxHashMap, FxHashSet};

/// One entry of the open-frame stack (spec.md §4.12). `receivedSheets` is a
/// `Vec` rather than a true set: `VStyleSheet` has no `Hash` impl (its text
/// is a plain, potentially-large `String`), and the handful of sheets a
/// realistic `AdoptedStyleSheetsChanged` event waits on make a linear
/// `iter().find()` the simpler, entirely adequate choice.
enum OpenFrame {
    Keyframe { document: VDocument, asset_count: u32, received_assets: FxHashSet<AssetId> },
    AddNode { parent_id: NodeId, index: usize, node: VNode, asset_count: u32, received_assets: FxHashSet<AssetId> },
    AdoptedStyleSheetAdded {
        stylesheet: VStyleSheet,
        asset_count: u32,
        received_assets: FxHashSet<AssetId>,
    },
    AdoptedStyleSheetsChanged {
        target_id: NodeId,
        sheet_ids: Vec<StyleSheetId>,
        added_count: u32,
        received_sheets: Vec<VStyleSheet>,
    },
}

/// Target-side state for one replayed page. Owns the `LiveDocument` being
/// materialized into, the id table, and the asset registry; implements
/// [`FrameHandler`] so it can be driven directly by a [`crate::PlaybackQueue`].
pub struct PagePlayer {
    doc: LiveDocument,
    ids: PlayerNodeMap,
    assets: AssetRegistry<AssetHost>,
    stack: Vec<OpenFrame>,
    /// Every stylesheet whose text this player has already resolved,
    /// keyed by its wire id, so a later `AdoptedStyleSheetsChanged` can
    /// reuse one instead of waiting on a redundant `AdoptedStyleSheetAdded`.
    sheet_texts: FxHashMap<StyleSheetId, VStyleSheet>,
    viewport: (u32, u32),
    has_keyframe: bool,
}

impl PagePlayer {
    pub fn new() -> Self {
        PagePlayer {
            doc: LiveDocument::new(),
            ids: PlayerNodeMap::new(),
            assets: AssetRegistry::new(),
            stack: Vec::new(),
            sheet_texts: FxHashMap::default(),
            viewport: (0, 0),
            has_keyframe: false,
        }
    }

    pub fn document(&self) -> &LiveDocument {
        &self.doc
    }

    pub fn node_ids(&self) -> &PlayerNodeMap {
        &self.ids
    }

    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    /// Whether at least one event is still waiting on assets/sheets.
    pub fn has_open_frames(&self) -> bool {
        !self.stack.is_empty()
    }

    /// Applies one decoded frame. The workhorse of the open-frame state
    /// machine (spec.md §4.12's transition table).
    pub fn apply_frame(&mut self, frame: Frame) {
        match frame {
            Frame::Timestamp { .. } => {}, // PlaybackQueue never forwards these; tolerate it anyway.
            Frame::Keyframe { document, viewport_width, viewport_height, asset_count } => {
                self.viewport = (viewport_width, viewport_height);
                self.stack.push(OpenFrame::Keyframe { document, asset_count, received_assets: FxHashSet::default() });
                self.try_apply_top();
            },
            Frame::DomNodeAdded { parent_node_id, index, node, asset_count } => {
                let parent_id = node_id_from_wire(parent_node_id);
                self.stack.push(OpenFrame::AddNode {
                    parent_id,
                    index: index as usize,
                    node,
                    asset_count,
                    received_assets: FxHashSet::default(),
                });
                self.try_apply_top();
            },
            Frame::AdoptedStyleSheetsChanged { target_node_id, sheet_ids } => {
                let target_id = node_id_from_wire(target_node_id);
                let added_count = sheet_ids.iter().filter(|id| !self.sheet_texts.contains_key(id)).count() as u32;
                self.stack.push(OpenFrame::AdoptedStyleSheetsChanged {
                    target_id,
                    sheet_ids,
                    added_count,
                    received_sheets: Vec::new(),
                });
                self.try_apply_top();
            },
            Frame::AdoptedStyleSheetAdded { target_node_id: _, sheet, asset_count } => {
                self.stack.push(OpenFrame::AdoptedStyleSheetAdded {
                    stylesheet: sheet,
                    asset_count,
                    received_assets: FxHashSet::default(),
                });
                self.try_apply_top();
            },
            Frame::Asset { asset_id, url, mime, bytes } => {
                self.receive_asset(AssetId::from_raw(asset_id), url, mime, bytes);
            },
            Frame::AssetReference { asset_id, url, mime, sha256: _ } => {
                self.receive_asset(AssetId::from_raw(asset_id), url, mime, Vec::new());
            },
            Frame::DomNodeRemoved { node_id } => {
                self.with_mutator(|mutator, doc| mutator.remove(doc, node_id_from_wire(node_id)));
            },
            Frame::DomAttributeChanged { node_id, name, value } => {
                self.with_mutator(|mutator, doc| {
                    mutator.update_attribute(doc, node_id_from_wire(node_id), &name, &value)
                });
            },
            Frame::DomAttributeRemoved { node_id, name } => {
                self.with_mutator(|mutator, doc| mutator.remove_attribute(doc, node_id_from_wire(node_id), &name));
            },
            Frame::DomTextChanged { node_id, ops } => {
                self.with_mutator(|mutator, doc| mutator.update_text(doc, node_id_from_wire(node_id), &ops));
            },
            Frame::ViewportResized { width, height } => {
                self.viewport = (width, height);
            },
            Frame::MouseMoved { .. }
            | Frame::MouseClicked { .. }
            | Frame::KeyPressed { .. }
            | Frame::ElementFocused { .. }
            | Frame::ElementBlurred
            | Frame::WindowFocused
            | Frame::WindowBlurred
            | Frame::TextSelectionChanged { .. }
            | Frame::ElementScrolled { .. }
            | Frame::WindowScrolled { .. }
            | Frame::DomNodeResized { .. }
            | Frame::DomNodePropertyChanged { .. } => {
                // Forwarded to the corresponding input/layout simulator;
                // out of scope for this crate (spec.md §4.12).
            },
            Frame::RecordingMetadata { .. } | Frame::Heartbeat | Frame::CacheManifest { .. } => {
                // Transport/session bookkeeping the recorder-facing client
                // owns; nothing for a player to do with these.
            },
        }
    }

    fn with_mutator(&mut self, op: impl FnOnce(&mut DomMutator, &mut LiveDocument)) {
        if !self.has_keyframe {
            log::error!("structural frame dropped: no keyframe has landed yet");
            return;
        }
        let mut mutator = DomMutator::new(&mut self.ids, &mut self.assets);
        op(&mut mutator, &mut self.doc);
    }

    fn receive_asset(&mut self, id: AssetId, url: String, mime: Option<String>, bytes: Vec<u8>) {
        if self.stack.is_empty() {
            // Idempotent no-op for an asset already resolved; a genuine
            // stranger is an open-frame mismatch (spec.md §7): log, still
            // deliver the bytes (receive() is globally useful and harmless).
            let already_resolved = self.assets.is_resolved(id);
            let _ = self.assets.receive(ReceivedAsset { id, url, mime, bytes });
            if !already_resolved {
                log::error!("asset {id:?} arrived with no open frame awaiting it");
            }
            return;
        }
        let _patches = self.assets.receive(ReceivedAsset { id, url, mime, bytes });
        // The top open frame hasn't been materialized yet, so there is
        // nothing live to patch: its raw VNode/VStyleSheet still carries
        // `asset:<id>` syntax, not a placeholder, and will resolve to the
        // already-known URL the moment it is itself materialized.
        let received = match self.stack.last_mut() {
            Some(OpenFrame::Keyframe { received_assets, .. }) => received_assets,
            Some(OpenFrame::AddNode { received_assets, .. }) => received_assets,
            Some(OpenFrame::AdoptedStyleSheetAdded { received_assets, .. }) => received_assets,
            Some(OpenFrame::AdoptedStyleSheetsChanged { .. }) => {
                log::error!("asset {id:?} arrived while the top open frame awaits stylesheets, not assets");
                return;
            },
            None => unreachable!("checked non-empty above"),
        };
        received.insert(id);
        self.try_apply_top();
    }

    fn try_apply_top(&mut self) {
        let Some(top) = self.stack.last() else { return };
        let complete = match top {
            OpenFrame::Keyframe { asset_count, received_assets, .. } => received_assets.len() as u32 >= *asset_count,
            OpenFrame::AddNode { asset_count, received_assets, .. } => received_assets.len() as u32 >= *asset_count,
            OpenFrame::AdoptedStyleSheetAdded { asset_count, received_assets, .. } => {
                received_assets.len() as u32 >= *asset_count
            },
            OpenFrame::AdoptedStyleSheetsChanged { added_count, received_sheets, .. } => {
                received_sheets.len() as u32 >= *added_count
            },
        };
        if complete {
            self.pop_and_apply();
        }
    }

    fn pop_and_apply(&mut self) {
        let Some(frame) = self.stack.pop() else { return };
        match frame {
            OpenFrame::Keyframe { document, .. } => self.apply_keyframe(document),
            OpenFrame::AddNode { parent_id, index, node, .. } => {
                DomMutator::new(&mut self.ids, &mut self.assets).insert(&mut self.doc, parent_id, index, &node);
            },
            OpenFrame::AdoptedStyleSheetAdded { stylesheet, .. } => self.apply_adopted_style_sheet_added(stylesheet),
            OpenFrame::AdoptedStyleSheetsChanged { target_id, sheet_ids, received_sheets, .. } => {
                self.apply_adopted_style_sheets_changed(target_id, sheet_ids, received_sheets)
            },
        }
    }

    fn apply_keyframe(&mut self, document: VDocument) {
        let mut materializer = DomMaterializer::new(&mut self.ids, &mut self.assets);
        if let Err(err) = materializer.materialize_document(&mut self.doc, &document) {
            log::error!("keyframe materialization failed: {err}");
            return;
        }
        self.has_keyframe = true;
        for sheet in self.doc.adopted_style_sheets(self.doc.root()) {
            self.sheet_texts.insert(sheet.id, sheet.clone());
        }
    }

    fn apply_adopted_style_sheet_added(&mut self, stylesheet: VStyleSheet) {
        let rewritten_text = self.assets.bind_stylesheet_text(AssetHost::Sheet(stylesheet.id), &stylesheet.text);
        let resolved = VStyleSheet { id: stylesheet.id, media: stylesheet.media, text: rewritten_text };
        self.sheet_texts.insert(resolved.id, resolved.clone());

        if let Some(OpenFrame::AdoptedStyleSheetsChanged { received_sheets, .. }) = self.stack.last_mut() {
            received_sheets.push(resolved);
            self.try_apply_top();
        }
    }

    fn apply_adopted_style_sheets_changed(
        &mut self,
        target_id: NodeId,
        sheet_ids: Vec<StyleSheetId>,
        received_sheets: Vec<VStyleSheet>,
    ) {
        let Some(target_slot) = self.ids.slot_for(target_id) else {
            log::error!("adoptedStyleSheetsChanged: unknown target {target_id:?}");
            return;
        };
        let mut ordered = Vec::with_capacity(sheet_ids.len());
        for id in &sheet_ids {
            if let Some(sheet) = self.sheet_texts.get(id) {
                ordered.push(sheet.clone());
            } else if let Some(sheet) = received_sheets.iter().find(|s| s.id == *id) {
                self.sheet_texts.insert(*id, sheet.clone());
                ordered.push(sheet.clone());
            } else {
                log::error!("adoptedStyleSheetsChanged: sheet {id:?} never arrived");
            }
        }
        self.doc.set_adopted_style_sheets(target_slot, ordered);
    }

    #[cfg(test)]
    fn slot_for(&self, id: u64) -> Option<Slot> {
        self.ids.slot_for(NodeId::from_raw(id))
    }
}

impl Default for PagePlayer {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameHandler for PagePlayer {
    fn handle<'a>(&'a mut self, frame: Frame) -> BoxFuture<'a> {
        self.apply_frame(frame);
        Box::pin(async {})
    }
}
