//! [`DomChangeDetector`] (spec.md §4.6): turns a batch of `LiveDocument`
//! mutations into an ordered run of wire frames, owning id assignment
//! (`node_id::NodeIdMap<Slot>`), causal stylesheet queueing
//! (`style_watch::StyleSheetWatcher<Slot>`) and asset discovery
//! (`asset_pipeline::AssetInliner`/`AssetUrlTable`) along the way.
//!
//! `remove` is the one operation this type wraps eagerly rather than
//! reading back out of `LiveDocument::take_mutations()` at flush time:
//! `LiveDocument::remove` returns the whole removed subtree's slots and
//! immediately recycles them for the next `insert_child`, so the only
//! place a removed root's id (and the id of every retired descendant) can
//! reliably be read is right at the `remove` call itself, before anything
//! else has a chance to reuse those slots. Insertions need no such
//! eagerness — ids are assigned during the additions pass of `flush`, in
//! document order, exactly as spec.md §4.6 describes.

use asset_pipeline::{AssetId, AssetInliner, AssetUrlTable, NoStylesheetFetcher, StylesheetFetcher};
use dom_model::{LiveDocument, ModelError, MutationRecord, Slot, StyleSheetId, VDocument, VNode, VStyleSheet};
use frame_protocol::{node_id_to_wire, Frame};
use node_id::{NodeId, NodeIdMap};
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;
use style_watch::{RuleMutation, StyleEvent, StyleSheetRef, StyleSheetWatcher};
use url::Url;

pub struct DomChangeDetector {
    ids: NodeIdMap<Slot>,
    styles: StyleSheetWatcher<Slot>,
    urls: AssetUrlTable,
    base_url: Url,
    fetcher: Box<dyn StylesheetFetcher>,
    /// Root id (or `None` if the root was never observed) captured by
    /// `remove` at the moment of removal, in removal order.
    pending_removals: VecDeque<Option<NodeId>>,
    /// Every newly discovered `(AssetId, absolute url)` pair since the
    /// last drain, for the caller to fetch and feed back through an
    /// `Asset` frame.
    pending_asset_fetches: Vec<(AssetId, String)>,
}

impl DomChangeDetector {
    pub fn new(base_url: Url) -> Self {
        Self::with_fetcher(base_url, Box::new(NoStylesheetFetcher))
    }

    pub fn with_fetcher(base_url: Url, fetcher: Box<dyn StylesheetFetcher>) -> Self {
        DomChangeDetector {
            ids: NodeIdMap::new(),
            styles: StyleSheetWatcher::new(),
            urls: AssetUrlTable::new(),
            base_url,
            fetcher,
            pending_removals: VecDeque::new(),
            pending_asset_fetches: Vec::new(),
        }
    }

    pub fn node_id(&self, slot: Slot) -> Option<NodeId> {
        self.ids.get_id(&slot)
    }

    pub fn allocate_adopted_style_sheet_tag(&mut self) -> u64 {
        self.styles.allocate_adopted_tag()
    }

    /// Exposed for completeness/testability (SPEC_FULL.md §4's scoping
    /// note): in this simulated, CSSOM-less model, owned-sheet rule
    /// mutations are already observable as an ordinary `TextChanged` on
    /// the `<style>` element's text child, so `flush` never calls this
    /// itself. A caller with a real rule-mutation source can still use it
    /// directly; the causal gate behaves exactly as `style_watch` tests it.
    pub fn record_rule_mutation(
        &mut self,
        sheet: StyleSheetRef<Slot>,
        mutation: RuleMutation,
    ) -> Option<StyleEvent<Slot>> {
        self.styles.record_rule_mutation(sheet, mutation)
    }

    pub fn record_document_style_sheets(&mut self, now: Vec<StyleSheetRef<Slot>>) -> StyleEvent<Slot> {
        self.styles.record_document_style_sheets(now)
    }

    /// Drains every newly-discovered asset URL since the last call.
    pub fn take_pending_asset_fetches(&mut self) -> Vec<(AssetId, String)> {
        std::mem::take(&mut self.pending_asset_fetches)
    }

    /// Detaches and retires `node`'s whole subtree. Must be called instead
    /// of `doc.remove` directly so id/stylesheet bookkeeping happens before
    /// `LiveDocument` can recycle the freed slots.
    pub fn remove(&mut self, doc: &mut LiveDocument, node: Slot) -> Result<(), ModelError> {
        let removed = doc.remove(node)?;
        let root = removed[0];
        let root_id = self.ids.get_id(&root);
        self.ids.remove_subtree(removed.iter().copied());
        for slot in &removed {
            self.styles.mark_node_removed(slot);
        }
        self.pending_removals.push_back(root_id);
        Ok(())
    }

    /// Builds the initial `VDocument` snapshot for a `Keyframe` frame,
    /// assigning ids to the whole tree in document order and running it
    /// through the same asset-inlining pass `flush`'s additions step uses.
    pub fn keyframe(&mut self, doc: &LiveDocument) -> Result<(VDocument, Vec<(AssetId, String)>), ModelError> {
        let root = doc.root();
        let subtree = doc.preorder(root)?;
        self.ids.adopt_subtree(subtree.iter().copied());
        self.styles.add_pending_new_nodes(subtree.iter().copied());

        let inliner = AssetInliner::new(self.base_url.clone(), &mut self.urls, self.fetcher.as_ref());
        let outcome = inliner.inline_subtree(doc, root, &|slot| {
            self.ids.get_id(&slot).expect("assigned above")
        })?;
        self.pending_asset_fetches.extend(outcome.new_assets.iter().cloned());

        let VNode::Element(root_el) = outcome.vnode else {
            unreachable!("LiveDocument's root is always an element")
        };
        let document =
            VDocument { id: root_el.id, children: root_el.children, adopted_style_sheets: doc.adopted_style_sheets(root).to_vec() };

        for slot in &subtree {
            self.styles.mark_node_emitted(slot);
        }
        Ok((document, outcome.new_assets))
    }

    /// Drains `doc`'s mutation log and this detector's own eagerly-queued
    /// removals into an ordered run of frames, following spec.md §4.6's
    /// four-step batch (removals, additions, attribute changes, text
    /// changes), plus adopted-stylesheet-set changes as a fifth,
    /// supplemented step (SPEC_FULL.md §4).
    pub fn flush(&mut self, doc: &mut LiveDocument) -> Vec<Frame> {
        let mutations = doc.take_mutations();
        let mut frames = Vec::new();

        let mut freshly_added = FxHashSet::default();

        self.flush_removals(&mut frames);
        self.flush_additions(doc, &mutations, &mut freshly_added, &mut frames);
        self.flush_attribute_changes(&mutations, &freshly_added, &mut frames);
        self.flush_text_changes(&mutations, &freshly_added, &mut frames);
        self.flush_adopted_style_sheets(doc, &mutations, &mut frames);

        frames
    }

    fn flush_removals(&mut self, frames: &mut Vec<Frame>) {
        while let Some(root_id) = self.pending_removals.pop_front() {
            if let Some(id) = root_id {
                frames.push(Frame::DomNodeRemoved { node_id: node_id_to_wire(id) });
            }
        }
    }

    fn flush_additions(
        &mut self,
        doc: &mut LiveDocument,
        mutations: &[MutationRecord],
        freshly_added: &mut FxHashSet<Slot>,
        frames: &mut Vec<Frame>,
    ) {
        let mut raw_adds = Vec::new();
        for mutation in mutations {
            if let MutationRecord::SubtreeAdded { parent, index, root } = mutation {
                raw_adds.push((*parent, *index, *root));
            }
        }
        // A root slot can appear more than once if it was recycled for an
        // unrelated node within this same batch (add, remove, re-add); only
        // the last occurrence describes what is actually live right now.
        let mut last_seen: FxHashMap<Slot, usize> = FxHashMap::default();
        for (i, (.., root)) in raw_adds.iter().enumerate() {
            last_seen.insert(*root, i);
        }
        let mut survivors = Vec::new();
        for (i, (parent, _recorded_index, root)) in raw_adds.into_iter().enumerate() {
            if last_seen.get(&root) != Some(&i) {
                log::debug!("dropping a stale DomNodeAdded superseded within the same batch");
                continue;
            }
            survivors.push((i, parent, root));
        }

        // `doc` already reflects the post-batch tree, so each survivor's
        // sibling position is stable to read up front. Mutation order
        // already guarantees a parent's own `DomNodeAdded` precedes
        // anything added into it, but it does not guarantee ascending
        // sibling index within one parent — two prepends into the same
        // parent record in insertion order, not final order. Re-sort each
        // parent's survivors into ascending final-index order (grouped by
        // the order each parent was first added to, which mutation order
        // does guarantee) so every emitted index is valid against the
        // siblings this batch has already emitted, not just against the
        // tree's eventual shape.
        let mut first_seen_rank: FxHashMap<Slot, usize> = FxHashMap::default();
        for (i, parent, _root) in &survivors {
            first_seen_rank.entry(*parent).or_insert(*i);
        }
        survivors.sort_by_key(|(i, parent, root)| {
            let sibling_index =
                doc.children(*parent).ok().and_then(|siblings| siblings.iter().position(|s| s == root)).unwrap_or(*i);
            (*first_seen_rank.get(parent).expect("recorded above"), sibling_index)
        });

        for (_, parent, root) in survivors {
            self.process_addition(doc, parent, root, freshly_added, frames);
        }
    }

    fn process_addition(
        &mut self,
        doc: &mut LiveDocument,
        parent: Slot,
        root: Slot,
        freshly_added: &mut FxHashSet<Slot>,
        frames: &mut Vec<Frame>,
    ) {
        let Some(parent_id) = self.ids.get_id(&parent) else {
            log::error!("dropping DomNodeAdded: parent has no assigned node id");
            return;
        };
        let Ok(siblings) = doc.children(parent) else {
            log::error!("dropping DomNodeAdded: parent is no longer an element");
            return;
        };
        let Some(final_index) = siblings.iter().position(|&s| s == root) else {
            log::debug!("dropping DomNodeAdded: node was removed again before this flush");
            return;
        };
        let Ok(subtree) = doc.preorder(root) else {
            return;
        };
        self.ids.adopt_subtree(subtree.iter().copied());
        self.styles.add_pending_new_nodes(subtree.iter().copied());

        let inliner = AssetInliner::new(self.base_url.clone(), &mut self.urls, self.fetcher.as_ref());
        let outcome = match inliner.inline_subtree(doc, root, &|slot| self.ids.get_id(&slot).expect("assigned above")) {
            Ok(outcome) => outcome,
            Err(err) => {
                log::error!("dropping DomNodeAdded: {err}");
                return;
            },
        };
        self.pending_asset_fetches.extend(outcome.new_assets.iter().cloned());

        frames.push(Frame::DomNodeAdded {
            parent_node_id: node_id_to_wire(parent_id),
            index: final_index as u32,
            node: outcome.vnode,
            asset_count: outcome.new_assets.len() as u32,
        });

        for slot in &subtree {
            self.styles.mark_node_emitted(slot);
            freshly_added.insert(*slot);
        }
    }

    /// Attribute/text mutations against a node this same flush already
    /// described in full via its `DomNodeAdded` snapshot are redundant and
    /// would otherwise double-report its post-insertion state.
    fn flush_attribute_changes(
        &mut self,
        mutations: &[MutationRecord],
        freshly_added: &FxHashSet<Slot>,
        frames: &mut Vec<Frame>,
    ) {
        for mutation in mutations {
            match mutation {
                MutationRecord::AttributeChanged { node, name, value } if !freshly_added.contains(node) => {
                    match self.ids.get_id(node) {
                        Some(id) => frames.push(Frame::DomAttributeChanged {
                            node_id: node_id_to_wire(id),
                            name: name.clone(),
                            value: value.clone(),
                        }),
                        None => log::warn!("dropping DomAttributeChanged: node has no assigned id"),
                    }
                },
                MutationRecord::AttributeRemoved { node, name } if !freshly_added.contains(node) => {
                    match self.ids.get_id(node) {
                        Some(id) => frames
                            .push(Frame::DomAttributeRemoved { node_id: node_id_to_wire(id), name: name.clone() }),
                        None => log::warn!("dropping DomAttributeRemoved: node has no assigned id"),
                    }
                },
                _ => {},
            }
        }
    }

    fn flush_text_changes(
        &mut self,
        mutations: &[MutationRecord],
        freshly_added: &FxHashSet<Slot>,
        frames: &mut Vec<Frame>,
    ) {
        for mutation in mutations {
            if let MutationRecord::TextChanged { node, old, new } = mutation {
                if freshly_added.contains(node) {
                    continue;
                }
                match self.ids.get_id(node) {
                    Some(id) => {
                        let ops = text_diff::diff(old, new);
                        frames.push(Frame::DomTextChanged { node_id: node_id_to_wire(id), ops });
                    },
                    None => log::warn!("dropping DomTextChanged: node has no assigned id"),
                }
            }
        }
    }

    fn flush_adopted_style_sheets(&mut self, doc: &LiveDocument, mutations: &[MutationRecord], frames: &mut Vec<Frame>) {
        for mutation in mutations {
            if let MutationRecord::AdoptedStyleSheetsChanged { root } = mutation {
                self.process_adopted_style_sheets_changed(doc, *root, frames);
            }
        }
    }

    fn process_adopted_style_sheets_changed(&mut self, doc: &LiveDocument, root: Slot, frames: &mut Vec<Frame>) {
        let Some(target_id) = self.ids.get_id(&root) else {
            log::warn!("dropping AdoptedStyleSheetsChanged: target has no assigned id");
            return;
        };
        let sheets = doc.adopted_style_sheets(root).to_vec();
        let now_refs: Vec<StyleSheetRef<Slot>> = sheets.iter().filter_map(|s| self.style_sheet_ref(s)).collect();
        let StyleEvent::AdoptedStyleSheetsChanged { added, .. } = self.styles.record_adopted_style_sheets(root, now_refs) else {
            unreachable!("record_adopted_style_sheets always returns its own variant")
        };

        frames.push(Frame::AdoptedStyleSheetsChanged {
            target_node_id: node_id_to_wire(target_id),
            sheet_ids: sheets.iter().map(|s| s.id).collect(),
        });

        for added_ref in added {
            let Some(sheet) = sheets.iter().find(|s| self.style_sheet_ref(s).as_ref() == Some(&added_ref)) else {
                continue;
            };
            frames.push(self.adopted_style_sheet_added_frame(target_id, sheet));
        }
    }

    fn adopted_style_sheet_added_frame(&mut self, target_id: NodeId, sheet: &VStyleSheet) -> Frame {
        let mut new_assets = Vec::new();
        let text = asset_pipeline::rewrite_urls(&sheet.text, |token| {
            let (id, url, is_new) = self.resolve_css_asset(token)?;
            if is_new {
                new_assets.push((id, url));
            }
            Some(format!("asset:{}", id.raw()))
        });
        self.pending_asset_fetches.extend(new_assets.iter().cloned());
        Frame::AdoptedStyleSheetAdded {
            target_node_id: node_id_to_wire(target_id),
            sheet: VStyleSheet { id: sheet.id, media: sheet.media.clone(), text },
            asset_count: new_assets.len() as u32,
        }
    }

    fn resolve_css_asset(&mut self, raw_url: &str) -> Option<(AssetId, String, bool)> {
        if raw_url.starts_with("data:") || raw_url.starts_with("asset:") {
            return None;
        }
        let absolute = self.base_url.join(raw_url).ok()?.to_string();
        let (id, is_new) = self.urls.id_for(&absolute);
        Some((id, absolute, is_new))
    }

    fn style_sheet_ref(&self, sheet: &VStyleSheet) -> Option<StyleSheetRef<Slot>> {
        match sheet.id {
            StyleSheetId::Adopted(tag) => Some(StyleSheetRef::Adopted(tag)),
            StyleSheetId::Owned(node_id) => self.ids.get_handle(node_id).copied().map(StyleSheetRef::Owned),
        }
    }
}
