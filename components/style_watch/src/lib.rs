//! [`StyleSheetWatcher`]: tracks `document.styleSheets` ordering,
//! adopted-stylesheet sets, and CSSOM rule mutations, and gates
//! rule-mutation events on their owning node's emission (spec.md §4.4 —
//! the "causal queuing" hard part of the four subsystems).
//!
//! This crate has no real DOM to observe, so it does not itself intercept
//! setters or subscribe to a mutation observer the way the teacher's
//! `StyleSheetsActor` stub gestures at. Instead it is a pure state
//! machine: the recorder calls `record_*` whenever its own observation of
//! the live document notices a stylesheet change, and `add_pending_new_nodes`/
//! `mark_node_emitted`/`mark_node_removed` whenever `DomChangeDetector`
//! assigns or emits node ids. Generalized over a host handle type `H`, the
//! same discipline `node_id::NodeIdMap` and `asset_pipeline::AssetRegistry`
//! use.

use rustc_hash::{FxHashMap, FxHashSet};
use std::hash::Hash;

/// A stylesheet's owner: the node that hosts it (a `<style>`/`<link>`
/// element), or `Adopted(tag)` for a sheet with no owning node, where
/// `tag` is the independently-allocated monotonic counter spec.md §3/§9
/// describes ("Global stylesheet id counter").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StyleSheetRef<H> {
    Owned(H),
    Adopted(u64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleMutation {
    Insert { rule: String, index: usize },
    Delete { index: usize },
    Replace { text: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StyleEvent<H> {
    DocumentStyleSheets {
        now: Vec<StyleSheetRef<H>>,
        added: Vec<StyleSheetRef<H>>,
        removed: Vec<StyleSheetRef<H>>,
        order_changed: bool,
    },
    AdoptedStyleSheetsChanged {
        target: H,
        now: Vec<StyleSheetRef<H>>,
        added: Vec<StyleSheetRef<H>>,
        removed: Vec<StyleSheetRef<H>>,
    },
    SheetRulesInsert { sheet: StyleSheetRef<H>, rule: String, index: usize },
    SheetRulesDelete { sheet: StyleSheetRef<H>, index: usize },
    SheetRulesReplace { sheet: StyleSheetRef<H>, text: String },
}

impl<H: Clone + Eq> StyleEvent<H> {
    /// The `(type, target)` key spec.md §4.4's debounce note coalesces on.
    /// Used by [`coalesce`]; two events share a key only if they'd collapse
    /// into the same final state when replayed in order.
    fn coalesce_key(&self) -> Option<(u8, StyleSheetRef<H>)> {
        match self {
            StyleEvent::SheetRulesReplace { sheet, .. } => Some((2, sheet.clone())),
            _ => None,
        }
    }
}

/// Collapses consecutive same-`(type, target)` events down to the last
/// one, without reordering across keys — spec.md §4.4: "ordering across
/// keys is not reordered by debouncing." Only `SheetRulesReplace` bursts
/// (a rapid sequence of `replaceSync` calls on the same sheet) ever
/// collapse; every other event kind passes through untouched, since
/// collapsing an `Insert`/`Delete` would change rule indices downstream.
pub fn coalesce<H: Clone + Eq>(events: Vec<StyleEvent<H>>) -> Vec<StyleEvent<H>> {
    let mut out: Vec<StyleEvent<H>> = Vec::with_capacity(events.len());
    for event in events {
        if let Some(key) = event.coalesce_key() {
            if let Some(last) = out.last() {
                if last.coalesce_key().as_ref() == Some(&key) {
                    out.pop();
                }
            }
        }
        out.push(event);
    }
    out
}

fn diff<T: Clone + Eq>(before: &[T], now: &[T]) -> (Vec<T>, Vec<T>, bool) {
    let added: Vec<T> = now.iter().filter(|x| !before.contains(x)).cloned().collect();
    let removed: Vec<T> = before.iter().filter(|x| !now.contains(x)).cloned().collect();
    let common_before: Vec<&T> = before.iter().filter(|x| now.contains(x)).collect();
    let common_now: Vec<&T> = now.iter().filter(|x| before.contains(x)).collect();
    let order_changed = common_before != common_now;
    (added, removed, order_changed)
}

pub struct StyleSheetWatcher<H: Clone + Eq + Hash> {
    document_sheets: Vec<StyleSheetRef<H>>,
    adopted: FxHashMap<H, Vec<StyleSheetRef<H>>>,
    pending_new: FxHashSet<H>,
    queues: FxHashMap<H, Vec<StyleEvent<H>>>,
    next_adopted_tag: u64,
}

impl<H: Clone + Eq + Hash> Default for StyleSheetWatcher<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: Clone + Eq + Hash> StyleSheetWatcher<H> {
    pub fn new() -> Self {
        StyleSheetWatcher {
            document_sheets: Vec::new(),
            adopted: FxHashMap::default(),
            pending_new: FxHashSet::default(),
            queues: FxHashMap::default(),
            next_adopted_tag: 0,
        }
    }

    /// Mints the next `Adopted` stylesheet tag (spec.md §9: "an independent
    /// monotonic counter provides their ids").
    pub fn allocate_adopted_tag(&mut self) -> u64 {
        let tag = self.next_adopted_tag;
        self.next_adopted_tag += 1;
        tag
    }

    /// §4.4 entry point 1: `document.styleSheets` changed. Diffs against
    /// the last known ordering and emits immediately — ordering changes
    /// are never gated, only rule mutations are.
    pub fn record_document_style_sheets(&mut self, now: Vec<StyleSheetRef<H>>) -> StyleEvent<H> {
        let (added, removed, order_changed) = diff(&self.document_sheets, &now);
        self.document_sheets = now.clone();
        StyleEvent::DocumentStyleSheets { now, added, removed, order_changed }
    }

    /// §4.4 entry point 2: `target`'s `adoptedStyleSheets` array changed.
    pub fn record_adopted_style_sheets(&mut self, target: H, now: Vec<StyleSheetRef<H>>) -> StyleEvent<H> {
        let before = self.adopted.get(&target).cloned().unwrap_or_default();
        let (added, removed, _order_changed) = diff(&before, &now);
        self.adopted.insert(target.clone(), now.clone());
        StyleEvent::AdoptedStyleSheetsChanged { target, now, added, removed }
    }

    /// §4.4 entry point 3: a CSSOM rule-mutation method fired on `sheet`.
    /// Returns `Some(event)` to emit now, or `None` if it was queued behind
    /// `sheet`'s owner node's emission (the causal gate, only relevant for
    /// `StyleSheetRef::Owned` sheets — adopted sheets have no owner and
    /// always emit immediately).
    pub fn record_rule_mutation(&mut self, sheet: StyleSheetRef<H>, mutation: RuleMutation) -> Option<StyleEvent<H>> {
        let event = match mutation {
            RuleMutation::Insert { rule, index } => StyleEvent::SheetRulesInsert { sheet: sheet.clone(), rule, index },
            RuleMutation::Delete { index } => StyleEvent::SheetRulesDelete { sheet: sheet.clone(), index },
            RuleMutation::Replace { text } => StyleEvent::SheetRulesReplace { sheet: sheet.clone(), text },
        };
        match &sheet {
            StyleSheetRef::Adopted(_) => Some(event),
            StyleSheetRef::Owned(owner) => {
                if self.pending_new.contains(owner) || self.queues.contains_key(owner) {
                    self.queues.entry(owner.clone()).or_default().push(event);
                    None
                } else {
                    Some(event)
                }
            },
        }
    }

    /// Marks every handle in `nodes` as newly-assigned-but-not-yet-emitted;
    /// any rule mutation against a stylesheet they own will queue until
    /// `mark_node_emitted`.
    pub fn add_pending_new_nodes(&mut self, nodes: impl IntoIterator<Item = H>) {
        self.pending_new.extend(nodes);
    }

    /// §4.4: flushes `node`'s queue (if any) and clears its pending-new
    /// status. Events are returned in the order they were queued.
    pub fn mark_node_emitted(&mut self, node: &H) -> Vec<StyleEvent<H>> {
        self.pending_new.remove(node);
        self.queues.remove(node).unwrap_or_default()
    }

    /// §4.4: discards `node`'s queue and clears its pending-new status —
    /// the node was removed before it was ever emitted, so any rule
    /// mutations queued against its stylesheet are moot.
    pub fn mark_node_removed(&mut self, node: &H) {
        self.pending_new.remove(node);
        self.queues.remove(node);
    }

    pub fn is_pending(&self, node: &H) -> bool {
        self.pending_new.contains(node)
    }

    pub fn queue_len(&self, node: &H) -> usize {
        self.queues.get(node).map(Vec::len).unwrap_or(0)
    }
}
