//! [`AssetRegistry`]: the table of asset state and the bind/release/receive
//! lifecycle from spec.md §4.3. Generalized over a host handle type `H`
//! (the same `Clone + Eq + Hash` discipline `node_id::NodeIdMap` uses) so
//! this crate never has to know what a "live element" or "live stylesheet"
//! actually is — the `player` crate supplies `dom_model::live::Slot`.
//!
//! There is no real DOM here, so there are no closures registered as
//! "requestors" the way a browser implementation would hang a callback off
//! an element. Instead `receive` returns the list of patches the caller
//! must apply to its own document — a plain data answer instead of a
//! callback, which is the only shape that works once the registry and the
//! document it describes are two separate owners.

use crate::asset_id::{self, AssetId, PlaceholderUrl};
use crate::css;
use crate::srcset;
use rustc_hash::{FxHashMap, FxHashSet};
use std::hash::Hash;

/// Bytes supplied for a previously-observed [`AssetId`], as they arrive off
/// the wire (an `Asset` or resolved `AssetReference` frame).
#[derive(Debug, Clone)]
pub struct ReceivedAsset {
    pub id: AssetId,
    pub url: String,
    pub mime: Option<String>,
    pub bytes: Vec<u8>,
}

/// An instruction to substitute `placeholder` for `resolved` wherever it
/// currently appears in the named target's live value. The substring
/// substitution is always safe: placeholders are minted as
/// globally-unique tokens (see [`PlaceholderUrl::mint`]), so a literal
/// `str::replace` can never touch anything but the occurrences this
/// registry itself inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetPatch<H> {
    ElementAttribute { host: H, attr: String, placeholder: String, resolved: String },
    StyleSheetText { host: H, placeholder: String, resolved: String },
}

struct AssetEntry<H> {
    source_url: Option<String>,
    bytes: Option<Vec<u8>>,
    mime: Option<String>,
    resolved_url: Option<String>,
    pending_placeholder: PlaceholderUrl,
    reference_count: usize,
    bound_elements: FxHashSet<(H, String)>,
    bound_stylesheets: FxHashSet<H>,
}

impl<H: Clone + Eq + Hash> AssetEntry<H> {
    fn fresh() -> Self {
        AssetEntry {
            source_url: None,
            bytes: None,
            mime: None,
            resolved_url: None,
            pending_placeholder: PlaceholderUrl::mint(),
            reference_count: 0,
            bound_elements: FxHashSet::default(),
            bound_stylesheets: FxHashSet::default(),
        }
    }

    fn current_url(&self) -> &str {
        self.resolved_url.as_deref().unwrap_or_else(|| self.pending_placeholder.as_str())
    }
}

#[derive(Default)]
pub struct AssetRegistry<H: Clone + Eq + Hash> {
    entries: FxHashMap<AssetId, AssetEntry<H>>,
}

impl<H: Clone + Eq + Hash> AssetRegistry<H> {
    pub fn new() -> Self {
        AssetRegistry { entries: FxHashMap::default() }
    }

    /// §4.3 `getOrCreate`: returns the current substitution URL for `id`
    /// (a placeholder until `receive` has landed), creating an empty entry
    /// if this is the first time `id` has been seen.
    pub fn get_or_create(&mut self, id: AssetId) -> &str {
        self.entries.entry(id).or_insert_with(AssetEntry::fresh).current_url()
    }

    pub fn reference_count(&self, id: AssetId) -> usize {
        self.entries.get(&id).map(|e| e.reference_count).unwrap_or(0)
    }

    pub fn is_resolved(&self, id: AssetId) -> bool {
        self.entries.get(&id).is_some_and(|e| e.resolved_url.is_some())
    }

    fn bind_one(&mut self, id: AssetId, host: H, attr: Option<&str>) -> String {
        let entry = self.entries.entry(id).or_insert_with(AssetEntry::fresh);
        entry.reference_count += 1;
        match attr {
            Some(attr) => {
                entry.bound_elements.insert((host, attr.to_string()));
            },
            None => {
                entry.bound_stylesheets.insert(host);
            },
        }
        entry.current_url().to_string()
    }

    /// §4.3 `bindAssetToElementAttribute`: scans `raw_value` for
    /// `asset:<id>` occurrences appropriate to `attr_name`'s syntax and
    /// substitutes the current (placeholder or already-resolved) URL for
    /// each, incrementing that asset's reference count and recording
    /// `host` as a bound element.
    pub fn bind_element_attribute(&mut self, host: H, attr_name: &str, raw_value: &str) -> String {
        match attr_name {
            "srcset" => {
                let mut candidates = srcset::parse(raw_value);
                for candidate in &mut candidates {
                    if let Some(id) = asset_id::parse_whole(&candidate.url) {
                        candidate.url = self.bind_one(id, host.clone(), Some(attr_name));
                    }
                }
                srcset::format(&candidates)
            },
            "style" => css::rewrite_urls(raw_value, |token| {
                asset_id::parse_whole(token).map(|id| self.bind_one(id, host.clone(), Some(attr_name)))
            }),
            _ => match asset_id::parse_whole(raw_value) {
                Some(id) => self.bind_one(id, host, Some(attr_name)),
                None => raw_value.to_string(),
            },
        }
    }

    /// §4.3 `bindAssetsToStyleSheet`/`bindAssetsToStyleElement`: rewrites
    /// every `url(asset:<id>)` occurrence in `css_text`, binding `host` as
    /// the owning stylesheet (or `<style>` element) for each.
    pub fn bind_stylesheet_text(&mut self, host: H, css_text: &str) -> String {
        css::rewrite_urls(css_text, |token| {
            asset_id::parse_whole(token).map(|id| self.bind_one(id, host.clone(), None))
        })
    }

    /// §4.3 `receive`: supplies bytes for `id`. Idempotent — a second call
    /// for an already-resolved id returns no patches.
    pub fn receive(&mut self, asset: ReceivedAsset) -> Vec<AssetPatch<H>> {
        let entry = self.entries.entry(asset.id).or_insert_with(AssetEntry::fresh);
        if entry.resolved_url.is_some() {
            return Vec::new();
        }
        let placeholder = entry.pending_placeholder.as_str().to_string();
        // No real blob store in this workspace (SPEC_FULL.md §6): the
        // resolved URL is always the asset's own source URL, whether or
        // not it carried bytes.
        let resolved = asset.url.clone();
        entry.source_url = Some(asset.url);
        entry.mime = asset.mime;
        entry.bytes = Some(asset.bytes);
        entry.resolved_url = Some(resolved.clone());

        let mut patches = Vec::with_capacity(entry.bound_elements.len() + entry.bound_stylesheets.len());
        for (host, attr) in &entry.bound_elements {
            patches.push(AssetPatch::ElementAttribute {
                host: host.clone(),
                attr: attr.clone(),
                placeholder: placeholder.clone(),
                resolved: resolved.clone(),
            });
        }
        for host in &entry.bound_stylesheets {
            patches.push(AssetPatch::StyleSheetText {
                host: host.clone(),
                placeholder: placeholder.clone(),
                resolved: resolved.clone(),
            });
        }
        patches
    }

    /// §4.3 `releaseByElement`. Unknown `(host, attr)` pairs are silently
    /// ignored, matching "unknown ids... silently ignored".
    pub fn release_by_element(&mut self, host: &H) {
        self.entries.retain(|_, entry| {
            let before = entry.bound_elements.len();
            entry.bound_elements.retain(|(h, _)| h != host);
            let released = before - entry.bound_elements.len();
            entry.reference_count = entry.reference_count.saturating_sub(released);
            entry.reference_count > 0 || !entry.bound_stylesheets.is_empty() || released == 0
        });
    }

    pub fn release_by_stylesheet(&mut self, host: &H) {
        self.entries.retain(|_, entry| {
            let released = entry.bound_stylesheets.remove(host) as usize;
            entry.reference_count = entry.reference_count.saturating_sub(released);
            entry.reference_count > 0 || !entry.bound_elements.is_empty() || released == 0
        });
    }

    /// §4.3 `dispose`: drops every entry. There are no real object URLs to
    /// revoke in this workspace (see SPEC_FULL.md §6), so this is a plain
    /// clear.
    pub fn dispose(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_create_returns_a_stable_placeholder_until_resolved() {
        let mut registry: AssetRegistry<u32> = AssetRegistry::new();
        let id = AssetId::from_raw(1);
        let first = registry.get_or_create(id).to_string();
        let second = registry.get_or_create(id).to_string();
        assert_eq!(first, second);
        assert!(first.starts_with("asset-placeholder:"));
    }

    #[test]
    fn bind_plain_attribute_substitutes_placeholder() {
        let mut registry: AssetRegistry<u32> = AssetRegistry::new();
        let rewritten = registry.bind_element_attribute(7, "src", "asset:3");
        assert!(rewritten.starts_with("asset-placeholder:"));
        assert_eq!(registry.reference_count(AssetId::from_raw(3)), 1);
    }

    #[test]
    fn bind_srcset_only_rewrites_url_tokens() {
        let mut registry: AssetRegistry<u32> = AssetRegistry::new();
        let rewritten = registry.bind_element_attribute(7, "srcset", "asset:1 1x, asset:2 2x");
        assert!(rewritten.contains("1x"));
        assert!(rewritten.contains("2x"));
        assert_eq!(registry.reference_count(AssetId::from_raw(1)), 1);
        assert_eq!(registry.reference_count(AssetId::from_raw(2)), 1);
    }

    #[test]
    fn bind_style_attribute_rewrites_css_urls() {
        let mut registry: AssetRegistry<u32> = AssetRegistry::new();
        let rewritten = registry.bind_element_attribute(7, "style", "background:url(asset:9)");
        assert!(rewritten.contains("url(asset-placeholder:"));
        assert_eq!(registry.reference_count(AssetId::from_raw(9)), 1);
    }

    #[test]
    fn receive_patches_every_bound_element_and_stylesheet() {
        let mut registry: AssetRegistry<u32> = AssetRegistry::new();
        registry.bind_element_attribute(1, "src", "asset:5");
        registry.bind_stylesheet_text(2, "a{background:url(asset:5)}");

        let patches = registry.receive(ReceivedAsset {
            id: AssetId::from_raw(5),
            url: "https://example.com/a.png".to_string(),
            mime: Some("image/png".to_string()),
            bytes: vec![1, 2, 3],
        });
        assert_eq!(patches.len(), 2);
        assert!(patches.iter().any(|p| matches!(p, AssetPatch::ElementAttribute { host: 1, .. })));
        assert!(patches.iter().any(|p| matches!(p, AssetPatch::StyleSheetText { host: 2, .. })));
    }

    #[test]
    fn receive_is_idempotent() {
        let mut registry: AssetRegistry<u32> = AssetRegistry::new();
        registry.bind_element_attribute(1, "src", "asset:5");
        let asset = || ReceivedAsset {
            id: AssetId::from_raw(5),
            url: "https://example.com/a.png".to_string(),
            mime: None,
            bytes: vec![1],
        };
        let first = registry.receive(asset());
        let second = registry.receive(asset());
        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
    }

    #[test]
    fn receive_on_unknown_id_creates_and_resolves_it() {
        let mut registry: AssetRegistry<u32> = AssetRegistry::new();
        let patches = registry.receive(ReceivedAsset {
            id: AssetId::from_raw(99),
            url: "https://example.com/b.png".to_string(),
            mime: None,
            bytes: vec![],
        });
        assert!(patches.is_empty());
        assert!(registry.is_resolved(AssetId::from_raw(99)));
    }

    #[test]
    fn release_decrements_and_drops_entry_at_zero() {
        let mut registry: AssetRegistry<u32> = AssetRegistry::new();
        registry.bind_element_attribute(1, "src", "asset:5");
        assert_eq!(registry.reference_count(AssetId::from_raw(5)), 1);
        registry.release_by_element(&1);
        assert_eq!(registry.reference_count(AssetId::from_raw(5)), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn release_by_unknown_host_is_a_no_op() {
        let mut registry: AssetRegistry<u32> = AssetRegistry::new();
        registry.bind_element_attribute(1, "src", "asset:5");
        registry.release_by_element(&42);
        assert_eq!(registry.reference_count(AssetId::from_raw(5)), 1);
    }

    #[test]
    fn reference_count_equals_bound_host_set_size() {
        let mut registry: AssetRegistry<u32> = AssetRegistry::new();
        registry.bind_element_attribute(1, "src", "asset:5");
        registry.bind_element_attribute(2, "src", "asset:5");
        registry.bind_stylesheet_text(3, "url(asset:5)");
        assert_eq!(registry.reference_count(AssetId::from_raw(5)), 3);
        registry.release_by_element(&1);
        assert_eq!(registry.reference_count(AssetId::from_raw(5)), 2);
        registry.release_by_stylesheet(&3);
        assert_eq!(registry.reference_count(AssetId::from_raw(5)), 1);
    }

    #[test]
    fn dispose_clears_all_entries() {
        let mut registry: AssetRegistry<u32> = AssetRegistry::new();
        registry.bind_element_attribute(1, "src", "asset:5");
        registry.dispose();
        assert!(registry.is_empty());
    }
}
