//! [`AssetInliner`]: walks a subtree, assigns [`AssetId`]s to every
//! URL-bearing attribute and CSS `url(...)`, and rewrites references to
//! `asset:<id>` (spec.md §4.5). Runs on the recorder side, against
//! whatever subtree `DomChangeDetector` just adopted into its
//! `LiveDocument`.

use crate::asset_id::AssetId;
use crate::css;
use crate::srcset;
use dom_model::{LiveDocument, LiveNodeKind, ModelError, Slot};
use dom_model::{VCharacterData, VElement, VNode};
use node_id::NodeId;
use rustc_hash::FxHashMap;
use url::Url;

/// Stable `AssetId` allocation keyed by absolute URL, for the lifetime of
/// one recording. Identical URLs always receive the same id (spec.md §3).
#[derive(Default)]
pub struct AssetUrlTable {
    by_url: FxHashMap<String, AssetId>,
    next: u32,
}

impl AssetUrlTable {
    pub fn new() -> Self {
        AssetUrlTable::default()
    }

    /// Returns the id for `url`, minting a fresh one on first sight.
    /// Returns whether this was a first sight, so the caller knows whether
    /// to queue a fetch.
    pub fn id_for(&mut self, url: &str) -> (AssetId, bool) {
        if let Some(&id) = self.by_url.get(url) {
            return (id, false);
        }
        let id = AssetId::from_raw(self.next);
        self.next += 1;
        self.by_url.insert(url.to_string(), id);
        (id, true)
    }
}

/// Informational classification (spec.md §4.5); never affects wire framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Font,
    Image,
    Binary,
}

pub fn classify(url: &str) -> AssetKind {
    let path = url.rsplit(['?', '#']).next_back().unwrap_or(url);
    match mime_guess::from_path(path).first() {
        Some(mime) if mime.type_() == mime_guess::mime::FONT => AssetKind::Font,
        Some(mime) if mime.type_() == mime_guess::mime::IMAGE => AssetKind::Image,
        _ => AssetKind::Binary,
    }
}

/// Resolves same-origin `<link rel="stylesheet">` hrefs to CSS text so
/// they can be inlined as `<style>` elements. The real implementation (an
/// HTTP fetch, out of scope for this crate's synchronous walk) is supplied
/// by the caller; a fetcher that always returns `None` preserves every
/// stylesheet link untouched, which is always a correct (if less
/// complete) outcome per spec.md §4.5.
pub trait StylesheetFetcher {
    fn fetch_same_origin_css(&self, href: &str) -> Option<String>;
}

/// A fetcher that never resolves anything; every `<link>` is preserved.
pub struct NoStylesheetFetcher;

impl StylesheetFetcher for NoStylesheetFetcher {
    fn fetch_same_origin_css(&self, _href: &str) -> Option<String> {
        None
    }
}

const GENERIC_URL_ATTRS: &[&str] = &["src", "poster", "data-src", "xlink:href"];

/// One subtree walk's worth of output: the rewritten virtual tree, plus
/// every newly-discovered `(AssetId, url)` pair to fetch, in first-seen
/// order (spec.md §4.6's `assetCount` is `new_assets.len()`).
pub struct InlineOutcome {
    pub vnode: VNode,
    pub new_assets: Vec<(AssetId, String)>,
}

pub struct AssetInliner<'a> {
    base_url: Url,
    urls: &'a mut AssetUrlTable,
    fetcher: &'a dyn StylesheetFetcher,
    new_assets: Vec<(AssetId, String)>,
}

impl<'a> AssetInliner<'a> {
    pub fn new(base_url: Url, urls: &'a mut AssetUrlTable, fetcher: &'a dyn StylesheetFetcher) -> Self {
        AssetInliner { base_url, urls, fetcher, new_assets: Vec::new() }
    }

    /// Walks `root` (and its shadow tree, if any) in document order,
    /// rewriting every URL-bearing position it recognizes.
    pub fn inline_subtree(
        mut self,
        doc: &LiveDocument,
        root: Slot,
        id_of: &impl Fn(Slot) -> NodeId,
    ) -> Result<InlineOutcome, ModelError> {
        let vnode = self.walk(doc, root, id_of)?;
        Ok(InlineOutcome { vnode, new_assets: self.new_assets })
    }

    fn resolve(&mut self, raw_url: &str) -> Option<(AssetId, String)> {
        if raw_url.starts_with("data:") || raw_url.starts_with("asset:") {
            return None;
        }
        let absolute = self.base_url.join(raw_url).ok()?.to_string();
        let (id, is_new) = self.urls.id_for(&absolute);
        if is_new {
            self.new_assets.push((id, absolute));
        }
        Some((id, format!("asset:{}", id.raw())))
    }

    fn rewrite_attr(&mut self, tag: &str, name: &str, value: &str) -> String {
        match name {
            "srcset" => {
                let mut candidates = srcset::parse(value);
                for candidate in &mut candidates {
                    if let Some((_, token)) = self.resolve(&candidate.url) {
                        candidate.url = token;
                    }
                }
                srcset::format(&candidates)
            },
            "style" => css::rewrite_urls(value, |token| self.resolve(token).map(|(_, t)| t)),
            _ if GENERIC_URL_ATTRS.contains(&name) && tag != "script" => {
                self.resolve(value).map(|(_, t)| t).unwrap_or_else(|| value.to_string())
            },
            _ => value.to_string(),
        }
    }

    fn walk(
        &mut self,
        doc: &LiveDocument,
        slot: Slot,
        id_of: &impl Fn(Slot) -> NodeId,
    ) -> Result<VNode, ModelError> {
        let id = id_of(slot);
        match doc.kind(slot)?.clone() {
            LiveNodeKind::Element { tag, namespace, attrs, children, shadow } => {
                let (tag, attrs, text_override) = self.rewrite_element(doc, slot, &tag, attrs)?;
                let mut v_children = Vec::with_capacity(children.len());
                if let Some(text) = text_override {
                    v_children.push(VNode::Text(VCharacterData { id, data: text }));
                } else {
                    for child in children {
                        v_children.push(self.walk(doc, child, id_of)?);
                    }
                }
                let v_shadow = shadow
                    .map(|shadow_children| {
                        shadow_children.iter().map(|&c| self.walk(doc, c, id_of)).collect::<Result<Vec<_>, _>>()
                    })
                    .transpose()?;
                Ok(VNode::Element(VElement { id, tag, namespace, attrs, children: v_children, shadow: v_shadow }))
            },
            LiveNodeKind::Text(data) => Ok(VNode::Text(VCharacterData { id, data })),
            LiveNodeKind::Cdata(data) => Ok(VNode::Cdata(VCharacterData { id, data })),
            LiveNodeKind::Comment(data) => Ok(VNode::Comment(VCharacterData { id, data })),
            LiveNodeKind::ProcessingInstruction { target, data } => {
                Ok(VNode::ProcessingInstruction(dom_model::VProcessingInstruction { id, target, data }))
            },
            LiveNodeKind::DocumentType { name, public_id, system_id } => {
                Ok(VNode::DocumentType(dom_model::VDocumentType { id, name, public_id, system_id }))
            },
        }
    }

    /// Rewrites one element's own attributes (not its children). Returns
    /// the tag to emit (`<link rel=stylesheet>` may become `<style>`),
    /// the rewritten attribute list, and an optional replacement for the
    /// element's text content (used for `<script>` stripping and inlined
    /// `<style>`/`<link>` CSS text).
    fn rewrite_element(
        &mut self,
        doc: &LiveDocument,
        slot: Slot,
        tag: &str,
        attrs: Vec<(String, String)>,
    ) -> Result<(String, Vec<(String, String)>, Option<String>), ModelError> {
        let lower_tag = tag.to_ascii_lowercase();

        if lower_tag == "script" {
            let rewritten: Vec<_> = attrs.into_iter().filter(|(name, _)| name != "src").collect();
            return Ok((tag.to_string(), rewritten, Some(String::new())));
        }

        if lower_tag == "style" {
            let css_text = current_text(doc, slot);
            let rewritten_css = css::rewrite_urls(&css_text, |token| self.resolve(token).map(|(_, t)| t));
            return Ok((tag.to_string(), attrs, Some(rewritten_css)));
        }

        if lower_tag == "link" && attrs.iter().any(|(k, v)| k == "rel" && v.eq_ignore_ascii_case("stylesheet")) {
            let href = attrs.iter().find(|(k, _)| k == "href").map(|(_, v)| v.clone());
            if let Some(href) = href {
                if let Some(css_text) = self.fetcher.fetch_same_origin_css(&href) {
                    let rewritten_css = css::rewrite_urls(&css_text, |token| self.resolve(token).map(|(_, t)| t));
                    let kept: Vec<_> =
                        attrs.into_iter().filter(|(k, _)| k != "rel" && k != "href").collect();
                    return Ok(("style".to_string(), kept, Some(rewritten_css)));
                }
            }
            // Cross-origin or unfetchable: preserved untouched, no asset
            // collected for its href.
            return Ok((tag.to_string(), attrs, None));
        }

        let rewritten = attrs
            .into_iter()
            .map(|(name, value)| {
                let new_value = self.rewrite_attr(&lower_tag, &name, &value);
                (name, new_value)
            })
            .collect();
        Ok((tag.to_string(), rewritten, None))
    }
}

/// `<style>` text is read from the element's sole text child, if any
/// (standing in for "read from `sheet.cssRules` when accessible, else
/// `textContent`" — there is no CSSOM here, only the character data the
/// live document stores).
fn current_text(doc: &LiveDocument, style_slot: Slot) -> String {
    let Ok(children) = doc.children(style_slot) else { return String::new() };
    children
        .iter()
        .filter_map(|&c| match doc.kind(c).ok()? {
            LiveNodeKind::Text(s) => Some(s.clone()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use dom_model::LiveDocument;

    fn elem(tag: &str, attrs: &[(&str, &str)]) -> LiveNodeKind {
        LiveNodeKind::Element {
            tag: tag.to_string(),
            namespace: None,
            attrs: attrs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            children: Vec::new(),
            shadow: None,
        }
    }

    fn id_of_slot(slot: Slot) -> NodeId {
        NodeId::from_raw(slot.raw() as u64)
    }

    fn base() -> Url {
        Url::parse("https://example.com/page").unwrap()
    }

    #[test]
    fn img_src_is_rewritten_and_queued() {
        let mut doc = LiveDocument::new();
        let root = doc.root();
        let img = doc.insert_child(root, 0, elem("img", &[("src", "cat.png")])).unwrap();
        let _ = img;

        let mut urls = AssetUrlTable::new();
        let fetcher = NoStylesheetFetcher;
        let inliner = AssetInliner::new(base(), &mut urls, &fetcher);
        let outcome = inliner.inline_subtree(&doc, root, &id_of_slot).unwrap();
        assert_eq!(outcome.new_assets.len(), 1);
        let VNode::Element(img_root) = &outcome.vnode else { panic!() };
        let VNode::Element(img_el) = &img_root.children[0] else { panic!() };
        assert_eq!(img_el.attrs[0].1, "asset:0");
    }

    #[test]
    fn duplicate_urls_share_one_asset_id() {
        let mut doc = LiveDocument::new();
        let root = doc.root();
        doc.insert_child(root, 0, elem("img", &[("src", "cat.png")])).unwrap();
        doc.insert_child(root, 1, elem("img", &[("src", "cat.png")])).unwrap();

        let mut urls = AssetUrlTable::new();
        let fetcher = NoStylesheetFetcher;
        let inliner = AssetInliner::new(base(), &mut urls, &fetcher);
        let outcome = inliner.inline_subtree(&doc, root, &id_of_slot).unwrap();
        assert_eq!(outcome.new_assets.len(), 1);
        let VNode::Element(r) = &outcome.vnode else { panic!() };
        let (VNode::Element(a), VNode::Element(b)) = (&r.children[0], &r.children[1]) else { panic!() };
        assert_eq!(a.attrs[0].1, b.attrs[0].1);
    }

    #[test]
    fn script_text_is_stripped_and_src_dropped() {
        let mut doc = LiveDocument::new();
        let root = doc.root();
        let script = doc.insert_child(root, 0, elem("script", &[("src", "a.js")])).unwrap();
        doc.insert_child(script, 0, LiveNodeKind::Text("alert(1)".into())).unwrap();

        let mut urls = AssetUrlTable::new();
        let fetcher = NoStylesheetFetcher;
        let inliner = AssetInliner::new(base(), &mut urls, &fetcher);
        let outcome = inliner.inline_subtree(&doc, root, &id_of_slot).unwrap();
        assert!(outcome.new_assets.is_empty());
        let VNode::Element(r) = &outcome.vnode else { panic!() };
        let VNode::Element(script_el) = &r.children[0] else { panic!() };
        assert!(script_el.attrs.iter().all(|(k, _)| k != "src"));
        assert!(matches!(&script_el.children[0], VNode::Text(t) if t.data.is_empty()));
    }

    #[test]
    fn style_text_urls_are_rewritten() {
        let mut doc = LiveDocument::new();
        let root = doc.root();
        let style = doc.insert_child(root, 0, elem("style", &[])).unwrap();
        doc.insert_child(style, 0, LiveNodeKind::Text("a{background:url(bg.png)}".into())).unwrap();

        let mut urls = AssetUrlTable::new();
        let fetcher = NoStylesheetFetcher;
        let inliner = AssetInliner::new(base(), &mut urls, &fetcher);
        let outcome = inliner.inline_subtree(&doc, root, &id_of_slot).unwrap();
        assert_eq!(outcome.new_assets.len(), 1);
        let VNode::Element(r) = &outcome.vnode else { panic!() };
        let VNode::Element(style_el) = &r.children[0] else { panic!() };
        assert!(matches!(&style_el.children[0], VNode::Text(t) if t.data.contains("asset:0")));
    }

    #[test]
    fn unfetchable_stylesheet_link_is_preserved() {
        let mut doc = LiveDocument::new();
        let root = doc.root();
        doc.insert_child(
            root,
            0,
            elem("link", &[("rel", "stylesheet"), ("href", "https://cdn.example.com/a.css")]),
        )
        .unwrap();

        let mut urls = AssetUrlTable::new();
        let fetcher = NoStylesheetFetcher;
        let inliner = AssetInliner::new(base(), &mut urls, &fetcher);
        let outcome = inliner.inline_subtree(&doc, root, &id_of_slot).unwrap();
        assert!(outcome.new_assets.is_empty());
        let VNode::Element(r) = &outcome.vnode else { panic!() };
        let VNode::Element(link_el) = &r.children[0] else { panic!() };
        assert_eq!(link_el.tag, "link");
    }

    #[test]
    fn classify_matches_extension_table() {
        assert_eq!(classify("a.woff2"), AssetKind::Font);
        assert_eq!(classify("a.png?x=1"), AssetKind::Image);
        assert_eq!(classify("a.bin"), AssetKind::Binary);
    }
}
