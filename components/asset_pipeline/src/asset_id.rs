//! [`AssetId`] identity and the `asset:<id>` reserved placeholder syntax.

use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetId(u32);

impl AssetId {
    pub fn from_raw(value: u32) -> Self {
        AssetId(value)
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "asset:{}", self.0)
    }
}

/// A locally-valid URL minted before an asset's bytes arrive. Stands in for
/// a real `URL.createObjectURL` value over a zero-byte blob — there is no
/// real blob store in this workspace, only the guarantee that the string is
/// a syntactically valid, globally unique URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlaceholderUrl(String);

impl PlaceholderUrl {
    pub fn mint() -> Self {
        PlaceholderUrl(format!("asset-placeholder:{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlaceholderUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn asset_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^asset:(\d+)$").unwrap())
}

fn asset_id_token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"asset:(\d+)").unwrap())
}

/// Parses a whole attribute value of exactly `asset:<id>`.
pub fn parse_whole(value: &str) -> Option<AssetId> {
    asset_id_pattern().captures(value).and_then(|c| c.get(1)?.as_str().parse().ok()).map(AssetId::from_raw)
}

/// Finds every distinct `asset:<id>` occurrence anywhere in `value`, in
/// first-seen order.
pub fn find_all(value: &str) -> Vec<AssetId> {
    let mut seen = Vec::new();
    for caps in asset_id_token_pattern().captures_iter(value) {
        if let Ok(raw) = caps[1].parse::<u32>() {
            let id = AssetId::from_raw(raw);
            if !seen.contains(&id) {
                seen.push(id);
            }
        }
    }
    seen
}
