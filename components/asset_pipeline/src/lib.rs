//! `AssetId`, [`AssetRegistry`] (spec.md §4.3) and [`AssetInliner`] (§4.5):
//! the pipeline that turns URL-bearing attributes and CSS `url(...)`
//! references into stable `asset:<id>` placeholders, fetches their bytes,
//! and rewrites the placeholders back into live values once those bytes
//! land.

mod asset_id;
mod css;
mod inliner;
mod registry;
mod srcset;

pub use asset_id::{find_all, parse_whole, AssetId, PlaceholderUrl};
pub use css::{find_url_tokens, rewrite_urls};
pub use inliner::{classify, AssetInliner, AssetKind, AssetUrlTable, InlineOutcome, NoStylesheetFetcher, StylesheetFetcher};
pub use registry::{AssetPatch, AssetRegistry, ReceivedAsset};
