//! Shared `url(...)` scanning/rewriting used by both the inliner (real URL
//! -> `asset:<id>`) and the registry (`asset:<id>` -> placeholder/resolved
//! URL). One regex, one rewrite loop, two call sites with different
//! substitution functions.

use regex::Regex;
use std::sync::OnceLock;

fn url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#"url\(\s*(['"]?)([^'"\)]+?)\1?\s*\)"#).unwrap())
}

/// Rewrites every `url(...)` occurrence in `css`. `replace` receives the
/// inner token (without quotes) and returns the replacement token, or
/// `None` to leave that occurrence untouched. The original quote style (or
/// lack of one) is preserved.
pub fn rewrite_urls(css: &str, mut replace: impl FnMut(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(css.len());
    let mut last_end = 0;
    for caps in url_pattern().captures_iter(css) {
        let whole = caps.get(0).unwrap();
        let quote = caps.get(1).map_or("", |m| m.as_str());
        let token = caps.get(2).unwrap().as_str();
        out.push_str(&css[last_end..whole.start()]);
        match replace(token) {
            Some(new_token) => out.push_str(&format!("url({quote}{new_token}{quote})")),
            None => out.push_str(whole.as_str()),
        }
        last_end = whole.end();
    }
    out.push_str(&css[last_end..]);
    out
}

/// The inner tokens of every `url(...)` occurrence, in order.
pub fn find_url_tokens(css: &str) -> Vec<String> {
    url_pattern().captures_iter(css).map(|c| c.get(2).unwrap().as_str().to_string()).collect()
}
