//! Minimal text edit scripts: a naive common-prefix/common-suffix diff and
//! its replay. Optimality of the op count is not a goal, only correctness
//! of `apply(old, diff(old, new)) == new`.

use std::fmt;

/// A single edit op. Indices are codepoint-unit positions in the pre-image
/// of the string at the moment the op is applied, in sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextOp {
    Insert { index: usize, content: String },
    Remove { index: usize, count: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffError {
    /// An op's `index` (or `index + count`) fell outside the text it was
    /// applied to.
    OutOfBounds,
}

impl fmt::Display for DiffError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiffError::OutOfBounds => write!(f, "text op index out of bounds"),
        }
    }
}

impl std::error::Error for DiffError {}

/// Computes a minimal insert/remove edit script turning `old` into `new`.
///
/// `diff(s, s) == []` for any `s`. Costs an O(n) prefix/suffix scan rather
/// than a full LCS; producing a shorter script is never required.
pub fn diff(old: &str, new: &str) -> Vec<TextOp> {
    let old_chars: Vec<char> = old.chars().collect();
    let new_chars: Vec<char> = new.chars().collect();

    let min_len = old_chars.len().min(new_chars.len());
    let prefix_len = old_chars
        .iter()
        .zip(new_chars.iter())
        .take(min_len)
        .take_while(|(a, b)| a == b)
        .count();

    let old_remaining = old_chars.len() - prefix_len;
    let new_remaining = new_chars.len() - prefix_len;
    let max_suffix = old_remaining.min(new_remaining);
    let suffix_len = (0..max_suffix)
        .take_while(|&i| {
            old_chars[old_chars.len() - 1 - i] == new_chars[new_chars.len() - 1 - i]
        })
        .count();

    let old_mid_len = old_chars.len() - prefix_len - suffix_len;
    let new_mid_start = prefix_len;
    let new_mid_end = new_chars.len() - suffix_len;

    let mut ops = Vec::with_capacity(2);
    if old_mid_len > 0 {
        ops.push(TextOp::Remove {
            index: prefix_len,
            count: old_mid_len,
        });
    }
    if new_mid_end > new_mid_start {
        ops.push(TextOp::Insert {
            index: prefix_len,
            content: new_chars[new_mid_start..new_mid_end].iter().collect(),
        });
    }
    ops
}

/// Replays an edit script over `text`, applying ops in order against the
/// running (mutated) text.
pub fn apply(text: &str, ops: &[TextOp]) -> Result<String, DiffError> {
    let mut chars: Vec<char> = text.chars().collect();
    for op in ops {
        match op {
            TextOp::Insert { index, content } => {
                if *index > chars.len() {
                    return Err(DiffError::OutOfBounds);
                }
                chars.splice(*index..*index, content.chars());
            },
            TextOp::Remove { index, count } => {
                let end = index.checked_add(*count).ok_or(DiffError::OutOfBounds)?;
                if end > chars.len() {
                    return Err(DiffError::OutOfBounds);
                }
                chars.drain(*index..end);
            },
        }
    }
    Ok(chars.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(old: &str, new: &str) {
        let ops = diff(old, new);
        assert_eq!(apply(old, &ops).unwrap(), new, "old={old:?} new={new:?} ops={ops:?}");
    }

    #[test]
    fn identical_strings_produce_no_ops() {
        assert_eq!(diff("hello", "hello"), vec![]);
        assert_eq!(diff("", ""), vec![]);
    }

    #[test]
    fn roundtrips_cover_edge_cases() {
        roundtrip("hello", "hello world");
        roundtrip("hello world", "world");
        roundtrip("", "abc");
        roundtrip("abc", "");
        roundtrip("abc", "xyz");
        roundtrip("hello", "hello");
        roundtrip("caf\u{e9}", "caf\u{e9}\u{e9}");
        roundtrip("\u{1f600}abc", "\u{1f600}xyz");
    }

    #[test]
    fn insert_then_remove_matches_scenario_b() {
        // scenario (b) from the spec: insert " world" at 5, then remove the
        // first six characters.
        let ops = vec![
            TextOp::Insert {
                index: 5,
                content: " world".to_string(),
            },
        ];
        let after_insert = apply("hello", &ops).unwrap();
        assert_eq!(after_insert, "hello world");
        let ops2 = vec![TextOp::Remove { index: 0, count: 6 }];
        let after_remove = apply(&after_insert, &ops2).unwrap();
        assert_eq!(after_remove, "world");
    }

    #[test]
    fn out_of_bounds_ops_are_rejected() {
        assert_eq!(
            apply("abc", &[TextOp::Remove { index: 2, count: 5 }]),
            Err(DiffError::OutOfBounds)
        );
        assert_eq!(
            apply(
                "abc",
                &[TextOp::Insert {
                    index: 10,
                    content: "x".to_string()
                }]
            ),
            Err(DiffError::OutOfBounds)
        );
    }

    #[test]
    fn empty_ops_is_idempotent_law() {
        // "replaying apply twice over the same input is idempotent iff
        // ops == []"
        let text = "stable";
        assert_eq!(apply(text, &[]).unwrap(), text);
        let nonempty = vec![TextOp::Insert {
            index: 0,
            content: "x".to_string(),
        }];
        let once = apply(text, &nonempty).unwrap();
        let twice = apply(&once, &nonempty).unwrap();
        assert_ne!(once, twice);
    }
}
