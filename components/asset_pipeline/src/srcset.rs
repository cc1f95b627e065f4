//! `srcset` candidate parsing: a comma-separated list of `url descriptor?`
//! pairs. Only the URL token of each candidate is ever asset-ified; the
//! descriptor (`1x`, `480w`, ...) travels through untouched.

/// One `srcset` candidate: the URL token plus whatever followed it,
/// verbatim (may be empty).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub url: String,
    pub descriptor: String,
}

pub fn parse(value: &str) -> Vec<Candidate> {
    value
        .split(',')
        .map(|part| part.trim())
        .filter(|part| !part.is_empty())
        .map(|part| match part.split_once(char::is_whitespace) {
            Some((url, rest)) => Candidate { url: url.to_string(), descriptor: rest.trim().to_string() },
            None => Candidate { url: part.to_string(), descriptor: String::new() },
        })
        .collect()
}

pub fn format(candidates: &[Candidate]) -> String {
    candidates
        .iter()
        .map(|c| if c.descriptor.is_empty() { c.url.clone() } else { format!("{} {}", c.url, c.descriptor) })
        .collect::<Vec<_>>()
        .join(", ")
}
