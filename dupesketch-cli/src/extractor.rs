//! A deterministic whitespace/identifier feature extractor.
//!
//! The core engine treats feature extraction as an external collaborator
//! (§1, §6): something hands it `(token, weight)` pairs per document. In
//! production that collaborator parses a syntax tree and extracts
//! structural features; here it is a stand-in so the binary runs end to end
//! without one. It splits a file's bytes into identifier-like runs
//! (`[A-Za-z0-9_]+`) and counts repeats, which is enough to drive the S1-S6
//! scenarios and is deterministic per input, the only contract the core
//! actually requires of it (§6 "the core only assumes the call is
//! deterministic per input").

use std::collections::HashMap;

use dupesketch::Feature;

/// Extract `(token, weight)` features from file bytes. Returns `None` if
/// the bytes are not valid UTF-8 text (treated the same as a binary file by
/// the caller, see [`crate::walker`]).
pub fn extract_features(bytes: &[u8]) -> Option<Vec<Feature>> {
    let text = std::str::from_utf8(bytes).ok()?;
    let mut counts: HashMap<&str, u32> = HashMap::new();

    let mut start = None;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c.is_ascii_alphanumeric() || c == '_' {
            if start.is_none() {
                start = Some(i);
            }
            let at_end = chars.peek().map(|&(_, next)| !(next.is_ascii_alphanumeric() || next == '_')).unwrap_or(true);
            if at_end {
                let s = start.take().unwrap();
                let token = &text[s..i + c.len_utf8()];
                if !token.chars().next().map(|c| c.is_ascii_digit()).unwrap_or(false) {
                    *counts.entry(token).or_insert(0) += 1;
                }
            }
        } else {
            start = None;
        }
    }

    Some(
        counts
            .into_iter()
            .map(|(token, weight)| Feature { token: token.to_string(), weight })
            .collect(),
    )
}

/// Sum a list of features into the `token -> summed weight` map the core
/// sketcher expects (§3 "Feature": "equal tokens within one document are
/// summed").
pub fn term_frequencies(features: &[Feature]) -> HashMap<String, u32> {
    let mut tf = HashMap::new();
    for feature in features {
        *tf.entry(feature.token.clone()).or_insert(0) += feature.weight;
    }
    tf
}
