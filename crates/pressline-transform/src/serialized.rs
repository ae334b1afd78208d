//! Serialized-string-safe search/replace.
//!
//! Exported data may embed PHP-style length-prefixed strings of the form
//! `s:LENGTH:"VALUE"`. A naive substring replacement inside VALUE would
//! desynchronize LENGTH from the new byte length and corrupt
//! deserialization, so replacement happens in two phases per line: first
//! every serialized token whose value contains the term is rewritten with
//! a recomputed LENGTH, then a plain substring replacement covers the rest
//! of the line, skipping the spans of serialized tokens.

use regex::{Captures, Regex};
use std::sync::LazyLock;

static SERIALIZED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"s:(\d+):"([^"]*)""#).expect("static pattern"));

/// Apply one search/replace pair to a line, serialization-safely.
///
/// Lines without the search term are returned unchanged.
pub fn search_replace_line(line: &str, search: &str, replace: &str) -> String {
    if search.is_empty() || !line.contains(search) {
        return line.to_owned();
    }

    // Phase 1: serialized tokens containing the term get their value
    // replaced and LENGTH recomputed as the UTF-8 byte length.
    let phase1 = SERIALIZED.replace_all(line, |caps: &Captures<'_>| {
        let value = &caps[2];
        if value.contains(search) {
            let new_value = value.replace(search, replace);
            format!("s:{}:\"{new_value}\"", new_value.len())
        } else {
            caps[0].to_owned()
        }
    });

    // Phase 2: plain replacement everywhere outside serialized tokens.
    // Tokens already handled in phase 1 must not be touched again, or a
    // replacement value containing the search term would re-desynchronize
    // the length.
    let mut out = String::with_capacity(phase1.len());
    let mut last = 0;
    for m in SERIALIZED.find_iter(&phase1) {
        out.push_str(&phase1[last..m.start()].replace(search, replace));
        out.push_str(m.as_str());
        last = m.end();
    }
    out.push_str(&phase1[last..].replace(search, replace));
    out
}
