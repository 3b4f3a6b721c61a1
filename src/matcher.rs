//! Name similarity scoring for spoken entity references.
//!
//! Dictation mangles short domain names (vendor and location names) in
//! systematic ways, so resolution scores candidates with a normalized
//! Levenshtein similarity instead of comparing them exactly.

use crate::config::MatcherConfig;
use strsim::levenshtein;

/// Normalize a spoken or stored name for comparison.
///
/// Lowercases, turns punctuation runs into single spaces, collapses
/// whitespace, and trims. `"Elettro  Impianti S.r.l."` becomes
/// `"elettro impianti s r l"`.
#[must_use]
pub fn normalize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_space = false;

    for ch in name.chars() {
        if ch.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.extend(ch.to_lowercase());
        } else {
            pending_space = true;
        }
    }

    out
}

/// Whole-string similarity over normalized names: `1 − distance/maxLen`.
///
/// Returns a value in `[0, 1]`; two empty names are identical.
#[must_use]
pub fn whole_similarity(a: &str, b: &str) -> f64 {
    edit_similarity(&normalize(a), &normalize(b))
}

/// Similarity between a spoken query and a candidate name.
///
/// The whole-string score is primary. Spoken references habitually keep
/// only the distinctive token of a multi-word name ("Siemenz" for
/// "Siemens Healthcare"), so the best token-vs-whole score, scaled by
/// the partial-name discount, can lift such a match into the
/// confirmation band without letting it auto-accept.
#[must_use]
pub fn similarity(query: &str, candidate: &str, config: &MatcherConfig) -> f64 {
    let query = normalize(query);
    let candidate = normalize(candidate);

    let whole = edit_similarity(&query, &candidate);

    let mut best_token: f64 = 0.0;
    for token in candidate.split(' ') {
        best_token = best_token.max(edit_similarity(&query, token));
    }
    for token in query.split(' ') {
        best_token = best_token.max(edit_similarity(token, &candidate));
    }

    whole.max(best_token * config.token_match_discount)
}

/// `1 − levenshtein/maxLen` over already-normalized strings.
fn edit_similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let distance = levenshtein(a, b);
    let max_len = a.chars().count().max(b.chars().count());
    1.0 - distance as f64 / max_len as f64
}
