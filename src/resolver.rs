//! Tiered resolution of spoken names against canonical records.
//!
//! Maps a loosely-spoken reference ("Medika", "Elettro Impianti") to a
//! stored record, or identifies its absence or ambiguity. Three tiers,
//! each short-circuiting: exact equality, substring containment, fuzzy
//! similarity with a gap-aware tie-break.

use crate::config::MatcherConfig;
use crate::matcher;
use tracing::debug;

/// A record that can be resolved by spoken name.
pub trait NamedEntity {
    /// Canonical display name used for matching.
    fn name(&self) -> &str;
}

/// Outcome of resolving a spoken name against a candidate pool.
///
/// A pure query result; resolution never mutates storage. `NotFound` is
/// a normal terminal state (it drives the "create this now" offer), not
/// an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution<T> {
    /// Exactly one convincing match.
    Found(T),
    /// Several plausible matches the operator must choose between.
    Ambiguous {
        /// Plausible candidates, best first.
        candidates: Vec<T>,
        /// The query as spoken.
        query: String,
    },
    /// Nothing in the pool resembles the query.
    NotFound {
        /// The query as spoken.
        query: String,
    },
    /// One plausible match, but not convincing enough to auto-resolve.
    NeedsConfirmation {
        /// The best candidate.
        candidate: T,
        /// Its similarity score in `[0, 1]`.
        similarity: f64,
        /// The query as spoken.
        query: String,
    },
}

impl<T> Resolution<T> {
    /// Returns the resolved record for a `Found` outcome.
    #[must_use]
    pub fn found(self) -> Option<T> {
        match self {
            Self::Found(record) => Some(record),
            _ => None,
        }
    }

    /// Returns `true` for the `NotFound` outcome.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Resolve a spoken name against a pool of candidate records.
///
/// Deterministic and side-effect free for a fixed `(query, pool)` pair:
/// ties preserve pool order.
pub fn resolve<T>(query: &str, pool: &[T], config: &MatcherConfig) -> Resolution<T>
where
    T: NamedEntity + Clone,
{
    let spoken = matcher::normalize(query);
    if spoken.is_empty() || pool.is_empty() {
        return Resolution::NotFound {
            query: query.to_owned(),
        };
    }

    // Tier 1: exact (normalized) equality.
    if let Some(hit) = pool
        .iter()
        .find(|candidate| matcher::normalize(candidate.name()) == spoken)
    {
        return Resolution::Found(hit.clone());
    }

    // Tier 2: substring containment, either direction.
    let contained: Vec<&T> = pool
        .iter()
        .filter(|candidate| {
            let name = matcher::normalize(candidate.name());
            name.contains(&spoken) || spoken.contains(&name)
        })
        .collect();
    match contained.len() {
        0 => {}
        1 => return Resolution::Found(contained[0].clone()),
        n if n <= config.substring_ambiguity_cap => {
            return Resolution::Ambiguous {
                candidates: contained.into_iter().cloned().collect(),
                query: query.to_owned(),
            };
        }
        n => {
            // The query matches too much of the pool to discriminate;
            // let similarity scoring rank instead.
            debug!("substring tier matched {n} candidates for '{query}', falling through");
        }
    }

    // Tier 3: fuzzy similarity over the whole pool.
    let mut scored: Vec<(f64, &T)> = pool
        .iter()
        .map(|candidate| (matcher::similarity(query, candidate.name(), config), candidate))
        .filter(|(score, _)| *score >= config.min_similarity)
        .collect();

    if scored.is_empty() {
        return Resolution::NotFound {
            query: query.to_owned(),
        };
    }

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

    if scored.len() == 1 {
        let (score, candidate) = scored[0];
        if score >= config.auto_accept {
            return Resolution::Found(candidate.clone());
        }
        return Resolution::NeedsConfirmation {
            candidate: candidate.clone(),
            similarity: score,
            query: query.to_owned(),
        };
    }

    // Several candidates survived. Auto-resolving into a similarly-named
    // neighbor is the expensive mistake, so a clear leader is only ever
    // offered for confirmation.
    let gap = scored[0].0 - scored[1].0;
    if gap > config.ambiguity_gap {
        return Resolution::NeedsConfirmation {
            candidate: scored[0].1.clone(),
            similarity: scored[0].0,
            query: query.to_owned(),
        };
    }

    Resolution::Ambiguous {
        candidates: scored
            .into_iter()
            .take(config.max_ambiguous)
            .map(|(_, candidate)| candidate.clone())
            .collect(),
        query: query.to_owned(),
    }
}
