//! Local stop/cancel phrase detection.
//!
//! Runs over the raw transcript before any model round-trip, so an
//! explicit "save it" or "cancel" never costs a network call.

use crate::config::PhraseConfig;
use crate::matcher;

/// A control phrase recognized in a transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhraseCommand {
    /// The operator asked to save the task.
    Save,
    /// The operator abandoned the task.
    Cancel,
}

/// Detect an explicit save/cancel phrase in the transcript.
///
/// A phrase matches as the whole utterance or as its tail ("ok that's
/// all" still ends the round). Cancel wins over save when an utterance
/// somehow matches both.
#[must_use]
pub fn detect_command(transcript: &str, config: &PhraseConfig) -> Option<PhraseCommand> {
    let normalized = matcher::normalize(transcript);
    if normalized.is_empty() {
        return None;
    }

    if config
        .cancel_phrases
        .iter()
        .any(|phrase| phrase_matches(&normalized, phrase))
    {
        return Some(PhraseCommand::Cancel);
    }
    if config
        .save_phrases
        .iter()
        .any(|phrase| phrase_matches(&normalized, phrase))
    {
        return Some(PhraseCommand::Save);
    }

    None
}

fn phrase_matches(normalized: &str, phrase: &str) -> bool {
    let phrase = matcher::normalize(phrase);
    if phrase.is_empty() {
        return false;
    }
    normalized == phrase || normalized.ends_with(&format!(" {phrase}"))
}
