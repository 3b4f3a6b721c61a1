//! Plain-text sanitation for the spoken-confirmation handoff.
//!
//! Downstream TTS reads its input verbatim, so emphasis markers and
//! other markdown left in a model reply would be read aloud as
//! symbols. Everything crossing the [`crate::store::SpokenOutput`] seam
//! goes through [`strip_markup`] first.

/// Strip markdown markers from text, keeping their content.
///
/// Removes emphasis (`*`, `_`), code fences and inline code markers,
/// heading hashes, and leading bullet markers, then collapses the
/// whitespace runs left behind.
#[must_use]
pub fn strip_markup(text: &str) -> String {
    let mut lines = Vec::new();

    for line in text.lines() {
        let trimmed = line.trim_start();
        // Fence lines carry no speakable content at all.
        if trimmed.starts_with("```") {
            continue;
        }
        let without_heading = trimmed.trim_start_matches('#').trim_start();
        let without_bullet = without_heading
            .strip_prefix("- ")
            .or_else(|| without_heading.strip_prefix("* "))
            .unwrap_or(without_heading);

        let mut cleaned = String::with_capacity(without_bullet.len());
        for ch in without_bullet.chars() {
            if !matches!(ch, '*' | '_' | '`') {
                cleaned.push(ch);
            }
        }

        let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
        if !collapsed.is_empty() {
            lines.push(collapsed);
        }
    }

    lines.join(" ")
}
