//! Model response parsing into field updates.
//!
//! The extraction prompt asks for a single JSON object, but models wrap
//! it in markdown fences or surrounding prose often enough that parsing
//! has to dig the object out before deserializing.

use crate::error::ExtractionError;
use crate::task::UpdateMap;
use serde_json::Value;

/// Parsed outcome of one extraction round.
#[derive(Debug, Clone, Default)]
pub struct ExtractionReply {
    /// Field updates to merge into the active task. May be empty, in
    /// which case only the conversational text changes.
    pub updates: UpdateMap,
    /// Conversational reply for the operator.
    pub reply: String,
    /// Model confidence in `[0, 1]`.
    pub confidence: f32,
}

/// Parse a raw model response into an [`ExtractionReply`].
///
/// Blank and null update values are dropped here, so the merge stays
/// monotonic. Numeric and boolean values are stringified.
///
/// # Errors
///
/// Returns [`ExtractionError::MalformedResponse`] when no JSON object
/// can be extracted.
pub fn parse_reply(raw: &str) -> Result<ExtractionReply, ExtractionError> {
    let json = find_json_object(raw).ok_or_else(|| {
        ExtractionError::MalformedResponse("no JSON object in response".to_owned())
    })?;

    let value: Value = serde_json::from_str(json)
        .map_err(|e| ExtractionError::MalformedResponse(e.to_string()))?;

    let mut updates = UpdateMap::new();
    if let Some(map) = value.get("updates").and_then(Value::as_object) {
        for (key, entry) in map {
            if let Some(text) = scalar_text(entry)
                && !text.trim().is_empty()
            {
                updates.insert(key.clone(), text);
            }
        }
    }

    let reply = value
        .get("reply")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_owned();

    let confidence = value
        .get("confidence")
        .and_then(Value::as_f64)
        .map_or(1.0, |c| c as f32)
        .clamp(0.0, 1.0);

    Ok(ExtractionReply {
        updates,
        reply,
        confidence,
    })
}

/// Locate the JSON object body in a possibly fenced or chatty response.
fn find_json_object(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();

    // Fenced block, with or without a language tag.
    for fence in ["```json", "```"] {
        if let Some(start) = trimmed.find(fence) {
            let body = &trimmed[start + fence.len()..];
            if let Some(end) = body.find("```") {
                let inner = body[..end].trim();
                if inner.starts_with('{') {
                    return Some(inner);
                }
            }
        }
    }

    // Outermost braces in free text.
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| &trimmed[start..=end])
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_plain_json() {
        let raw = r#"{"updates": {"name": "CT Scanner"}, "reply": "Got it.", "confidence": 0.9}"#;
        let parsed = parse_reply(raw).unwrap();
        assert_eq!(parsed.updates.get("name").map(String::as_str), Some("CT Scanner"));
        assert_eq!(parsed.reply, "Got it.");
        assert!((parsed.confidence - 0.9).abs() < f32::EPSILON);
    }

    #[test]
    fn parse_fenced_json() {
        let raw = "Here you go:\n```json\n{\"updates\": {\"name\": \"Medika\"}, \"reply\": \"Ok\", \"confidence\": 0.8}\n```\nDone.";
        let parsed = parse_reply(raw).unwrap();
        assert_eq!(parsed.updates.get("name").map(String::as_str), Some("Medika"));
    }

    #[test]
    fn parse_json_with_surrounding_prose() {
        let raw = "Sure. {\"updates\": {}, \"reply\": \"Anything else?\", \"confidence\": 1.0} hope that helps";
        let parsed = parse_reply(raw).unwrap();
        assert!(parsed.updates.is_empty());
        assert_eq!(parsed.reply, "Anything else?");
    }

    #[test]
    fn null_and_blank_values_are_dropped() {
        let raw = r#"{"updates": {"name": "Medika", "phone": null, "email": "  "}, "reply": "", "confidence": 0.7}"#;
        let parsed = parse_reply(raw).unwrap();
        assert_eq!(parsed.updates.len(), 1);
        assert!(parsed.updates.contains_key("name"));
    }

    #[test]
    fn numeric_values_are_stringified() {
        let raw = r#"{"updates": {"cost": 120.5}, "reply": "Noted.", "confidence": 0.85}"#;
        let parsed = parse_reply(raw).unwrap();
        assert_eq!(parsed.updates.get("cost").map(String::as_str), Some("120.5"));
    }

    #[test]
    fn missing_confidence_defaults_high() {
        let raw = r#"{"updates": {}, "reply": "Ok."}"#;
        let parsed = parse_reply(raw).unwrap();
        assert!((parsed.confidence - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn out_of_range_confidence_is_clamped() {
        let raw = r#"{"updates": {}, "reply": "Ok.", "confidence": 1.7}"#;
        let parsed = parse_reply(raw).unwrap();
        assert!((parsed.confidence - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn prose_without_json_is_malformed() {
        assert!(matches!(
            parse_reply("I could not find any fields in that."),
            Err(ExtractionError::MalformedResponse(_))
        ));
    }

    #[test]
    fn truncated_json_is_malformed() {
        assert!(parse_reply(r#"{"updates": {"name": "Med"#).is_err());
    }
}
