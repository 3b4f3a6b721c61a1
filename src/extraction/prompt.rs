//! Extraction request assembly.
//!
//! Each round sends the model everything it needs to fill slots
//! incrementally: today's date, the task's already-collected fields,
//! the bounded exchange history, the domain's field rules, and the new
//! transcript.

use crate::context::{ConversationContext, SpeakerHint};
use crate::task::{ActiveTask, TaskKind, EQUIPMENT_CATEGORIES, INTERVENTION_TYPES};
use chrono::NaiveDate;

/// The extraction system prompt (loaded from `prompts/extraction.md` at compile time).
const EXTRACTION_PROMPT: &str = include_str!("../../prompts/extraction.md");

/// Build the `(system, user)` prompt pair for one extraction round.
#[must_use]
pub fn build_prompts(
    transcript: &str,
    task: &ActiveTask,
    context: &ConversationContext,
    today: NaiveDate,
) -> (String, String) {
    let system = EXTRACTION_PROMPT.to_owned();

    let mut user = String::new();
    user.push_str(&format!("## Today's date\n\n{today}\n\n"));
    user.push_str(&format!("## Task\n\nRecording a {}.\n\n", task.kind().label()));

    user.push_str("## Collected fields\n\n");
    let snapshot = task.field_snapshot();
    if snapshot.is_empty() {
        user.push_str("(none yet)\n");
    } else {
        for (name, value) in &snapshot {
            user.push_str(&format!("- {name}: {value}\n"));
        }
    }
    user.push('\n');

    user.push_str("## Field rules\n\n");
    user.push_str(&format!(
        "Allowed fields: {}.\n",
        task.kind().field_names().join(", ")
    ));
    let missing = task.missing_required_fields(context.speaker_hint());
    if missing.is_empty() {
        user.push_str("All required fields are filled.\n");
    } else {
        user.push_str(&format!("Still required: {}.\n", missing.join(", ")));
    }
    match task.kind() {
        TaskKind::MaintenanceEvent => {
            user.push_str(&format!(
                "Valid intervention_type values: {}.\n",
                INTERVENTION_TYPES.join(", ")
            ));
            if context.speaker_hint() == SpeakerHint::LikelyOperator {
                user.push_str("The narrator performed the work themselves.\n");
            }
        }
        TaskKind::EquipmentCreation => {
            user.push_str(&format!(
                "Valid category values: {}.\n",
                EQUIPMENT_CATEGORIES.join(", ")
            ));
        }
        TaskKind::VendorCreation | TaskKind::LocationCreation => {}
    }
    user.push('\n');

    let exchanges: Vec<_> = context.exchanges().collect();
    if !exchanges.is_empty() {
        user.push_str("## Recent exchanges\n\n");
        for exchange in exchanges {
            user.push_str(&format!("Operator: {}\n", exchange.transcript));
            user.push_str(&format!("Assistant: {}\n", exchange.response));
        }
        user.push('\n');
    }

    user.push_str(&format!("## Transcript\n\n{}\n", transcript.trim()));

    (system, user)
}
