//! Process-scoped conversation session state.
//!
//! One [`ConversationContext`] exists per interactive session. It owns
//! the active task, a bounded history of recent exchanges, and the
//! speaker-inference hint. The pipeline is its only writer, and
//! [`ConversationContext::reset`] is the single exit point invoked on
//! every task exit (save, cancel, navigate-away).

use crate::matcher;
use crate::task::ActiveTask;
use std::collections::VecDeque;

/// Who the narrator appears to be, inferred from grammatical person.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SpeakerHint {
    /// Nothing conclusive yet.
    #[default]
    Unknown,
    /// First-person narration: the equipment's own operator did the work.
    LikelyOperator,
    /// Third-person narration: an external performer did the work.
    LikelyPerformer,
}

/// One transcript/response round kept in the bounded history.
#[derive(Debug, Clone)]
pub struct Exchange {
    /// What the operator said.
    pub transcript: String,
    /// The conversational reply produced for it.
    pub response: String,
}

/// Session state for one voice interaction.
#[derive(Debug)]
pub struct ConversationContext {
    active_task: Option<ActiveTask>,
    exchanges: VecDeque<Exchange>,
    speaker_hint: SpeakerHint,
    history_cap: usize,
}

impl ConversationContext {
    /// Create an empty context keeping at most `history_cap` exchanges.
    #[must_use]
    pub fn new(history_cap: usize) -> Self {
        Self {
            active_task: None,
            exchanges: VecDeque::with_capacity(history_cap),
            speaker_hint: SpeakerHint::Unknown,
            history_cap,
        }
    }

    /// The task currently being collected, if any.
    #[must_use]
    pub fn active_task(&self) -> Option<&ActiveTask> {
        self.active_task.as_ref()
    }

    /// Mutable access to the active task.
    pub fn active_task_mut(&mut self) -> Option<&mut ActiveTask> {
        self.active_task.as_mut()
    }

    /// Install a new active task. Returns `false` (and leaves state
    /// untouched) when one is already active: at most one task exists.
    pub fn begin_task(&mut self, task: ActiveTask) -> bool {
        if self.active_task.is_some() {
            return false;
        }
        self.active_task = Some(task);
        true
    }

    /// Recent exchanges, oldest first.
    #[must_use]
    pub fn exchanges(&self) -> impl Iterator<Item = &Exchange> {
        self.exchanges.iter()
    }

    /// Append an exchange, evicting the oldest past the cap.
    pub fn push_exchange(&mut self, transcript: impl Into<String>, response: impl Into<String>) {
        if self.history_cap == 0 {
            return;
        }
        while self.exchanges.len() >= self.history_cap {
            self.exchanges.pop_front();
        }
        self.exchanges.push_back(Exchange {
            transcript: transcript.into(),
            response: response.into(),
        });
    }

    /// The current speaker-inference hint.
    #[must_use]
    pub fn speaker_hint(&self) -> SpeakerHint {
        self.speaker_hint
    }

    /// Update the speaker hint from a new transcript.
    ///
    /// The hint only ever strengthens within a task: once a `Likely*`
    /// value is established it is kept, so a later vague utterance
    /// cannot re-open the performer question.
    pub fn observe_transcript(&mut self, transcript: &str) {
        if self.speaker_hint == SpeakerHint::Unknown {
            self.speaker_hint = infer_speaker(transcript);
        }
    }

    /// Clear everything back to the empty state.
    ///
    /// The single task-exit entrypoint: called on save, cancel, and
    /// navigate-away alike, so no session state ever dangles.
    pub fn reset(&mut self) {
        self.active_task = None;
        self.exchanges.clear();
        self.speaker_hint = SpeakerHint::Unknown;
    }
}

/// First-person words suggesting the narrator performed the work.
const FIRST_PERSON_WORDS: &[&str] = &[
    "i", "we", "my", "our", "myself", "io", "ho", "abbiamo", "mio", "nostro",
];

/// Words suggesting an external performer did the work.
const THIRD_PERSON_WORDS: &[&str] = &[
    "technician",
    "engineer",
    "he",
    "she",
    "they",
    "their",
    "vendor",
    "tecnico",
    "ditta",
    "fornitore",
    "loro",
];

/// Guess the narrator's role from grammatical person in the transcript.
#[must_use]
pub fn infer_speaker(transcript: &str) -> SpeakerHint {
    let normalized = matcher::normalize(transcript);
    let mut first = 0usize;
    let mut third = 0usize;

    for word in normalized.split(' ') {
        if FIRST_PERSON_WORDS.contains(&word) {
            first += 1;
        } else if THIRD_PERSON_WORDS.contains(&word) {
            third += 1;
        }
    }

    match first.cmp(&third) {
        std::cmp::Ordering::Greater => SpeakerHint::LikelyOperator,
        std::cmp::Ordering::Less => SpeakerHint::LikelyPerformer,
        std::cmp::Ordering::Equal => SpeakerHint::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskKind;

    #[test]
    fn history_evicts_oldest_past_cap() {
        let mut context = ConversationContext::new(3);
        for i in 0..5 {
            context.push_exchange(format!("transcript {i}"), format!("reply {i}"));
        }
        let transcripts: Vec<&str> = context.exchanges().map(|e| e.transcript.as_str()).collect();
        assert_eq!(transcripts, ["transcript 2", "transcript 3", "transcript 4"]);
    }

    #[test]
    fn zero_cap_keeps_no_history() {
        let mut context = ConversationContext::new(0);
        context.push_exchange("a", "b");
        assert_eq!(context.exchanges().count(), 0);
    }

    #[test]
    fn second_task_is_rejected() {
        let mut context = ConversationContext::new(6);
        assert!(context.begin_task(ActiveTask::new(TaskKind::VendorCreation)));
        assert!(!context.begin_task(ActiveTask::new(TaskKind::LocationCreation)));
        let task = context.active_task().map(ActiveTask::kind);
        assert_eq!(task, Some(TaskKind::VendorCreation));
    }

    #[test]
    fn reset_clears_everything() {
        let mut context = ConversationContext::new(6);
        context.begin_task(ActiveTask::new(TaskKind::MaintenanceEvent));
        context.push_exchange("hello", "hi");
        context.observe_transcript("I replaced the filter");
        context.reset();

        assert!(context.active_task().is_none());
        assert_eq!(context.exchanges().count(), 0);
        assert_eq!(context.speaker_hint(), SpeakerHint::Unknown);
    }

    #[test]
    fn first_person_transcript_hints_operator() {
        assert_eq!(
            infer_speaker("I replaced the filter and cleaned the sensor"),
            SpeakerHint::LikelyOperator
        );
    }

    #[test]
    fn third_person_transcript_hints_performer() {
        assert_eq!(
            infer_speaker("The Siemens technician replaced the tube"),
            SpeakerHint::LikelyPerformer
        );
    }

    #[test]
    fn vague_transcript_stays_unknown() {
        assert_eq!(
            infer_speaker("ultrasound probe cleaned on Monday"),
            SpeakerHint::Unknown
        );
    }

    #[test]
    fn hint_only_strengthens() {
        let mut context = ConversationContext::new(6);
        context.observe_transcript("The technician came by");
        assert_eq!(context.speaker_hint(), SpeakerHint::LikelyPerformer);

        // A later first-person aside does not flip the hint.
        context.observe_transcript("I think that covers it");
        assert_eq!(context.speaker_hint(), SpeakerHint::LikelyPerformer);
    }
}
