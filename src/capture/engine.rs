//! Recognition engine seam.
//!
//! The platform speech recognizer lives behind this trait: one `listen`
//! call covers one engine cycle, which ends at the engine's natural
//! pause or with an error. The controller decides whether another cycle
//! follows, which is how a long utterance survives the engine's own
//! segmentation.

use crate::error::CaptureError;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::mpsc;

/// A single event from one engine listen cycle.
#[derive(Debug, Clone)]
pub enum SegmentEvent {
    /// Interim hypothesis for the speech segment in progress.
    Partial(String),
    /// Final text for the segment; the engine has hit a natural pause.
    Final(String),
}

/// Platform speech-recognition engine contract.
#[async_trait]
pub trait RecognitionEngine: Send + Sync {
    /// Run one listen cycle, emitting segment events on `events`.
    ///
    /// Emits zero or more `Partial` events followed by at most one
    /// `Final`, then returns when the engine ends the segment at a
    /// natural pause.
    ///
    /// # Errors
    ///
    /// Returns the engine's error for the cycle; recoverable errors are
    /// retried by the controller.
    async fn listen(
        &self,
        events: mpsc::Sender<SegmentEvent>,
    ) -> std::result::Result<(), CaptureError>;
}

/// One scripted engine cycle for [`ScriptedEngine`].
#[derive(Debug, Clone)]
pub enum ScriptedCycle {
    /// A segment of recognized speech ending at a natural pause.
    Segment {
        /// Interim hypotheses emitted before the final text.
        partials: Vec<String>,
        /// Final text for the segment.
        final_text: String,
    },
    /// The cycle fails with the given engine error.
    Error(CaptureError),
}

impl ScriptedCycle {
    /// A segment with no interim hypotheses.
    #[must_use]
    pub fn segment(final_text: impl Into<String>) -> Self {
        Self::Segment {
            partials: Vec::new(),
            final_text: final_text.into(),
        }
    }
}

/// Deterministic engine for tests and the dev console.
///
/// Plays back a fixed sequence of cycles; once the script is exhausted,
/// `listen` pends forever, like an open microphone hearing nothing.
#[derive(Debug, Default)]
pub struct ScriptedEngine {
    cycles: Mutex<VecDeque<ScriptedCycle>>,
}

impl ScriptedEngine {
    /// Create an engine that plays the given cycles in order.
    #[must_use]
    pub fn new(cycles: Vec<ScriptedCycle>) -> Self {
        Self {
            cycles: Mutex::new(cycles.into()),
        }
    }

    fn next_cycle(&self) -> Option<ScriptedCycle> {
        self.cycles
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .pop_front()
    }
}

#[async_trait]
impl RecognitionEngine for ScriptedEngine {
    async fn listen(
        &self,
        events: mpsc::Sender<SegmentEvent>,
    ) -> std::result::Result<(), CaptureError> {
        match self.next_cycle() {
            Some(ScriptedCycle::Segment {
                partials,
                final_text,
            }) => {
                for partial in partials {
                    if events.send(SegmentEvent::Partial(partial)).await.is_err() {
                        return Ok(());
                    }
                }
                let _ = events.send(SegmentEvent::Final(final_text)).await;
                Ok(())
            }
            Some(ScriptedCycle::Error(error)) => Err(error),
            None => {
                // Script exhausted: hold the cycle open until cancelled.
                std::future::pending::<()>().await;
                Ok(())
            }
        }
    }
}
