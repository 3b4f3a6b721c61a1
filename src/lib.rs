//! Invox: voice-driven inventory capture.
//!
//! Turns a dictated description of an inventory event (new equipment, a
//! maintenance visit, a new vendor, a new location) into a structured,
//! persisted record:
//! Capture → Transcript → Extraction (generative model) → Task merge →
//! Entity resolution → Persistence handoff
//!
//! # Architecture
//!
//! The pipeline is built from independent pieces owned by one session:
//! - **Capture**: operator-controlled listening over a platform engine,
//!   auto-restarting across natural pauses so long utterances never
//!   truncate
//! - **Extraction**: turns transcript + accumulated task state into
//!   field updates via a chat-completions model API
//! - **Task state**: a sum type per inventory domain with monotonic
//!   merge and a shared completeness predicate
//! - **Resolution**: tiered exact/substring/fuzzy matching of spoken
//!   names against canonical records
//!
//! Storage, rendering, and audio output live behind collaborator traits
//! in [`store`].

pub mod capture;
pub mod config;
pub mod context;
pub mod error;
pub mod extraction;
pub mod matcher;
pub mod resolver;
pub mod speakable;
pub mod store;
pub mod task;

pub use capture::{CaptureController, CaptureEvent, RecognitionEngine};
pub use config::InvoxConfig;
pub use context::{ConversationContext, SpeakerHint};
pub use error::{CaptureError, ExtractionError, InvoxError, Result};
pub use extraction::{ExtractedData, ExtractionEvent, ExtractionPipeline, RoundOutcome};
pub use resolver::{resolve, NamedEntity, Resolution};
pub use store::{EntityKind, EntityRecord, EntityStore, SpokenOutput};
pub use task::{ActiveTask, TaskKind, TaskPhase, UpdateMap};
