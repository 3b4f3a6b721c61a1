//! Transcript-to-fields extraction: model client, prompts, parsing,
//! phrase short-circuits, and the orchestrating pipeline.

pub mod client;
pub mod parse;
pub mod phrases;
pub mod pipeline;
pub mod prompt;

pub use client::ModelClient;
pub use parse::{parse_reply, ExtractionReply};
pub use phrases::{detect_command, PhraseCommand};
pub use pipeline::{
    ExtractedData, ExtractionEvent, ExtractionPipeline, ReferenceResolution, RoundOutcome,
};
