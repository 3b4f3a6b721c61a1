//! Speech capture: engine seam and session controller.

pub mod controller;
pub mod engine;

pub use controller::{CaptureController, CaptureEvent};
pub use engine::{RecognitionEngine, ScriptedCycle, ScriptedEngine, SegmentEvent};
