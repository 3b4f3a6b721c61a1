//! Manually-controlled capture session lifecycle.
//!
//! The operator starts listening and the operator ends it: there is no
//! implicit timeout. The underlying engine segments speech at natural
//! pauses, so the session silently restarts it after each segment and
//! keeps appending to one logical accumulated utterance until
//! `stop_capture` finalizes it.

use crate::capture::engine::{RecognitionEngine, SegmentEvent};
use crate::config::CaptureConfig;
use crate::error::CaptureError;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Capture progress published to subscribers.
#[derive(Debug, Clone)]
pub enum CaptureEvent {
    /// No session is live.
    Idle,
    /// A session started listening.
    Listening,
    /// The accumulated utterance so far, including the in-flight
    /// segment hypothesis.
    PartialResult(String),
    /// The finalized utterance. Emitted exactly once per session, by
    /// `stop_capture`.
    Result(String),
    /// The session hit a terminal error; auto-restart is disabled until
    /// the session is stopped and a new one started.
    Error(CaptureError),
}

/// Broadcast capacity for capture events.
const CAPTURE_EVENT_CAPACITY: usize = 32;

/// Segment channel capacity per engine cycle.
const SEGMENT_CHANNEL_SIZE: usize = 16;

struct LiveSession {
    cancel: CancellationToken,
    handle: JoinHandle<String>,
}

/// Drives the recognition engine across one operator-controlled session.
pub struct CaptureController<E> {
    engine: Arc<E>,
    config: CaptureConfig,
    events: broadcast::Sender<CaptureEvent>,
    session: Mutex<Option<LiveSession>>,
}

impl<E: RecognitionEngine + 'static> CaptureController<E> {
    /// Create a controller over the given engine.
    #[must_use]
    pub fn new(engine: Arc<E>, config: CaptureConfig) -> Self {
        let (events, _) = broadcast::channel(CAPTURE_EVENT_CAPACITY);
        Self {
            engine,
            config,
            events,
            session: Mutex::new(None),
        }
    }

    /// Subscribe to capture progress events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CaptureEvent> {
        self.events.subscribe()
    }

    /// Whether a capture session is currently live.
    pub async fn is_listening(&self) -> bool {
        self.session.lock().await.is_some()
    }

    /// Begin a capture session. A no-op when one is already live:
    /// concurrent sessions are never forked.
    pub async fn start_capture(&self) {
        let mut slot = self.session.lock().await;
        if slot.is_some() {
            debug!("capture already live, start ignored");
            return;
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_session(
            Arc::clone(&self.engine),
            self.config.clone(),
            self.events.clone(),
            cancel.clone(),
        ));
        *slot = Some(LiveSession { cancel, handle });
        info!("capture session started");
    }

    /// Stop listening and finalize the accumulated utterance.
    ///
    /// The only authoritative end signal: disables auto-restart,
    /// releases the engine, and emits exactly one `Result` (possibly
    /// empty). Calling it again without a live session is a no-op and
    /// returns `None`.
    pub async fn stop_capture(&self) -> Option<String> {
        let session = self.session.lock().await.take();
        let Some(session) = session else {
            debug!("no live capture, stop ignored");
            return None;
        };

        session.cancel.cancel();
        let text = match session.handle.await {
            Ok(text) => text,
            Err(e) => {
                warn!("capture session task failed: {e}");
                String::new()
            }
        };

        info!("capture finalized: {} chars", text.len());
        let _ = self.events.send(CaptureEvent::Result(text.clone()));
        let _ = self.events.send(CaptureEvent::Idle);
        Some(text)
    }
}

/// How one engine cycle ended.
enum CycleOutcome {
    /// Natural pause: restart silently.
    Pause,
    /// The session was cancelled by `stop_capture`.
    Cancelled,
    /// The engine reported an error.
    Failed(CaptureError),
}

/// Session task: runs engine cycles until stopped, appending each
/// segment to one logical utterance. Returns the accumulated text.
async fn run_session<E: RecognitionEngine>(
    engine: Arc<E>,
    config: CaptureConfig,
    events: broadcast::Sender<CaptureEvent>,
    cancel: CancellationToken,
) -> String {
    let mut accumulated = String::new();
    let mut consecutive_errors: u32 = 0;
    let _ = events.send(CaptureEvent::Listening);

    loop {
        if cancel.is_cancelled() {
            break;
        }

        let outcome = run_cycle(
            engine.as_ref(),
            &mut accumulated,
            &mut consecutive_errors,
            &events,
            &cancel,
        )
        .await;

        match outcome {
            CycleOutcome::Cancelled => break,
            CycleOutcome::Pause => {
                // Natural pause mid-utterance: keep listening.
                debug!("engine pause, restarting quietly");
            }
            CycleOutcome::Failed(e) if e.is_recoverable() => {
                consecutive_errors += 1;
                if consecutive_errors > config.max_consecutive_errors {
                    warn!(
                        "capture error bound exceeded after {consecutive_errors} consecutive errors: {e}"
                    );
                    let _ = events.send(CaptureEvent::Error(e));
                    // Fatal: hold what was heard until stop finalizes it.
                    cancel.cancelled().await;
                    break;
                }
                debug!(
                    "recoverable capture error ({e}), quiet restart {consecutive_errors}/{}",
                    config.max_consecutive_errors
                );
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(config.restart_delay()) => {}
                }
            }
            CycleOutcome::Failed(e) => {
                error!("terminal capture error: {e}");
                let _ = events.send(CaptureEvent::Error(e));
                cancel.cancelled().await;
                break;
            }
        }
    }

    accumulated
}

/// Run a single engine cycle, draining its segment events.
async fn run_cycle<E: RecognitionEngine>(
    engine: &E,
    accumulated: &mut String,
    consecutive_errors: &mut u32,
    events: &broadcast::Sender<CaptureEvent>,
    cancel: &CancellationToken,
) -> CycleOutcome {
    let (segment_tx, mut segment_rx) = mpsc::channel::<SegmentEvent>(SEGMENT_CHANNEL_SIZE);
    let mut cycle = engine.listen(segment_tx);

    let outcome = 'cycle: loop {
        tokio::select! {
            () = cancel.cancelled() => break 'cycle CycleOutcome::Cancelled,
            result = &mut cycle => {
                // Drain segments that raced with cycle completion.
                while let Ok(event) = segment_rx.try_recv() {
                    handle_segment(event, accumulated, consecutive_errors, events);
                }
                break 'cycle match result {
                    Ok(()) => CycleOutcome::Pause,
                    Err(e) => CycleOutcome::Failed(e),
                };
            }
            event = segment_rx.recv() => match event {
                Some(event) => handle_segment(event, accumulated, consecutive_errors, events),
                None => {
                    // Engine dropped its sender; just await the cycle end.
                    tokio::select! {
                        () = cancel.cancelled() => break 'cycle CycleOutcome::Cancelled,
                        result = &mut cycle => break 'cycle match result {
                            Ok(()) => CycleOutcome::Pause,
                            Err(e) => CycleOutcome::Failed(e),
                        },
                    }
                }
            },
        }
    };

    outcome
}

fn handle_segment(
    event: SegmentEvent,
    accumulated: &mut String,
    consecutive_errors: &mut u32,
    events: &broadcast::Sender<CaptureEvent>,
) {
    match event {
        SegmentEvent::Partial(text) => {
            let _ = events.send(CaptureEvent::PartialResult(join_segments(
                accumulated,
                text.trim(),
            )));
        }
        SegmentEvent::Final(text) => {
            let text = text.trim();
            if text.is_empty() {
                return;
            }
            if !accumulated.is_empty() {
                accumulated.push(' ');
            }
            accumulated.push_str(text);
            // Real speech arrived: the error streak is over.
            *consecutive_errors = 0;
            let _ = events.send(CaptureEvent::PartialResult(accumulated.clone()));
        }
    }
}

/// Join the accumulated utterance with an in-flight hypothesis.
fn join_segments(base: &str, tail: &str) -> String {
    if base.is_empty() {
        tail.to_owned()
    } else if tail.is_empty() {
        base.to_owned()
    } else {
        format!("{base} {tail}")
    }
}
