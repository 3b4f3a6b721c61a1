//! Extraction pipeline orchestration.
//!
//! Owns the conversation context and serializes every mutation of it:
//! transcripts flow through one fair async gate, so a transcript
//! arriving while a round is in flight queues behind it and never
//! interleaves. Stopping, cancelling, or navigating away cancels the
//! in-flight model call and resets the context; no background work
//! survives teardown.

use crate::config::InvoxConfig;
use crate::context::ConversationContext;
use crate::error::{InvoxError, Result};
use crate::extraction::client::ModelClient;
use crate::extraction::parse;
use crate::extraction::phrases::{self, PhraseCommand};
use crate::extraction::prompt;
use crate::resolver::{self, Resolution};
use crate::speakable;
use crate::store::{EntityKind, EntityRecord, EntityStore, MinimalRecord, SpokenOutput, TaskRecord};
use crate::task::{ActiveTask, TaskKind, UpdateMap};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Extraction progress published to subscribers.
#[derive(Debug, Clone)]
pub enum ExtractionEvent {
    /// No round is running and no task is active.
    Idle,
    /// A model round-trip is in flight.
    Processing,
    /// A round completed: updates merged and references resolved.
    Extracted(ExtractedData),
    /// A round failed. Collected fields are untouched.
    Error(String),
}

/// Resolution outcome for one textual entity reference on the task.
#[derive(Debug, Clone)]
pub struct ReferenceResolution {
    /// The task field holding the spoken reference.
    pub field: &'static str,
    /// Which entity pool it was resolved against.
    pub kind: EntityKind,
    /// The resolution outcome.
    pub resolution: Resolution<EntityRecord>,
}

/// Data published after a successful extraction round.
#[derive(Debug, Clone)]
pub struct ExtractedData {
    /// Fields the round actually set.
    pub applied_fields: Vec<String>,
    /// Conversational reply for the operator.
    pub reply: String,
    /// Model confidence in `[0, 1]`.
    pub confidence: f32,
    /// Below the configured threshold. Surfaced as a warning, never blocking.
    pub low_confidence: bool,
    /// Required fields still missing after the merge.
    pub missing_required: Vec<&'static str>,
    /// Whether the completeness predicate now holds.
    pub complete: bool,
    /// Resolution outcomes for the task's entity references.
    pub resolutions: Vec<ReferenceResolution>,
}

/// Outcome of handling one finalized transcript.
#[derive(Debug)]
pub enum RoundOutcome {
    /// The model round ran and its updates were merged.
    Extracted(ExtractedData),
    /// A save phrase arrived but required fields are still missing.
    SaveRequested {
        /// The fields blocking the save.
        missing_required: Vec<&'static str>,
    },
    /// The task was confirmed and persisted.
    Saved {
        /// Identifier of the persisted record.
        record_id: Uuid,
    },
    /// A cancel phrase abandoned the task.
    Abandoned,
    /// The transcript was blank; nothing happened.
    Ignored,
}

/// Broadcast capacity for extraction events.
const EXTRACTION_EVENT_CAPACITY: usize = 32;

/// Turns finalized transcripts into structured task updates.
pub struct ExtractionPipeline {
    config: InvoxConfig,
    client: ModelClient,
    store: Arc<dyn EntityStore>,
    voice: Option<Arc<dyn SpokenOutput>>,
    context: std::sync::Mutex<ConversationContext>,
    events: broadcast::Sender<ExtractionEvent>,
    /// Fair gate serializing rounds: lock waiters run in FIFO order.
    round_gate: tokio::sync::Mutex<()>,
    session_cancel: std::sync::Mutex<CancellationToken>,
}

impl ExtractionPipeline {
    /// Create a pipeline over the given persistence collaborator.
    #[must_use]
    pub fn new(config: InvoxConfig, store: Arc<dyn EntityStore>) -> Self {
        let (events, _) = broadcast::channel(EXTRACTION_EVENT_CAPACITY);
        let context = ConversationContext::new(config.extraction.history_cap);
        let client = ModelClient::new(config.extraction.clone());
        Self {
            config,
            client,
            store,
            voice: None,
            context: std::sync::Mutex::new(context),
            events,
            round_gate: tokio::sync::Mutex::new(()),
            session_cancel: std::sync::Mutex::new(CancellationToken::new()),
        }
    }

    /// Attach a spoken-confirmation collaborator.
    #[must_use]
    pub fn with_spoken_output(mut self, voice: Arc<dyn SpokenOutput>) -> Self {
        self.voice = Some(voice);
        self
    }

    /// Subscribe to extraction progress events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ExtractionEvent> {
        self.events.subscribe()
    }

    /// Start collecting a new task.
    ///
    /// # Errors
    ///
    /// Returns a task error when one is already active: at most one
    /// task exists per session.
    pub fn begin_task(&self, kind: TaskKind) -> Result<()> {
        let mut context = self.context();
        if !context.begin_task(ActiveTask::new(kind)) {
            return Err(InvoxError::Task("a task is already active".to_owned()));
        }
        drop(context);

        *self.session_lock() = CancellationToken::new();
        info!("task started: {kind}");
        Ok(())
    }

    /// Synchronous snapshot of the active task's current field values.
    ///
    /// The presentation layer reads this to display fields, and passes
    /// its own (possibly manually edited) version back with the next
    /// transcript.
    #[must_use]
    pub fn field_snapshot(&self) -> Option<UpdateMap> {
        self.context().active_task().map(ActiveTask::field_snapshot)
    }

    /// Human-readable recap of the active task.
    #[must_use]
    pub fn collected_summary(&self) -> Option<String> {
        self.context()
            .active_task()
            .map(ActiveTask::collected_summary)
    }

    /// Handle one finalized transcript.
    ///
    /// `authoritative` is the presentation layer's current field values
    /// (including manual edits); it is overlaid onto the task before the
    /// round so the model's updates merge onto fresh state, never onto a
    /// stale cached copy.
    ///
    /// Rounds are strictly serialized: a transcript arriving while one
    /// is in flight waits its turn.
    ///
    /// # Errors
    ///
    /// Returns an error when no task is active, when the model call
    /// fails after retries, or when persistence fails on a save phrase.
    /// Collected fields survive every error path.
    pub async fn handle_transcript(
        &self,
        transcript: &str,
        authoritative: Option<&UpdateMap>,
    ) -> Result<RoundOutcome> {
        let _round = self.round_gate.lock().await;
        let cancel = self.session_token();

        if transcript.trim().is_empty() {
            debug!("blank transcript ignored");
            return Ok(RoundOutcome::Ignored);
        }

        {
            let mut context = self.context();
            let Some(task) = context.active_task_mut() else {
                return Err(InvoxError::Task("no active task".to_owned()));
            };
            if let Some(snapshot) = authoritative {
                task.overlay_snapshot(snapshot);
            }
            context.observe_transcript(transcript);
        }

        // Explicit control phrases never reach the model.
        match phrases::detect_command(transcript, &self.config.phrases) {
            Some(PhraseCommand::Cancel) => {
                self.abandon().await;
                return Ok(RoundOutcome::Abandoned);
            }
            Some(PhraseCommand::Save) => return self.confirm_locked().await,
            None => {}
        }

        let _ = self.events.send(ExtractionEvent::Processing);

        let (system, user) = {
            let context = self.context();
            let Some(task) = context.active_task() else {
                return Err(InvoxError::Task("no active task".to_owned()));
            };
            prompt::build_prompts(
                transcript,
                task,
                &context,
                chrono::Local::now().date_naive(),
            )
        };

        let raw = match self.client.complete(&system, &user, &cancel).await {
            Ok(raw) => raw,
            Err(e) => {
                let _ = self.events.send(ExtractionEvent::Error(e.to_string()));
                return Err(e.into());
            }
        };

        let reply = match parse::parse_reply(&raw) {
            Ok(reply) => reply,
            Err(e) => {
                let _ = self.events.send(ExtractionEvent::Error(e.to_string()));
                return Err(e.into());
            }
        };

        let low_confidence = reply.confidence < self.config.extraction.low_confidence_threshold;
        if low_confidence {
            warn!(
                "low-confidence extraction ({:.2}), applying anyway",
                reply.confidence
            );
        }

        // Merge under the lock; entity resolution runs outside it.
        let (applied, missing, references) = {
            let mut context = self.context();
            let hint = context.speaker_hint();
            let Some(task) = context.active_task_mut() else {
                return Err(InvoxError::Task("no active task".to_owned()));
            };
            let applied = task.apply(&reply.updates);
            let missing = task.missing_required_fields(hint);
            let snapshot = task.field_snapshot();
            let references: Vec<(&'static str, EntityKind, String)> =
                reference_fields(task.kind())
                    .iter()
                    .filter_map(|(field, kind)| {
                        snapshot.get(*field).map(|value| (*field, *kind, value.clone()))
                    })
                    .collect();
            context.push_exchange(transcript, reply.reply.clone());
            (applied, missing, references)
        };

        let mut resolutions = Vec::with_capacity(references.len());
        for (field, kind, spoken) in references {
            let resolution = self.resolve_reference(kind, &spoken).await?;
            resolutions.push(ReferenceResolution {
                field,
                kind,
                resolution,
            });
        }

        let data = ExtractedData {
            applied_fields: applied,
            reply: reply.reply.clone(),
            confidence: reply.confidence,
            low_confidence,
            complete: missing.is_empty(),
            missing_required: missing,
            resolutions,
        };

        let _ = self.events.send(ExtractionEvent::Extracted(data.clone()));
        self.speak(&reply.reply).await;
        Ok(RoundOutcome::Extracted(data))
    }

    /// Confirm the active task and hand it to persistence.
    ///
    /// # Errors
    ///
    /// Returns an error when no task is active or when persistence
    /// fails; a persistence failure rolls the task back to collecting
    /// with every value intact.
    pub async fn confirm(&self) -> Result<RoundOutcome> {
        let _round = self.round_gate.lock().await;
        self.confirm_locked().await
    }

    /// Confirmation body. Caller must hold the round gate.
    async fn confirm_locked(&self) -> Result<RoundOutcome> {
        enum Prep {
            Missing(Vec<&'static str>),
            Ready(TaskRecord, TaskKind),
        }

        let prep = {
            let mut context = self.context();
            let hint = context.speaker_hint();
            let Some(task) = context.active_task_mut() else {
                return Err(InvoxError::Task("no active task".to_owned()));
            };
            let missing = task.missing_required_fields(hint);
            if missing.is_empty() {
                task.confirm(hint)?;
                Prep::Ready(TaskRecord::from_task(task), task.kind())
            } else {
                Prep::Missing(missing)
            }
        };

        match prep {
            Prep::Missing(missing_required) => {
                let message = format!("Still missing: {}.", missing_required.join(", "));
                self.speak(&message).await;
                Ok(RoundOutcome::SaveRequested { missing_required })
            }
            Prep::Ready(record, kind) => match self.store.insert(record).await {
                Ok(record_id) => {
                    info!("persisted {kind} record {record_id}");
                    self.context().reset();
                    let _ = self.events.send(ExtractionEvent::Idle);
                    self.speak(&format!("Saved the {}.", kind.label())).await;
                    Ok(RoundOutcome::Saved { record_id })
                }
                Err(e) => {
                    // Back to collecting, values intact, ready for retry.
                    if let Some(task) = self.context().active_task_mut() {
                        task.rollback();
                    }
                    let _ = self.events.send(ExtractionEvent::Error(e.to_string()));
                    Err(InvoxError::Persistence(e))
                }
            },
        }
    }

    /// Abandon the active task and reset the session.
    ///
    /// Safe to call at any time (explicit cancel, navigate-away):
    /// cancels any in-flight model call and resets the context.
    pub async fn abandon(&self) {
        self.session_lock().cancel();
        let cancelled_kind = {
            let mut context = self.context();
            let kind = context.active_task_mut().map(|task| {
                task.abandon();
                task.kind()
            });
            context.reset();
            kind
        };
        let _ = self.events.send(ExtractionEvent::Idle);
        if let Some(kind) = cancelled_kind {
            info!("task abandoned: {kind}");
            self.speak(&format!("Cancelled the {}.", kind.label())).await;
        }
    }

    /// Tear the session down without spoken feedback.
    ///
    /// Cancels in-flight work and resets the context; nothing survives.
    pub fn shutdown(&self) {
        self.session_lock().cancel();
        self.context().reset();
        let _ = self.events.send(ExtractionEvent::Idle);
    }

    /// Resolve a spoken reference against one entity pool.
    ///
    /// # Errors
    ///
    /// Returns the persistence collaborator's error verbatim when the
    /// pool cannot be listed.
    pub async fn resolve_reference(
        &self,
        kind: EntityKind,
        spoken: &str,
    ) -> Result<Resolution<EntityRecord>> {
        let pool = self
            .store
            .list_active(kind)
            .await
            .map_err(InvoxError::Persistence)?;
        Ok(resolver::resolve(spoken, &pool, &self.config.matcher))
    }

    /// Create a minimal placeholder record for an unresolved reference
    /// without leaving the current task flow.
    ///
    /// # Errors
    ///
    /// Returns the persistence collaborator's error verbatim.
    pub async fn create_inline(&self, kind: EntityKind, name: &str) -> Result<EntityRecord> {
        let id = self
            .store
            .create(MinimalRecord {
                kind,
                name: name.to_owned(),
            })
            .await
            .map_err(InvoxError::Persistence)?;
        info!("created incomplete {kind} '{name}' inline");
        Ok(EntityRecord {
            id,
            kind,
            name: name.to_owned(),
            incomplete: true,
        })
    }

    async fn speak(&self, text: &str) {
        let Some(voice) = &self.voice else {
            return;
        };
        let plain = speakable::strip_markup(text);
        if plain.is_empty() {
            return;
        }
        if let Err(e) = voice.say(&plain).await {
            warn!("spoken output failed: {e}");
        }
    }

    fn context(&self) -> std::sync::MutexGuard<'_, ConversationContext> {
        self.context
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn session_lock(&self) -> std::sync::MutexGuard<'_, CancellationToken> {
        self.session_cancel
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn session_token(&self) -> CancellationToken {
        self.session_lock().clone()
    }
}

/// Task fields holding spoken references, and the pool each resolves
/// against.
fn reference_fields(kind: TaskKind) -> &'static [(&'static str, EntityKind)] {
    match kind {
        TaskKind::EquipmentCreation => {
            &[("vendor", EntityKind::Vendor), ("location", EntityKind::Location)]
        }
        TaskKind::MaintenanceEvent => &[("equipment", EntityKind::Equipment)],
        TaskKind::VendorCreation | TaskKind::LocationCreation => &[],
    }
}
