//! End-to-end extraction rounds against a mock chat-completions server.
//!
//! Exercises the full path a finalized transcript takes: prompt
//! assembly, the HTTP exchange, response parsing, monotonic merge,
//! entity resolution, phrase short-circuits, and the persistence
//! handoff with its rollback contract.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use invox::config::InvoxConfig;
use invox::resolver::Resolution;
use invox::store::{
    EntityKind, EntityRecord, EntityStore, InMemoryStore, MinimalRecord, TaskRecord,
};
use invox::task::UpdateMap;
use invox::{ExtractionPipeline, InvoxError, RoundOutcome, TaskKind};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(server: &MockServer) -> InvoxConfig {
    let mut config = InvoxConfig::default();
    config.extraction.api_url = server.uri();
    config.extraction.api_model = "test-model".to_owned();
    config.extraction.retry.max_attempts = 2;
    config.extraction.retry.base_delay_ms = 1;
    config
}

/// An OpenAI-shaped completion whose content is the given extraction JSON.
fn completion_body(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "model": "test-model",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }]
    })
}

/// Mount a one-shot completion returning the given extraction JSON.
async fn mount_round(server: &MockServer, content: &str) {
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(content)))
        .up_to_n_times(1)
        .mount(server)
        .await;
}

fn sample_store() -> Arc<InMemoryStore> {
    Arc::new(InMemoryStore::with_entities(vec![
        EntityRecord::new(EntityKind::Vendor, "Medika Srl"),
        EntityRecord::new(EntityKind::Vendor, "Medika Service"),
        EntityRecord::new(EntityKind::Vendor, "Elettro Impianti Srl"),
        EntityRecord::new(EntityKind::Location, "Radiology"),
        EntityRecord::new(EntityKind::Equipment, "CT Scanner"),
    ]))
}

fn pipeline_over(server: &MockServer, store: Arc<InMemoryStore>) -> ExtractionPipeline {
    ExtractionPipeline::new(test_config(server), store)
}

// ────────────────────────────────────────────────────────────────────────────
// Extraction rounds
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn round_merges_fields_and_resolves_references() {
    let server = MockServer::start().await;
    mount_round(
        &server,
        r#"{"updates": {"name": "New Ultrasound", "location": "Radiology", "vendor": "Elettro Impianti"},
            "reply": "Got it. What brand is it?", "confidence": 0.92}"#,
    )
    .await;

    let store = sample_store();
    let pipeline = pipeline_over(&server, store);
    pipeline.begin_task(TaskKind::EquipmentCreation).unwrap();

    let outcome = pipeline
        .handle_transcript(
            "new ultrasound in radiology bought from elettro impianti",
            None,
        )
        .await
        .unwrap();

    let RoundOutcome::Extracted(data) = outcome else {
        panic!("expected Extracted");
    };
    assert_eq!(data.applied_fields.len(), 3);
    assert!(!data.low_confidence);
    assert!(data.complete, "name and location are both filled");

    // Both references resolved through their pools.
    let vendor = data
        .resolutions
        .iter()
        .find(|r| r.field == "vendor")
        .unwrap();
    assert!(
        matches!(&vendor.resolution, Resolution::Found(record) if record.name == "Elettro Impianti Srl")
    );
    let location = data
        .resolutions
        .iter()
        .find(|r| r.field == "location")
        .unwrap();
    assert!(
        matches!(&location.resolution, Resolution::Found(record) if record.name == "Radiology")
    );
}

#[tokio::test]
async fn second_round_never_clears_earlier_fields() {
    let server = MockServer::start().await;
    mount_round(
        &server,
        r#"{"updates": {"intervention_type": "repair", "description": "replaced the probe cable"},
            "reply": "Who did the repair?", "confidence": 0.9}"#,
    )
    .await;
    mount_round(
        &server,
        r#"{"updates": {"performer": "Medika Srl"}, "reply": "Noted.", "confidence": 0.88}"#,
    )
    .await;

    let pipeline = pipeline_over(&server, sample_store());
    pipeline.begin_task(TaskKind::MaintenanceEvent).unwrap();

    pipeline
        .handle_transcript("the probe cable was replaced on the ultrasound", None)
        .await
        .unwrap();
    pipeline
        .handle_transcript("medika did the repair", None)
        .await
        .unwrap();

    let snapshot = pipeline.field_snapshot().unwrap();
    assert_eq!(
        snapshot.get("intervention_type").map(String::as_str),
        Some("repair")
    );
    assert_eq!(
        snapshot.get("description").map(String::as_str),
        Some("replaced the probe cable")
    );
    assert_eq!(
        snapshot.get("performer").map(String::as_str),
        Some("Medika Srl")
    );
}

#[tokio::test]
async fn empty_update_map_leaves_the_task_untouched() {
    let server = MockServer::start().await;
    mount_round(
        &server,
        r#"{"updates": {"name": "Drill Press"}, "reply": "Ok.", "confidence": 0.9}"#,
    )
    .await;
    mount_round(
        &server,
        r#"{"updates": {}, "reply": "Could you repeat that?", "confidence": 0.4}"#,
    )
    .await;

    let pipeline = pipeline_over(&server, sample_store());
    pipeline.begin_task(TaskKind::EquipmentCreation).unwrap();

    pipeline
        .handle_transcript("it's the drill press", None)
        .await
        .unwrap();
    let before = pipeline.field_snapshot().unwrap();

    let outcome = pipeline
        .handle_transcript("mumble mumble", None)
        .await
        .unwrap();
    let RoundOutcome::Extracted(data) = outcome else {
        panic!("expected Extracted");
    };
    assert!(data.applied_fields.is_empty());
    assert_eq!(data.reply, "Could you repeat that?");
    assert_eq!(pipeline.field_snapshot().unwrap(), before);
}

#[tokio::test]
async fn low_confidence_is_flagged_but_still_applied() {
    let server = MockServer::start().await;
    mount_round(
        &server,
        r#"{"updates": {"name": "Maybe A Centrifuge"}, "reply": "I think so.", "confidence": 0.3}"#,
    )
    .await;

    let pipeline = pipeline_over(&server, sample_store());
    pipeline.begin_task(TaskKind::EquipmentCreation).unwrap();

    let outcome = pipeline
        .handle_transcript("something about a centrifuge", None)
        .await
        .unwrap();
    let RoundOutcome::Extracted(data) = outcome else {
        panic!("expected Extracted");
    };
    assert!(data.low_confidence);
    assert_eq!(data.applied_fields, vec!["name".to_owned()]);
    assert!(pipeline.field_snapshot().unwrap().contains_key("name"));
}

#[tokio::test]
async fn authoritative_snapshot_preserves_manual_edits() {
    let server = MockServer::start().await;
    mount_round(
        &server,
        r#"{"updates": {"name": "Medika"}, "reply": "Phone number?", "confidence": 0.9}"#,
    )
    .await;
    mount_round(
        &server,
        r#"{"updates": {"phone": "055 123456"}, "reply": "Saved the number.", "confidence": 0.9}"#,
    )
    .await;

    let pipeline = pipeline_over(&server, sample_store());
    pipeline.begin_task(TaskKind::VendorCreation).unwrap();
    pipeline
        .handle_transcript("new vendor medika", None)
        .await
        .unwrap();

    // The operator corrected the name on screen between utterances.
    let mut edited: UpdateMap = pipeline.field_snapshot().unwrap();
    edited.insert("name".to_owned(), "Medika Srl".to_owned());

    pipeline
        .handle_transcript("their phone is oh five five one two three four five six", Some(&edited))
        .await
        .unwrap();

    let snapshot = pipeline.field_snapshot().unwrap();
    assert_eq!(snapshot.get("name").map(String::as_str), Some("Medika Srl"));
    assert_eq!(
        snapshot.get("phone").map(String::as_str),
        Some("055 123456")
    );
}

#[tokio::test]
async fn blank_transcript_is_ignored() {
    let server = MockServer::start().await;
    let pipeline = pipeline_over(&server, sample_store());
    pipeline.begin_task(TaskKind::VendorCreation).unwrap();

    let outcome = pipeline.handle_transcript("   ", None).await.unwrap();
    assert!(matches!(outcome, RoundOutcome::Ignored));
}

#[tokio::test]
async fn transcript_without_a_task_is_an_error() {
    let server = MockServer::start().await;
    let pipeline = pipeline_over(&server, sample_store());
    assert!(matches!(
        pipeline.handle_transcript("anything", None).await,
        Err(InvoxError::Task(_))
    ));
}

// ────────────────────────────────────────────────────────────────────────────
// Phrase short-circuits and persistence
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn save_phrase_persists_without_a_model_call() {
    let server = MockServer::start().await;
    mount_round(
        &server,
        r#"{"updates": {"name": "Medika Srl"}, "reply": "Anything else?", "confidence": 0.95}"#,
    )
    .await;
    // No second mock: "that's all" must not reach the model.

    let store = sample_store();
    let pipeline = pipeline_over(&server, store.clone());
    pipeline.begin_task(TaskKind::VendorCreation).unwrap();
    pipeline
        .handle_transcript("new vendor medika srl", None)
        .await
        .unwrap();

    let outcome = pipeline.handle_transcript("that's all", None).await.unwrap();
    let RoundOutcome::Saved { record_id } = outcome else {
        panic!("expected Saved, got {outcome:?}");
    };

    let records = store.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, record_id);
    assert_eq!(records[0].kind, TaskKind::VendorCreation);

    // The session reset on save.
    assert!(pipeline.field_snapshot().is_none());
}

#[tokio::test]
async fn save_phrase_with_missing_fields_reports_them() {
    let server = MockServer::start().await;
    let pipeline = pipeline_over(&server, sample_store());
    pipeline.begin_task(TaskKind::MaintenanceEvent).unwrap();

    let outcome = pipeline.handle_transcript("salva", None).await.unwrap();
    let RoundOutcome::SaveRequested { missing_required } = outcome else {
        panic!("expected SaveRequested, got {outcome:?}");
    };
    assert!(missing_required.contains(&"intervention_type"));
    assert!(missing_required.contains(&"description"));

    // The task survives the refused save.
    assert!(pipeline.field_snapshot().is_some());
}

#[tokio::test]
async fn cancel_phrase_abandons_and_resets() {
    let server = MockServer::start().await;
    mount_round(
        &server,
        r#"{"updates": {"name": "Radiology Annex"}, "reply": "Ok.", "confidence": 0.9}"#,
    )
    .await;

    let store = sample_store();
    let pipeline = pipeline_over(&server, store.clone());
    pipeline.begin_task(TaskKind::LocationCreation).unwrap();
    pipeline
        .handle_transcript("new location radiology annex", None)
        .await
        .unwrap();

    let outcome = pipeline
        .handle_transcript("never mind", None)
        .await
        .unwrap();
    assert!(matches!(outcome, RoundOutcome::Abandoned));
    assert!(pipeline.field_snapshot().is_none());
    assert!(store.records().is_empty());

    // A fresh task can start immediately after the reset.
    pipeline.begin_task(TaskKind::VendorCreation).unwrap();
}

#[tokio::test]
async fn persistence_failure_rolls_back_to_collecting() {
    /// A store whose insert always fails.
    struct RefusingStore;

    #[async_trait::async_trait]
    impl EntityStore for RefusingStore {
        async fn list_active(&self, _kind: EntityKind) -> anyhow::Result<Vec<EntityRecord>> {
            Ok(Vec::new())
        }
        async fn create(&self, _minimal: MinimalRecord) -> anyhow::Result<Uuid> {
            anyhow::bail!("read-only store")
        }
        async fn insert(&self, _record: TaskRecord) -> anyhow::Result<Uuid> {
            anyhow::bail!("disk full")
        }
        async fn update(&self, _record: TaskRecord) -> anyhow::Result<()> {
            anyhow::bail!("read-only store")
        }
    }

    let server = MockServer::start().await;
    mount_round(
        &server,
        r#"{"updates": {"name": "Medika Srl"}, "reply": "Ok.", "confidence": 0.95}"#,
    )
    .await;

    let pipeline = ExtractionPipeline::new(test_config(&server), Arc::new(RefusingStore));
    pipeline.begin_task(TaskKind::VendorCreation).unwrap();
    pipeline
        .handle_transcript("new vendor medika srl", None)
        .await
        .unwrap();

    let result = pipeline.confirm().await;
    assert!(matches!(result, Err(InvoxError::Persistence(_))));

    // Back in collecting with every value intact: retry needs no re-dictation.
    let snapshot = pipeline.field_snapshot().unwrap();
    assert_eq!(snapshot.get("name").map(String::as_str), Some("Medika Srl"));
}

#[tokio::test]
async fn inline_creation_flags_the_record_incomplete() {
    let server = MockServer::start().await;
    let store = sample_store();
    let pipeline = pipeline_over(&server, store.clone());

    let resolution = pipeline
        .resolve_reference(EntityKind::Vendor, "Brand New Vendor")
        .await
        .unwrap();
    assert!(resolution.is_not_found());

    let created = pipeline
        .create_inline(EntityKind::Vendor, "Brand New Vendor")
        .await
        .unwrap();
    assert!(created.incomplete);

    // The next resolution of the same name finds the placeholder.
    let resolution = pipeline
        .resolve_reference(EntityKind::Vendor, "Brand New Vendor")
        .await
        .unwrap();
    assert!(
        matches!(resolution, Resolution::Found(record) if record.id == created.id)
    );
}

// ────────────────────────────────────────────────────────────────────────────
// Model API failures
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn rate_limit_is_retried_and_fields_survive() {
    let server = MockServer::start().await;
    mount_round(
        &server,
        r#"{"updates": {"name": "Medika Srl"}, "reply": "Ok.", "confidence": 0.9}"#,
    )
    .await;
    // Second round: one 429, then success.
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_round(
        &server,
        r#"{"updates": {"phone": "055 9"}, "reply": "Noted.", "confidence": 0.9}"#,
    )
    .await;

    let pipeline = pipeline_over(&server, sample_store());
    pipeline.begin_task(TaskKind::VendorCreation).unwrap();
    pipeline
        .handle_transcript("new vendor medika srl", None)
        .await
        .unwrap();

    let outcome = pipeline
        .handle_transcript("phone oh five five nine", None)
        .await
        .unwrap();
    assert!(matches!(outcome, RoundOutcome::Extracted(_)));

    let snapshot = pipeline.field_snapshot().unwrap();
    assert_eq!(snapshot.get("name").map(String::as_str), Some("Medika Srl"));
    assert_eq!(snapshot.get("phone").map(String::as_str), Some("055 9"));
}

#[tokio::test]
async fn malformed_response_errors_without_losing_fields() {
    let server = MockServer::start().await;
    mount_round(
        &server,
        r#"{"updates": {"name": "Medika Srl"}, "reply": "Ok.", "confidence": 0.9}"#,
    )
    .await;
    mount_round(&server, "I'm sorry, I can't produce JSON today.").await;

    let pipeline = pipeline_over(&server, sample_store());
    pipeline.begin_task(TaskKind::VendorCreation).unwrap();
    pipeline
        .handle_transcript("new vendor medika srl", None)
        .await
        .unwrap();

    let result = pipeline.handle_transcript("add their phone", None).await;
    assert!(matches!(result, Err(InvoxError::Extraction(_))));

    // The failed round discarded nothing.
    let snapshot = pipeline.field_snapshot().unwrap();
    assert_eq!(snapshot.get("name").map(String::as_str), Some("Medika Srl"));
}

#[tokio::test]
async fn content_filter_is_terminal_for_the_round() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": ""},
                "finish_reason": "content_filter"
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let pipeline = pipeline_over(&server, sample_store());
    pipeline.begin_task(TaskKind::VendorCreation).unwrap();

    // Exactly one request: content-filter outcomes are not retried.
    let result = pipeline.handle_transcript("some dictation", None).await;
    assert!(matches!(result, Err(InvoxError::Extraction(_))));
    server.verify().await;
}

// ────────────────────────────────────────────────────────────────────────────
// Round serialization
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn concurrent_transcripts_serialize_without_interleaving() {
    let server = MockServer::start().await;
    mount_round(
        &server,
        r#"{"updates": {"name": "CT Scanner"}, "reply": "Ok.", "confidence": 0.9}"#,
    )
    .await;
    mount_round(
        &server,
        r#"{"updates": {"serial_number": "SN-42"}, "reply": "Ok.", "confidence": 0.9}"#,
    )
    .await;

    let pipeline = Arc::new(pipeline_over(&server, sample_store()));
    pipeline.begin_task(TaskKind::EquipmentCreation).unwrap();

    let first = {
        let pipeline = Arc::clone(&pipeline);
        tokio::spawn(async move { pipeline.handle_transcript("it's the ct scanner", None).await })
    };
    let second = {
        let pipeline = Arc::clone(&pipeline);
        tokio::spawn(
            async move { pipeline.handle_transcript("serial number s n four two", None).await },
        )
    };

    assert!(first.await.unwrap().is_ok());
    assert!(second.await.unwrap().is_ok());

    // Both rounds landed; neither overwrote the other.
    let snapshot = pipeline.field_snapshot().unwrap();
    assert_eq!(snapshot.len(), 2);
    assert!(snapshot.contains_key("name"));
    assert!(snapshot.contains_key("serial_number"));
}
