//! Keyboard-driven harness for the extraction pipeline.
//!
//! Feeds typed lines to the real pipeline against an in-memory store,
//! printing progress events as they arrive. Useful for exercising
//! prompts, merging, and entity resolution against a local model server
//! without a microphone.
//!
//! Commands: `:task <domain>`, `:save`, `:cancel`, `:fields`, `:quit`.
//! Any other line is treated as one finalized utterance.

use anyhow::Result;
use invox::store::{EntityKind, EntityRecord, InMemoryStore, SpokenOutput};
use invox::{ExtractionEvent, ExtractionPipeline, InvoxConfig, TaskKind};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

struct ConsoleVoice;

#[async_trait::async_trait]
impl SpokenOutput for ConsoleVoice {
    async fn say(&self, text: &str) -> Result<()> {
        println!("[voice] {text}");
        Ok(())
    }
}

fn sample_entities() -> Vec<EntityRecord> {
    vec![
        EntityRecord::new(EntityKind::Vendor, "Medika Srl"),
        EntityRecord::new(EntityKind::Vendor, "Medika Service"),
        EntityRecord::new(EntityKind::Vendor, "Elettro Impianti Srl"),
        EntityRecord::new(EntityKind::Vendor, "Siemens Healthcare"),
        EntityRecord::new(EntityKind::Location, "Radiology"),
        EntityRecord::new(EntityKind::Location, "Operating Room 2"),
        EntityRecord::new(EntityKind::Equipment, "CT Scanner"),
        EntityRecord::new(EntityKind::Equipment, "Ultrasound Cart"),
    ]
}

fn parse_task(arg: &str) -> Option<TaskKind> {
    match arg.trim() {
        "equipment" => Some(TaskKind::EquipmentCreation),
        "maintenance" => Some(TaskKind::MaintenanceEvent),
        "vendor" => Some(TaskKind::VendorCreation),
        "location" => Some(TaskKind::LocationCreation),
        _ => None,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config_path = InvoxConfig::default_config_path();
    let config = if config_path.exists() {
        InvoxConfig::from_file(&config_path)?
    } else {
        InvoxConfig::default()
    };
    println!(
        "model: {} at {}",
        config.extraction.api_model, config.extraction.api_url
    );

    let store = Arc::new(InMemoryStore::with_entities(sample_entities()));
    let pipeline = Arc::new(
        ExtractionPipeline::new(config, store.clone() as Arc<dyn invox::EntityStore>)
            .with_spoken_output(Arc::new(ConsoleVoice)),
    );

    let mut events = pipeline.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ExtractionEvent::Idle => println!("[state] idle"),
                ExtractionEvent::Processing => println!("[state] processing"),
                ExtractionEvent::Extracted(data) => {
                    println!(
                        "[state] extracted {:?} (confidence {:.2}{})",
                        data.applied_fields,
                        data.confidence,
                        if data.low_confidence { ", LOW" } else { "" }
                    );
                    for reference in &data.resolutions {
                        println!("[resolve] {} -> {:?}", reference.field, reference.resolution);
                    }
                    if !data.missing_required.is_empty() {
                        println!("[state] still missing: {}", data.missing_required.join(", "));
                    }
                }
                ExtractionEvent::Error(message) => println!("[state] error: {message}"),
            }
        }
    });

    println!("commands: :task <equipment|maintenance|vendor|location>, :save, :cancel, :fields, :quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim().to_owned();
        match line.as_str() {
            "" => {}
            ":quit" => break,
            ":save" => match pipeline.confirm().await {
                Ok(outcome) => println!("-> {outcome:?}"),
                Err(e) => println!("!! {e}"),
            },
            ":cancel" => pipeline.abandon().await,
            ":fields" => match pipeline.collected_summary() {
                Some(summary) => println!("{summary}"),
                None => println!("no active task"),
            },
            _ if line.starts_with(":task") => {
                let arg = line.trim_start_matches(":task");
                match parse_task(arg) {
                    Some(kind) => match pipeline.begin_task(kind) {
                        Ok(()) => println!("-> collecting {kind}"),
                        Err(e) => println!("!! {e}"),
                    },
                    None => println!("!! unknown domain: {arg}"),
                }
            }
            transcript => match pipeline.handle_transcript(transcript, None).await {
                Ok(outcome) => println!("-> {outcome:?}"),
                Err(e) => println!("!! {e}"),
            },
        }
    }

    pipeline.shutdown();
    println!("records persisted: {}", store.records().len());
    Ok(())
}
