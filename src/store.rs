//! Collaborator seams: persistence and spoken output.
//!
//! The storage schema and query layer live on the other side of
//! [`EntityStore`]; this crate only consumes the interface. Errors
//! cross the seam verbatim as [`anyhow::Error`].

use crate::resolver::NamedEntity;
use crate::task::{ActiveTask, TaskKind, UpdateMap};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kinds of canonical records a spoken name can resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Registered equipment.
    Equipment,
    /// Vendors and service firms.
    Vendor,
    /// Physical locations.
    Location,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Equipment => write!(f, "equipment"),
            Self::Vendor => write!(f, "vendor"),
            Self::Location => write!(f, "location"),
        }
    }
}

/// A canonical stored record, as surfaced to resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRecord {
    /// Stable record identifier.
    pub id: Uuid,
    /// Which pool this record belongs to.
    pub kind: EntityKind,
    /// Canonical display name.
    pub name: String,
    /// Set on records created inline from an unresolved spoken
    /// reference, pending later follow-up.
    pub incomplete: bool,
}

impl EntityRecord {
    /// A complete record with the given name.
    #[must_use]
    pub fn new(kind: EntityKind, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            name: name.into(),
            incomplete: false,
        }
    }
}

impl NamedEntity for EntityRecord {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Minimal payload for inline creation of an unresolved reference.
#[derive(Debug, Clone)]
pub struct MinimalRecord {
    /// Which pool to create the record in.
    pub kind: EntityKind,
    /// The name as spoken.
    pub name: String,
}

/// A completed task ready for persistence.
#[derive(Debug, Clone)]
pub struct TaskRecord {
    /// Stable identifier, fixed at task creation so persistence retries
    /// reuse it.
    pub id: Uuid,
    /// The task's domain.
    pub kind: TaskKind,
    /// Every collected field, by name.
    pub fields: UpdateMap,
    /// When the record was assembled for persistence.
    pub recorded_at: DateTime<Utc>,
}

impl TaskRecord {
    /// Assemble the persistence record for a task.
    #[must_use]
    pub fn from_task(task: &ActiveTask) -> Self {
        Self {
            id: task.record_id(),
            kind: task.kind(),
            fields: task.field_snapshot(),
            recorded_at: Utc::now(),
        }
    }
}

/// Persistence collaborator contract.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Ordered candidate records for one resolvable kind.
    async fn list_active(&self, kind: EntityKind) -> anyhow::Result<Vec<EntityRecord>>;

    /// Inline creation for unresolved references the operator wants to
    /// keep. The stored record is flagged incomplete for later follow-up.
    async fn create(&self, minimal: MinimalRecord) -> anyhow::Result<Uuid>;

    /// Persist a completed task.
    async fn insert(&self, record: TaskRecord) -> anyhow::Result<Uuid>;

    /// Update a previously persisted task.
    async fn update(&self, record: TaskRecord) -> anyhow::Result<()>;
}

/// Spoken-confirmation handoff. Receives plain text only; markup is
/// stripped before the text reaches this seam.
#[async_trait]
pub trait SpokenOutput: Send + Sync {
    /// Speak the given text to the operator.
    async fn say(&self, text: &str) -> anyhow::Result<()>;
}

/// In-memory store for tests and the dev console.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entities: std::sync::Mutex<Vec<EntityRecord>>,
    records: std::sync::Mutex<Vec<TaskRecord>>,
}

impl InMemoryStore {
    /// A store pre-populated with the given entity pool.
    #[must_use]
    pub fn with_entities(entities: Vec<EntityRecord>) -> Self {
        Self {
            entities: std::sync::Mutex::new(entities),
            records: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Persisted task records, in insertion order.
    #[must_use]
    pub fn records(&self) -> Vec<TaskRecord> {
        self.records
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// All entity records, including inline-created ones.
    #[must_use]
    pub fn entities(&self) -> Vec<EntityRecord> {
        self.entities
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl EntityStore for InMemoryStore {
    async fn list_active(&self, kind: EntityKind) -> anyhow::Result<Vec<EntityRecord>> {
        Ok(self
            .entities
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .filter(|record| record.kind == kind)
            .cloned()
            .collect())
    }

    async fn create(&self, minimal: MinimalRecord) -> anyhow::Result<Uuid> {
        let record = EntityRecord {
            id: Uuid::new_v4(),
            kind: minimal.kind,
            name: minimal.name,
            incomplete: true,
        };
        let id = record.id;
        self.entities
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(record);
        Ok(id)
    }

    async fn insert(&self, record: TaskRecord) -> anyhow::Result<Uuid> {
        let id = record.id;
        self.records
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(record);
        Ok(id)
    }

    async fn update(&self, record: TaskRecord) -> anyhow::Result<()> {
        let mut records = self
            .records
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        match records.iter_mut().find(|existing| existing.id == record.id) {
            Some(existing) => {
                *existing = record;
                Ok(())
            }
            None => anyhow::bail!("no task record with id {}", record.id),
        }
    }
}
