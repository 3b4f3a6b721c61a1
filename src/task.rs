//! Per-domain task state: collected fields, completeness, transitions.
//!
//! A dictated task is a sum type over the four inventory domains. Each
//! variant holds optional scalar fields filled across one or more
//! utterances (slot filling); the shared capability surface
//! (`missing_required_fields`, `collected_summary`, `apply`) keeps the
//! completeness logic in one place instead of copy-pasted per domain.

use crate::context::SpeakerHint;
use crate::error::{InvoxError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};
use uuid::Uuid;

/// Ordered field-name → value map parsed from a model response.
pub type UpdateMap = BTreeMap<String, String>;

/// Inventory domains a dictated task can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Registering a new piece of equipment.
    EquipmentCreation,
    /// Recording a maintenance visit on existing equipment.
    MaintenanceEvent,
    /// Registering a new vendor.
    VendorCreation,
    /// Registering a new location.
    LocationCreation,
}

impl TaskKind {
    /// Short human-readable label, used in prompts and summaries.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::EquipmentCreation => "equipment registration",
            Self::MaintenanceEvent => "maintenance event",
            Self::VendorCreation => "vendor registration",
            Self::LocationCreation => "location registration",
        }
    }

    /// Every field name this domain accepts in an update map.
    #[must_use]
    pub fn field_names(self) -> &'static [&'static str] {
        match self {
            Self::EquipmentCreation => &[
                "name",
                "category",
                "brand",
                "model",
                "serial_number",
                "location",
                "vendor",
                "notes",
            ],
            Self::MaintenanceEvent => &[
                "equipment",
                "intervention_type",
                "description",
                "performer",
                "date",
                "cost",
                "notes",
            ],
            Self::VendorCreation => &["name", "phone", "email", "contact_person", "notes"],
            Self::LocationCreation => &["name", "department", "floor", "notes"],
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EquipmentCreation => write!(f, "equipment_creation"),
            Self::MaintenanceEvent => write!(f, "maintenance_event"),
            Self::VendorCreation => write!(f, "vendor_creation"),
            Self::LocationCreation => write!(f, "location_creation"),
        }
    }
}

/// Valid maintenance intervention classifications.
pub const INTERVENTION_TYPES: &[&str] = &[
    "repair",
    "preventive",
    "inspection",
    "calibration",
    "installation",
    "decommission",
];

/// Valid equipment categories.
pub const EQUIPMENT_CATEGORIES: &[&str] = &[
    "diagnostic",
    "laboratory",
    "monitoring",
    "therapy",
    "infrastructure",
    "other",
];

/// Lifecycle phase of the active task.
///
/// Collecting is the default; completeness is a predicate over the
/// fields, not a phase. Confirmed is reached only through an explicit
/// operator confirmation, and a persistence failure rolls back to
/// Collecting with every value intact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TaskPhase {
    /// Fields are still being gathered.
    #[default]
    Collecting,
    /// The operator confirmed; persistence is in flight or done.
    Confirmed,
    /// Explicitly cancelled or navigated away. Terminal.
    Abandoned,
}

/// Collected fields, tagged by domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskFields {
    /// New equipment being registered.
    EquipmentCreation(EquipmentFields),
    /// A maintenance visit being recorded.
    MaintenanceEvent(MaintenanceFields),
    /// A new vendor being registered.
    VendorCreation(VendorFields),
    /// A new location being registered.
    LocationCreation(LocationFields),
}

/// Fields for a new piece of equipment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EquipmentFields {
    pub name: Option<String>,
    pub category: Option<String>,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub serial_number: Option<String>,
    pub location: Option<String>,
    pub vendor: Option<String>,
    pub notes: Option<String>,
}

/// Fields for a maintenance visit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceFields {
    pub equipment: Option<String>,
    pub intervention_type: Option<String>,
    pub description: Option<String>,
    pub performer: Option<String>,
    pub date: Option<String>,
    pub cost: Option<String>,
    pub notes: Option<String>,
}

/// Fields for a new vendor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VendorFields {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub contact_person: Option<String>,
    pub notes: Option<String>,
}

/// Fields for a new location.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationFields {
    pub name: Option<String>,
    pub department: Option<String>,
    pub floor: Option<String>,
    pub notes: Option<String>,
}

/// The single dictated task in progress.
#[derive(Debug, Clone)]
pub struct ActiveTask {
    record_id: Uuid,
    fields: TaskFields,
    phase: TaskPhase,
}

impl ActiveTask {
    /// Create an empty task for the given domain.
    #[must_use]
    pub fn new(kind: TaskKind) -> Self {
        let fields = match kind {
            TaskKind::EquipmentCreation => TaskFields::EquipmentCreation(EquipmentFields::default()),
            TaskKind::MaintenanceEvent => TaskFields::MaintenanceEvent(MaintenanceFields::default()),
            TaskKind::VendorCreation => TaskFields::VendorCreation(VendorFields::default()),
            TaskKind::LocationCreation => TaskFields::LocationCreation(LocationFields::default()),
        };
        Self {
            record_id: Uuid::new_v4(),
            fields,
            phase: TaskPhase::Collecting,
        }
    }

    /// Stable record identifier, assigned at task creation so a
    /// persistence retry reuses the same id.
    #[must_use]
    pub fn record_id(&self) -> Uuid {
        self.record_id
    }

    /// Which domain this task targets.
    #[must_use]
    pub fn kind(&self) -> TaskKind {
        match self.fields {
            TaskFields::EquipmentCreation(_) => TaskKind::EquipmentCreation,
            TaskFields::MaintenanceEvent(_) => TaskKind::MaintenanceEvent,
            TaskFields::VendorCreation(_) => TaskKind::VendorCreation,
            TaskFields::LocationCreation(_) => TaskKind::LocationCreation,
        }
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> TaskPhase {
        self.phase
    }

    /// Merge an update map into the collected fields.
    ///
    /// Monotonic: blank values and unknown keys are ignored, so an
    /// update can only ever add or overwrite, never clear. Invalid
    /// classification values are rejected, keeping the previous value.
    /// Returns the names of the fields that were actually set.
    pub fn apply(&mut self, updates: &UpdateMap) -> Vec<String> {
        let mut applied = Vec::new();
        let kind = self.kind();

        for (key, value) in updates {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }

            let Some(slot) = self.slot(key) else {
                warn!("ignoring unknown field '{key}' for {kind}");
                continue;
            };

            let stored = match classification_vocabulary(kind, key) {
                Some(vocabulary) => {
                    let canonical = value.to_lowercase();
                    if !vocabulary.contains(&canonical.as_str()) {
                        warn!("rejecting invalid {key} '{value}' for {kind}");
                        continue;
                    }
                    canonical
                }
                None => value.to_owned(),
            };

            *slot = Some(stored);
            applied.push(key.clone());
        }

        if !applied.is_empty() {
            debug!("applied fields for {kind}: {applied:?}");
        }
        applied
    }

    /// Overwrite fields from the presentation layer's authoritative
    /// snapshot, taken immediately before a new transcript is processed.
    ///
    /// Unlike [`ActiveTask::apply`], a blank value here clears the
    /// field: a manual deletion on screen is as authoritative as a
    /// manual edit. Fields absent from the snapshot are left alone.
    pub fn overlay_snapshot(&mut self, snapshot: &UpdateMap) {
        for name in self.kind().field_names() {
            let Some(value) = snapshot.get(*name) else {
                continue;
            };
            let value = value.trim();
            if let Some(slot) = self.slot(name) {
                *slot = if value.is_empty() {
                    None
                } else {
                    Some(value.to_owned())
                };
            }
        }
    }

    /// Required fields still missing, given the current speaker hint.
    ///
    /// The maintenance performer is only required while speaker
    /// inference is inconclusive: a clearly first- or third-person
    /// narration already answers who did the work.
    #[must_use]
    pub fn missing_required_fields(&self, hint: SpeakerHint) -> Vec<&'static str> {
        let mut missing = Vec::new();
        match &self.fields {
            TaskFields::EquipmentCreation(f) => {
                push_if_blank(&mut missing, "name", &f.name);
                push_if_blank(&mut missing, "location", &f.location);
            }
            TaskFields::MaintenanceEvent(f) => {
                push_if_blank(&mut missing, "intervention_type", &f.intervention_type);
                push_if_blank(&mut missing, "description", &f.description);
                if hint == SpeakerHint::Unknown {
                    push_if_blank(&mut missing, "performer", &f.performer);
                }
            }
            TaskFields::VendorCreation(f) => {
                push_if_blank(&mut missing, "name", &f.name);
            }
            TaskFields::LocationCreation(f) => {
                push_if_blank(&mut missing, "name", &f.name);
            }
        }
        missing
    }

    /// Whether every required field is filled (pure predicate).
    #[must_use]
    pub fn is_complete(&self, hint: SpeakerHint) -> bool {
        self.missing_required_fields(hint).is_empty()
    }

    /// Human-readable recap of everything collected so far.
    #[must_use]
    pub fn collected_summary(&self) -> String {
        let mut lines = vec![format!("{}:", self.kind().label())];
        for (name, value) in self.entries() {
            if let Some(value) = value {
                lines.push(format!("  {}: {value}", name.replace('_', " ")));
            }
        }
        if lines.len() == 1 {
            lines.push("  (nothing collected yet)".to_owned());
        }
        lines.join("\n")
    }

    /// Current non-blank values as a field map.
    #[must_use]
    pub fn field_snapshot(&self) -> UpdateMap {
        self.entries()
            .into_iter()
            .filter_map(|(name, value)| value.map(|v| (name.to_owned(), v.clone())))
            .collect()
    }

    /// Transition to Confirmed. Legal only from Collecting with every
    /// required field filled.
    ///
    /// # Errors
    ///
    /// Returns a task error naming the missing fields, or the illegal
    /// phase.
    pub fn confirm(&mut self, hint: SpeakerHint) -> Result<()> {
        if self.phase != TaskPhase::Collecting {
            return Err(InvoxError::Task(format!(
                "cannot confirm from phase {:?}",
                self.phase
            )));
        }
        let missing = self.missing_required_fields(hint);
        if !missing.is_empty() {
            return Err(InvoxError::Task(format!(
                "required fields missing: {}",
                missing.join(", ")
            )));
        }
        self.phase = TaskPhase::Confirmed;
        Ok(())
    }

    /// Roll back a failed persistence attempt: Confirmed → Collecting,
    /// all field values intact, so the operator can retry without
    /// re-dictating.
    pub fn rollback(&mut self) {
        if self.phase == TaskPhase::Confirmed {
            self.phase = TaskPhase::Collecting;
        }
    }

    /// Mark the task abandoned. Terminal.
    pub fn abandon(&mut self) {
        self.phase = TaskPhase::Abandoned;
    }

    /// All fields in declaration order, with current values.
    fn entries(&self) -> Vec<(&'static str, Option<&String>)> {
        match &self.fields {
            TaskFields::EquipmentCreation(f) => vec![
                ("name", f.name.as_ref()),
                ("category", f.category.as_ref()),
                ("brand", f.brand.as_ref()),
                ("model", f.model.as_ref()),
                ("serial_number", f.serial_number.as_ref()),
                ("location", f.location.as_ref()),
                ("vendor", f.vendor.as_ref()),
                ("notes", f.notes.as_ref()),
            ],
            TaskFields::MaintenanceEvent(f) => vec![
                ("equipment", f.equipment.as_ref()),
                ("intervention_type", f.intervention_type.as_ref()),
                ("description", f.description.as_ref()),
                ("performer", f.performer.as_ref()),
                ("date", f.date.as_ref()),
                ("cost", f.cost.as_ref()),
                ("notes", f.notes.as_ref()),
            ],
            TaskFields::VendorCreation(f) => vec![
                ("name", f.name.as_ref()),
                ("phone", f.phone.as_ref()),
                ("email", f.email.as_ref()),
                ("contact_person", f.contact_person.as_ref()),
                ("notes", f.notes.as_ref()),
            ],
            TaskFields::LocationCreation(f) => vec![
                ("name", f.name.as_ref()),
                ("department", f.department.as_ref()),
                ("floor", f.floor.as_ref()),
                ("notes", f.notes.as_ref()),
            ],
        }
    }

    /// Mutable slot for a field name, or `None` for unknown keys.
    fn slot(&mut self, key: &str) -> Option<&mut Option<String>> {
        match &mut self.fields {
            TaskFields::EquipmentCreation(f) => match key {
                "name" => Some(&mut f.name),
                "category" => Some(&mut f.category),
                "brand" => Some(&mut f.brand),
                "model" => Some(&mut f.model),
                "serial_number" => Some(&mut f.serial_number),
                "location" => Some(&mut f.location),
                "vendor" => Some(&mut f.vendor),
                "notes" => Some(&mut f.notes),
                _ => None,
            },
            TaskFields::MaintenanceEvent(f) => match key {
                "equipment" => Some(&mut f.equipment),
                "intervention_type" => Some(&mut f.intervention_type),
                "description" => Some(&mut f.description),
                "performer" => Some(&mut f.performer),
                "date" => Some(&mut f.date),
                "cost" => Some(&mut f.cost),
                "notes" => Some(&mut f.notes),
                _ => None,
            },
            TaskFields::VendorCreation(f) => match key {
                "name" => Some(&mut f.name),
                "phone" => Some(&mut f.phone),
                "email" => Some(&mut f.email),
                "contact_person" => Some(&mut f.contact_person),
                "notes" => Some(&mut f.notes),
                _ => None,
            },
            TaskFields::LocationCreation(f) => match key {
                "name" => Some(&mut f.name),
                "department" => Some(&mut f.department),
                "floor" => Some(&mut f.floor),
                "notes" => Some(&mut f.notes),
                _ => None,
            },
        }
    }
}

/// The classification vocabulary for a field, if it has one.
fn classification_vocabulary(kind: TaskKind, key: &str) -> Option<&'static [&'static str]> {
    match (kind, key) {
        (TaskKind::MaintenanceEvent, "intervention_type") => Some(INTERVENTION_TYPES),
        (TaskKind::EquipmentCreation, "category") => Some(EQUIPMENT_CATEGORIES),
        _ => None,
    }
}

fn push_if_blank(
    missing: &mut Vec<&'static str>,
    name: &'static str,
    value: &Option<String>,
) {
    if value.as_deref().is_none_or(|v| v.trim().is_empty()) {
        missing.push(name);
    }
}
