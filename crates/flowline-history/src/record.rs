use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What kind of mutation a change entry belongs to.
///
/// Soft deletes (deactivating a grant) are recorded as `Delete`; the audit
/// trail sees the row disappear even though it stays persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Create,
    Update,
    Delete,
}

impl HistoryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

/// One changed scalar or foreign-key field on one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    pub id: Uuid,
    pub entity_kind: String,
    pub entity_id: String,
    pub field_name: String,
    pub prev_value: String,
    pub next_value: String,
    pub action: HistoryAction,
    pub recorded_at: DateTime<Utc>,
}

/// Builder collecting the per-field entries of one entity mutation.
#[derive(Debug)]
pub struct ChangeSet {
    entity_kind: String,
    entity_id: String,
    action: HistoryAction,
    changes: Vec<FieldChange>,
}

impl ChangeSet {
    pub fn create(entity_kind: impl Into<String>, entity_id: impl ToString) -> Self {
        Self::with_action(entity_kind, entity_id, HistoryAction::Create)
    }

    pub fn update(entity_kind: impl Into<String>, entity_id: impl ToString) -> Self {
        Self::with_action(entity_kind, entity_id, HistoryAction::Update)
    }

    pub fn delete(entity_kind: impl Into<String>, entity_id: impl ToString) -> Self {
        Self::with_action(entity_kind, entity_id, HistoryAction::Delete)
    }

    fn with_action(
        entity_kind: impl Into<String>,
        entity_id: impl ToString,
        action: HistoryAction,
    ) -> Self {
        Self {
            entity_kind: entity_kind.into(),
            entity_id: entity_id.to_string(),
            action,
            changes: Vec::new(),
        }
    }

    pub fn field(mut self, name: &str, prev: impl ToString, next: impl ToString) -> Self {
        self.changes.push(FieldChange {
            id: Uuid::new_v4(),
            entity_kind: self.entity_kind.clone(),
            entity_id: self.entity_id.clone(),
            field_name: name.to_string(),
            prev_value: prev.to_string(),
            next_value: next.to_string(),
            action: self.action,
            recorded_at: Utc::now(),
        });
        self
    }

    /// A field recorded at creation time: previous value is always "none".
    pub fn created_field(self, name: &str, next: impl ToString) -> Self {
        self.field(name, "none", next)
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn into_changes(self) -> Vec<FieldChange> {
        self.changes
    }
}
