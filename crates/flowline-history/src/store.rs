use async_trait::async_trait;
use flowline_core::AppResult;
use tokio::sync::RwLock;

use crate::record::FieldChange;

/// Audit trail collaborator.
///
/// Implementations must persist entries in the order given; the core batches
/// one entity mutation's entries into a single `record` call.
#[async_trait]
pub trait HistoryRecorder: Send + Sync {
    async fn record(&self, changes: Vec<FieldChange>) -> AppResult<()>;
}

/// In-memory, append-only recorder.
pub struct InMemoryHistory {
    entries: RwLock<Vec<FieldChange>>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    pub async fn entries(&self) -> Vec<FieldChange> {
        self.entries.read().await.clone()
    }

    pub async fn entries_for(&self, entity_kind: &str, entity_id: &str) -> Vec<FieldChange> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|c| c.entity_kind == entity_kind && c.entity_id == entity_id)
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for InMemoryHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HistoryRecorder for InMemoryHistory {
    async fn record(&self, changes: Vec<FieldChange>) -> AppResult<()> {
        self.entries.write().await.extend(changes);
        Ok(())
    }
}
