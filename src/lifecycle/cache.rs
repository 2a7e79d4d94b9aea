//! Per-replica model cache
//!
//! In-memory view of the models this replica has loaded, with usage counters.

use crate::types::model::ModelRecord;
use chrono::Utc;
use dashmap::DashMap;

/// Cache of [`ModelRecord`]s keyed by model id
pub struct ModelCache {
    models: DashMap<String, ModelRecord>,
}

impl ModelCache {
    pub fn new() -> Self {
        Self {
            models: DashMap::new(),
        }
    }

    /// Insert a new record, or count a reload of an existing one
    pub fn upsert(&self, model_id: &str, display_name: &str) -> ModelRecord {
        let mut entry = self
            .models
            .entry(model_id.to_string())
            .and_modify(|record| {
                record.display_name = display_name.to_string();
                record.last_load_time = Utc::now();
                record.reload_count += 1;
            })
            .or_insert_with(|| ModelRecord::new(model_id, display_name));
        entry.value_mut().clone()
    }

    /// Count one inference call, creating the record if this replica never loaded it
    pub fn record_inference(&self, model_id: &str, display_name: &str) -> ModelRecord {
        let mut entry = self
            .models
            .entry(model_id.to_string())
            .or_insert_with(|| ModelRecord::new(model_id, display_name));
        entry.invocation_count += 1;
        entry.value().clone()
    }

    pub fn find(&self, model_id: &str) -> Option<ModelRecord> {
        self.models.get(model_id).map(|r| r.value().clone())
    }

    pub fn contains(&self, model_id: &str) -> bool {
        self.models.contains_key(model_id)
    }

    pub fn remove(&self, model_id: &str) -> Option<ModelRecord> {
        self.models.remove(model_id).map(|(_, record)| record)
    }

    /// All records ordered by model id
    pub fn snapshot(&self) -> Vec<ModelRecord> {
        let mut records: Vec<ModelRecord> = self.models.iter().map(|r| r.value().clone()).collect();
        records.sort_by(|a, b| a.model_id.cmp(&b.model_id));
        records
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

impl Default for ModelCache {
    fn default() -> Self {
        Self::new()
    }
}
