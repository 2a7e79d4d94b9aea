//! Model types
//!
//! Catalog metadata and the per-replica record kept for every loaded model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Custom metadata category that carries the training environment.
pub const TRAINING_ENV_CATEGORY: &str = "Training Environment";
/// Custom metadata key holding the environment slug.
pub const SLUG_NAME_KEY: &str = "SlugName";

/// Usage and reload bookkeeping for a model resident on this replica
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRecord {
    /// Catalog identifier (immutable)
    pub model_id: String,
    /// Human-readable name
    pub display_name: String,
    /// Number of inference calls served by this replica
    pub invocation_count: u64,
    /// When the model was last (re)loaded on this replica
    pub last_load_time: DateTime<Utc>,
    /// Number of loads, starting at 1
    pub reload_count: u32,
}

impl ModelRecord {
    pub fn new(model_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            display_name: display_name.into(),
            invocation_count: 0,
            last_load_time: Utc::now(),
            reload_count: 1,
        }
    }
}

/// Catalog lifecycle state of a model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    Active,
    Inactive,
    Deleted,
    Failed,
    #[serde(other)]
    Unknown,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Active => "ACTIVE",
            LifecycleState::Inactive => "INACTIVE",
            LifecycleState::Deleted => "DELETED",
            LifecycleState::Failed => "FAILED",
            LifecycleState::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single custom metadata entry attached to a catalog model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomMetadata {
    #[serde(default)]
    pub category: Option<String>,
    pub key: String,
    pub value: String,
}

/// Model metadata as returned by the model catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub id: String,
    pub display_name: String,
    pub lifecycle_state: LifecycleState,
    #[serde(default)]
    pub custom_metadata: Vec<CustomMetadata>,
}

impl ModelMetadata {
    /// Environment slug the model was trained against, if declared
    pub fn env_slug(&self) -> Option<&str> {
        self.custom_metadata
            .iter()
            .find(|m| m.category.as_deref() == Some(TRAINING_ENV_CATEGORY) && m.key == SLUG_NAME_KEY)
            .map(|m| m.value.as_str())
    }
}

/// Parameters for listing catalog models
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListModelsQuery {
    pub compartment_id: String,
    pub project_id: String,
    pub lifecycle_state: LifecycleState,
    pub limit: u32,
}
