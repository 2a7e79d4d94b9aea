//! Async job types
//!
//! Batch inference + scoring jobs tracked through a durable status record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Job status. Transitions only move forward:
/// ACCEPTED -> PROCESSING -> COMPLETED | FAILED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Accepted,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Accepted => "ACCEPTED",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        }
    }

    /// Whether `next` is a legal successor of this status
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Accepted, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACCEPTED" => Ok(JobStatus::Accepted),
            "PROCESSING" => Ok(JobStatus::Processing),
            "COMPLETED" => Ok(JobStatus::Completed),
            "FAILED" => Ok(JobStatus::Failed),
            _ => Err(format!("Invalid job status: {}", s)),
        }
    }
}

/// Location of a single object in the object store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectLocator {
    pub namespace: String,
    pub bucket_name: String,
    pub object_name: String,
}

impl std::fmt::Display for ObjectLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.bucket_name, self.object_name)
    }
}

/// Where job results are written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputTarget {
    pub namespace: String,
    pub bucket_name: String,
    /// Optional object name prefix, e.g. `results/2024`
    #[serde(default)]
    pub prefix: Option<String>,
}

impl OutputTarget {
    /// Object that holds the results of `job_id`
    pub fn locator_for(&self, job_id: &str) -> ObjectLocator {
        let object_name = match self.prefix.as_deref().map(|p| p.trim_matches('/')) {
            Some(prefix) if !prefix.is_empty() => format!("{}/{}.json", prefix, job_id),
            _ => format!("{}.json", job_id),
        };
        ObjectLocator {
            namespace: self.namespace.clone(),
            bucket_name: self.bucket_name.clone(),
            object_name,
        }
    }
}

/// Job description submitted by a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    /// Model producing predictions for each prompt
    #[serde(default)]
    pub ll_model: String,
    /// Model scoring predictions against references
    #[serde(default)]
    pub measure_model: String,
    pub input: ObjectLocator,
    pub output: OutputTarget,
}

impl JobSpec {
    /// At least one model reference must be set
    pub fn validate(&self) -> Result<(), String> {
        if self.ll_model.trim().is_empty() && self.measure_model.trim().is_empty() {
            return Err("At least one of 'll_model' or 'measure_model' must be specified".to_string());
        }
        Ok(())
    }
}

/// A persisted batch job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsyncJob {
    pub job_id: String,
    pub status: JobStatus,
    pub ll_model: String,
    pub measure_model: String,
    pub input: ObjectLocator,
    pub output: OutputTarget,
    /// Set once results have been written
    #[serde(default)]
    pub output_locator: Option<ObjectLocator>,
    pub submission_time: DateTime<Utc>,
    #[serde(default)]
    pub updated_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error: Option<String>,
}

impl AsyncJob {
    /// A freshly accepted job with a generated id
    pub fn accepted(spec: JobSpec) -> Self {
        Self {
            job_id: Uuid::new_v4().to_string(),
            status: JobStatus::Accepted,
            ll_model: spec.ll_model,
            measure_model: spec.measure_model,
            input: spec.input,
            output: spec.output,
            output_locator: None,
            submission_time: Utc::now(),
            updated_time: None,
            error: None,
        }
    }
}
