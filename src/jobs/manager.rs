//! Job submission and status

use crate::error::ServiceError;
use crate::storage::jobs::JobStore;
use crate::types::job::{AsyncJob, JobSpec};
use serde::Serialize;

/// Result of a status query; an unknown id is not an error
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum JobLookup {
    Found(AsyncJob),
    Missing { db_msg: String },
}

impl JobLookup {
    fn missing(job_id: &str) -> Self {
        JobLookup::Missing {
            db_msg: format!("Inference Job id: [{}] not found!", job_id),
        }
    }

    pub fn job(&self) -> Option<&AsyncJob> {
        match self {
            JobLookup::Found(job) => Some(job),
            JobLookup::Missing { .. } => None,
        }
    }
}

#[derive(Clone)]
pub struct AsyncJobManager {
    store: JobStore,
}

impl AsyncJobManager {
    pub fn new(store: JobStore) -> Self {
        Self { store }
    }

    /// Validate and persist a new job in ACCEPTED state
    pub async fn submit(&self, spec: JobSpec) -> Result<AsyncJob, ServiceError> {
        spec.validate().map_err(ServiceError::Unprocessable)?;
        let job = AsyncJob::accepted(spec);

        let store = self.store.clone();
        let row = job.clone();
        tokio::task::spawn_blocking(move || store.insert(&row))
            .await
            .map_err(|e| ServiceError::Internal(format!("Task join error: {}", e)))??;

        tracing::info!(
            job_id = %job.job_id,
            ll_model = %job.ll_model,
            measure_model = %job.measure_model,
            "Inference job accepted"
        );
        Ok(job)
    }

    pub async fn get_status(&self, job_id: &str) -> Result<JobLookup, ServiceError> {
        let store = self.store.clone();
        let id = job_id.to_string();
        let job = tokio::task::spawn_blocking(move || store.get(&id))
            .await
            .map_err(|e| ServiceError::Internal(format!("Task join error: {}", e)))??;

        Ok(match job {
            Some(job) => JobLookup::Found(job),
            None => {
                tracing::debug!(job_id = %job_id, "Inference job not found");
                JobLookup::missing(job_id)
            }
        })
    }
}
