//! Scoring worker
//!
//! Claims ACCEPTED jobs one at a time and runs the scoring pipeline:
//! 1. read the input document `{prompts, references, predictions?}`
//! 2. run the LL model on every prompt (or take `predictions` from the input)
//! 3. run the measure model on every (prediction, reference) pair
//! 4. write `{job_id, predictions, scores}` to the output bucket
//!
//! Any failure is terminal for the job; the loop moves on.

use crate::jobs::backend::InferenceBackend;
use crate::storage::download::UpstreamError;
use crate::storage::jobs::{JobStore, JobStoreError};
use crate::storage::object_store::ObjectStore;
use crate::types::job::{AsyncJob, ObjectLocator};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Object storage error: {0}")]
    Storage(#[from] UpstreamError),
    #[error("Invalid JSON document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Input has no predictions and the job names no LL model")]
    MissingPredictions,
    #[error("Got {predictions} predictions for {references} references")]
    LengthMismatch { predictions: usize, references: usize },
    #[error("Inference with model {model_id} failed: {source}")]
    Inference {
        model_id: String,
        #[source]
        source: UpstreamError,
    },
}

#[derive(Debug, Deserialize)]
struct ScoringInput {
    #[serde(default)]
    prompts: Vec<Value>,
    #[serde(default)]
    references: Vec<Value>,
    #[serde(default)]
    predictions: Option<Vec<Value>>,
}

#[derive(Debug, Serialize)]
struct ScoringOutput<'a> {
    job_id: &'a str,
    predictions: Vec<Value>,
    scores: Vec<Value>,
}

pub struct ScoringWorker {
    store: JobStore,
    objects: Arc<dyn ObjectStore>,
    backend: Arc<dyn InferenceBackend>,
    interval: Duration,
}

impl ScoringWorker {
    pub fn new(store: JobStore, objects: Arc<dyn ObjectStore>, backend: Arc<dyn InferenceBackend>) -> Self {
        Self {
            store,
            objects,
            backend,
            interval: Duration::from_secs(5),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Poll until `shutdown` flips to true
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("Scoring worker started");
        while !*shutdown.borrow() {
            let idle = match self.poll_once().await {
                Ok(Some(_)) => false,
                Ok(None) => {
                    debug!(wait = ?self.interval, "No accepted job found");
                    true
                }
                Err(e) => {
                    error!(error = %e, "Failed to poll job table");
                    true
                }
            };
            if idle {
                tokio::select! {
                    _ = sleep(self.interval) => {}
                    _ = shutdown.changed() => {}
                }
            }
        }
        info!("Scoring worker stopped");
    }

    /// Claim and process at most one job, returning its final state
    pub async fn poll_once(&self) -> Result<Option<AsyncJob>, JobStoreError> {
        let store = self.store.clone();
        let Some(job) = blocking(move || store.claim_next()).await? else {
            return Ok(None);
        };
        info!(job_id = %job.job_id, "Processing inference job");

        let job_id = job.job_id.clone();
        let store = self.store.clone();
        let finished = match self.process(&job).await {
            Ok(output) => {
                info!(job_id = %job_id, output = %output, "Inference job completed");
                blocking(move || store.complete(&job_id, &output)).await?
            }
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "Inference job failed");
                let reason = e.to_string();
                blocking(move || store.fail(&job_id, &reason)).await?
            }
        };
        Ok(finished.or(Some(job)))
    }

    async fn process(&self, job: &AsyncJob) -> Result<ObjectLocator, PipelineError> {
        let raw = self.objects.get_object(&job.input).await?;
        let input: ScoringInput = serde_json::from_slice(&raw)?;

        let predictions = if job.ll_model.trim().is_empty() {
            input.predictions.ok_or(PipelineError::MissingPredictions)?
        } else {
            let mut predictions = Vec::with_capacity(input.prompts.len());
            for prompt in &input.prompts {
                let output = self.infer(&job.ll_model, json!({ "prompt": prompt })).await?;
                predictions.push(output);
            }
            predictions
        };

        let mut scores = Vec::new();
        if !job.measure_model.trim().is_empty() {
            if predictions.len() != input.references.len() {
                return Err(PipelineError::LengthMismatch {
                    predictions: predictions.len(),
                    references: input.references.len(),
                });
            }
            for (prediction, reference) in predictions.iter().zip(&input.references) {
                let payload = json!({ "prediction": prediction, "reference": reference });
                scores.push(self.infer(&job.measure_model, payload).await?);
            }
        }

        let output = ScoringOutput {
            job_id: &job.job_id,
            predictions,
            scores,
        };
        let locator = job.output.locator_for(&job.job_id);
        self.objects
            .put_object(&locator, serde_json::to_vec_pretty(&output)?)
            .await?;
        Ok(locator)
    }

    async fn infer(&self, model_id: &str, payload: Value) -> Result<Value, PipelineError> {
        self.backend
            .infer(model_id, payload)
            .await
            .map_err(|source| PipelineError::Inference {
                model_id: model_id.to_string(),
                source,
            })
    }
}

async fn blocking<T, F>(f: F) -> Result<T, JobStoreError>
where
    F: FnOnce() -> Result<T, JobStoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| JobStoreError::Task(e.to_string()))?
}
