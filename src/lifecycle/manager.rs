//! Lifecycle manager
//!
//! Every replica runs one manager. Replicas never talk to each other: the registry
//! file and the artifact directories on the shared store are the only coordination.
//! Validation always happens before the registry or the cache is touched, so a
//! failed operation leaves neither behind.

use crate::error::ServiceError;
use crate::lifecycle::cache::ModelCache;
use crate::lifecycle::scorer::ScorerLoader;
use crate::lifecycle::secrets::SecretBook;
use crate::storage::artifacts::{ArtifactStore, RUNTIME_FILE};
use crate::storage::catalog::ModelCatalog;
use crate::storage::registry::ModelRegistry;
use crate::storage::{validate_model_id, StorageError};
use crate::system::stats::RuntimeStats;
use crate::transfer::{TransferError, TransferQueue};
use crate::types::model::{LifecycleState, ListModelsQuery, ModelMetadata, ModelRecord};
use crate::types::transfer::{ObjectStoreUpload, TransferCallback, TransferRequest, TransferStatus};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tokio::fs;
use tracing::{debug, info, warn};

const DEFAULT_CALLBACK_URI: &str = "http://127.0.0.1:8000/api/v1/uploadmodel/callback";

#[derive(Debug, Clone, Serialize)]
pub struct LoadOutcome {
    pub model_id: String,
    pub model_name: String,
    /// Seconds spent fetching and installing the artifact
    pub load_time: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransferAccepted {
    pub model_id: String,
    pub model_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CallbackOutcome {
    pub model_id: String,
    pub transfer_status: TransferStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct RemoveOutcome {
    pub model_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct InferOutcome {
    pub model_id: String,
    pub data: Value,
    /// Seconds spent in the scorer
    pub inference_time: f64,
}

pub struct LifecycleManager {
    env_slug: String,
    store: ArtifactStore,
    registry: ModelRegistry,
    cache: Arc<ModelCache>,
    catalog: Arc<dyn ModelCatalog>,
    scorers: Arc<dyn ScorerLoader>,
    secrets: SecretBook,
    queue: TransferQueue,
    stats: Arc<RuntimeStats>,
    callback_uri: String,
}

impl LifecycleManager {
    pub fn new(
        env_slug: impl Into<String>,
        api_secret: impl Into<String>,
        store: ArtifactStore,
        catalog: Arc<dyn ModelCatalog>,
        scorers: Arc<dyn ScorerLoader>,
    ) -> Self {
        Self {
            env_slug: env_slug.into(),
            registry: store.registry(),
            queue: TransferQueue::new(store.models_dir()),
            store,
            cache: Arc::new(ModelCache::new()),
            catalog,
            scorers,
            secrets: SecretBook::new(api_secret),
            stats: Arc::new(RuntimeStats::new()),
            callback_uri: DEFAULT_CALLBACK_URI.to_string(),
        }
    }

    /// Address the sidecar calls once a transfer finishes
    pub fn with_callback_uri(mut self, uri: impl Into<String>) -> Self {
        self.callback_uri = uri.into();
        self
    }

    pub fn with_stats(mut self, stats: Arc<RuntimeStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn env_slug(&self) -> &str {
        &self.env_slug
    }

    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn stats(&self) -> &RuntimeStats {
        &self.stats
    }

    /// Models loaded on this replica
    pub fn loaded_models(&self) -> Vec<ModelRecord> {
        self.cache.snapshot()
    }

    /// Fetch a model from the catalog and install it
    pub async fn load(&self, model_id: &str) -> Result<LoadOutcome, ServiceError> {
        validate_model_id(model_id)?;
        self.ensure_not_resident(model_id).await?;
        let started = Instant::now();

        let metadata = self.catalog.get_model(model_id).await?;
        self.check_catalog_entry(&metadata)?;

        self.store.ensure_layout().await?;
        let archive = self.store.root().join(format!("{}.zip", model_id));
        self.catalog.fetch_artifact(model_id, &archive).await?;

        let installed = self.install_archive(model_id, &archive).await;
        if let Err(e) = fs::remove_file(&archive).await {
            debug!(model_id = %model_id, error = %e, "Could not delete model archive");
        }
        installed?;

        self.register(model_id, &metadata.display_name).await?;
        let load_time = started.elapsed().as_secs_f64();
        info!(model_id = %model_id, load_time = load_time, "Model loaded");
        Ok(LoadOutcome {
            model_id: model_id.to_string(),
            model_name: metadata.display_name,
            load_time,
        })
    }

    /// Install a model from an archive sent by the client
    pub async fn upload(
        &self,
        model_id: &str,
        archive: Vec<u8>,
        model_name: Option<&str>,
    ) -> Result<LoadOutcome, ServiceError> {
        validate_model_id(model_id)?;
        if archive.is_empty() {
            return Err(ServiceError::BadRequest(
                "No model artifact sent in the request body".to_string(),
            ));
        }
        self.ensure_not_resident(model_id).await?;
        let started = Instant::now();

        self.store.ensure_layout().await?;
        self.store.extract_bytes(model_id, archive).await?;
        if let Err(e) = self.validate_installed(model_id).await {
            self.discard_installed(model_id).await;
            return Err(e);
        }

        let model_name = model_name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(model_id);
        self.register(model_id, model_name).await?;
        let load_time = started.elapsed().as_secs_f64();
        info!(model_id = %model_id, model_name = %model_name, "Model uploaded");
        Ok(LoadOutcome {
            model_id: model_id.to_string(),
            model_name: model_name.to_string(),
            load_time,
        })
    }

    /// Queue a transfer of an object store archive for the sidecar
    pub async fn upload_from_object_store(
        &self,
        upload: ObjectStoreUpload,
    ) -> Result<TransferAccepted, ServiceError> {
        validate_model_id(&upload.model_id)?;
        if upload.artifact_name.trim().is_empty() {
            return Err(ServiceError::BadRequest("artifact_name must not be empty".to_string()));
        }
        self.ensure_not_resident(&upload.model_id).await?;

        let sidecar = self
            .secrets
            .sidecar()
            .ok_or_else(|| ServiceError::Unavailable("No transfer sidecar has registered yet".to_string()))?;
        if self.queue.is_pending(&upload.model_id).await.map_err(transfer_error)? {
            return Err(ServiceError::Conflict(format!(
                "An upload request for model {} is already pending",
                upload.model_id
            )));
        }

        let request = TransferRequest {
            server_secret: self.secrets.issue(&upload.model_id),
            sidecar_secret: sidecar,
            server_env: self.env_slug.clone(),
            callback_uri: self.callback_uri.clone(),
            model_id: upload.model_id,
            model_name: upload.model_name,
            namespace: upload.namespace,
            bucket_name: upload.bucket_name,
            artifact_name: upload.artifact_name,
        };
        if let Err(e) = self.queue.enqueue(&request).await {
            self.secrets.revoke(&request.model_id);
            return Err(transfer_error(e));
        }
        Ok(TransferAccepted {
            model_id: request.model_id,
            model_name: request.model_name,
        })
    }

    /// Accept the sidecar's report for a queued transfer
    pub async fn handle_transfer_callback(
        &self,
        callback: TransferCallback,
    ) -> Result<CallbackOutcome, ServiceError> {
        validate_model_id(&callback.model_id)?;
        if !self.secrets.redeem(&callback.model_id, &callback.secret) {
            warn!(model_id = %callback.model_id, "Rejected transfer callback with invalid secret");
            return Err(ServiceError::Unauthorized(format!(
                "Invalid secret for model {}",
                callback.model_id
            )));
        }

        match callback.status {
            TransferStatus::Completed => {
                let name = if callback.model_name.trim().is_empty() {
                    callback.model_id.as_str()
                } else {
                    callback.model_name.as_str()
                };
                self.register(&callback.model_id, name).await?;
                info!(model_id = %callback.model_id, "Model installed by sidecar");
            }
            TransferStatus::Failed => {
                warn!(model_id = %callback.model_id, "Sidecar reported a failed transfer");
            }
        }
        Ok(CallbackOutcome {
            model_id: callback.model_id,
            transfer_status: callback.status,
        })
    }

    pub fn register_sidecar(&self, api_secret: &str, sidecar_id: &str) -> Result<(), ServiceError> {
        if !self.secrets.register_sidecar(api_secret, sidecar_id) {
            warn!("Rejected sidecar registration");
            return Err(ServiceError::Unauthorized("Invalid api secret".to_string()));
        }
        info!(sidecar_id = %sidecar_id, "Transfer sidecar registered");
        Ok(())
    }

    pub async fn remove(&self, model_id: &str) -> Result<RemoveOutcome, ServiceError> {
        validate_model_id(model_id)?;
        if !self.store.remove(model_id).await? {
            return Err(ServiceError::NotFound(format!(
                "Artifacts for model {} not found",
                model_id
            )));
        }
        self.registry.remove(model_id).await?;
        self.cache.remove(model_id);
        info!(model_id = %model_id, "Model removed");
        Ok(RemoveOutcome {
            model_id: model_id.to_string(),
        })
    }

    /// Runtime descriptor of a model, loading it first if needed
    pub async fn get_metadata(&self, model_id: &str) -> Result<Value, ServiceError> {
        let runtime = self.store.model_dir(model_id)?.join(RUNTIME_FILE);
        if !fs::try_exists(&runtime).await.map_err(StorageError::from)? {
            match self.load(model_id).await {
                Ok(_) | Err(ServiceError::Conflict(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(self.store.read_runtime(model_id).await?)
    }

    pub async fn infer(&self, model_id: &str, payload: Value) -> Result<InferOutcome, ServiceError> {
        let result = self.score(model_id, payload).await;
        match &result {
            Ok(_) => self.stats.record_scored(),
            Err(e) if e.is_server_failure() => self.stats.record_server_failure(),
            Err(_) => self.stats.record_failed_request(),
        }
        result
    }

    pub async fn list_models(&self, query: &ListModelsQuery) -> Result<Vec<ModelMetadata>, ServiceError> {
        Ok(self.catalog.list_models(query).await?)
    }

    async fn score(&self, model_id: &str, payload: Value) -> Result<InferOutcome, ServiceError> {
        validate_model_id(model_id)?;
        if is_empty_payload(&payload) {
            return Err(ServiceError::BadRequest(
                "No data sent in the request body".to_string(),
            ));
        }
        if !self.store.is_present(model_id).await? {
            if self.cache.remove(model_id).is_some() {
                warn!(model_id = %model_id, "Evicted cached model without artifacts");
            }
            return Err(ServiceError::BadRequest(format!(
                "Model {} is not loaded",
                model_id
            )));
        }

        let scorer = self
            .scorers
            .load(&self.store.model_dir(model_id)?)
            .await
            .map_err(|e| ServiceError::Unprocessable(e.to_string()))?;
        let started = Instant::now();
        let data = scorer
            .predict(payload)
            .await
            .map_err(|e| ServiceError::Unprocessable(format!("Malformed data sent in the request body: {}", e)))?;
        let inference_time = started.elapsed().as_secs_f64();

        let display_name = match self.cache.find(model_id) {
            Some(record) => record.display_name,
            None => self
                .registry
                .get(model_id)
                .await?
                .unwrap_or_else(|| model_id.to_string()),
        };
        let record = self.cache.record_inference(model_id, &display_name);
        debug!(
            model_id = %model_id,
            invocations = record.invocation_count,
            inference_time = inference_time,
            "Scored request"
        );
        Ok(InferOutcome {
            model_id: model_id.to_string(),
            data,
            inference_time,
        })
    }

    /// Conflict when the model is already known; adopts peer installs and purges stale entries
    async fn ensure_not_resident(&self, model_id: &str) -> Result<(), ServiceError> {
        if self.cache.contains(model_id) {
            return Err(already_loaded(model_id));
        }
        if let Some(name) = self.registry.get(model_id).await? {
            if self.store.is_present(model_id).await? {
                self.cache.upsert(model_id, &name);
                info!(model_id = %model_id, "Adopted model installed by another replica");
                return Err(already_loaded(model_id));
            }
            warn!(model_id = %model_id, "Purging stale registry entry");
            self.registry.remove(model_id).await?;
        }
        Ok(())
    }

    fn check_catalog_entry(&self, metadata: &ModelMetadata) -> Result<(), ServiceError> {
        if metadata.lifecycle_state != LifecycleState::Active {
            return Err(ServiceError::BadRequest(format!(
                "Model {} is not active (state: {})",
                metadata.id, metadata.lifecycle_state
            )));
        }
        match metadata.env_slug() {
            Some(slug) if slug == self.env_slug => Ok(()),
            other => Err(env_mismatch(other, &self.env_slug)),
        }
    }

    async fn install_archive(&self, model_id: &str, archive: &std::path::Path) -> Result<(), ServiceError> {
        self.store.extract_file(model_id, archive).await?;
        if let Err(e) = self.store.verify_markers(model_id).await {
            self.discard_installed(model_id).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn validate_installed(&self, model_id: &str) -> Result<(), ServiceError> {
        self.store.verify_markers(model_id).await?;
        let slug = self.store.runtime_env_slug(model_id).await?;
        if slug.as_deref() != Some(self.env_slug.as_str()) {
            return Err(env_mismatch(slug.as_deref(), &self.env_slug));
        }
        Ok(())
    }

    async fn discard_installed(&self, model_id: &str) {
        if let Err(e) = self.store.remove(model_id).await {
            warn!(model_id = %model_id, error = %e, "Failed to delete rejected artifacts");
        }
    }

    async fn register(&self, model_id: &str, display_name: &str) -> Result<ModelRecord, ServiceError> {
        self.registry.insert(model_id, display_name).await?;
        Ok(self.cache.upsert(model_id, display_name))
    }
}

fn already_loaded(model_id: &str) -> ServiceError {
    ServiceError::Conflict(format!("Model {} is already loaded", model_id))
}

fn env_mismatch(model_slug: Option<&str>, server_slug: &str) -> ServiceError {
    ServiceError::BadRequest(format!(
        "Model environment '{}' does not match server environment '{}'",
        model_slug.unwrap_or("<none>"),
        server_slug
    ))
}

fn is_empty_payload(payload: &Value) -> bool {
    match payload {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

fn transfer_error(e: TransferError) -> ServiceError {
    match e {
        TransferError::AlreadyPending(model_id) => ServiceError::Conflict(format!(
            "An upload request for model {} is already pending",
            model_id
        )),
        TransferError::Storage(e) => e.into(),
        other => ServiceError::Internal(other.to_string()),
    }
}
