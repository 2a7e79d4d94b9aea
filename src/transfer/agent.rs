//! Transfer agent (sidecar)
//!
//! Polls the transfer queue for requests addressed to this sidecar, installs the
//! referenced artifact into the artifact store, and reports the outcome to the
//! model server.

use crate::storage::artifacts::ArtifactStore;
use crate::storage::object_store::ObjectStore;
use crate::transfer::{ServerLink, TransferError, TransferQueue};
use crate::types::job::ObjectLocator;
use crate::types::transfer::{TransferCallback, TransferRequest, TransferStatus};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const DEFAULT_ARCHIVE_NAME: &str = "artifact.zip";

/// Result of one poll of the queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentOutcome {
    /// No request addressed to this sidecar
    Idle,
    /// Target directory already existed; request dropped without a callback
    Discarded(String),
    Installed(String),
    Failed { model_id: String, reason: String },
}

pub struct TransferAgent {
    sidecar_id: String,
    queue: TransferQueue,
    store: ArtifactStore,
    objects: Arc<dyn ObjectStore>,
    link: Arc<dyn ServerLink>,
    poll_interval: Duration,
    register_backoff: Duration,
}

impl TransferAgent {
    pub fn new(store: ArtifactStore, objects: Arc<dyn ObjectStore>, link: Arc<dyn ServerLink>) -> Self {
        Self {
            sidecar_id: Uuid::new_v4().to_string(),
            queue: TransferQueue::new(store.models_dir()),
            store,
            objects,
            link,
            poll_interval: Duration::from_secs(5),
            register_backoff: Duration::from_secs(30),
        }
    }

    pub fn with_intervals(mut self, poll_interval: Duration, register_backoff: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.register_backoff = register_backoff;
        self
    }

    /// Secret this sidecar registers with the model server
    pub fn sidecar_id(&self) -> &str {
        &self.sidecar_id
    }

    /// Register, then poll until `shutdown` flips to true
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        if !self.register(&mut shutdown).await {
            return;
        }

        while !*shutdown.borrow() {
            let idle = match self.process_next().await {
                Ok(AgentOutcome::Idle) => true,
                Ok(outcome) => {
                    debug!(outcome = ?outcome, "Transfer request processed");
                    false
                }
                Err(e) => {
                    error!(error = %e, "Failed to read transfer queue");
                    true
                }
            };
            if idle {
                tokio::select! {
                    _ = sleep(self.poll_interval) => {}
                    _ = shutdown.changed() => {}
                }
            }
        }
        info!(sidecar_id = %self.sidecar_id, "Transfer agent stopped");
    }

    /// Retry registration with a fixed backoff. Returns false if shut down first.
    pub async fn register(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.link.register(&self.sidecar_id).await {
                Ok(()) => {
                    info!(sidecar_id = %self.sidecar_id, attempt = attempt, "Sidecar registered with model server");
                    return true;
                }
                Err(e) => {
                    warn!(
                        attempt = attempt,
                        retry_in = ?self.register_backoff,
                        error = %e,
                        "Sidecar registration failed, retrying"
                    );
                }
            }
            tokio::select! {
                _ = sleep(self.register_backoff) => {}
                _ = shutdown.changed() => return false,
            }
            if *shutdown.borrow() {
                return false;
            }
        }
    }

    /// Handle at most one pending request
    pub async fn process_next(&self) -> Result<AgentOutcome, TransferError> {
        let Some(request) = self.queue.next_for(&self.sidecar_id).await? else {
            return Ok(AgentOutcome::Idle);
        };
        let model_id = request.model_id.clone();
        info!(model_id = %model_id, artifact = %request.artifact_name, "Processing transfer request");

        // A concurrent load already installed the model.
        if self.store.is_present(&model_id).await? {
            self.queue.discard(&model_id).await?;
            info!(model_id = %model_id, "Artifact directory already present, request discarded");
            return Ok(AgentOutcome::Discarded(model_id));
        }

        match self.install(&request).await {
            Ok(()) => {
                self.notify(&request, TransferStatus::Completed).await;
                Ok(AgentOutcome::Installed(model_id))
            }
            Err(e) => {
                if let Err(cleanup) = self.queue.discard(&model_id).await {
                    warn!(model_id = %model_id, error = %cleanup, "Failed to delete transfer directory");
                }
                error!(model_id = %model_id, error = %e, "Transfer failed");
                self.notify(&request, TransferStatus::Failed).await;
                Ok(AgentOutcome::Failed {
                    model_id,
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn install(&self, request: &TransferRequest) -> Result<(), TransferError> {
        let model_id = request.model_id.as_str();
        let temp_dir = self.queue.pending_dir(model_id)?;
        let archive_name = Path::new(&request.artifact_name)
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| DEFAULT_ARCHIVE_NAME.into());
        let archive = temp_dir.join(archive_name);

        let locator = ObjectLocator {
            namespace: request.namespace.clone(),
            bucket_name: request.bucket_name.clone(),
            object_name: request.artifact_name.clone(),
        };
        let size = self.objects.download_object(&locator, &archive).await?;
        debug!(model_id = %model_id, size = size, "Downloaded model archive");

        self.store.extract_file(model_id, &archive).await?;
        self.queue.discard(model_id).await?;

        if let Err(e) = self.validate(request).await {
            let _ = self.store.remove(model_id).await;
            return Err(e);
        }
        info!(model_id = %model_id, "Model artifacts installed");
        Ok(())
    }

    async fn validate(&self, request: &TransferRequest) -> Result<(), TransferError> {
        self.store.verify_markers(&request.model_id).await?;
        let slug = self.store.runtime_env_slug(&request.model_id).await?;
        if slug.as_deref() != Some(request.server_env.as_str()) {
            return Err(TransferError::EnvMismatch {
                required: slug.unwrap_or_default(),
                server: request.server_env.clone(),
            });
        }
        Ok(())
    }

    async fn notify(&self, request: &TransferRequest, status: TransferStatus) {
        let callback = TransferCallback {
            model_id: request.model_id.clone(),
            model_name: request.model_name.clone(),
            status,
            secret: request.server_secret.clone(),
        };
        if let Err(e) = self.link.notify(&request.callback_uri, &callback).await {
            error!(
                model_id = %request.model_id,
                status = status.as_str(),
                error = %e,
                "Failed to notify model server"
            );
        }
    }
}
