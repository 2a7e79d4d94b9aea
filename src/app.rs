//! Process assembly
//!
//! Wires configuration into the three long-running processes: the model server,
//! the transfer sidecar and the scoring worker.

use crate::api::{create_router, AppState};
use crate::jobs::{AsyncJobManager, HttpInferenceBackend, ScoringWorker};
use crate::lifecycle::{LifecycleManager, ScriptScorerLoader};
use crate::storage::artifacts::ArtifactStore;
use crate::storage::catalog::HttpCatalog;
use crate::storage::jobs::JobStore;
use crate::storage::object_store::HttpObjectStore;
use crate::storage::settings::ConfigError;
use crate::transfer::{HttpServerLink, TransferAgent};
use crate::types::config::ServerConfig;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

pub type AppResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Run the model server until `shutdown` resolves
pub async fn serve<F>(config: ServerConfig, shutdown: F) -> AppResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let catalog_url = config
        .catalog_url
        .clone()
        .ok_or(ConfigError::Missing("MMIS_CATALOG_URL"))?;
    let client = config.http_client()?;

    let store = ArtifactStore::new(&config.store_dir);
    store.ensure_layout().await?;
    info!(store = %store.root().display(), env_slug = %config.env_slug, "Using artifact store");

    let jobs = JobStore::open(&config.database_path)?;
    jobs.migrate()?;

    let catalog = HttpCatalog::new(client, catalog_url).with_request_tag(format!("mmis-{}", config.env_slug));
    let lifecycle = LifecycleManager::new(
        config.env_slug.clone(),
        config.api_secret.clone(),
        store,
        Arc::new(catalog),
        Arc::new(ScriptScorerLoader::new()),
    )
    .with_callback_uri(format!(
        "{}/api/v1/uploadmodel/callback",
        config.effective_server_url()
    ));

    let state = AppState::new(Arc::new(lifecycle), AsyncJobManager::new(jobs));
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, "Model server listening");

    axum::serve(listener, app).with_graceful_shutdown(shutdown).await?;
    info!("Model server shut down");
    Ok(())
}

/// Run the transfer sidecar until `shutdown` flips to true
pub async fn run_sidecar(config: ServerConfig, shutdown: watch::Receiver<bool>) -> AppResult<()> {
    let object_store_url = config
        .object_store_url
        .clone()
        .ok_or(ConfigError::Missing("MMIS_OBJECT_STORE_URL"))?;
    let client = config.http_client()?;

    let store = ArtifactStore::new(&config.store_dir);
    store.ensure_layout().await?;

    let server_url = config.effective_server_url();
    info!(server = %server_url, "Starting transfer sidecar");
    let agent = TransferAgent::new(
        store,
        Arc::new(HttpObjectStore::new(client.clone(), object_store_url)),
        Arc::new(HttpServerLink::new(client, server_url, config.api_secret.clone())),
    )
    .with_intervals(config.poll_interval(), config.register_backoff());

    agent.run(shutdown).await;
    Ok(())
}

/// Run the scoring worker until `shutdown` flips to true
pub async fn run_worker(config: ServerConfig, shutdown: watch::Receiver<bool>) -> AppResult<()> {
    let object_store_url = config
        .object_store_url
        .clone()
        .ok_or(ConfigError::Missing("MMIS_OBJECT_STORE_URL"))?;
    let client = config.http_client()?;

    let jobs = JobStore::open(&config.database_path)?;
    jobs.migrate()?;

    let worker = ScoringWorker::new(
        jobs,
        Arc::new(HttpObjectStore::new(client.clone(), object_store_url)),
        Arc::new(HttpInferenceBackend::new(client, config.effective_server_url())),
    )
    .with_interval(config.worker_interval());

    worker.run(shutdown).await;
    Ok(())
}
