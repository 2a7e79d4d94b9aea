//! Shared fixtures: in-process catalog and scorer fakes plus a running server.

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use mmis::api::{create_router, AppState};
use mmis::jobs::AsyncJobManager;
use mmis::lifecycle::{LifecycleManager, Scorer, ScorerError, ScorerLoader};
use mmis::storage::artifacts::{ArtifactStore, RUNTIME_FILE, SCORE_FILE};
use mmis::storage::catalog::ModelCatalog;
use mmis::storage::download::UpstreamError;
use mmis::storage::jobs::JobStore;
use mmis::storage::object_store::LocalObjectStore;
use mmis::types::model::{
    CustomMetadata, LifecycleState, ListModelsQuery, ModelMetadata, SLUG_NAME_KEY, TRAINING_ENV_CATEGORY,
};
use serde_json::{json, Value};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

pub const SLUG: &str = "generalml_p38_cpu_v1";
pub const API_SECRET: &str = "deploy-secret";

pub fn runtime_yaml(slug: &str) -> String {
    format!(
        "MODEL_ARTIFACT_VERSION: '3.0'\nMODEL_DEPLOYMENT:\n  INFERENCE_CONDA_ENV:\n    INFERENCE_ENV_SLUG: {slug}\n"
    )
}

pub fn zip_archive(files: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (name, contents) in files {
        writer.start_file(*name, SimpleFileOptions::default()).unwrap();
        writer.write_all(contents.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Archive with both marker files for `slug`
pub fn model_archive(slug: &str) -> Vec<u8> {
    let runtime = runtime_yaml(slug);
    zip_archive(&[(SCORE_FILE, "def predict(data):\n    return data\n"), (RUNTIME_FILE, &runtime)])
}

#[derive(Default)]
pub struct FakeCatalog {
    models: HashMap<String, (ModelMetadata, Vec<u8>)>,
    fetches: AtomicU32,
}

impl FakeCatalog {
    pub fn with_model(mut self, id: &str, state: LifecycleState, slug: &str) -> Self {
        let metadata = ModelMetadata {
            id: id.to_string(),
            display_name: format!("{id}-name"),
            lifecycle_state: state,
            custom_metadata: vec![CustomMetadata {
                category: Some(TRAINING_ENV_CATEGORY.to_string()),
                key: SLUG_NAME_KEY.to_string(),
                value: slug.to_string(),
            }],
        };
        self.models.insert(id.to_string(), (metadata, model_archive(slug)));
        self
    }

    pub fn fetches(&self) -> u32 {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelCatalog for FakeCatalog {
    async fn get_model(&self, model_id: &str) -> Result<ModelMetadata, UpstreamError> {
        self.models
            .get(model_id)
            .map(|(m, _)| m.clone())
            .ok_or_else(|| UpstreamError::NotFound(model_id.to_string()))
    }

    async fn fetch_artifact(&self, model_id: &str, dest: &Path) -> Result<u64, UpstreamError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let (_, archive) = self
            .models
            .get(model_id)
            .ok_or_else(|| UpstreamError::NotFound(model_id.to_string()))?;
        tokio::fs::write(dest, archive).await?;
        Ok(archive.len() as u64)
    }

    async fn list_models(&self, query: &ListModelsQuery) -> Result<Vec<ModelMetadata>, UpstreamError> {
        let mut models: Vec<ModelMetadata> = self
            .models
            .values()
            .map(|(m, _)| m.clone())
            .filter(|m| m.lifecycle_state == query.lifecycle_state)
            .collect();
        models.sort_by(|a, b| a.id.cmp(&b.id));
        models.truncate(query.limit as usize);
        Ok(models)
    }
}

/// Upper-cases prompts, scores exact matches, echoes anything else
pub struct FakeScorer;

#[async_trait]
impl Scorer for FakeScorer {
    async fn predict(&self, payload: Value) -> Result<Value, ScorerError> {
        if payload.get("fail").is_some() {
            return Err(ScorerError::Failed {
                code: Some(1),
                stderr: "ValueError: could not convert input".to_string(),
            });
        }
        if let Some(prompt) = payload.get("prompt").and_then(Value::as_str) {
            return Ok(json!(prompt.to_uppercase()));
        }
        if let (Some(prediction), Some(reference)) = (payload.get("prediction"), payload.get("reference")) {
            let f1 = if prediction == reference { 1.0 } else { 0.0 };
            return Ok(json!({ "f1": f1 }));
        }
        Ok(json!({ "echo": payload }))
    }
}

pub struct FakeScorerLoader;

#[async_trait]
impl ScorerLoader for FakeScorerLoader {
    async fn load(&self, _model_dir: &Path) -> Result<Arc<dyn Scorer>, ScorerError> {
        Ok(Arc::new(FakeScorer))
    }
}

/// A model server bound to 127.0.0.1 with its store, job table and object store
pub struct TestServer {
    pub base: String,
    pub client: reqwest::Client,
    pub lifecycle: Arc<LifecycleManager>,
    pub catalog: Arc<FakeCatalog>,
    pub store: ArtifactStore,
    pub jobs: JobStore,
    pub objects: Arc<LocalObjectStore>,
    _dir: TempDir,
}

impl TestServer {
    pub async fn start() -> Self {
        let catalog = FakeCatalog::default()
            .with_model("m1", LifecycleState::Active, SLUG)
            .with_model("m2", LifecycleState::Active, SLUG)
            .with_model("retired", LifecycleState::Inactive, SLUG)
            .with_model("gpu-model", LifecycleState::Active, "pytorch_p38_gpu_v1");
        Self::start_with(catalog).await
    }

    pub async fn start_with(catalog: FakeCatalog) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("store"));
        store.ensure_layout().await.unwrap();
        let jobs = JobStore::open(dir.path().join("mmis.db").to_str().unwrap()).unwrap();
        jobs.migrate().unwrap();
        let objects = Arc::new(LocalObjectStore::new(dir.path().join("objects")));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let base = format!("http://{addr}");

        let catalog = Arc::new(catalog);
        let lifecycle = Arc::new(
            LifecycleManager::new(SLUG, API_SECRET, store.clone(), catalog.clone(), Arc::new(FakeScorerLoader))
                .with_callback_uri(format!("{base}/api/v1/uploadmodel/callback")),
        );
        let app = create_router(AppState::new(lifecycle.clone(), AsyncJobManager::new(jobs.clone())));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base,
            client: reqwest::Client::new(),
            lifecycle,
            catalog,
            store,
            jobs,
            objects,
            _dir: dir,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base, path)
    }

    pub async fn get(&self, path: &str) -> (u16, Value) {
        let resp = self.client.get(self.url(path)).send().await.unwrap();
        read(resp).await
    }

    pub async fn post_json(&self, path: &str, body: &Value) -> (u16, Value) {
        let resp = self.client.post(self.url(path)).json(body).send().await.unwrap();
        read(resp).await
    }

    pub async fn post_bytes(&self, path: &str, body: Vec<u8>) -> (u16, Value) {
        let resp = self.client.post(self.url(path)).body(body).send().await.unwrap();
        read(resp).await
    }

    pub async fn delete(&self, path: &str) -> (u16, Value) {
        let resp = self.client.delete(self.url(path)).send().await.unwrap();
        read(resp).await
    }

    pub async fn registry_len(&self) -> usize {
        self.store.registry().entries().await.unwrap().len()
    }
}

async fn read(resp: reqwest::Response) -> (u16, Value) {
    let status = resp.status().as_u16();
    let body = resp.json().await.unwrap_or(Value::Null);
    (status, body)
}
