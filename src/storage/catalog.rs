//! Model catalog client
//!
//! Metadata lookups and artifact downloads against the model catalog service.

use crate::storage::download::{check_status, stream_to_file, UpstreamError};
use crate::types::model::{ListModelsQuery, ModelMetadata};
use async_trait::async_trait;
use std::path::Path;

/// Model catalog operations the lifecycle manager depends on
#[async_trait]
pub trait ModelCatalog: Send + Sync {
    async fn get_model(&self, model_id: &str) -> Result<ModelMetadata, UpstreamError>;

    /// Download the artifact archive of `model_id` into `dest`
    async fn fetch_artifact(&self, model_id: &str, dest: &Path) -> Result<u64, UpstreamError>;

    async fn list_models(&self, query: &ListModelsQuery) -> Result<Vec<ModelMetadata>, UpstreamError>;
}

/// REST client for the catalog service
pub struct HttpCatalog {
    client: reqwest::Client,
    base_url: String,
    request_tag: Option<String>,
}

impl HttpCatalog {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            request_tag: None,
        }
    }

    /// Tag sent as `opc-request-id` so catalog logs can be correlated with this replica
    pub fn with_request_tag(mut self, tag: impl Into<String>) -> Self {
        self.request_tag = Some(tag.into());
        self
    }

    fn get(&self, url: String) -> reqwest::RequestBuilder {
        let request = self.client.get(url);
        match &self.request_tag {
            Some(tag) => request.header("opc-request-id", tag),
            None => request,
        }
    }
}

#[async_trait]
impl ModelCatalog for HttpCatalog {
    async fn get_model(&self, model_id: &str) -> Result<ModelMetadata, UpstreamError> {
        let url = format!("{}/models/{}", self.base_url, model_id);
        let response = check_status(self.get(url).send().await?, model_id).await?;
        Ok(response.json().await?)
    }

    async fn fetch_artifact(&self, model_id: &str, dest: &Path) -> Result<u64, UpstreamError> {
        let url = format!("{}/models/{}/artifact/content", self.base_url, model_id);
        tracing::info!(model_id = %model_id, "Fetching model artifact from catalog");
        let response = check_status(self.get(url).send().await?, model_id).await?;
        stream_to_file(response, dest).await
    }

    async fn list_models(&self, query: &ListModelsQuery) -> Result<Vec<ModelMetadata>, UpstreamError> {
        let url = format!("{}/models", self.base_url);
        let limit = query.limit.to_string();
        let response = self
            .get(url)
            .query(&[
                ("compartmentId", query.compartment_id.as_str()),
                ("projectId", query.project_id.as_str()),
                ("lifecycleState", query.lifecycle_state.as_str()),
                ("limit", limit.as_str()),
            ])
            .send()
            .await?;
        let response = check_status(response, "models").await?;
        Ok(response.json().await?)
    }
}
