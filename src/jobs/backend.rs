//! Model inference for the scoring worker

use crate::storage::download::{check_status, UpstreamError};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Score `payload` with `model_id`, returning the model's output
    async fn infer(&self, model_id: &str, payload: Value) -> Result<Value, UpstreamError>;
}

/// Calls the model server's score endpoint
pub struct HttpInferenceBackend {
    client: reqwest::Client,
    server_url: String,
}

#[derive(Deserialize)]
struct ScoreResponse {
    data: Value,
}

impl HttpInferenceBackend {
    pub fn new(client: reqwest::Client, server_url: impl Into<String>) -> Self {
        Self {
            client,
            server_url: server_url.into(),
        }
    }
}

#[async_trait]
impl InferenceBackend for HttpInferenceBackend {
    async fn infer(&self, model_id: &str, payload: Value) -> Result<Value, UpstreamError> {
        let url = format!("{}/api/v1/score", self.server_url);
        let response = self
            .client
            .post(&url)
            .query(&[("model_id", model_id)])
            .json(&payload)
            .send()
            .await?;
        let response = check_status(response, model_id).await?;
        let body: ScoreResponse = response.json().await?;
        Ok(body.data)
    }
}
