//! Sidecar to model server calls

use crate::storage::download::{check_status, UpstreamError};
use crate::transfer::TransferError;
use crate::types::transfer::TransferCallback;
use async_trait::async_trait;

/// Calls the sidecar makes against the model server
#[async_trait]
pub trait ServerLink: Send + Sync {
    /// Announce the sidecar id, authenticated with the deployment api secret
    async fn register(&self, sidecar_id: &str) -> Result<(), TransferError>;

    /// Report the terminal outcome of a transfer
    async fn notify(&self, callback_uri: &str, callback: &TransferCallback) -> Result<(), TransferError>;
}

pub struct HttpServerLink {
    client: reqwest::Client,
    server_url: String,
    api_secret: String,
}

impl HttpServerLink {
    pub fn new(client: reqwest::Client, server_url: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            client,
            server_url: server_url.into(),
            api_secret: api_secret.into(),
        }
    }
}

#[async_trait]
impl ServerLink for HttpServerLink {
    async fn register(&self, sidecar_id: &str) -> Result<(), TransferError> {
        let url = format!("{}/api/v1/registersc", self.server_url);
        let response = self
            .client
            .post(&url)
            .query(&[("api_secret", self.api_secret.as_str()), ("sidecar_id", sidecar_id)])
            .send()
            .await
            .map_err(UpstreamError::from)?;
        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(TransferError::Rejected("api secret not accepted".to_string()));
        }
        check_status(response, "registersc").await?;
        Ok(())
    }

    async fn notify(&self, callback_uri: &str, callback: &TransferCallback) -> Result<(), TransferError> {
        let response = self
            .client
            .post(callback_uri)
            .query(&[
                ("model_id", callback.model_id.as_str()),
                ("model_name", callback.model_name.as_str()),
                ("status", callback.status.as_str()),
                ("secret", callback.secret.as_str()),
            ])
            .send()
            .await
            .map_err(UpstreamError::from)?;
        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(TransferError::Rejected(format!(
                "callback for model {} not accepted",
                callback.model_id
            )));
        }
        check_status(response, "uploadmodel/callback").await?;
        tracing::info!(
            model_id = %callback.model_id,
            status = callback.status.as_str(),
            "Transfer callback delivered"
        );
        Ok(())
    }
}
