//! Object storage client
//!
//! Input/output documents of async jobs and model archives uploaded out-of-band.

use crate::storage::download::{check_status, stream_to_file, UpstreamError};
use crate::types::job::ObjectLocator;
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tokio::fs;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get_object(&self, locator: &ObjectLocator) -> Result<Vec<u8>, UpstreamError>;

    async fn put_object(&self, locator: &ObjectLocator, body: Vec<u8>) -> Result<(), UpstreamError>;

    /// Download an object into `dest`, returning its size
    async fn download_object(&self, locator: &ObjectLocator, dest: &Path) -> Result<u64, UpstreamError> {
        let bytes = self.get_object(locator).await?;
        fs::write(dest, &bytes).await?;
        Ok(bytes.len() as u64)
    }
}

/// REST client: objects live at `{base}/n/{namespace}/b/{bucket}/o/{object}`
pub struct HttpObjectStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpObjectStore {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn object_url(&self, locator: &ObjectLocator) -> String {
        format!(
            "{}/n/{}/b/{}/o/{}",
            self.base_url, locator.namespace, locator.bucket_name, locator.object_name
        )
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn get_object(&self, locator: &ObjectLocator) -> Result<Vec<u8>, UpstreamError> {
        let response = self.client.get(self.object_url(locator)).send().await?;
        let response = check_status(response, &locator.to_string()).await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn put_object(&self, locator: &ObjectLocator, body: Vec<u8>) -> Result<(), UpstreamError> {
        let response = self
            .client
            .put(self.object_url(locator))
            .body(body)
            .send()
            .await?;
        check_status(response, &locator.to_string()).await?;
        Ok(())
    }

    async fn download_object(&self, locator: &ObjectLocator, dest: &Path) -> Result<u64, UpstreamError> {
        tracing::info!(object = %locator, "Downloading object");
        let response = self.client.get(self.object_url(locator)).send().await?;
        let response = check_status(response, &locator.to_string()).await?;
        stream_to_file(response, dest).await
    }
}

/// Object store backed by a local directory: `{root}/{namespace}/{bucket}/{object}`
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, locator: &ObjectLocator) -> Result<PathBuf, UpstreamError> {
        let mut path = self.root.clone();
        for part in [&locator.namespace, &locator.bucket_name, &locator.object_name] {
            let relative = Path::new(part);
            let clean = relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
            if part.is_empty() || !clean {
                return Err(UpstreamError::InvalidLocation(locator.to_string()));
            }
            path.push(relative);
        }
        Ok(path)
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn get_object(&self, locator: &ObjectLocator) -> Result<Vec<u8>, UpstreamError> {
        let path = self.object_path(locator)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(UpstreamError::NotFound(locator.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn put_object(&self, locator: &ObjectLocator, body: Vec<u8>) -> Result<(), UpstreamError> {
        let path = self.object_path(locator)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, body).await?;
        Ok(())
    }
}
