//! Configuration types
//!
//! Server, sidecar and worker configuration structures.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration shared by all three processes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Runtime environment slug this replica serves (mandatory)
    pub env_slug: String,
    /// Secret the sidecar presents when registering (mandatory)
    pub api_secret: String,
    /// Listen port of the model server
    pub port: u16,
    /// Root of the shared artifact store
    pub store_dir: PathBuf,
    /// SQLite database holding the job table
    pub database_path: String,
    /// Base URL of the model catalog service
    pub catalog_url: Option<String>,
    /// Base URL of the object storage service
    pub object_store_url: Option<String>,
    /// Base URL the sidecar and worker use to reach the model server
    pub server_url: Option<String>,
    /// Sidecar poll interval for pending transfers
    pub poll_interval_secs: u64,
    /// Sidecar delay between registration attempts
    pub register_backoff_secs: u64,
    /// Worker sleep when no job is pending
    pub worker_interval_secs: u64,
    /// Connect timeout for upstream HTTP calls
    pub connect_timeout_secs: u64,
    /// Read timeout for upstream HTTP calls (artifacts may be large)
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let data_dir = crate::storage::get_data_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            env_slug: String::new(),
            api_secret: String::new(),
            port: 8000,
            store_dir: data_dir.join("store"),
            database_path: data_dir.join("mmis.db").to_string_lossy().to_string(),
            catalog_url: None,
            object_store_url: None,
            server_url: None,
            poll_interval_secs: 5,
            register_backoff_secs: 30,
            worker_interval_secs: 5,
            connect_timeout_secs: 10,
            request_timeout_secs: 3600,
        }
    }
}

impl ServerConfig {
    /// Clamp intervals to sane values and normalise URLs
    pub fn validate(&mut self) {
        self.env_slug = self.env_slug.trim().to_string();
        if self.poll_interval_secs == 0 {
            self.poll_interval_secs = 5;
        }
        if self.register_backoff_secs == 0 {
            self.register_backoff_secs = 30;
        }
        if self.worker_interval_secs == 0 {
            self.worker_interval_secs = 5;
        }
        self.connect_timeout_secs = self.connect_timeout_secs.clamp(1, 300);
        if self.request_timeout_secs < self.connect_timeout_secs {
            self.request_timeout_secs = self.connect_timeout_secs;
        }
        for url in [
            &mut self.catalog_url,
            &mut self.object_store_url,
            &mut self.server_url,
        ] {
            if let Some(u) = url.as_mut() {
                while u.ends_with('/') {
                    u.pop();
                }
            }
            if url.as_deref().is_some_and(|u| u.trim().is_empty()) {
                *url = None;
            }
        }
    }

    /// URL the sidecar and worker use to call the model server
    pub fn effective_server_url(&self) -> String {
        self.server_url
            .clone()
            .unwrap_or_else(|| format!("http://127.0.0.1:{}", self.port))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn register_backoff(&self) -> Duration {
        Duration::from_secs(self.register_backoff_secs)
    }

    pub fn worker_interval(&self) -> Duration {
        Duration::from_secs(self.worker_interval_secs)
    }

    /// Build an HTTP client honouring the configured timeouts
    pub fn http_client(&self) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(self.connect_timeout_secs))
            .timeout(Duration::from_secs(self.request_timeout_secs))
            .user_agent(concat!("mmis/", env!("CARGO_PKG_VERSION")))
            .build()
    }
}
