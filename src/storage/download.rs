//! Streamed downloads
//!
//! Shared by the catalog and object storage clients: artifacts can be several
//! gigabytes, so responses are streamed to a temp file and renamed on completion.

use std::path::Path;
use thiserror::Error;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;

/// Failure talking to an upstream service
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Upstream returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Download incomplete: got {got} bytes, expected {expected}")]
    Incomplete { got: u64, expected: u64 },
    #[error("Invalid object location: {0}")]
    InvalidLocation(String),
}

/// Turn a non-success response into an error, keeping the body for diagnostics
pub async fn check_status(
    response: reqwest::Response,
    what: &str,
) -> Result<reqwest::Response, UpstreamError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(UpstreamError::NotFound(what.to_string()));
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(UpstreamError::Status {
        status: status.as_u16(),
        body,
    })
}

/// Stream a response body into `dest`, returning the number of bytes written
pub async fn stream_to_file(response: reqwest::Response, dest: &Path) -> Result<u64, UpstreamError> {
    let expected = response.content_length();
    let temp_path = dest.with_extension("part");

    let mut temp_file = File::create(&temp_path).await?;
    let mut response = response;
    let mut downloaded: u64 = 0;
    let result: Result<(), UpstreamError> = async {
        while let Some(chunk) = response.chunk().await? {
            temp_file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
        }
        temp_file.flush().await?;
        Ok(())
    }
    .await;

    if let Err(e) = result {
        let _ = fs::remove_file(&temp_path).await;
        return Err(e);
    }

    if let Some(expected) = expected {
        if downloaded != expected {
            let _ = fs::remove_file(&temp_path).await;
            return Err(UpstreamError::Incomplete {
                got: downloaded,
                expected,
            });
        }
    }

    fs::rename(&temp_path, dest).await?;
    tracing::debug!(path = %dest.display(), size = %format_size(downloaded), "Download complete");
    Ok(downloaded)
}

/// Get a human-readable size string
pub fn format_size(bytes: u64) -> String {
    let bytes = bytes as f64;
    if bytes < 1024.0 {
        format!("{} B", bytes as u64)
    } else if bytes < 1024.0 * 1024.0 {
        format!("{:.2} KB", bytes / 1024.0)
    } else if bytes < 1024.0 * 1024.0 * 1024.0 {
        format!("{:.2} MB", bytes / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes / (1024.0 * 1024.0 * 1024.0))
    }
}
