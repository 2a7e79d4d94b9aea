//! Model scorers
//!
//! A loaded model exposes `predict(data)` from its `score.py`. Scorers run the entry
//! point in a Python subprocess, passing the payload as JSON on stdin.

use crate::storage::artifacts::SCORE_FILE;
use async_trait::async_trait;
use once_cell::sync::OnceCell;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::{timeout, Duration};

/// Imports score.py from the working directory and calls `predict` on stdin JSON
const HARNESS: &str = r#"
import json, sys
sys.path.insert(0, '.')
import score
result = score.predict(json.load(sys.stdin))
if hasattr(result, 'tolist'):
    result = result.tolist()
json.dump(result, sys.stdout)
"#;

const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Scorer failures; all of them are reported as unprocessable requests
#[derive(Debug, Error)]
pub enum ScorerError {
    #[error("Failed to launch scorer: {0}")]
    Launch(#[from] std::io::Error),
    #[error("Scorer exited with code {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },
    #[error("Scorer produced invalid output: {0}")]
    Output(#[from] serde_json::Error),
    #[error("Model artifact has no {0}")]
    MissingEntryPoint(&'static str),
    #[error("Scorer timed out after {0}s")]
    Timeout(u64),
}

/// A model ready to produce predictions
#[async_trait]
pub trait Scorer: Send + Sync {
    async fn predict(&self, payload: Value) -> Result<Value, ScorerError>;
}

/// Builds a [`Scorer`] from an extracted model directory
#[async_trait]
pub trait ScorerLoader: Send + Sync {
    async fn load(&self, model_dir: &Path) -> Result<Arc<dyn Scorer>, ScorerError>;
}

/// Loads `score.py` entry points run by the system Python
pub struct ScriptScorerLoader {
    timeout_secs: u64,
}

impl ScriptScorerLoader {
    pub fn new() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs.max(1);
        self
    }
}

impl Default for ScriptScorerLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ScorerLoader for ScriptScorerLoader {
    async fn load(&self, model_dir: &Path) -> Result<Arc<dyn Scorer>, ScorerError> {
        if !tokio::fs::try_exists(model_dir.join(SCORE_FILE)).await? {
            return Err(ScorerError::MissingEntryPoint(SCORE_FILE));
        }
        Ok(Arc::new(ScriptScorer {
            model_dir: model_dir.to_path_buf(),
            timeout_secs: self.timeout_secs,
        }))
    }
}

/// `score.py` of one model directory
pub struct ScriptScorer {
    model_dir: PathBuf,
    timeout_secs: u64,
}

#[async_trait]
impl Scorer for ScriptScorer {
    async fn predict(&self, payload: Value) -> Result<Value, ScorerError> {
        let input = serde_json::to_vec(&payload)?;

        let mut cmd = Command::new(python_interpreter());
        cmd.arg("-c")
            .arg(HARNESS)
            .current_dir(&self.model_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let run = async {
            let mut child = cmd.spawn()?;
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(&input).await?;
                drop(stdin);
            }
            child.wait_with_output().await
        };

        let output = timeout(Duration::from_secs(self.timeout_secs), run)
            .await
            .map_err(|_| ScorerError::Timeout(self.timeout_secs))??;

        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if !output.status.success() {
            tracing::warn!(
                dir = %self.model_dir.display(),
                exit_code = ?output.status.code(),
                "Scorer failed"
            );
            return Err(ScorerError::Failed {
                code: output.status.code(),
                stderr: stderr.trim().to_string(),
            });
        }
        if !stderr.trim().is_empty() {
            tracing::debug!(dir = %self.model_dir.display(), stderr = %stderr.trim(), "Scorer stderr");
        }
        Ok(serde_json::from_slice(&output.stdout)?)
    }
}

/// First interpreter answering `--version`, probed once per process
fn python_interpreter() -> &'static str {
    static PYTHON: OnceCell<&'static str> = OnceCell::new();
    PYTHON.get_or_init(|| {
        let variants: &[&'static str] = if cfg!(windows) {
            &["python", "python3", "py"]
        } else {
            &["python3", "python"]
        };
        for &py in variants {
            let works = std::process::Command::new(py)
                .arg("--version")
                .output()
                .map(|o| o.status.success())
                .unwrap_or(false);
            if works {
                tracing::debug!(interpreter = %py, "Found working Python");
                return py;
            }
        }
        tracing::warn!("No working Python found, falling back to 'python'");
        "python"
    })
}
