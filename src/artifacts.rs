//! Run artifact capture
//!
//! Failure screenshots and the run trace. Capture is best effort: callers log
//! an [`ArtifactError`] and carry on, the step's own error always wins.
//!
//! Layout under the configured artifacts directory:
//!
//! ```text
//! run-<id>/step-<order>-<action>.png
//! run-<id>/trace.json
//! ```

use crate::browser::session::PageSession;
use crate::model::{MacroId, RunId, Step, StepResult, StepStatus};
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;

pub const TRACE_FILE: &str = "trace.json";

#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Capture failed: {0}")]
    Capture(String),

    #[error("Failed to serialize trace: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A screenshot written to disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenshotInfo {
    pub path: String,
    pub size_bytes: usize,
    /// SHA-256 of the PNG bytes
    pub hash: String,
}

/// Writes files into one run's artifact directory
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    run_dir: PathBuf,
}

impl ArtifactWriter {
    pub fn for_run(artifacts_dir: &Path, run_id: RunId) -> Self {
        Self {
            run_dir: artifacts_dir.join(format!("run-{}", run_id)),
        }
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn screenshot_path(&self, step: &Step) -> PathBuf {
        self.run_dir.join(format!(
            "step-{}-{}.png",
            step.order_index,
            sanitize(step.action_type.as_str())
        ))
    }

    pub fn trace_path(&self) -> PathBuf {
        self.run_dir.join(TRACE_FILE)
    }

    /// Capture the viewport after a failed step.
    pub async fn capture_failure_screenshot(
        &self,
        session: &dyn PageSession,
        step: &Step,
    ) -> Result<ScreenshotInfo, ArtifactError> {
        let png = session
            .screenshot()
            .await
            .map_err(|e| ArtifactError::Capture(e.to_string()))?;

        let path = self.screenshot_path(step);
        self.write(&path, &png).await?;
        log::info!("Saved failure screenshot: {}", path.display());

        Ok(ScreenshotInfo {
            path: path.to_string_lossy().to_string(),
            size_bytes: png.len(),
            hash: compute_hash(&png),
        })
    }

    async fn write(&self, path: &Path, contents: &[u8]) -> Result<(), ArtifactError> {
        tokio::fs::create_dir_all(&self.run_dir)
            .await
            .map_err(|source| ArtifactError::Io {
                path: self.run_dir.clone(),
                source,
            })?;
        tokio::fs::write(path, contents)
            .await
            .map_err(|source| ArtifactError::Io {
                path: path.to_path_buf(),
                source,
            })
    }
}

/// One executed step as seen by the trace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub order_index: u32,
    pub action_type: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Milliseconds since the run started, at step completion
    pub elapsed_ms: u64,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used_locator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Page state when the trace was written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dom: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dom_sha256: Option<String>,
    /// Base64 PNG
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
}

/// Contents of `trace.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trace {
    pub run_id: RunId,
    pub macro_id: MacroId,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub events: Vec<TraceEvent>,
    pub final_state: FinalState,
}

/// Collects step events for the lifetime of a run
#[derive(Debug)]
pub struct TraceRecorder {
    run_id: RunId,
    macro_id: MacroId,
    started: Instant,
    started_at: DateTime<Utc>,
    events: Vec<TraceEvent>,
}

impl TraceRecorder {
    pub fn start(run_id: RunId, macro_id: MacroId) -> Self {
        Self {
            run_id,
            macro_id,
            started: Instant::now(),
            started_at: Utc::now(),
            events: Vec::new(),
        }
    }

    /// Add a finished step, stamped with the time since the run started
    pub fn record(&mut self, step: &Step, result: &StepResult, url: Option<String>) {
        self.events.push(TraceEvent {
            order_index: step.order_index,
            action_type: step.action_type.as_str().to_string(),
            started_at: result.started_at,
            finished_at: result.finished_at,
            elapsed_ms: self.started.elapsed().as_millis() as u64,
            status: result.status,
            used_locator: result.used_locator.as_ref().map(|l| l.to_string()),
            url,
            error: result.error_message.clone(),
        });
    }

    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    /// Write the trace with the final page state. Parts of the final state
    /// that cannot be read are left out rather than failing the write.
    pub async fn write(
        self,
        session: &dyn PageSession,
        writer: &ArtifactWriter,
    ) -> Result<PathBuf, ArtifactError> {
        let url = match session.current_url().await {
            Ok(url) => Some(url),
            Err(e) => {
                log::warn!("Trace: could not read final URL: {}", e);
                None
            }
        };
        let dom = match session.page_source().await {
            Ok(html) => Some(html),
            Err(e) => {
                log::warn!("Trace: could not read final DOM: {}", e);
                None
            }
        };
        let screenshot = match session.screenshot().await {
            Ok(png) => Some(base64::engine::general_purpose::STANDARD.encode(png)),
            Err(e) => {
                log::warn!("Trace: could not capture final screenshot: {}", e);
                None
            }
        };

        let trace = Trace {
            run_id: self.run_id,
            macro_id: self.macro_id,
            started_at: self.started_at,
            finished_at: Utc::now(),
            events: self.events,
            final_state: FinalState {
                url,
                dom_sha256: dom.as_deref().map(|d| compute_hash(d.as_bytes())),
                dom,
                screenshot,
            },
        };

        let json = serde_json::to_vec_pretty(&trace)?;
        let path = writer.trace_path();
        writer.write(&path, &json).await?;
        log::info!(
            "Saved run trace ({} events, {} KB): {}",
            trace.events.len(),
            json.len() / 1024,
            path.display()
        );
        Ok(path)
    }
}

/// SHA-256 as lowercase hex
pub fn compute_hash(content: &[u8]) -> String {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

/// Keep file names portable for unknown action names
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
