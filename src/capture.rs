//! Best-effort diagnostic capture around step execution

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::state::SharedValue;

/// When diagnostic capture runs during a suite's lifecycle.
///
/// A failing step always triggers a capture; `EveryStep` additionally
/// captures after each successful step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapturePolicy {
    /// Capture after every step as well as on failure
    #[default]
    EveryStep,
    /// Capture only after a failing step
    OnFailure,
}

/// Errors while writing a diagnostic artifact. Always swallowed and logged
/// by the worker; never allowed to replace the triggering failure.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// IO error writing the artifact
    #[error("capture IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Artifact serialization error
    #[error("capture serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Context handed to a capture implementation
#[derive(Debug, Serialize)]
pub struct CaptureRequest<'a> {
    /// Lane the suite is running in
    pub lane: &'a str,
    /// Suite being executed
    pub suite: &'a str,
    /// Step that just finished
    pub step: &'a str,
    /// Error text when the step failed
    pub error: Option<&'a str>,
    /// The worker's view of the shared state at capture time
    pub shared: &'a BTreeMap<String, SharedValue>,
}

/// Sink for diagnostic artifacts captured inside workers
#[async_trait]
pub trait DiagnosticCapture: Send + Sync {
    /// Capture an artifact for the given step
    async fn capture(&self, request: CaptureRequest<'_>) -> Result<(), CaptureError>;
}

/// Capture sink that discards everything (the default)
#[derive(Debug, Default)]
pub struct NoopCapture;

#[async_trait]
impl DiagnosticCapture for NoopCapture {
    async fn capture(&self, _request: CaptureRequest<'_>) -> Result<(), CaptureError> {
        Ok(())
    }
}

/// Capture sink that writes one JSON artifact per step into a lane-specific
/// folder, mirroring how a browser runner would file screenshots.
#[derive(Debug)]
pub struct FsCapture {
    dir: PathBuf,
}

impl FsCapture {
    /// Create a capture sink rooted at the given directory
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl DiagnosticCapture for FsCapture {
    async fn capture(&self, request: CaptureRequest<'_>) -> Result<(), CaptureError> {
        #[derive(Serialize)]
        struct Artifact<'a> {
            #[serde(flatten)]
            request: &'a CaptureRequest<'a>,
            captured_at: String,
        }

        let folder = self.dir.join(request.lane);
        tokio::fs::create_dir_all(&folder).await?;

        let artifact = Artifact {
            request: &request,
            captured_at: chrono::Utc::now().to_rfc3339(),
        };
        let path = folder.join(format!("{}#{}.json", request.suite, request.step));
        tokio::fs::write(&path, serde_json::to_string_pretty(&artifact)?).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn request<'a>(shared: &'a BTreeMap<String, SharedValue>) -> CaptureRequest<'a> {
        CaptureRequest {
            lane: "staging",
            suite: "checkout",
            step: "pay",
            error: Some("card declined"),
            shared,
        }
    }

    #[tokio::test]
    async fn test_fs_capture_writes_artifact() {
        let temp = TempDir::new().unwrap();
        let capture = FsCapture::new(temp.path());
        let shared = BTreeMap::new();

        capture.capture(request(&shared)).await.unwrap();

        let path = temp.path().join("staging").join("checkout#pay.json");
        let contents = std::fs::read_to_string(path).unwrap();
        assert!(contents.contains("card declined"));
    }

    #[tokio::test]
    async fn test_noop_capture_always_succeeds() {
        let shared = BTreeMap::new();
        assert!(NoopCapture.capture(request(&shared)).await.is_ok());
    }
}
