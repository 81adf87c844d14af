//! Run configuration

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::capture::CapturePolicy;

/// Resume cache configuration. When enabled, suite results are persisted to
/// disk and successful suites are skipped on the next run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumeOptions {
    /// Whether the disk-backed result store is used at all
    #[serde(default)]
    pub enabled: bool,

    /// Location of the JSON snapshot file
    #[serde(default = "default_resume_location")]
    pub location: PathBuf,
}

fn default_resume_location() -> PathBuf {
    PathBuf::from(".convoy/resume.json")
}

impl Default for ResumeOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            location: default_resume_location(),
        }
    }
}

impl ResumeOptions {
    /// Enable resuming, persisting results at the given location
    pub fn at(location: impl Into<PathBuf>) -> Self {
        Self {
            enabled: true,
            location: location.into(),
        }
    }
}

/// Report output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportFormat {
    /// JUnit-style XML, one testsuite per suite result
    #[default]
    Junit,
}

/// Where and how to write the end-of-run report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportOptions {
    /// Output format
    #[serde(default)]
    pub format: ReportFormat,

    /// File the report is written to
    pub path: PathBuf,
}

impl ReportOptions {
    /// JUnit report at the given path
    pub fn junit(path: impl Into<PathBuf>) -> Self {
        Self {
            format: ReportFormat::Junit,
            path: path.into(),
        }
    }
}

/// Options for a whole run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOptions {
    /// Lanes to run the suite graph in. Each lane gets its own result
    /// namespace and its own pass through the graph.
    #[serde(default = "default_lanes")]
    pub lanes: Vec<String>,

    /// Run lanes in parallel instead of one after another
    #[serde(default)]
    pub parallel_lanes: bool,

    /// Honor suites that opt out of isolation. Off by default: unless
    /// explicitly enabled, every suite runs isolated regardless of its
    /// descriptor.
    #[serde(default)]
    pub enable_concurrency: bool,

    /// Run-wide diagnostic capture policy; suites may override it
    #[serde(default)]
    pub capture: CapturePolicy,

    /// Resume cache configuration
    #[serde(default)]
    pub resume: ResumeOptions,

    /// Optional end-of-run report
    #[serde(default)]
    pub report: Option<ReportOptions>,
}

fn default_lanes() -> Vec<String> {
    vec!["default".to_string()]
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            lanes: default_lanes(),
            parallel_lanes: false,
            enable_concurrency: false,
            capture: CapturePolicy::default(),
            resume: ResumeOptions::default(),
            report: None,
        }
    }
}

impl RunOptions {
    /// Default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the lane list
    pub fn lanes<I, S>(mut self, lanes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lanes = lanes.into_iter().map(Into::into).collect();
        self
    }

    /// Run lanes in parallel
    pub fn parallel_lanes(mut self) -> Self {
        self.parallel_lanes = true;
        self
    }

    /// Honor non-isolated suites, scheduling them concurrently
    pub fn enable_concurrency(mut self) -> Self {
        self.enable_concurrency = true;
        self
    }

    /// Force every suite to run isolated (the default)
    pub fn isolated_only(mut self) -> Self {
        self.enable_concurrency = false;
        self
    }

    /// Set the run-wide capture policy
    pub fn capture(mut self, policy: CapturePolicy) -> Self {
        self.capture = policy;
        self
    }

    /// Enable the resume cache at the given location
    pub fn resume_at(mut self, location: impl Into<PathBuf>) -> Self {
        self.resume = ResumeOptions::at(location);
        self
    }

    /// Write a report when the run finishes
    pub fn report(mut self, report: ReportOptions) -> Self {
        self.report = Some(report);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = RunOptions::default();
        assert_eq!(options.lanes, vec!["default"]);
        assert!(!options.parallel_lanes);
        assert!(!options.enable_concurrency, "concurrency is opt-in");
        assert!(!options.resume.enabled);
        assert!(options.report.is_none());
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let options: RunOptions = serde_json::from_str(
            r#"{
                "lanes": ["staging", "production"],
                "capture": "on_failure",
                "resume": { "enabled": true }
            }"#,
        )
        .unwrap();

        assert_eq!(options.lanes, vec!["staging", "production"]);
        assert!(!options.enable_concurrency);
        assert_eq!(options.capture, CapturePolicy::OnFailure);
        assert!(options.resume.enabled);
        assert_eq!(options.resume.location, PathBuf::from(".convoy/resume.json"));
    }

    #[test]
    fn test_builder() {
        let options = RunOptions::new()
            .lanes(["staging"])
            .parallel_lanes()
            .enable_concurrency()
            .resume_at("/tmp/resume.json")
            .report(ReportOptions::junit("/tmp/report.xml"));

        assert!(options.parallel_lanes);
        assert!(options.enable_concurrency);
        assert!(options.resume.enabled);
        assert_eq!(options.report.unwrap().format, ReportFormat::Junit);
    }
}
