//! Top-level run driver: lanes, resume store wiring, and reporting

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::capture::{DiagnosticCapture, NoopCapture};
use crate::options::{ReportFormat, RunOptions};
use crate::registry::SuiteRegistry;
use crate::report::{self, ReportError};
use crate::reporter::{RunEvent, RunReporter, TracingReporter};
use crate::result::ExecutionResult;
use crate::scheduler::{Scheduler, SchedulerState};
use crate::store::{DiskResultStore, MemoryResultStore, ResultStore, StoreError};

/// Errors that abort a run before or after suites execute. Suite failures
/// themselves are never errors here; they land in the summary.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// Result store could not be opened or updated
    #[error(transparent)]
    Store(#[from] StoreError),

    /// End-of-run report could not be written
    #[error(transparent)]
    Report(#[from] ReportError),
}

/// Outcome of one lane
#[derive(Debug, Clone)]
pub struct LaneSummary {
    /// Lane name
    pub lane: String,
    /// Whether every suite scheduled in the lane succeeded
    pub passed: bool,
}

/// Outcome of a whole run
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Per-lane outcomes, in option order
    pub lanes: Vec<LaneSummary>,
    /// Every result produced or reused during the run
    pub results: Vec<ExecutionResult>,
    /// Total wall-clock time
    pub duration: Duration,
}

impl RunSummary {
    /// Whether every lane passed
    pub fn passed(&self) -> bool {
        self.lanes.iter().all(|lane| lane.passed)
    }

    /// Number of failed suite results
    pub fn failed_suites(&self) -> usize {
        self.results.iter().filter(|result| !result.success).count()
    }

    /// Process exit code: 0 when every lane passed, 1 otherwise
    pub fn exit_code(&self) -> i32 {
        if self.passed() {
            0
        } else {
            1
        }
    }
}

/// Drives the registered suite graph through every configured lane.
///
/// Lanes run sequentially by default or in parallel when requested; either
/// way they share one result store, one claim set, and one shared state map
/// for the duration of the run.
pub struct Runner {
    registry: Arc<SuiteRegistry>,
    options: RunOptions,
    capture: Arc<dyn DiagnosticCapture>,
    reporter: Arc<dyn RunReporter>,
}

impl Runner {
    /// Create a runner with default options, tracing-based reporting, and
    /// no diagnostic capture
    pub fn new(registry: SuiteRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            options: RunOptions::default(),
            capture: Arc::new(NoopCapture),
            reporter: Arc::new(TracingReporter),
        }
    }

    /// Replace the run options
    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// Install a diagnostic capture sink
    pub fn with_capture(mut self, capture: Arc<dyn DiagnosticCapture>) -> Self {
        self.capture = capture;
        self
    }

    /// Install a run reporter
    pub fn with_reporter(mut self, reporter: Arc<dyn RunReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Run every lane and return the summary.
    ///
    /// A fully successful run clears the resume store, but only after the
    /// results have been collected, so the summary and the report always
    /// cover the full run.
    pub async fn run(&self) -> Result<RunSummary, RunnerError> {
        let started = Instant::now();

        let store: Box<dyn ResultStore> = if self.options.resume.enabled {
            Box::new(DiskResultStore::open(&self.options.resume.location)?)
        } else {
            Box::new(MemoryResultStore::new())
        };
        let state = Arc::new(SchedulerState::new(store));

        let scheduler = Scheduler::new(
            self.registry.clone(),
            state.clone(),
            Arc::new(self.options.clone()),
            self.capture.clone(),
            self.reporter.clone(),
        );

        let mut lanes = Vec::with_capacity(self.options.lanes.len());
        if self.options.parallel_lanes {
            let mut handles = Vec::with_capacity(self.options.lanes.len());
            for lane in &self.options.lanes {
                let scheduler = scheduler.clone();
                let name = lane.clone();
                handles.push((
                    lane.clone(),
                    tokio::spawn(async move { scheduler.run_lane(&name).await }),
                ));
            }
            for (lane, handle) in handles {
                // a panicked lane task counts as a failed lane
                let passed = handle.await.unwrap_or(false);
                lanes.push(LaneSummary { lane, passed });
            }
        } else {
            for lane in &self.options.lanes {
                let passed = scheduler.run_lane(lane).await;
                lanes.push(LaneSummary {
                    lane: lane.clone(),
                    passed,
                });
            }
        }

        let results = state.results();
        let passed = lanes.iter().all(|lane| lane.passed);
        if passed {
            state.clear_results()?;
        }

        let failed = results.iter().filter(|result| !result.success).count();
        let passed_lanes = lanes.iter().filter(|lane| lane.passed).count();
        self.reporter.report(&RunEvent::RunCompleted {
            suites: results.len(),
            failed,
            passed_lanes,
            failed_lanes: lanes.len() - passed_lanes,
            duration: started.elapsed(),
        });

        if let Some(options) = &self.options.report {
            match options.format {
                ReportFormat::Junit => report::write_junit(&options.path, &results)?,
            }
        }

        Ok(RunSummary {
            lanes,
            results,
            duration: started.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use anyhow::anyhow;
    use serde_json::Value;
    use tempfile::TempDir;

    use crate::options::ReportOptions;
    use crate::suite::{SuiteBody, SuiteDescriptor};

    fn counting_registry(counter: Arc<AtomicUsize>) -> SuiteRegistry {
        let mut registry = SuiteRegistry::new();
        registry
            .register(
                SuiteDescriptor::new("login"),
                SuiteBody::entry("main", move |_ctx| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { Ok(Value::Null) }
                }),
            )
            .unwrap();
        registry
    }

    fn flaky_registry(counter: Arc<AtomicUsize>, fixed: Arc<AtomicBool>) -> SuiteRegistry {
        let mut registry = counting_registry(counter);
        registry
            .register(
                SuiteDescriptor::new("checkout").depends_on(["login"]),
                SuiteBody::entry("main", move |_ctx| {
                    let healthy = fixed.load(Ordering::SeqCst);
                    async move {
                        if healthy {
                            Ok(Value::Null)
                        } else {
                            Err(anyhow!("payment provider down"))
                        }
                    }
                }),
            )
            .unwrap();
        registry
    }

    fn lane_sensitive_registry(counter: Arc<AtomicUsize>) -> SuiteRegistry {
        let mut registry = SuiteRegistry::new();
        registry
            .register(
                SuiteDescriptor::new("smoke"),
                SuiteBody::entry("main", move |ctx| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if ctx.lane() == "production" {
                            Err(anyhow!("production firewall rejected the probe"))
                        } else {
                            Ok(Value::Null)
                        }
                    }
                }),
            )
            .unwrap();
        registry
    }

    #[tokio::test]
    async fn test_successful_run_has_exit_code_zero() {
        let counter = Arc::new(AtomicUsize::new(0));
        let runner = Runner::new(counting_registry(counter.clone()));

        let summary = runner.run().await.unwrap();

        assert!(summary.passed());
        assert_eq!(summary.exit_code(), 0);
        assert_eq!(summary.failed_suites(), 0);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_suite_fails_the_lane() {
        let counter = Arc::new(AtomicUsize::new(0));
        let fixed = Arc::new(AtomicBool::new(false));
        let runner = Runner::new(flaky_registry(counter, fixed));

        let summary = runner.run().await.unwrap();

        assert!(!summary.passed());
        assert_eq!(summary.exit_code(), 1);
        assert_eq!(summary.failed_suites(), 1);
    }

    #[tokio::test]
    async fn test_resume_skips_persisted_successes() {
        let temp = TempDir::new().unwrap();
        let location = temp.path().join("resume.json");
        let counter = Arc::new(AtomicUsize::new(0));
        let fixed = Arc::new(AtomicBool::new(false));
        let options = RunOptions::new().resume_at(&location);

        // first run: login succeeds, checkout fails, store keeps both
        let runner = Runner::new(flaky_registry(counter.clone(), fixed.clone()))
            .with_options(options.clone());
        let summary = runner.run().await.unwrap();
        assert!(!summary.passed());
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        // second run: login is reused from disk, checkout reruns and passes
        fixed.store(true, Ordering::SeqCst);
        let runner =
            Runner::new(flaky_registry(counter.clone(), fixed)).with_options(options);
        let summary = runner.run().await.unwrap();
        assert!(summary.passed());
        assert_eq!(counter.load(Ordering::SeqCst), 1, "login must not rerun");

        // the fully successful run cleared the store
        let snapshot: std::collections::BTreeMap<String, ExecutionResult> =
            serde_json::from_str(&std::fs::read_to_string(&location).unwrap()).unwrap();
        assert!(snapshot.is_empty());
    }

    #[tokio::test]
    async fn test_run_writes_junit_report() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("junit.xml");
        let counter = Arc::new(AtomicUsize::new(0));
        let fixed = Arc::new(AtomicBool::new(false));

        let runner = Runner::new(flaky_registry(counter, fixed))
            .with_options(RunOptions::new().report(ReportOptions::junit(&path)));
        let summary = runner.run().await.unwrap();

        assert!(!summary.passed());
        let xml = std::fs::read_to_string(&path).unwrap();
        assert!(xml.contains("<testsuite name=\"login\""));
        assert!(xml.contains("payment provider down"));
    }

    #[tokio::test]
    async fn test_failed_lane_does_not_stop_later_lanes() {
        let counter = Arc::new(AtomicUsize::new(0));
        // the failing lane runs first, the passing one after it
        let runner = Runner::new(lane_sensitive_registry(counter.clone()))
            .with_options(RunOptions::new().lanes(["production", "staging"]));

        let summary = runner.run().await.unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 2, "both lanes dispatched");
        assert!(!summary.passed());
        assert_eq!(summary.exit_code(), 1);
        assert_eq!(summary.lanes.len(), 2);
        assert_eq!(summary.lanes[0].lane, "production");
        assert!(!summary.lanes[0].passed);
        assert_eq!(summary.lanes[1].lane, "staging");
        assert!(summary.lanes[1].passed);
    }

    #[tokio::test]
    async fn test_failed_lane_does_not_stop_parallel_lanes() {
        let counter = Arc::new(AtomicUsize::new(0));
        let runner = Runner::new(lane_sensitive_registry(counter.clone())).with_options(
            RunOptions::new()
                .lanes(["production", "staging"])
                .parallel_lanes(),
        );

        let summary = runner.run().await.unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 2, "both lanes dispatched");
        assert!(!summary.passed());
        let outcomes: std::collections::HashMap<&str, bool> = summary
            .lanes
            .iter()
            .map(|lane| (lane.lane.as_str(), lane.passed))
            .collect();
        assert!(!outcomes["production"]);
        assert!(outcomes["staging"]);
    }

    #[tokio::test]
    async fn test_parallel_lanes_each_run_the_graph() {
        let counter = Arc::new(AtomicUsize::new(0));
        let runner = Runner::new(counting_registry(counter.clone())).with_options(
            RunOptions::new()
                .lanes(["staging", "production"])
                .parallel_lanes(),
        );

        let summary = runner.run().await.unwrap();

        assert!(summary.passed());
        assert_eq!(summary.lanes.len(), 2);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(summary.results.len(), 2, "one result per lane");
    }

    #[tokio::test]
    async fn test_summary_keeps_results_collected_before_clearing() {
        let counter = Arc::new(AtomicUsize::new(0));
        let runner = Runner::new(counting_registry(counter));

        let summary = runner.run().await.unwrap();

        assert!(summary.passed());
        assert_eq!(summary.results.len(), 1);
        assert_eq!(summary.results[0].suite_name, "login");
    }
}
