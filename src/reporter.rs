//! Run lifecycle event reporting

use std::time::Duration;

/// Events emitted as lanes and suites progress through a run
#[derive(Debug, Clone)]
pub enum RunEvent {
    /// A lane is starting with its root suites
    LaneStarted {
        lane: String,
        root_count: usize,
    },
    /// A lane finished; passed iff every scheduled suite succeeded
    LaneCompleted {
        lane: String,
        passed: bool,
        duration: Duration,
    },
    /// A worker is being dispatched for a suite
    SuiteStarted {
        lane: String,
        suite: String,
    },
    /// A suite finished successfully (possibly reused from the resume cache)
    SuiteCompleted {
        lane: String,
        suite: String,
        duration: Duration,
        resumed: bool,
    },
    /// A suite failed
    SuiteFailed {
        lane: String,
        suite: String,
        duration: Duration,
        error: String,
    },
    /// A worker published a shared state key
    SharedStateUpdated {
        lane: String,
        suite: String,
        key: String,
    },
    /// The whole run finished
    RunCompleted {
        suites: usize,
        failed: usize,
        passed_lanes: usize,
        failed_lanes: usize,
        duration: Duration,
    },
}

/// Trait for observing run progress
pub trait RunReporter: Send + Sync {
    /// Handle a run event
    fn report(&self, event: &RunEvent);
}

/// Reporter that logs events through tracing
#[derive(Debug, Default)]
pub struct TracingReporter;

impl RunReporter for TracingReporter {
    fn report(&self, event: &RunEvent) {
        match event {
            RunEvent::LaneStarted { lane, root_count } => {
                tracing::info!("Starting lane {} ({} root suites)", lane, root_count);
            }
            RunEvent::LaneCompleted {
                lane,
                passed,
                duration,
            } => {
                if *passed {
                    tracing::info!("Lane {} passed in {:.1}s", lane, duration.as_secs_f64());
                } else {
                    tracing::error!("Lane {} failed after {:.1}s", lane, duration.as_secs_f64());
                }
            }
            RunEvent::SuiteStarted { lane, suite } => {
                tracing::info!("Running {} on {}", suite, lane);
            }
            RunEvent::SuiteCompleted {
                lane,
                suite,
                duration,
                resumed,
            } => {
                if *resumed {
                    tracing::info!("{} on {} reused from resume cache", suite, lane);
                } else {
                    tracing::info!(
                        "{} on {} completed in {:.1}s",
                        suite,
                        lane,
                        duration.as_secs_f64()
                    );
                }
            }
            RunEvent::SuiteFailed {
                lane,
                suite,
                duration,
                error,
            } => {
                tracing::error!(
                    "{} on {} failed after {:.1}s: {}",
                    suite,
                    lane,
                    duration.as_secs_f64(),
                    error
                );
            }
            RunEvent::SharedStateUpdated { lane, suite, key } => {
                tracing::debug!("{} on {} updated shared key '{}'", suite, lane, key);
            }
            RunEvent::RunCompleted {
                suites,
                failed,
                passed_lanes,
                failed_lanes,
                duration,
            } => {
                tracing::info!(
                    "Run complete: {} suites, {} failed, {}/{} lanes passed ({:.1}s)",
                    suites,
                    failed,
                    passed_lanes,
                    passed_lanes + failed_lanes,
                    duration.as_secs_f64()
                );
            }
        }
    }
}

/// Reporter that collects events for later inspection (useful for testing)
#[derive(Debug, Default)]
pub struct CollectingReporter {
    events: std::sync::Mutex<Vec<RunEvent>>,
}

impl CollectingReporter {
    /// Get all collected events
    pub fn events(&self) -> Vec<RunEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Names of suites that completed (or were reused), in completion order
    pub fn completed_suites(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|event| match event {
                RunEvent::SuiteCompleted { suite, .. } => Some(suite.clone()),
                _ => None,
            })
            .collect()
    }

    /// Names of suites a worker was dispatched for, in dispatch order
    pub fn started_suites(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|event| match event {
                RunEvent::SuiteStarted { suite, .. } => Some(suite.clone()),
                _ => None,
            })
            .collect()
    }
}

impl RunReporter for CollectingReporter {
    fn report(&self, event: &RunEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}
