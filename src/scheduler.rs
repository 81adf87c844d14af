//! Dependency-driven scheduling of suites within a lane

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::capture::DiagnosticCapture;
use crate::graph::DependencyGraph;
use crate::options::RunOptions;
use crate::registry::SuiteRegistry;
use crate::reporter::{RunEvent, RunReporter};
use crate::result::{ExecutionResult, ResultKey};
use crate::state::SharedState;
use crate::store::{ResultStore, StoreError};
use crate::suite::RegisteredSuite;
use crate::worker::{build_inputs, spawn_suite_worker, WorkerMessage};

/// A suite failure as seen by the scheduler: the first failing suite stops
/// further dispatch along its lane's chain.
#[derive(Debug, Clone, thiserror::Error)]
#[error("suite '{suite}' failed on lane '{lane}': {error}")]
pub struct SuiteFailure {
    /// Lane the failure happened in
    pub lane: String,
    /// Suite that failed
    pub suite: String,
    /// Error text of the first failing step
    pub error: String,
}

/// Mutable state shared by every scheduling path of a run: the result
/// store, the shared state map, and the dispatch claim set.
pub struct SchedulerState {
    results: Mutex<Box<dyn ResultStore>>,
    shared: SharedState,
    claimed: Mutex<HashSet<ResultKey>>,
}

impl SchedulerState {
    /// Wrap a result store for a run
    pub fn new(store: Box<dyn ResultStore>) -> Self {
        Self {
            results: Mutex::new(store),
            shared: SharedState::new(),
            claimed: Mutex::new(HashSet::new()),
        }
    }

    /// Claim a (lane, suite) pair for dispatch. Returns false when the pair
    /// was already claimed, in which case the caller must not dispatch.
    fn claim(&self, key: &ResultKey) -> bool {
        self.claimed.lock().unwrap().insert(key.clone())
    }

    fn get_result(&self, key: &ResultKey) -> Option<ExecutionResult> {
        self.results.lock().unwrap().get(key)
    }

    fn set_result(&self, key: ResultKey, result: ExecutionResult) -> Result<(), StoreError> {
        self.results.lock().unwrap().set(key, result)
    }

    /// All stored results
    pub fn results(&self) -> Vec<ExecutionResult> {
        self.results.lock().unwrap().values()
    }

    /// Drop every stored result, e.g. after a fully successful run
    pub fn clear_results(&self) -> Result<(), StoreError> {
        self.results.lock().unwrap().clear()
    }

    /// The run's shared state map
    pub fn shared(&self) -> &SharedState {
        &self.shared
    }
}

/// Schedules suites through one lane at a time. Cloning is cheap; clones
/// share the same state and are handed to spawned scheduling tasks.
#[derive(Clone)]
pub struct Scheduler {
    registry: Arc<SuiteRegistry>,
    graph: Arc<DependencyGraph>,
    state: Arc<SchedulerState>,
    options: Arc<RunOptions>,
    capture: Arc<dyn DiagnosticCapture>,
    reporter: Arc<dyn RunReporter>,
}

impl Scheduler {
    /// Build a scheduler over a populated registry
    pub fn new(
        registry: Arc<SuiteRegistry>,
        state: Arc<SchedulerState>,
        options: Arc<RunOptions>,
        capture: Arc<dyn DiagnosticCapture>,
        reporter: Arc<dyn RunReporter>,
    ) -> Self {
        let graph = Arc::new(DependencyGraph::build(&registry));
        Self {
            registry,
            graph,
            state,
            options,
            capture,
            reporter,
        }
    }

    /// Run the whole suite graph in one lane, starting from the roots.
    /// Returns whether every scheduled suite succeeded.
    pub async fn run_lane(&self, lane: &str) -> bool {
        let started = Instant::now();
        let roots = self.graph.roots().to_vec();
        self.reporter.report(&RunEvent::LaneStarted {
            lane: lane.to_string(),
            root_count: roots.len(),
        });

        let outcome = self.execute_in_order(lane, &roots).await;
        if let Err(failure) = &outcome {
            warn!(lane = %lane, suite = %failure.suite, error = %failure.error, "lane failed");
        }

        let passed = outcome.is_ok();
        self.reporter.report(&RunEvent::LaneCompleted {
            lane: lane.to_string(),
            passed,
            duration: started.elapsed(),
        });
        passed
    }

    /// Run a batch of ready suites: isolated ones first, sequentially and in
    /// input order, then all concurrent ones together. An isolated failure
    /// stops the batch; a concurrent failure still waits for every sibling
    /// already started.
    async fn execute_in_order(&self, lane: &str, names: &[String]) -> Result<(), SuiteFailure> {
        let (isolated, concurrent) = self.partition(names);

        for name in isolated {
            self.run_suite_in_lane(name, lane.to_string()).await?;
        }

        let mut handles = Vec::with_capacity(concurrent.len());
        for name in concurrent {
            let scheduler = self.clone();
            let lane = lane.to_string();
            let suite = name.clone();
            handles.push((
                name,
                tokio::spawn(async move { scheduler.run_suite_in_lane(suite, lane).await }),
            ));
        }

        let mut first_failure = None;
        for (name, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(join_error) => Err(SuiteFailure {
                    lane: lane.to_string(),
                    suite: name,
                    error: format!("scheduling task panicked: {join_error}"),
                }),
            };
            if let Err(failure) = outcome {
                first_failure.get_or_insert(failure);
            }
        }

        match first_failure {
            Some(failure) => Err(failure),
            None => Ok(()),
        }
    }

    /// Split a batch into isolated and concurrent suites, both preserving
    /// input order. Everything is isolated when concurrency is disabled.
    fn partition(&self, names: &[String]) -> (Vec<String>, Vec<String>) {
        let mut isolated = Vec::new();
        let mut concurrent = Vec::new();

        for name in names {
            let Some(suite) = self.registry.get(name) else {
                warn!(suite = %name, "skipping unregistered suite");
                continue;
            };
            if suite.descriptor.run_in_isolation || !self.options.enable_concurrency {
                isolated.push(name.clone());
            } else {
                concurrent.push(name.clone());
            }
        }

        (isolated, concurrent)
    }

    /// Run one suite in a lane, then cascade into its ready dependents.
    ///
    /// The claim on (lane, suite) is taken before anything else, so a suite
    /// triggered by several completed dependencies is dispatched exactly
    /// once; later triggers return immediately. A cached successful result
    /// skips the worker but still cascades.
    fn run_suite_in_lane(
        &self,
        name: String,
        lane: String,
    ) -> Pin<Box<dyn Future<Output = Result<(), SuiteFailure>> + Send + '_>> {
        Box::pin(async move {
            let key = ResultKey::new(&lane, &name);
            if !self.state.claim(&key) {
                debug!(suite = %name, lane = %lane, "already dispatched, skipping");
                return Ok(());
            }

            let Some(suite) = self.registry.get(&name).cloned() else {
                return Err(SuiteFailure {
                    lane,
                    suite: name,
                    error: "suite is not registered".to_string(),
                });
            };

            let cached = self.state.get_result(&key).filter(|result| result.success);
            let (result, resumed) = match cached {
                Some(result) => (result, true),
                None => {
                    self.reporter.report(&RunEvent::SuiteStarted {
                        lane: lane.clone(),
                        suite: name.clone(),
                    });
                    let result = self.dispatch_worker(&suite, &lane).await;
                    self.state
                        .set_result(key, result.clone())
                        .map_err(|error| SuiteFailure {
                            lane: lane.clone(),
                            suite: name.clone(),
                            error: error.to_string(),
                        })?;
                    (result, false)
                }
            };

            let duration = Duration::from_millis(result.duration_ms);
            if !result.success {
                let error = result
                    .first_error()
                    .unwrap_or("suite failed without an error message")
                    .to_string();
                self.reporter.report(&RunEvent::SuiteFailed {
                    lane: lane.clone(),
                    suite: name.clone(),
                    duration,
                    error: error.clone(),
                });
                return Err(SuiteFailure {
                    lane,
                    suite: name,
                    error,
                });
            }

            self.reporter.report(&RunEvent::SuiteCompleted {
                lane: lane.clone(),
                suite: name.clone(),
                duration,
                resumed,
            });

            let ready = self.ready_dependents(&lane, self.graph.dependents(&name));
            if ready.is_empty() {
                return Ok(());
            }
            self.execute_in_order(&lane, &ready).await
        })
    }

    /// Dispatch a worker for one suite and wait for its result, applying
    /// shared-state updates as they arrive. Never panics outward: unmet
    /// inputs and worker transport failures come back as failed results.
    async fn dispatch_worker(&self, suite: &Arc<RegisteredSuite>, lane: &str) -> ExecutionResult {
        let name = suite.descriptor.name.clone();

        let inputs = {
            let store = self.state.results.lock().unwrap();
            build_inputs(&suite.descriptor, lane, store.as_ref())
        };
        let inputs = match inputs {
            Ok(inputs) => inputs,
            Err(error) => return ExecutionResult::startup_failure(&name, error.to_string()),
        };

        let policy = suite
            .descriptor
            .capture_override
            .unwrap_or(self.options.capture);
        let mut handle = spawn_suite_worker(
            suite.clone(),
            lane.to_string(),
            inputs,
            self.state.shared.snapshot(),
            policy,
            self.capture.clone(),
        );

        let mut finished = None;
        while let Some(message) = handle.messages.recv().await {
            match message {
                WorkerMessage::SharedStateUpdate { key, value } => {
                    self.state.shared.set(key.clone(), value);
                    self.reporter.report(&RunEvent::SharedStateUpdated {
                        lane: lane.to_string(),
                        suite: name.clone(),
                        key,
                    });
                }
                WorkerMessage::Finished(result) => {
                    finished = Some(result);
                    break;
                }
            }
        }

        match finished {
            Some(result) => result,
            None => {
                let error = match handle.join.await {
                    Err(join_error) if join_error.is_panic() => {
                        format!("worker panicked: {join_error}")
                    }
                    _ => "worker exited without reporting a result".to_string(),
                };
                ExecutionResult::startup_failure(&name, error)
            }
        }
    }

    /// Filter a completed suite's dependents down to the ones whose every
    /// dependency has a successful result in this lane.
    fn ready_dependents(&self, lane: &str, dependents: &[String]) -> Vec<String> {
        let store = self.state.results.lock().unwrap();
        dependents
            .iter()
            .filter(|name| {
                self.registry.get(name).is_some_and(|suite| {
                    suite.descriptor.depends_on.iter().all(|dependency| {
                        store
                            .get(&ResultKey::new(lane, dependency))
                            .is_some_and(|result| result.success)
                    })
                })
            })
            .cloned()
            .collect()
    }
}
