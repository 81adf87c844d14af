//! Worker execution context: runs one suite's lifecycle in isolation

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::capture::{CapturePolicy, CaptureRequest, DiagnosticCapture};
use crate::result::{ExecutionResult, ResultKey, StepResult};
use crate::state::SharedValue;
use crate::store::ResultStore;
use crate::suite::{RegisteredSuite, SuiteBody, SuiteDescriptor};

/// Messages flowing from a worker back to the orchestrator. Exactly one
/// `Finished` per worker invocation; zero or more `SharedStateUpdate`
/// messages at any point before it.
#[derive(Debug, Clone)]
pub enum WorkerMessage {
    /// A suite wrote a shared state key mid-run
    SharedStateUpdate {
        /// Key being written
        key: String,
        /// New value, last-write-wins
        value: SharedValue,
    },
    /// The suite finished, successfully or not
    Finished(ExecutionResult),
}

/// Errors while building a suite's constructor inputs from its dependencies'
/// stored results. Fatal to that suite's dispatch: the orchestrator
/// synthesizes a failed result instead of spawning a worker.
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    /// A dependency has no stored result for this lane
    #[error("could not look up result for '{0}'")]
    MissingDependency(String),

    /// A dependency's stored payload is not valid JSON
    #[error("failed to parse stored payload for '{dependency}': {source}")]
    UnparseablePayload {
        /// Dependency whose payload failed to parse
        dependency: String,
        /// Underlying parse error
        source: serde_json::Error,
    },
}

/// Build a suite's inputs from its dependencies' serialized payloads, in
/// declared dependency order.
pub(crate) fn build_inputs(
    descriptor: &SuiteDescriptor,
    lane: &str,
    store: &dyn ResultStore,
) -> Result<Vec<Value>, InputError> {
    descriptor
        .depends_on
        .iter()
        .map(|dependency| {
            let result = store
                .get(&ResultKey::new(lane, dependency))
                .ok_or_else(|| InputError::MissingDependency(dependency.clone()))?;

            serde_json::from_str(&result.payload).map_err(|source| {
                InputError::UnparseablePayload {
                    dependency: dependency.clone(),
                    source,
                }
            })
        })
        .collect()
}

struct ContextInner {
    lane: String,
    suite: String,
    inputs: Vec<Value>,
    shared: Mutex<BTreeMap<String, SharedValue>>,
    output: Mutex<serde_json::Map<String, Value>>,
    tx: mpsc::UnboundedSender<WorkerMessage>,
}

/// Per-worker view of the run, handed to every step and entry function.
///
/// Cloning is cheap and every clone refers to the same underlying state.
/// Shared state reads see the snapshot taken at dispatch plus the suite's
/// own writes; writes are also emitted to the orchestrator immediately,
/// independent of the suite's final result.
#[derive(Clone)]
pub struct SuiteContext {
    inner: Arc<ContextInner>,
}

impl SuiteContext {
    fn new(
        lane: String,
        suite: String,
        inputs: Vec<Value>,
        shared: BTreeMap<String, SharedValue>,
        tx: mpsc::UnboundedSender<WorkerMessage>,
    ) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                lane,
                suite,
                inputs,
                shared: Mutex::new(shared),
                output: Mutex::new(serde_json::Map::new()),
                tx,
            }),
        }
    }

    /// Lane this suite is running in
    pub fn lane(&self) -> &str {
        &self.inner.lane
    }

    /// Name of the suite being executed
    pub fn suite(&self) -> &str {
        &self.inner.suite
    }

    /// Dependency payloads, in declared dependency order
    pub fn inputs(&self) -> &[Value] {
        &self.inner.inputs
    }

    /// Payload of the n-th declared dependency
    pub fn input(&self, index: usize) -> Option<&Value> {
        self.inner.inputs.get(index)
    }

    /// Read a shared state key
    pub fn shared(&self, key: &str) -> Option<SharedValue> {
        self.inner.shared.lock().unwrap().get(key).cloned()
    }

    /// Write a shared state key: updates the local view and notifies the
    /// orchestrator immediately
    pub fn set_shared(&self, key: impl Into<String>, value: impl Into<SharedValue>) {
        let key = key.into();
        let value = value.into();
        self.inner
            .shared
            .lock()
            .unwrap()
            .insert(key.clone(), value.clone());
        let _ = self
            .inner
            .tx
            .send(WorkerMessage::SharedStateUpdate { key, value });
    }

    /// Publish a field into the suite's output payload, which dependents
    /// receive as their input
    pub fn publish(
        &self,
        key: impl Into<String>,
        value: impl serde::Serialize,
    ) -> Result<(), serde_json::Error> {
        let value = serde_json::to_value(value)?;
        self.inner.output.lock().unwrap().insert(key.into(), value);
        Ok(())
    }

    fn shared_snapshot(&self) -> BTreeMap<String, SharedValue> {
        self.inner.shared.lock().unwrap().clone()
    }

    fn take_output(&self) -> serde_json::Map<String, Value> {
        std::mem::take(&mut *self.inner.output.lock().unwrap())
    }
}

/// A dispatched worker: its task handle and message stream
pub(crate) struct WorkerHandle {
    /// Join handle of the spawned worker task
    pub join: JoinHandle<()>,
    /// Messages flowing back to the orchestrator
    pub messages: mpsc::UnboundedReceiver<WorkerMessage>,
}

/// Dispatch a worker task for one suite.
///
/// The suite runs inside its own spawned task so a panic is contained in
/// the task's join error and can never corrupt the orchestrator or sibling
/// suites.
pub(crate) fn spawn_suite_worker(
    suite: Arc<RegisteredSuite>,
    lane: String,
    inputs: Vec<Value>,
    shared: BTreeMap<String, SharedValue>,
    policy: CapturePolicy,
    capture: Arc<dyn DiagnosticCapture>,
) -> WorkerHandle {
    let (tx, rx) = mpsc::unbounded_channel();

    let join = tokio::spawn(async move {
        run_in_worker(suite, lane, inputs, shared, policy, capture, tx).await;
    });

    WorkerHandle { join, messages: rx }
}

async fn run_in_worker(
    suite: Arc<RegisteredSuite>,
    lane: String,
    inputs: Vec<Value>,
    shared: BTreeMap<String, SharedValue>,
    policy: CapturePolicy,
    capture: Arc<dyn DiagnosticCapture>,
    tx: mpsc::UnboundedSender<WorkerMessage>,
) {
    let name = suite.descriptor.name.clone();
    debug!(suite = %name, lane = %lane, "worker started");

    let started = Instant::now();
    let ctx = SuiteContext::new(lane, name.clone(), inputs, shared, tx.clone());
    let mut steps = Vec::new();
    let mut payload = "null".to_string();

    match &suite.body {
        SuiteBody::Steps(table) => {
            let mut failed = false;

            for (_, step) in table.iter() {
                let step_started = Instant::now();
                match (step.run)(ctx.clone()).await {
                    Ok(()) => {
                        debug!(
                            suite = %name,
                            step = %step.method,
                            elapsed_ms = step_started.elapsed().as_millis() as u64,
                            "step passed"
                        );
                        steps.push(StepResult::passed(&step.method, step_started.elapsed()));
                        if policy == CapturePolicy::EveryStep {
                            capture_best_effort(&capture, &ctx, &step.method, None).await;
                        }
                    }
                    Err(error) => {
                        let text = format!("{error:#}");
                        steps.push(StepResult::failed(
                            &step.method,
                            step_started.elapsed(),
                            &text,
                        ));
                        capture_best_effort(&capture, &ctx, &step.method, Some(&text)).await;
                        failed = true;
                        break;
                    }
                }
            }

            if !failed {
                payload = Value::Object(ctx.take_output()).to_string();
            }
        }
        SuiteBody::Entry { method, run } => {
            let step_started = Instant::now();
            match run(ctx.clone()).await {
                Ok(value) => {
                    steps.push(StepResult::passed(method, step_started.elapsed()));
                    payload = value.to_string();
                    if policy == CapturePolicy::EveryStep {
                        capture_best_effort(&capture, &ctx, method, None).await;
                    }
                }
                Err(error) => {
                    let text = format!("{error:#}");
                    steps.push(StepResult::failed(method, step_started.elapsed(), &text));
                    capture_best_effort(&capture, &ctx, method, Some(&text)).await;
                }
            }
        }
    }

    let result = ExecutionResult::finished(&name, started.elapsed(), steps, payload);
    let _ = tx.send(WorkerMessage::Finished(result));
}

/// Capture a diagnostic artifact; a capture failure must never replace or
/// suppress the original error, so it is only logged.
async fn capture_best_effort(
    capture: &Arc<dyn DiagnosticCapture>,
    ctx: &SuiteContext,
    step: &str,
    error: Option<&str>,
) {
    let shared = ctx.shared_snapshot();
    let request = CaptureRequest {
        lane: ctx.lane(),
        suite: ctx.suite(),
        step,
        error,
        shared: &shared,
    };

    if let Err(capture_error) = capture.capture(request).await {
        warn!(
            suite = %ctx.suite(),
            step = %step,
            error = %capture_error,
            "diagnostic capture failed"
        );
    }
}
