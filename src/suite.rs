//! Suite descriptors, step tables, and suite bodies

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::capture::CapturePolicy;
use crate::registry::RegistrationError;
use crate::worker::SuiteContext;

/// Boxed future returned by a step function
pub type StepFuture = Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send>>;

/// Boxed future returned by a single-entry suite, yielding its output payload
pub type EntryFuture =
    Pin<Box<dyn Future<Output = Result<serde_json::Value, anyhow::Error>> + Send>>;

/// An async step bound to a suite
pub type StepFn = Arc<dyn Fn(SuiteContext) -> StepFuture + Send + Sync>;

/// The single entry point of an entry-based suite
pub type EntryFn = Arc<dyn Fn(SuiteContext) -> EntryFuture + Send + Sync>;

/// Static description of a suite: identity, dependencies, and run flags.
/// Immutable once registered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteDescriptor {
    /// Unique suite name
    pub name: String,

    /// Suites whose successful results this suite consumes, in declared order
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Disabled suites are invisible to the rest of the system
    #[serde(default)]
    pub disabled: bool,

    /// Isolated suites run with no other suite executing concurrently in
    /// the same lane at that scheduling step (the default)
    #[serde(default = "default_isolation")]
    pub run_in_isolation: bool,

    /// Per-suite override of the run-wide diagnostic capture policy
    #[serde(default)]
    pub capture_override: Option<CapturePolicy>,
}

fn default_isolation() -> bool {
    true
}

impl SuiteDescriptor {
    /// Create a descriptor with no dependencies and default flags
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            depends_on: Vec::new(),
            disabled: false,
            run_in_isolation: true,
            capture_override: None,
        }
    }

    /// Declare the suites this one depends on, in input order
    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Mark the suite disabled
    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    /// Opt the suite into concurrent scheduling (gated by the run-mode flag)
    pub fn concurrent(mut self) -> Self {
        self.run_in_isolation = false;
        self
    }

    /// Override the diagnostic capture policy for this suite
    pub fn with_capture(mut self, policy: CapturePolicy) -> Self {
        self.capture_override = Some(policy);
        self
    }
}

/// A step binding: method name plus the async function to run
pub struct Step {
    /// Method name, unique within the suite's step table
    pub method: String,
    /// The step function
    pub run: StepFn,
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step").field("method", &self.method).finish()
    }
}

/// Ordered step table for a step-based suite.
///
/// Orders are registered incrementally; reusing an order number is rejected
/// immediately, independent of the full-table validation that runs when the
/// suite is registered.
#[derive(Debug)]
pub struct StepTable {
    suite: String,
    steps: BTreeMap<u32, Step>,
}

impl StepTable {
    /// Create an empty step table for the named suite
    pub fn new(suite: impl Into<String>) -> Self {
        Self {
            suite: suite.into(),
            steps: BTreeMap::new(),
        }
    }

    /// Bind a step function to an order number
    pub fn register<F, Fut>(
        &mut self,
        order: u32,
        method: impl Into<String>,
        run: F,
    ) -> Result<(), RegistrationError>
    where
        F: Fn(SuiteContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), anyhow::Error>> + Send + 'static,
    {
        if self.steps.contains_key(&order) {
            return Err(RegistrationError::DuplicateStepOrder {
                suite: self.suite.clone(),
                order,
            });
        }

        self.steps.insert(
            order,
            Step {
                method: method.into(),
                run: Arc::new(move |ctx| -> StepFuture { Box::pin(run(ctx)) }),
            },
        );
        Ok(())
    }

    /// Suite this table was built for
    pub fn suite(&self) -> &str {
        &self.suite
    }

    /// Steps in ascending order
    pub fn iter(&self) -> impl Iterator<Item = (u32, &Step)> {
        self.steps.iter().map(|(order, step)| (*order, step))
    }

    /// Sorted order numbers
    pub fn orders(&self) -> Vec<u32> {
        self.steps.keys().copied().collect()
    }

    /// Look up a step by order number
    pub fn get(&self, order: u32) -> Option<&Step> {
        self.steps.get(&order)
    }

    /// Number of registered steps
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Check whether the table has no steps
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// What a suite actually executes
pub enum SuiteBody {
    /// Ordered steps, run in ascending order number
    Steps(StepTable),
    /// A single entry point whose return value is the output payload
    Entry {
        /// Method name used in step results and reports
        method: String,
        /// The entry function
        run: EntryFn,
    },
}

impl SuiteBody {
    /// Build an entry-based body
    pub fn entry<F, Fut>(method: impl Into<String>, run: F) -> Self
    where
        F: Fn(SuiteContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<serde_json::Value, anyhow::Error>> + Send + 'static,
    {
        Self::Entry {
            method: method.into(),
            run: Arc::new(move |ctx| -> EntryFuture { Box::pin(run(ctx)) }),
        }
    }
}

impl fmt::Debug for SuiteBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Steps(table) => f.debug_tuple("Steps").field(table).finish(),
            Self::Entry { method, .. } => f.debug_struct("Entry").field("method", method).finish(),
        }
    }
}

/// A registered suite: descriptor plus executable body
#[derive(Debug)]
pub struct RegisteredSuite {
    /// The suite's descriptor
    pub descriptor: SuiteDescriptor,
    /// The suite's executable body
    pub body: SuiteBody,
}
