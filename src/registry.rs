//! Suite registration and structural validation

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::suite::{RegisteredSuite, StepTable, SuiteBody, SuiteDescriptor};

/// Errors raised while registering suites and steps. All of these are fatal
/// at startup, before any suite executes; none are ever retried.
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    /// Suite name is already taken
    #[error("suite '{0}' is already registered, use a different name")]
    DuplicateSuite(String),

    /// Adding the suite would create one or more dependency cycles
    #[error("dependency cycles detected: {}", render_cycles(.0))]
    Cycle(Vec<Vec<String>>),

    /// A step-based suite has an empty step table
    #[error("suite '{suite}' has no steps registered")]
    NoSteps {
        /// Offending suite
        suite: String,
    },

    /// A gap in the step order chain
    #[error("suite '{suite}' is missing step {expected}")]
    MissingStep {
        /// Offending suite
        suite: String,
        /// The order number that should exist but does not
        expected: u32,
    },

    /// A method name bound to two different order numbers
    #[error("suite '{suite}' binds method '{method}' to steps {first} and {second}")]
    DuplicateMethod {
        /// Offending suite
        suite: String,
        /// Method bound twice
        method: String,
        /// First order the method was bound to
        first: u32,
        /// Second order the method was bound to
        second: u32,
    },

    /// An order number registered twice on the same suite
    #[error("step order {order} is already present on suite '{suite}'")]
    DuplicateStepOrder {
        /// Offending suite
        suite: String,
        /// The reused order number
        order: u32,
    },
}

fn render_cycles(cycles: &[Vec<String>]) -> String {
    cycles
        .iter()
        .map(|path| path.join(" => "))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Process-wide table of registered suites.
///
/// Populated once during process initialization through explicit
/// registration calls, then handed to the runner read-only.
#[derive(Debug, Default)]
pub struct SuiteRegistry {
    suites: HashMap<String, Arc<RegisteredSuite>>,
    /// Registration order, which drives root scheduling order
    order: Vec<String>,
}

impl SuiteRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a suite with its executable body.
    ///
    /// Disabled suites are skipped entirely: they are not stored and their
    /// dependency and cycle checks never run, so suites depending on them
    /// will simply never become ready.
    pub fn register(
        &mut self,
        descriptor: SuiteDescriptor,
        body: SuiteBody,
    ) -> Result<(), RegistrationError> {
        if descriptor.disabled {
            debug!(suite = %descriptor.name, "skipping disabled suite");
            return Ok(());
        }

        if self.suites.contains_key(&descriptor.name) {
            return Err(RegistrationError::DuplicateSuite(descriptor.name));
        }

        let cycles = self.detect_cycles(&descriptor.name, &descriptor.depends_on);
        if !cycles.is_empty() {
            return Err(RegistrationError::Cycle(cycles));
        }

        if let SuiteBody::Steps(table) = &body {
            validate_step_table(&descriptor.name, table)?;
        }

        info!(
            suite = %descriptor.name,
            dependencies = descriptor.depends_on.len(),
            "registered suite"
        );

        self.order.push(descriptor.name.clone());
        self.suites.insert(
            descriptor.name.clone(),
            Arc::new(RegisteredSuite { descriptor, body }),
        );
        Ok(())
    }

    /// Look up a registered suite
    pub fn get(&self, name: &str) -> Option<&Arc<RegisteredSuite>> {
        self.suites.get(name)
    }

    /// Registered suite names, in registration order
    pub fn names(&self) -> &[String] {
        &self.order
    }

    /// Number of registered suites
    pub fn len(&self) -> usize {
        self.suites.len()
    }

    /// Check whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.suites.is_empty()
    }

    /// Walk the dependency edges starting from a suite about to be
    /// registered and collect every cycle path found.
    ///
    /// The walk follows each dependency's own dependency list, tolerating
    /// names that are not registered yet. A path is a cycle when it reaches
    /// the suite under registration or revisits a suite already on the path.
    fn detect_cycles(&self, name: &str, depends_on: &[String]) -> Vec<Vec<String>> {
        let mut cycles = Vec::new();
        let mut path = vec![name.to_string()];
        self.walk_dependencies(name, depends_on, &mut path, &mut cycles);
        cycles
    }

    fn walk_dependencies(
        &self,
        root: &str,
        deps: &[String],
        path: &mut Vec<String>,
        cycles: &mut Vec<Vec<String>>,
    ) {
        for dep in deps {
            let closes_on_root = dep == root;
            let revisits_path = path.iter().any(|seen| seen == dep);

            path.push(dep.clone());
            if closes_on_root || revisits_path {
                cycles.push(path.clone());
            } else {
                let next_deps = self
                    .suites
                    .get(dep)
                    .map(|suite| suite.descriptor.depends_on.as_slice())
                    .unwrap_or(&[]);
                self.walk_dependencies(root, next_deps, path, cycles);
            }
            path.pop();
        }
    }
}

/// Validate a full step table: non-empty, no method bound twice, and no gap
/// between consecutive present order numbers.
///
/// Checks run interleaved while walking orders ascending: at each order the
/// method is checked against earlier bindings before the gap to the next
/// order, so a duplicate hiding past a gap surfaces as the gap error.
///
/// The lowest order is deliberately not required to equal 1; a table such as
/// `{2, 3}` passes. Tests cover this leniency explicitly.
fn validate_step_table(suite: &str, table: &StepTable) -> Result<(), RegistrationError> {
    let orders = table.orders();

    if orders.is_empty() {
        return Err(RegistrationError::NoSteps {
            suite: suite.to_string(),
        });
    }

    let mut method_usage: HashMap<&str, u32> = HashMap::new();

    for (index, &order) in orders.iter().enumerate() {
        let method = table
            .get(order)
            .map(|step| step.method.as_str())
            .unwrap_or_default();

        if let Some(&first) = method_usage.get(method) {
            return Err(RegistrationError::DuplicateMethod {
                suite: suite.to_string(),
                method: method.to_string(),
                first,
                second: order,
            });
        }

        if let Some(&next) = orders.get(index + 1) {
            if next != order + 1 {
                return Err(RegistrationError::MissingStep {
                    suite: suite.to_string(),
                    expected: order + 1,
                });
            }
        }

        method_usage.insert(method, order);
    }

    Ok(())
}
