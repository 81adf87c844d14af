//! Dependency graph derived from registered suites

use std::collections::HashMap;

use crate::registry::SuiteRegistry;

/// Derived index over the registry: for each suite, the suites that list it
/// as a dependency, plus the set of root suites.
///
/// Never stored by registrants; always recomputed from the descriptors at
/// run start, in registration order.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    dependents: HashMap<String, Vec<String>>,
    roots: Vec<String>,
}

impl DependencyGraph {
    /// Build the graph from a populated registry
    pub fn build(registry: &SuiteRegistry) -> Self {
        let mut dependents: HashMap<String, Vec<String>> = HashMap::new();
        let mut roots = Vec::new();

        for name in registry.names() {
            let Some(suite) = registry.get(name) else {
                continue;
            };

            if suite.descriptor.depends_on.is_empty() {
                roots.push(name.clone());
            }

            for dependency in &suite.descriptor.depends_on {
                dependents
                    .entry(dependency.clone())
                    .or_default()
                    .push(name.clone());
            }
        }

        Self { dependents, roots }
    }

    /// Suites that list `name` as a dependency, in registration order
    pub fn dependents(&self, name: &str) -> &[String] {
        self.dependents
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Suites with an empty dependency list, eligible to start as soon as a
    /// lane begins
    pub fn roots(&self) -> &[String] {
        &self.roots
    }
}
