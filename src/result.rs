//! Execution results and result keys

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Outcome of a single step within a suite
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// Step method name
    pub name: String,
    /// Whether the step succeeded
    pub success: bool,
    /// How long the step took
    pub duration_ms: u64,
    /// Error text for a failed step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepResult {
    /// Record a passed step
    pub fn passed(name: impl Into<String>, duration: Duration) -> Self {
        Self {
            name: name.into(),
            success: true,
            duration_ms: duration.as_millis() as u64,
            error: None,
        }
    }

    /// Record a failed step with its error text
    pub fn failed(name: impl Into<String>, duration: Duration, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            success: false,
            duration_ms: duration.as_millis() as u64,
            error: Some(error.into()),
        }
    }
}

/// Outcome of one suite execution, produced exactly once per (lane, suite)
/// per run and persisted in the result store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Suite that was executed
    pub suite_name: String,
    /// Overall success (all steps passed)
    pub success: bool,
    /// Total elapsed time
    pub duration_ms: u64,
    /// Ordered step outcomes
    pub steps: Vec<StepResult>,
    /// Serialized JSON output payload, consumed by dependent suites
    pub payload: String,
    /// When this result was recorded (RFC 3339)
    pub recorded_at: String,
}

impl ExecutionResult {
    /// Build a result for a suite that finished running its body
    pub fn finished(
        suite_name: impl Into<String>,
        duration: Duration,
        steps: Vec<StepResult>,
        payload: String,
    ) -> Self {
        let success = steps.iter().all(|step| step.success);
        Self {
            suite_name: suite_name.into(),
            success,
            duration_ms: duration.as_millis() as u64,
            steps,
            payload,
            recorded_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Synthesize a failed result for a suite whose worker never ran any
    /// suite code, e.g. unmet dependency inputs or a worker transport error.
    pub fn startup_failure(suite_name: impl Into<String>, error: impl Into<String>) -> Self {
        let suite_name = suite_name.into();
        Self {
            steps: vec![StepResult::failed(&suite_name, Duration::ZERO, error)],
            suite_name,
            success: false,
            duration_ms: 0,
            payload: "null".to_string(),
            recorded_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Error text of the first failing step, the one reported for the suite
    pub fn first_error(&self) -> Option<&str> {
        self.steps
            .iter()
            .find(|step| !step.success)
            .and_then(|step| step.error.as_deref())
    }
}

/// Composite key scoping a result to one lane. Results from different lanes
/// never collide or satisfy each other's dependency checks.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResultKey {
    /// Lane identifier (e.g. target environment)
    pub lane: String,
    /// Suite name
    pub suite: String,
}

impl ResultKey {
    /// Create a new result key
    pub fn new(lane: impl Into<String>, suite: impl Into<String>) -> Self {
        Self {
            lane: lane.into(),
            suite: suite.into(),
        }
    }

    /// Parse a key from "lane:suite" format
    pub fn parse(s: &str) -> Option<Self> {
        let parts: Vec<&str> = s.splitn(2, ':').collect();
        if parts.len() == 2 {
            Some(Self::new(parts[0], parts[1]))
        } else {
            None
        }
    }
}

impl fmt::Display for ResultKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.lane, self.suite)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_key_display() {
        let key = ResultKey::new("staging", "checkout");
        assert_eq!(key.to_string(), "staging:checkout");
    }

    #[test]
    fn test_result_key_parse() {
        let key = ResultKey::parse("staging:checkout").unwrap();
        assert_eq!(key.lane, "staging");
        assert_eq!(key.suite, "checkout");
    }

    #[test]
    fn test_result_key_parse_invalid() {
        assert!(ResultKey::parse("no-separator").is_none());
    }

    #[test]
    fn test_finished_success_follows_steps() {
        let steps = vec![
            StepResult::passed("open", Duration::from_millis(5)),
            StepResult::failed("submit", Duration::from_millis(2), "timed out"),
        ];
        let result = ExecutionResult::finished("checkout", Duration::from_millis(7), steps, "null".into());

        assert!(!result.success);
        assert_eq!(result.first_error(), Some("timed out"));
    }

    #[test]
    fn test_startup_failure_has_single_failing_step() {
        let result = ExecutionResult::startup_failure("checkout", "could not look up result for login");

        assert!(!result.success);
        assert_eq!(result.steps.len(), 1);
        assert_eq!(result.steps[0].name, "checkout");
        assert_eq!(result.first_error(), Some("could not look up result for login"));
    }
}
