//! JUnit-style XML report over a run's result set

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use tracing::info;

use crate::result::ExecutionResult;

/// Errors while writing the end-of-run report
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// IO error writing the report file
    #[error("failed to write report: {0}")]
    Io(#[from] std::io::Error),
}

/// Render results as a JUnit XML document: one testsuite per suite result,
/// one testcase per step, with failure elements carrying the step error.
pub fn render_junit(results: &[ExecutionResult]) -> String {
    let tests: usize = results.iter().map(|result| result.steps.len()).sum();
    let failures: usize = results
        .iter()
        .map(|result| result.steps.iter().filter(|step| !step.success).count())
        .sum();
    let time: f64 = results
        .iter()
        .map(|result| result.duration_ms as f64 / 1000.0)
        .sum();

    let mut xml = String::new();
    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    let _ = writeln!(
        xml,
        "<testsuites name=\"convoy\" tests=\"{tests}\" failures=\"{failures}\" time=\"{time:.3}\">"
    );

    for result in results {
        let suite_failures = result.steps.iter().filter(|step| !step.success).count();
        let _ = writeln!(
            xml,
            "  <testsuite name=\"{}\" tests=\"{}\" failures=\"{}\" time=\"{:.3}\" timestamp=\"{}\">",
            escape(&result.suite_name),
            result.steps.len(),
            suite_failures,
            result.duration_ms as f64 / 1000.0,
            escape(&result.recorded_at),
        );

        for step in &result.steps {
            let _ = write!(
                xml,
                "    <testcase name=\"{}\" classname=\"{}\" time=\"{:.3}\"",
                escape(&step.name),
                escape(&result.suite_name),
                step.duration_ms as f64 / 1000.0,
            );
            match &step.error {
                Some(error) => {
                    let _ = writeln!(xml, ">");
                    let _ = writeln!(
                        xml,
                        "      <failure message=\"{}\">{}</failure>",
                        escape(error),
                        escape(error),
                    );
                    let _ = writeln!(xml, "    </testcase>");
                }
                None => {
                    let _ = writeln!(xml, "/>");
                }
            }
        }

        let _ = writeln!(xml, "  </testsuite>");
    }

    xml.push_str("</testsuites>\n");
    xml
}

/// Write the JUnit report to disk, creating parent directories as needed
pub fn write_junit(path: &Path, results: &[ExecutionResult]) -> Result<(), ReportError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, render_junit(results))?;
    info!(path = %path.display(), suites = results.len(), "wrote JUnit report");
    Ok(())
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::result::StepResult;

    fn mixed_results() -> Vec<ExecutionResult> {
        vec![
            ExecutionResult::finished(
                "login",
                Duration::from_millis(1500),
                vec![StepResult::passed("authenticate", Duration::from_millis(1500))],
                "null".to_string(),
            ),
            ExecutionResult::finished(
                "checkout",
                Duration::from_millis(250),
                vec![
                    StepResult::passed("open_cart", Duration::from_millis(100)),
                    StepResult::failed("pay", Duration::from_millis(150), "card <declined> & retried"),
                ],
                "null".to_string(),
            ),
        ]
    }

    #[test]
    fn test_render_counts_and_structure() {
        let xml = render_junit(&mixed_results());

        assert!(xml.contains("tests=\"3\" failures=\"1\""));
        assert!(xml.contains("<testsuite name=\"login\" tests=\"1\" failures=\"0\""));
        assert!(xml.contains("<testsuite name=\"checkout\" tests=\"2\" failures=\"1\""));
        assert!(xml.contains("<testcase name=\"authenticate\" classname=\"login\" time=\"1.500\"/>"));
    }

    #[test]
    fn test_render_escapes_error_text() {
        let xml = render_junit(&mixed_results());

        assert!(xml.contains("card &lt;declined&gt; &amp; retried"));
        assert!(!xml.contains("card <declined>"));
    }

    #[test]
    fn test_write_creates_parent_directories() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("reports").join("junit.xml");

        write_junit(&path, &mixed_results()).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("<?xml version=\"1.0\""));
        assert!(contents.ends_with("</testsuites>\n"));
    }
}
