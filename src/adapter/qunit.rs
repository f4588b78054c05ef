use camino::Utf8Path;

use crate::adapter::Tool;
use crate::error::AdapterError;

/// Outcome of one headless test run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestReport {
    pub passed: usize,
    /// Names of the failing cases, in reporting order.
    pub failed: Vec<String>,
}

impl TestReport {
    pub fn total(&self) -> usize {
        self.passed + self.failed.len()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Executes a test page in a headless environment.
///
/// A runner only reports: deciding whether failures are fatal is left to the
/// caller. An `Err` means the suite could not be run at all.
pub trait TestRunner: Send + Sync {
    fn name(&self) -> &str;

    fn run(&self, page: &Utf8Path, cwd: &Utf8Path) -> Result<TestReport, AdapterError>;
}

/// QUnit through a headless browser runner that prints TAP.
///
/// A run that reports no case at all counts as failed.
pub struct QUnit {
    tool: Tool,
}

impl QUnit {
    pub fn new(tool: Tool) -> Self {
        Self { tool }
    }
}

impl TestRunner for QUnit {
    fn name(&self) -> &str {
        "qunit"
    }

    fn run(&self, page: &Utf8Path, cwd: &Utf8Path) -> Result<TestReport, AdapterError> {
        if !page.exists() {
            return Err(AdapterError::MissingInput(page.to_owned()));
        }

        let output = self.tool.run(&[page.to_string()], cwd)?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut report = parse_tap(&stdout);

        if !output.status.success() && report.is_success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = stderr.lines().next().unwrap_or("no output").trim();
            report
                .failed
                .push(format!("runner exited with {}: {reason}", output.status));
        }

        if report.total() == 0 {
            report
                .failed
                .push("no test cases reported, the runner has to print TAP".into());
        }

        Ok(report)
    }
}

/// Collects `ok` / `not ok` lines of a TAP stream.
fn parse_tap(text: &str) -> TestReport {
    let mut report = TestReport::default();

    for line in text.lines().map(str::trim) {
        if let Some(rest) = line.strip_prefix("not ok") {
            report.failed.push(case_name(rest));
        } else if line.starts_with("ok") {
            report.passed += 1;
        }
    }

    report
}

fn case_name(rest: &str) -> String {
    let rest = rest.trim_start();
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_digit()).trim_start();
    let rest = rest.strip_prefix('-').unwrap_or(rest).trim();
    rest.to_string()
}
