//! Test-runner output parsing.
//!
//! Each framework gets one narrow parser from raw output to [`TestCounts`].
//! Line-oriented runners (pytest) are scanned for status keywords. JSON
//! reporters (jest, mocha) are decoded from the first `{` in stdout so
//! leading log noise is tolerated; when decoding fails the combined output
//! is scanned for pass/fail glyphs instead.

use serde::Deserialize;

use crate::models::TestCounts;

/// pytest `-v`: count literal `PASSED`, `FAILED`, `ERROR`, `SKIPPED`.
pub fn parse_pytest(output: &str) -> TestCounts {
    let passed = output.matches("PASSED").count() as u64;
    let failed = output.matches("FAILED").count() as u64;
    let errors = output.matches("ERROR").count() as u64;
    let skipped = output.matches("SKIPPED").count() as u64;
    TestCounts {
        total: passed + failed + errors + skipped,
        passed,
        failed,
        errors,
        skipped,
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JestSummary {
    #[serde(default)]
    num_total_tests: u64,
    #[serde(default)]
    num_passed_tests: u64,
    #[serde(default)]
    num_failed_tests: u64,
    #[serde(default)]
    num_pending_tests: u64,
}

/// jest `--json`.
pub fn parse_jest(stdout: &str, combined: &str) -> TestCounts {
    match decode_report::<JestSummary>(stdout) {
        Some(report) => TestCounts {
            total: report.num_total_tests,
            passed: report.num_passed_tests,
            failed: report.num_failed_tests,
            errors: 0,
            skipped: report.num_pending_tests,
        },
        None => count_glyphs(combined),
    }
}

#[derive(Debug, Default, Deserialize)]
struct MochaStats {
    #[serde(default)]
    tests: u64,
    #[serde(default)]
    passes: u64,
    #[serde(default)]
    failures: u64,
    #[serde(default)]
    pending: u64,
}

#[derive(Debug, Deserialize)]
struct MochaReport {
    #[serde(default)]
    stats: MochaStats,
}

/// mocha `--reporter json`.
pub fn parse_mocha(stdout: &str, combined: &str) -> TestCounts {
    match decode_report::<MochaReport>(stdout) {
        Some(MochaReport { stats }) => TestCounts {
            total: stats.tests,
            passed: stats.passes,
            failed: stats.failures,
            errors: 0,
            skipped: stats.pending,
        },
        None => count_glyphs(combined),
    }
}

/// Decode everything from the first `{` in `stdout` as a JSON report.
fn decode_report<T: serde::de::DeserializeOwned>(stdout: &str) -> Option<T> {
    let start = stdout.find('{')?;
    match serde_json::from_str(&stdout[start..]) {
        Ok(report) => Some(report),
        Err(e) => {
            tracing::debug!(error = %e, "structured test report unreadable; counting glyphs");
            None
        }
    }
}

/// Fallback for JSON reporters: `✓`/`passed` and `✕`/`failed` occurrences.
fn count_glyphs(output: &str) -> TestCounts {
    let passed = (output.matches('✓').count() + output.matches("passed").count()) as u64;
    let failed = (output.matches('✕').count() + output.matches("failed").count()) as u64;
    TestCounts {
        total: passed + failed,
        passed,
        failed,
        ..TestCounts::default()
    }
}

/// Last `max` characters of `text`, or all of it when shorter.
pub fn tail_chars(text: &str, max: usize) -> &str {
    let count = text.chars().count();
    if count <= max {
        return text;
    }
    match text.char_indices().nth(count - max) {
        Some((start, _)) => &text[start..],
        None => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TestStatus;

    #[test]
    fn test_pytest_keywords() {
        let out = "\
tests/test_a.py::test_one PASSED
tests/test_a.py::test_two PASSED
tests/test_a.py::test_three FAILED
tests/test_a.py::test_four SKIPPED
";
        let counts = parse_pytest(out);
        assert_eq!(counts.passed, 2);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.skipped, 1);
        assert_eq!(counts.total, 4);
        assert_eq!(counts.status(), TestStatus::Failed);
    }

    #[test]
    fn test_pytest_nothing_recognizable() {
        let counts = parse_pytest("collected 0 items\n");
        assert_eq!(counts, TestCounts::default());
        assert_eq!(counts.status(), TestStatus::Unknown);
    }

    #[test]
    fn test_jest_report_after_noise() {
        let stdout = "Determining test suites...\n{\"numTotalTests\":10,\"numPassedTests\":8,\"numFailedTests\":2,\"numPendingTests\":0,\"success\":false}\n";
        let counts = parse_jest(stdout, stdout);
        assert_eq!(counts.total, 10);
        assert_eq!(counts.passed, 8);
        assert_eq!(counts.failed, 2);
        assert_eq!(counts.status(), TestStatus::Failed);
    }

    #[test]
    fn test_jest_pending_is_skipped() {
        let stdout = r#"{"numTotalTests":3,"numPassedTests":2,"numFailedTests":0,"numPendingTests":1}"#;
        let counts = parse_jest(stdout, stdout);
        assert_eq!(counts.skipped, 1);
        assert_eq!(counts.status(), TestStatus::Passed);
    }

    #[test]
    fn test_jest_glyph_fallback() {
        let combined = "  ✓ adds (2 ms)\n  ✓ subtracts\n  ✕ divides\n";
        let counts = parse_jest("no json here", combined);
        assert_eq!(counts.passed, 2);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.total, 3);
    }

    #[test]
    fn test_truncated_json_falls_back() {
        let stdout = "{\"numTotalTests\": 4, \"numPassed";
        let combined = format!("{}\nTests: 1 failed, 3 passed", stdout);
        let counts = parse_jest(stdout, &combined);
        assert_eq!(counts.passed, 1);
        assert_eq!(counts.failed, 1);
    }

    #[test]
    fn test_mocha_stats() {
        let stdout = r#"{"stats":{"suites":1,"tests":5,"passes":4,"pending":1,"failures":0},"tests":[]}"#;
        let counts = parse_mocha(stdout, stdout);
        assert_eq!(counts.total, 5);
        assert_eq!(counts.passed, 4);
        assert_eq!(counts.skipped, 1);
        assert_eq!(counts.status(), TestStatus::Passed);
    }

    #[test]
    fn test_mocha_missing_stats_defaults_to_zero() {
        let counts = parse_mocha("{}", "{}");
        assert_eq!(counts, TestCounts::default());
    }

    #[test]
    fn test_tail_chars() {
        assert_eq!(tail_chars("abcdef", 3), "def");
        assert_eq!(tail_chars("abc", 10), "abc");
        assert_eq!(tail_chars("ééééé", 2), "éé");
        assert_eq!(tail_chars("abc", 0), "");
        assert_eq!(tail_chars("", 0), "");
    }
}
