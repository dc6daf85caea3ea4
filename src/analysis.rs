//! Line-pattern source hints.
//!
//! Approximate and language-agnostic by design of its callers: each line is
//! matched independently, so a `def` inside a string literal still counts.

use regex::Regex;
use std::sync::LazyLock;

use crate::models::{FileAnalysis, LineRef, SymbolHint, TodoMarker};

static FUNCTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(async\s+)?def\s+(\w+)\s*\(").expect("valid regex"));
static CLASS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*class\s+(\w+)\s*[:(]").expect("valid regex"));
static TODO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(TODO|FIXME|BUG)\b:?\s*(.*)").expect("valid regex"));
static DEPRECATED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)@deprecated|\bdeprecated\b").expect("valid regex"));

pub fn analyze_source(content: &str) -> FileAnalysis {
    let mut analysis = FileAnalysis::default();

    for (idx, line) in content.lines().enumerate() {
        let line_no = idx + 1;

        if let Some(caps) = FUNCTION_RE.captures(line) {
            analysis.functions.push(SymbolHint {
                name: caps[2].to_string(),
                line: line_no,
                content: line.trim().to_string(),
            });
        }
        if let Some(caps) = CLASS_RE.captures(line) {
            analysis.classes.push(SymbolHint {
                name: caps[1].to_string(),
                line: line_no,
                content: line.trim().to_string(),
            });
        }
        if let Some(caps) = TODO_RE.captures(line) {
            analysis.todos.push(TodoMarker {
                kind: caps[1].to_uppercase(),
                message: caps[2].trim().to_string(),
                line: line_no,
            });
        }
        if DEPRECATED_RE.is_match(line) {
            analysis.deprecated.push(LineRef {
                line: line_no,
                content: line.trim().to_string(),
            });
        }
    }

    analysis
}
