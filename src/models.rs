//! Core data models returned by workspace operations.
//!
//! Every path-bearing field is workspace-relative and `/`-separated. These
//! types are serialized as-is by the CLI (`--json`) and the tool server.

use serde::Serialize;
use std::collections::BTreeMap;

/// Raw file read from the workspace for semantic indexing.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub path: String,
    pub body: String,
}

/// A chunk of a document's body text.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub document_path: String,
    pub chunk_index: i64,
    pub text: String,
    pub hash: String,
}

/// Files, folders, and per-file imports of the workspace as of the last crawl.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContextSnapshot {
    pub files: Vec<String>,
    pub folders: Vec<String>,
    /// Only files with at least one import appear here.
    pub imports: BTreeMap<String, Vec<String>>,
}

/// One matching line from keyword search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub file: String,
    /// 1-based.
    pub line: usize,
    /// The match line and its surrounding window, joined with `\n`.
    pub context: String,
}

/// A ranked passage from the semantic index.
#[derive(Debug, Clone, Serialize)]
pub struct Passage {
    pub file: String,
    pub chunk_index: i64,
    pub score: f32,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SemanticAnswer {
    pub passages: Vec<Passage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
}

/// Outcome of a semantic query. Never an error: an unusable index yields
/// an advisory message instead.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SemanticOutcome {
    Answer(SemanticAnswer),
    Advisory { message: String },
}

/// Lifecycle state of the semantic index as seen by callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum IndexStatus {
    Unloaded,
    /// A load or build is in flight.
    Building,
    Unavailable {
        reason: String,
    },
    Ready {
        model: String,
        documents: usize,
        chunks: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TestStatus {
    Unknown,
    Passed,
    Failed,
}

impl TestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestStatus::Unknown => "UNKNOWN",
            TestStatus::Passed => "PASSED",
            TestStatus::Failed => "FAILED",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TestCounts {
    pub total: u64,
    pub passed: u64,
    pub failed: u64,
    pub errors: u64,
    pub skipped: u64,
}

impl TestCounts {
    /// FAILED if anything failed or errored, PASSED if anything passed,
    /// UNKNOWN otherwise.
    pub fn status(&self) -> TestStatus {
        if self.failed > 0 || self.errors > 0 {
            TestStatus::Failed
        } else if self.passed > 0 {
            TestStatus::Passed
        } else {
            TestStatus::Unknown
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub framework: String,
    pub status: TestStatus,
    pub counts: TestCounts,
    pub output_snippet: String,
    pub full_logs: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    pub location: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    pub tool: String,
    pub target: String,
    /// True number of issues found, independent of the `issues` cap.
    pub issue_count: usize,
    pub issues: Vec<Issue>,
    pub summary: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

#[derive(Debug, Clone, Serialize)]
pub struct DirEntryInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub size: Option<u64>,
    pub modified: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DirListing {
    pub path: String,
    pub entries: Vec<DirEntryInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymbolHint {
    pub name: String,
    pub line: usize,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TodoMarker {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineRef {
    pub line: usize,
    pub content: String,
}

/// Best-effort structural hints from line-pattern matching.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileAnalysis {
    pub functions: Vec<SymbolHint>,
    pub classes: Vec<SymbolHint>,
    pub todos: Vec<TodoMarker>,
    pub deprecated: Vec<LineRef>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileView {
    pub path: String,
    pub content: String,
    pub analysis: FileAnalysis,
}
