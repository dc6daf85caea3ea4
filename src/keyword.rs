//! Keyword search over workspace files.
//!
//! The term is matched case-insensitively. By default it is escaped and
//! matched literally; callers opt into regular-expression semantics with
//! [`KeywordQuery::regex`]. Files are selected by a glob on their file name
//! and walked with the same pruning rules as the project crawler.
//!
//! Each matching line produces one [`SearchHit`] whose context is the
//! inclusive window of `context_lines` lines around it, clamped to the file.

use globset::{Glob, GlobMatcher};
use regex::{Regex, RegexBuilder};
use std::path::{Path, PathBuf};

use crate::error::{CoreError, CoreResult};
use crate::models::SearchHit;
use crate::sandbox::relative_to;
use crate::scan::{read_text_lossy, WorkspaceWalker};

#[derive(Debug, Clone)]
pub struct KeywordQuery {
    pub term: String,
    /// Glob matched against file names; `*` and `?` wildcards.
    pub file_pattern: String,
    pub context_lines: usize,
    /// Treat `term` as a regular expression instead of a literal.
    pub regex: bool,
}

impl KeywordQuery {
    pub fn literal(term: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            file_pattern: "*".to_string(),
            context_lines: 2,
            regex: false,
        }
    }
}

pub struct KeywordSearch {
    root: PathBuf,
    max_entries: usize,
    max_hits: usize,
}

impl KeywordSearch {
    pub fn new(root: impl Into<PathBuf>, max_entries: usize, max_hits: usize) -> Self {
        Self {
            root: root.into(),
            max_entries,
            max_hits,
        }
    }

    /// Run the query on a blocking worker thread.
    pub async fn search(&self, query: KeywordQuery) -> CoreResult<Vec<SearchHit>> {
        let root = self.root.clone();
        let max_entries = self.max_entries;
        let max_hits = self.max_hits;
        tokio::task::spawn_blocking(move || search_workspace(&root, &query, max_entries, max_hits))
            .await
            .map_err(|e| CoreError::ToolFailure {
                tool: "keyword search".to_string(),
                message: e.to_string(),
            })?
    }
}

/// Search every eligible file under `root`. Stops after `max_hits` hits.
pub fn search_workspace(
    root: &Path,
    query: &KeywordQuery,
    max_entries: usize,
    max_hits: usize,
) -> CoreResult<Vec<SearchHit>> {
    if query.term.is_empty() {
        return Ok(Vec::new());
    }
    let matcher = compile_term(&query.term, query.regex)?;
    let files = compile_file_pattern(&query.file_pattern)?;

    let mut hits = Vec::new();
    for entry in WorkspaceWalker::new(root, max_entries) {
        if !entry.file_type().is_file() || !files.is_match(entry.file_name()) {
            continue;
        }
        let text = match read_text_lossy(entry.path()) {
            Ok(text) => text,
            Err(e) => {
                tracing::debug!(path = %entry.path().display(), error = %e, "skipping unreadable file");
                continue;
            }
        };

        let rel = relative_to(root, entry.path());
        let remaining = max_hits.saturating_sub(hits.len());
        hits.extend(search_text(&rel, &text, &matcher, query.context_lines, remaining));

        if hits.len() >= max_hits {
            tracing::warn!(max_hits, "keyword search stopped at the hit cap");
            break;
        }
    }

    Ok(hits)
}

fn compile_term(term: &str, as_regex: bool) -> CoreResult<Regex> {
    let pattern = if as_regex {
        term.to_string()
    } else {
        regex::escape(term)
    };
    RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| CoreError::InvalidArgument(format!("invalid search pattern: {}", e)))
}

fn compile_file_pattern(pattern: &str) -> CoreResult<GlobMatcher> {
    let pattern = if pattern.trim().is_empty() { "*" } else { pattern };
    Glob::new(pattern)
        .map(|g| g.compile_matcher())
        .map_err(|e| CoreError::InvalidArgument(format!("invalid file pattern: {}", e)))
}

/// Hits within one file's text, at most `limit`.
fn search_text(
    file: &str,
    text: &str,
    matcher: &Regex,
    context_lines: usize,
    limit: usize,
) -> Vec<SearchHit> {
    let lines: Vec<&str> = text.lines().collect();
    lines
        .iter()
        .enumerate()
        .filter(|(_, line)| matcher.is_match(line))
        .take(limit)
        .map(|(idx, _)| {
            let start = idx.saturating_sub(context_lines);
            let end = idx
                .saturating_add(context_lines)
                .saturating_add(1)
                .min(lines.len());
            SearchHit {
                file: file.to_string(),
                line: idx + 1,
                context: lines[start..end].join("\n"),
            }
        })
        .collect()
}
