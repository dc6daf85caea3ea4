//! Project context crawler.
//!
//! Builds a [`ContextSnapshot`] of the workspace: every visible folder, every
//! tracked source file, and the imports each file declares. Imports are read
//! with line patterns rather than a parser; a file whose import statements
//! cannot be made sense of contributes an empty import list and the crawl
//! carries on.
//!
//! The snapshot is cached until [`ProjectContext::refresh`] is called. Nothing
//! ties it to the live filesystem in between.

use anyhow::Result;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use crate::models::ContextSnapshot;
use crate::sandbox::relative_to;
use crate::scan::{read_text_lossy, WorkspaceWalker};

/// Extension of the files whose imports are tracked.
pub const TRACKED_EXTENSION: &str = "py";

/// Number of import identifiers listed in [`ProjectContext::summary`].
pub const SUMMARY_TOP_IMPORTS: usize = 15;

static IMPORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^import\s+(.+)$").expect("valid regex"));
static FROM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^from\s+(\S+)\s+import\s*(.*)$").expect("valid regex"));
static DOTTED_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$").expect("valid regex"));

pub struct ProjectContext {
    root: PathBuf,
    max_entries: usize,
    cache: RwLock<Option<Arc<ContextSnapshot>>>,
}

impl ProjectContext {
    pub fn new(root: impl Into<PathBuf>, max_entries: usize) -> Self {
        Self {
            root: root.into(),
            max_entries,
            cache: RwLock::new(None),
        }
    }

    /// Return the cached snapshot, crawling on first use.
    pub async fn snapshot(&self) -> Result<Arc<ContextSnapshot>> {
        if let Some(cached) = self.cached() {
            tracing::debug!("project context served from cache");
            return Ok(cached);
        }
        self.refresh().await
    }

    /// Re-crawl the workspace and replace the cached snapshot.
    pub async fn refresh(&self) -> Result<Arc<ContextSnapshot>> {
        let root = self.root.clone();
        let max_entries = self.max_entries;
        let snapshot =
            tokio::task::spawn_blocking(move || crawl_workspace(&root, max_entries)).await?;
        let snapshot = Arc::new(snapshot);
        *self.cache.write().unwrap_or_else(PoisonError::into_inner) = Some(snapshot.clone());
        tracing::info!(
            files = snapshot.files.len(),
            folders = snapshot.folders.len(),
            "project context crawled"
        );
        Ok(snapshot)
    }

    /// Compact digest of the project: the file list plus the most common
    /// import identifiers.
    pub async fn summary(&self) -> Result<String> {
        let snapshot = self.snapshot().await?;
        Ok(render_summary(&snapshot))
    }

    fn cached(&self) -> Option<Arc<ContextSnapshot>> {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Walk `root` and build a fresh snapshot.
pub fn crawl_workspace(root: &Path, max_entries: usize) -> ContextSnapshot {
    let mut snapshot = ContextSnapshot::default();

    for entry in WorkspaceWalker::new(root, max_entries) {
        if entry.depth() == 0 {
            continue;
        }
        let rel = relative_to(root, entry.path());
        if entry.file_type().is_dir() {
            snapshot.folders.push(rel);
            continue;
        }
        if !entry.file_type().is_file() {
            continue;
        }
        let tracked = entry
            .path()
            .extension()
            .map(|ext| ext == TRACKED_EXTENSION)
            .unwrap_or(false);
        if !tracked {
            continue;
        }

        let imports = match read_text_lossy(entry.path()) {
            Ok(source) => extract_imports(&source),
            Err(e) => {
                tracing::debug!(path = %rel, error = %e, "unreadable source file");
                Vec::new()
            }
        };
        if !imports.is_empty() {
            snapshot.imports.insert(rel.clone(), imports);
        }
        snapshot.files.push(rel);
    }

    snapshot
}

/// Extract import identifiers from Python-like source.
///
/// `import a.b, c as d` yields `a.b` and `c`; `from m import x, y as z`
/// yields `m.x` and `m.y`. Relative modules drop their leading dots, and a
/// bare relative import (`from . import x`) yields `.x`. Any statement that
/// cannot be parsed makes the whole file yield nothing.
pub fn extract_imports(source: &str) -> Vec<String> {
    match parse_imports(source) {
        Some(imports) => imports,
        None => {
            tracing::debug!("malformed import statement; ignoring file imports");
            Vec::new()
        }
    }
}

fn parse_imports(source: &str) -> Option<Vec<String>> {
    let mut found = Vec::new();
    let mut lines = source.lines();

    while let Some(raw) = lines.next() {
        let mut logical = strip_comment(raw).trim().to_string();

        while logical.ends_with('\\') {
            logical.pop();
            logical.push(' ');
            logical.push_str(strip_comment(lines.next()?).trim());
        }
        if logical.starts_with("from ") && logical.contains('(') {
            while !logical.contains(')') {
                logical.push(' ');
                logical.push_str(strip_comment(lines.next()?).trim());
            }
        }

        for statement in logical.split(';') {
            parse_statement(statement.trim(), &mut found)?;
        }
    }

    Some(found)
}

/// One simple statement. `None` when it is an import that cannot be parsed.
fn parse_statement(statement: &str, found: &mut Vec<String>) -> Option<()> {
    if let Some(caps) = IMPORT_RE.captures(statement) {
        for item in caps[1].split(',') {
            let module = alias_target(item);
            if !DOTTED_NAME_RE.is_match(module) {
                return None;
            }
            found.push(module.to_string());
        }
    } else if let Some(caps) = FROM_RE.captures(statement) {
        let module = caps[1].trim_start_matches('.');
        if !module.is_empty() && !DOTTED_NAME_RE.is_match(module) {
            return None;
        }

        let mut names = caps[2].trim();
        if let Some(inner) = names.strip_prefix('(') {
            names = inner.split(')').next().unwrap_or_default();
        }

        let mut any = false;
        for item in names.split(',') {
            if item.trim().is_empty() {
                continue;
            }
            let name = alias_target(item);
            if name != "*" && !DOTTED_NAME_RE.is_match(name) {
                return None;
            }
            found.push(format!("{}.{}", module, name));
            any = true;
        }
        if !any {
            return None;
        }
    }
    Some(())
}

fn strip_comment(line: &str) -> &str {
    line.split('#').next().unwrap_or_default()
}

/// `name as alias` -> `name`.
fn alias_target(item: &str) -> &str {
    item.split_whitespace().next().unwrap_or_default()
}

fn render_summary(snapshot: &ContextSnapshot) -> String {
    let mut ranked: Vec<(String, usize)> = import_frequencies(snapshot).into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    let top: Vec<String> = ranked
        .into_iter()
        .take(SUMMARY_TOP_IMPORTS)
        .map(|(name, _)| name)
        .collect();

    let mut summary = String::from("PROJECT STRUCTURE:\n");
    summary.push_str("- Files: ");
    summary.push_str(&snapshot.files.join(", "));
    summary.push('\n');
    summary.push_str("- Key Imports: ");
    summary.push_str(&top.join(", "));
    summary
}

/// How many files import each identifier.
pub fn import_frequencies(snapshot: &ContextSnapshot) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for deps in snapshot.imports.values() {
        for dep in deps {
            *counts.entry(dep.clone()).or_insert(0) += 1;
        }
    }
    counts
}
