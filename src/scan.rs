//! Workspace traversal shared by the crawler, keyword search, and the
//! semantic index.
//!
//! The walk is depth-first from the workspace root. Directories whose name
//! starts with `.` or that belong to [`IGNORED_DIRS`] are pruned before
//! descent, so dependency trees and the persisted index are never visited.
//! Within a directory, files are yielded before subdirectories and both are
//! ordered by name, which keeps snapshots and result lists deterministic.

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::cmp::Ordering;
use std::path::Path;
use walkdir::{DirEntry, WalkDir};

use crate::models::SourceDocument;
use crate::sandbox::relative_to;

/// Dependency, cache, and virtual-env directories skipped by every walk.
pub const IGNORED_DIRS: &[&str] = &["node_modules", "venv", "__pycache__"];

fn is_pruned_dir(entry: &DirEntry) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || IGNORED_DIRS.contains(&name.as_ref())
}

fn files_first(a: &DirEntry, b: &DirEntry) -> Ordering {
    a.file_type()
        .is_dir()
        .cmp(&b.file_type().is_dir())
        .then_with(|| a.file_name().cmp(b.file_name()))
}

/// Iterator over every non-pruned entry below a root, capped at
/// `max_entries` yielded entries.
pub struct WorkspaceWalker {
    inner: Box<dyn Iterator<Item = walkdir::Result<DirEntry>> + Send>,
    remaining: usize,
    truncated: bool,
}

impl WorkspaceWalker {
    pub fn new(root: &Path, max_entries: usize) -> Self {
        let inner = WalkDir::new(root)
            .follow_links(false)
            .sort_by(files_first)
            .into_iter()
            .filter_entry(|e| !is_pruned_dir(e));
        Self {
            inner: Box::new(inner),
            remaining: max_entries,
            truncated: false,
        }
    }

    /// True once the entry cap cut the walk short.
    pub fn truncated(&self) -> bool {
        self.truncated
    }
}

impl Iterator for WorkspaceWalker {
    type Item = DirEntry;

    fn next(&mut self) -> Option<DirEntry> {
        loop {
            if self.remaining == 0 {
                if !self.truncated && self.inner.next().is_some() {
                    self.truncated = true;
                    tracing::warn!("workspace walk stopped at the configured entry cap");
                }
                return None;
            }
            match self.inner.next()? {
                Ok(entry) => {
                    self.remaining -= 1;
                    return Some(entry);
                }
                Err(e) => {
                    tracing::debug!(error = %e, "skipping unreadable entry");
                    continue;
                }
            }
        }
    }
}

/// Decode bytes as UTF-8, dropping invalid sequences instead of replacing
/// them.
pub fn decode_dropping_invalid(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for chunk in bytes.utf8_chunks() {
        out.push_str(chunk.valid());
    }
    out
}

/// Read a file as text with [`decode_dropping_invalid`] semantics.
pub fn read_text_lossy(path: &Path) -> std::io::Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(decode_dropping_invalid(&bytes))
}

/// Collect the documents eligible for semantic indexing: visible files whose
/// extension is in `extensions`, read with permissive decoding.
pub fn scan_documents(
    root: &Path,
    extensions: &[String],
    max_entries: usize,
) -> Result<Vec<SourceDocument>> {
    let patterns: Vec<String> = extensions
        .iter()
        .map(|ext| format!("*.{}", ext.trim_start_matches('.')))
        .collect();
    let include = build_globset(&patterns)?;

    let mut documents = Vec::new();
    for entry in WorkspaceWalker::new(root, max_entries) {
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if name.starts_with('.') || !include.is_match(name.as_ref()) {
            continue;
        }
        let body = match read_text_lossy(entry.path()) {
            Ok(body) => body,
            Err(e) => {
                tracing::debug!(path = %entry.path().display(), error = %e, "unreadable document");
                continue;
            }
        };
        if body.trim().is_empty() {
            continue;
        }
        documents.push(SourceDocument {
            path: relative_to(root, entry.path()),
            body,
        });
    }

    documents.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(documents)
}

pub fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn fixture() -> TempDir {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("pkg/sub")).unwrap();
        fs::create_dir_all(root.join("node_modules/dep")).unwrap();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::create_dir_all(root.join("venv/lib")).unwrap();
        fs::write(root.join("main.py"), "print('hi')\n").unwrap();
        fs::write(root.join("README.md"), "# readme\n").unwrap();
        fs::write(root.join("pkg/a.py"), "x = 1\n").unwrap();
        fs::write(root.join("pkg/sub/b.ts"), "let y = 2;\n").unwrap();
        fs::write(root.join("node_modules/dep/index.js"), "module.exports = 1;\n").unwrap();
        fs::write(root.join(".git/config"), "[core]\n").unwrap();
        fs::write(root.join("venv/lib/site.py"), "import sys\n").unwrap();
        tmp
    }

    #[test]
    fn test_walk_prunes_ignored_and_hidden() {
        let tmp = fixture();
        let paths: Vec<String> = WorkspaceWalker::new(tmp.path(), usize::MAX)
            .filter(|e| e.file_type().is_file())
            .map(|e| relative_to(tmp.path(), e.path()))
            .collect();
        assert_eq!(paths, vec!["README.md", "main.py", "pkg/a.py", "pkg/sub/b.ts"]);
    }

    #[test]
    fn test_walk_cap() {
        let tmp = fixture();
        let mut walker = WorkspaceWalker::new(tmp.path(), 2);
        let taken: Vec<_> = walker.by_ref().collect();
        assert_eq!(taken.len(), 2);
        assert!(walker.truncated());
    }

    #[test]
    fn test_decode_drops_invalid_bytes() {
        let bytes = b"caf\xc3\xa9 \xff\xfeok";
        assert_eq!(decode_dropping_invalid(bytes), "café ok");
    }

    #[test]
    fn test_scan_documents_filters_extensions() {
        let tmp = fixture();
        fs::write(tmp.path().join("notes.txt"), "plain text").unwrap();
        fs::write(tmp.path().join(".hidden.py"), "secret = 1").unwrap();
        let exts = vec!["py".to_string(), ".md".to_string(), "ts".to_string()];
        let docs = scan_documents(tmp.path(), &exts, usize::MAX).unwrap();
        let paths: Vec<&str> = docs.iter().map(|d| d.path.as_str()).collect();
        assert_eq!(paths, vec!["README.md", "main.py", "pkg/a.py", "pkg/sub/b.ts"]);
    }
}
