//! Sandboxed directory listing and file reading.

use chrono::{DateTime, Utc};
use std::fs;

use crate::analysis::analyze_source;
use crate::error::{CoreError, CoreResult};
use crate::models::{DirEntryInfo, DirListing, EntryKind, FileView};
use crate::sandbox::Sandbox;
use crate::scan::read_text_lossy;

/// List the entries of a workspace directory, sorted by name. Sizes are
/// reported for files only.
pub fn list_dir(sandbox: &Sandbox, path: &str) -> CoreResult<DirListing> {
    let dir = sandbox.resolve_existing(path)?;
    if !dir.is_dir() {
        return Err(CoreError::NotFound(format!("not a directory: {}", path)));
    }

    let mut entries = Vec::new();
    for entry in fs::read_dir(&dir).map_err(|e| CoreError::io(&dir, e))? {
        let entry = entry.map_err(|e| CoreError::io(&dir, e))?;
        let meta = match entry.metadata() {
            Ok(meta) => meta,
            Err(e) => {
                tracing::debug!(path = %entry.path().display(), error = %e, "skipping entry without metadata");
                continue;
            }
        };
        let kind = if meta.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        };
        entries.push(DirEntryInfo {
            name: entry.file_name().to_string_lossy().into_owned(),
            kind,
            size: (kind == EntryKind::File).then(|| meta.len()),
            modified: meta
                .modified()
                .ok()
                .map(|t| DateTime::<Utc>::from(t).to_rfc3339()),
        });
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(DirListing {
        path: sandbox.relative(&dir),
        entries,
    })
}

/// Read a workspace file with permissive decoding and attach line-pattern
/// hints.
pub fn read_file(sandbox: &Sandbox, path: &str) -> CoreResult<FileView> {
    let file = sandbox.resolve_existing(path)?;
    if !file.is_file() {
        return Err(CoreError::NotFound(format!("not a file: {}", path)));
    }
    let content = read_text_lossy(&file).map_err(|e| CoreError::io(&file, e))?;
    let analysis = analyze_source(&content);

    Ok(FileView {
        path: sandbox.relative(&file),
        content,
        analysis,
    })
}
