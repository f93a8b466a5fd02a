//! Garbage collection of permanent storage.
//!
//! After a pass, storage holds exactly the directories some branch pointer
//! targets. Runs after every request, failed ones included, so unreferenced
//! outputs and crashed working copies never outlive the next cycle.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use crate::error::CollectError;
use crate::layout::Layout;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CollectReport {
    /// Storage entries kept because a pointer targets them.
    pub active: Vec<PathBuf>,
    pub deleted: Vec<PathBuf>,
}

/// Deletes every storage entry no branch pointer targets.
///
/// Enumeration errors abort the pass before anything is deleted. The first
/// deletion error stops the remaining deletions.
pub fn collect(layout: &Layout) -> Result<CollectReport, CollectError> {
    collect_with(layout, remove_entry)
}

fn collect_with<F>(layout: &Layout, mut remove: F) -> Result<CollectReport, CollectError>
where
    F: FnMut(&Path) -> std::io::Result<()>,
{
    info!("[GC] Requested cleanup of stale build dirs");

    let (active, stale_pointers) = active_outputs(layout).map_err(|e| {
        error!(error = %e, "[GC][ERROR] Unable to get list of active outputs");
        e
    })?;
    let all = all_outputs(layout).map_err(|e| {
        error!(error = %e, "[GC][ERROR] Unable to get list of all build outputs");
        e
    })?;

    let (kept, to_delete): (Vec<_>, Vec<_>) = all.into_iter().partition(|p| active.contains(p));
    info!(dirs = ?to_delete, "[GC] Deleting build dirs");

    let mut report = CollectReport {
        active: kept,
        deleted: Vec::new(),
    };
    for path in to_delete {
        remove(&path).map_err(|source| {
            error!(error = ?source, path = %path.display(), "[GC][ERROR] Unable to remove dir");
            CollectError::Delete {
                path: path.clone(),
                source,
            }
        })?;
        report.deleted.push(path);
    }

    for staged in stale_pointers {
        if let Err(e) = fs::remove_file(&staged) {
            warn!(error = ?e, path = %staged.display(), "[GC] Unable to remove stale staged pointer");
        }
    }

    info!(
        kept = report.active.len(),
        deleted = report.deleted.len(),
        "[GC] Successfully cleaned up build output dir"
    );
    Ok(report)
}

/// Resolved targets of every branch pointer, plus leftover staged pointers
/// (dot-names) from interrupted swaps.
fn active_outputs(layout: &Layout) -> Result<(HashSet<PathBuf>, Vec<PathBuf>), CollectError> {
    let enumerate = |path: &Path| {
        let path = path.to_path_buf();
        move |source: std::io::Error| CollectError::Enumerate { path, source }
    };

    let mut active = HashSet::new();
    let mut stale = Vec::new();
    for entry in fs::read_dir(&layout.branches_dir).map_err(enumerate(&layout.branches_dir))? {
        let entry = entry.map_err(enumerate(&layout.branches_dir))?;
        let pointer = entry.path();
        if entry.file_name().to_string_lossy().starts_with('.') {
            stale.push(pointer);
            continue;
        }
        let target = fs::read_link(&pointer).map_err(enumerate(&pointer))?;
        let target = if target.is_relative() {
            layout.branches_dir.join(target)
        } else {
            target
        };
        active.insert(normalize(&target));
    }
    Ok((active, stale))
}

fn all_outputs(layout: &Layout) -> Result<Vec<PathBuf>, CollectError> {
    let enumerate = |source: std::io::Error| CollectError::Enumerate {
        path: layout.output_dir.clone(),
        source,
    };
    let root = fs::canonicalize(&layout.output_dir).map_err(enumerate)?;
    let mut all = Vec::new();
    for entry in fs::read_dir(&root).map_err(enumerate)? {
        let entry = entry.map_err(enumerate)?;
        all.push(root.join(entry.file_name()));
    }
    all.sort();
    Ok(all)
}

/// Canonical form when the path exists; dangling targets keep their absolute form.
fn normalize(path: &Path) -> PathBuf {
    fs::canonicalize(path)
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

fn remove_entry(path: &Path) -> std::io::Result<()> {
    if fs::symlink_metadata(path)?.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}
