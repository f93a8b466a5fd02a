//! Publisher: promotes rendered output into permanent storage and cuts the
//! branch pointer over to it.
//!
//! Both steps are single filesystem operations (a directory rename, then a
//! symlink rename), so a reader resolving `branches/<branch>` sees either the
//! previous build in full or the new one in full.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use crate::contract::BuildRequest;
use crate::error::PipelineError;
use crate::layout::Layout;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Output moved into storage and the branch pointer now targets it.
    Published(PathBuf),
    /// Storage already held this `(branch, commit)`; nothing was changed.
    Duplicate(PathBuf),
}

impl PublishOutcome {
    pub fn path(&self) -> &Path {
        match self {
            PublishOutcome::Published(p) | PublishOutcome::Duplicate(p) => p,
        }
    }
}

pub struct Publisher {
    layout: Layout,
}

impl Publisher {
    pub fn new(layout: &Layout) -> Self {
        Self {
            layout: layout.clone(),
        }
    }

    pub fn publish(&self, rendered: &Path, request: &BuildRequest) -> Result<PublishOutcome, PipelineError> {
        let branch = request.branch_name();
        let target = absolute(&self.layout.output_path(branch, &request.commit));

        if let Err(source) = fs::rename(rendered, &target) {
            if is_non_empty_dir(&target) {
                // Reachable by re-delivered hooks, not by ordinary pushes.
                warn!(
                    branch = branch,
                    commit = %request.commit,
                    path = %target.display(),
                    "[PUBLISH] Skipped deployment, build output already exists"
                );
                return Ok(PublishOutcome::Duplicate(target));
            }
            error!(
                error = ?source,
                from = %rendered.display(),
                to = %target.display(),
                "[PUBLISH][ERROR] Unable to move build output into storage"
            );
            return Err(PipelineError::Publish {
                from: rendered.to_path_buf(),
                to: target,
                source,
            });
        }

        self.point(branch, &target)?;
        info!(
            branch = branch,
            commit = %request.commit,
            path = %target.display(),
            "[PUBLISH] Successfully deployed newly-built branch"
        );
        Ok(PublishOutcome::Published(target))
    }

    /// Atomically (re)points `branches/<branch>` at `target`.
    ///
    /// A fresh symlink is created under a temporary dot-name and renamed over
    /// the live pointer; on failure the live pointer is left as it was.
    pub fn point(&self, branch: &str, target: &Path) -> Result<(), PipelineError> {
        let pointer = self.layout.pointer_path(branch);
        let staged = self
            .layout
            .branches_dir
            .join(format!(".{branch}.{}.tmp", uuid::Uuid::new_v4()));

        let swapped = symlink_dir(target, &staged).and_then(|_| fs::rename(&staged, &pointer));
        if let Err(source) = swapped {
            let _ = fs::remove_file(&staged);
            error!(
                error = ?source,
                branch = branch,
                pointer = %pointer.display(),
                target = %target.display(),
                "[PUBLISH][ERROR] Unable to update branch pointer"
            );
            return Err(PipelineError::Pointer {
                branch: branch.to_string(),
                source,
            });
        }
        Ok(())
    }
}

fn is_non_empty_dir(path: &Path) -> bool {
    fs::read_dir(path)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(unix)]
fn symlink_dir(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink_dir(target: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_dir(target, link)
}
