//! On-disk layout shared by every pipeline stage and by the file server.
//!
//! ```text
//! <root>/repo          persistent source mirror
//! <root>/buildoutput   permanent storage, one `<branch>-<commit>` dir per build
//! <root>/branches      one symlink per branch, pointing into buildoutput
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Pointer served when a request names no (known) branch.
pub const DEFAULT_BRANCH: &str = "master";

/// Lock file name, kept next to the storage dir.
pub const LOCK_FILE: &str = ".branchdocs.lock";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layout {
    pub mirror_dir: PathBuf,
    pub output_dir: PathBuf,
    pub branches_dir: PathBuf,
}

impl Layout {
    /// The standard layout below a single root directory.
    pub fn under(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            mirror_dir: root.join("repo"),
            output_dir: root.join("buildoutput"),
            branches_dir: root.join("branches"),
        }
    }

    /// Permanent storage path for one build: `<output_dir>/<branch>-<commit>`.
    pub fn output_path(&self, branch: &str, commit: &str) -> PathBuf {
        self.output_dir.join(format!("{branch}-{commit}"))
    }

    pub fn pointer_path(&self, branch: &str) -> PathBuf {
        self.branches_dir.join(branch)
    }

    /// Advisory lock shared by every process writing to this layout.
    pub fn lock_path(&self) -> PathBuf {
        self.output_dir.with_file_name(LOCK_FILE)
    }

    /// Whether the mirror has been cloned. A pre-created empty dir does not count.
    pub fn mirror_exists(&self) -> bool {
        self.mirror_dir.join(".git").exists()
    }

    /// Creates the three directories if missing (owner-only on unix).
    pub fn ensure(&self) -> io::Result<()> {
        for dir in [&self.mirror_dir, &self.output_dir, &self.branches_dir] {
            create_private_dir(dir)?;
            debug!(path = %dir.display(), "Ensured directory");
        }
        info!(
            mirror = %self.mirror_dir.display(),
            output = %self.output_dir.display(),
            branches = %self.branches_dir.display(),
            "Layout ready"
        );
        Ok(())
    }

    /// Branch whose pointer serves `url_path`: the first path segment when a
    /// pointer of that name resolves to a directory, otherwise [`DEFAULT_BRANCH`].
    pub fn resolve_branch(&self, url_path: &str) -> String {
        let first = url_path.trim_start_matches('/').split('/').next().unwrap_or("");
        let candidate = !first.is_empty() && !first.starts_with('.');
        let live = |branch: &str| {
            fs::metadata(self.pointer_path(branch))
                .map(|m| m.is_dir())
                .unwrap_or(false)
        };
        if candidate && live(first) {
            first.to_string()
        } else {
            DEFAULT_BRANCH.to_string()
        }
    }
}

fn create_private_dir(dir: &Path) -> io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(dir)
}
