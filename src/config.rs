// branchdocs/src/config.rs

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

use crate::layout::Layout;

/// Resolved configuration handed to every component at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub layout: Layout,
    pub git: GitConfig,
    pub build: BuildToolConfig,
}

impl Config {
    /// Defaults below `root`, with the build tool expected in `tool_path`.
    pub fn with_root(root: impl Into<PathBuf>, tool_path: impl Into<PathBuf>) -> Self {
        Self {
            layout: Layout::under(root.into()),
            git: GitConfig::default(),
            build: BuildToolConfig::with_tool_path(tool_path),
        }
    }

    pub fn trace_loaded(&self) {
        info!(
            mirror = %self.layout.mirror_dir.display(),
            output = %self.layout.output_dir.display(),
            branches = %self.layout.branches_dir.display(),
            build_program = %self.build.program,
            "Loaded Config"
        );
        debug!(?self, "Config loaded (full debug)");
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitConfig {
    pub program: String,
    /// Limit for any single git invocation; `None` waits forever.
    pub timeout_secs: Option<u64>,
}

impl GitConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            program: "git".to_string(),
            timeout_secs: Some(600),
        }
    }
}

/// The external documentation build tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildToolConfig {
    pub program: String,
    pub args: Vec<String>,
    /// Where the tool leaves rendered HTML, relative to the working copy.
    pub output_subdir: PathBuf,
    /// Appended to `PATH` when running the tool.
    pub tool_path: PathBuf,
    pub timeout_secs: Option<u64>,
}

impl BuildToolConfig {
    pub fn with_tool_path(tool_path: impl Into<PathBuf>) -> Self {
        Self {
            program: "make".to_string(),
            args: vec!["html".to_string()],
            output_subdir: PathBuf::from("_build").join("html"),
            tool_path: tool_path.into(),
            timeout_secs: Some(1800),
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}
