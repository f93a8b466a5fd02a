//! # contract: shared request types and the subprocess seam
//!
//! This module defines the data handed from the intake side to the build
//! worker ([`BuildRequest`]) and the single trait every external command goes
//! through ([`CommandRunner`]).
//!
//! ## Interface & Extensibility
//! - Implement [`CommandRunner`] to run commands somewhere else (a container,
//!   a remote host) or to simulate git and the build tool in tests.
//! - Commands are described by [`CommandSpec`]: an explicit argument vector,
//!   never a shell string.
//!
//! ## Mocking & Testing
//! - The trait is annotated for `mockall` so consumers can generate
//!   deterministic mocks (`MockCommandRunner`) for unit/integration tests.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use mockall::automock;

use crate::error::ExecError;

/// A request to build and publish one reference of the tracked repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    /// Full reference as sent by the trigger, e.g. `refs/heads/master`.
    pub reference: String,
    /// URL the mirror is cloned and fetched from.
    pub repository_url: String,
    /// Commit id the reference pointed at when the trigger fired.
    pub commit: String,
}

impl BuildRequest {
    pub fn new(
        repository_url: impl Into<String>,
        reference: impl Into<String>,
        commit: impl Into<String>,
    ) -> Self {
        Self {
            reference: reference.into(),
            repository_url: repository_url.into(),
            commit: commit.into(),
        }
    }

    /// Branch name derived from the reference: its last `/`-separated segment.
    pub fn branch_name(&self) -> &str {
        branch_name(&self.reference)
    }
}

/// Last path segment of a reference (`refs/heads/foo` -> `foo`).
pub fn branch_name(reference: &str) -> &str {
    reference.rsplit('/').next().unwrap_or(reference)
}

/// One external command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Working directory; inherits the daemon's when `None`.
    pub cwd: Option<PathBuf>,
    /// Directory appended to the inherited `PATH`.
    pub path_append: Option<PathBuf>,
    /// Upper bound on wall-clock time before the child is killed.
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            cwd: None,
            path_append: None,
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy().into_owned())
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn append_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.path_append = Some(dir.into());
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Human-readable command line, for logs only.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of a command that exited successfully.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// stdout followed by stderr.
    pub combined: String,
}

/// Trait for running external commands (git, the documentation build tool).
///
/// Implementors must treat a non-zero exit as [`ExecError::Failed`] and carry
/// the captured output along so callers can log it.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ExecError>;
}
