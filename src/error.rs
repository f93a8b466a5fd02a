//! Error types for the build pipeline.
//!
//! Library code returns these `thiserror` enums; the CLI wraps them with
//! `anyhow` at the boundary. None of them ever stops the build worker: a
//! failure aborts the current request (or collection pass) only.

use std::path::PathBuf;
use std::time::Duration;

/// Failure running an external command.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    /// The process could not be spawned at all.
    #[error("failed to launch `{command}`: {source}")]
    Launch {
        command: String,
        source: std::io::Error,
    },

    /// The process ran and exited unsuccessfully.
    #[error("`{command}` exited with {}", exit_label(.code))]
    Failed {
        command: String,
        code: Option<i32>,
        output: String,
    },

    /// The process exceeded its time budget and was killed.
    #[error("`{command}` timed out after {timeout:?}")]
    TimedOut { command: String, timeout: Duration },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

impl ExecError {
    /// Captured output, when the command got far enough to produce any.
    pub fn output(&self) -> &str {
        match self {
            ExecError::Failed { output, .. } => output,
            _ => "",
        }
    }
}

/// Failure processing one build request.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid build request: {0}")]
    InvalidRequest(String),

    /// clone / fetch / merge of the source mirror.
    #[error("source sync failed during {step}: {source}")]
    Sync {
        step: &'static str,
        #[source]
        source: ExecError,
    },

    /// The ephemeral working copy could not be prepared.
    #[error("unable to prepare working copy at {path:?}: {source}")]
    Workspace {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Cloning the mirror or running the documentation tool failed.
    #[error("build failed during {step}: {source}")]
    Build {
        step: &'static str,
        #[source]
        source: ExecError,
    },

    /// The build tool succeeded but left no rendered output behind.
    #[error("build produced no output at {0:?}")]
    MissingOutput(PathBuf),

    /// Moving the rendered output into permanent storage failed.
    #[error("unable to move {from:?} into permanent storage at {to:?}: {source}")]
    Publish {
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },

    /// Creating or swapping the branch pointer failed.
    #[error("unable to update pointer for branch {branch}: {source}")]
    Pointer {
        branch: String,
        source: std::io::Error,
    },
}

/// Failure during a garbage-collection pass.
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    /// Listing pointers or storage failed; nothing was deleted.
    #[error("unable to enumerate {path:?}: {source}")]
    Enumerate {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A deletion failed; remaining deletions for this pass were skipped.
    #[error("unable to remove {path:?}: {source}")]
    Delete {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("build worker is no longer running")]
    Closed,
}

/// Failure of the long-running payload intake.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("unable to read push payloads: {0}")]
    Read(#[from] std::io::Error),
    #[error(transparent)]
    Queue(#[from] QueueError),
}
