//! Real subprocess execution for [`CommandRunner`].
//!
//! Children are spawned directly (no shell) through `tokio::process`, their
//! stdout and stderr are captured, and a child that outlives its
//! [`CommandSpec::timeout`] is killed. On unix each child leads its own
//! process group and the whole group is killed, so helpers it started
//! (`sphinx-build` under `make`, remote helpers under `git`) go with it.

use std::env::JoinPathsError;
use std::ffi::OsString;
use std::io;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::contract::{CommandOutput, CommandRunner, CommandSpec};
use crate::error::ExecError;

/// Runs commands on the local host.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ExecError> {
        let command_line = spec.display();
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.cwd {
            cmd.current_dir(dir);
        }
        if let Some(extra) = &spec.path_append {
            let path = augmented_path(std::env::var_os("PATH"), extra).map_err(|e| ExecError::Launch {
                command: command_line.clone(),
                source: io::Error::new(io::ErrorKind::InvalidInput, e),
            })?;
            cmd.env("PATH", path);
        }
        #[cfg(unix)]
        cmd.process_group(0);

        debug!(command = %command_line, cwd = ?spec.cwd, "Spawning command");
        let child = cmd.spawn().map_err(|source| ExecError::Launch {
            command: command_line.clone(),
            source,
        })?;

        let pid = child.id();

        // Dropping the wait future on timeout kills the child; the rest of its group goes below.
        let waited = match spec.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(waited) => waited,
                Err(_) => {
                    if let Some(pid) = pid {
                        kill_group(pid);
                    }
                    warn!(command = %command_line, timeout = ?limit, "Command timed out, killed");
                    return Err(ExecError::TimedOut {
                        command: command_line,
                        timeout: limit,
                    });
                }
            },
            None => child.wait_with_output().await,
        };
        let output = waited.map_err(|source| ExecError::Launch {
            command: command_line.clone(),
            source,
        })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if output.status.success() {
            debug!(command = %command_line, "Command succeeded");
            Ok(CommandOutput { combined })
        } else {
            Err(ExecError::Failed {
                command: command_line,
                code: output.status.code(),
                output: combined,
            })
        }
    }
}

/// `PATH` with `extra` appended; just `extra` when `PATH` is unset.
///
/// Fails when an entry contains the platform's path separator.
pub fn augmented_path(current: Option<OsString>, extra: &Path) -> Result<OsString, JoinPathsError> {
    let mut dirs: Vec<_> = current
        .as_deref()
        .map(|p| std::env::split_paths(p).collect())
        .unwrap_or_default();
    dirs.push(extra.to_path_buf());
    std::env::join_paths(dirs)
}

/// Kills the process group led by `pid`.
#[cfg(unix)]
fn kill_group(pid: u32) {
    let result = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
    if result != 0 {
        debug!(pid = pid, error = %io::Error::last_os_error(), "Process group already gone");
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: u32) {}
