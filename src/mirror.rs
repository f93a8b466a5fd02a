//! Source synchronization: keeps the persistent mirror of the tracked
//! repository fast-forwarded to the requested reference.
//!
//! Sequence for one request:
//! 1. `git clone <url> <mirror>` when the mirror has never been cloned
//! 2. `git fetch <url> <reference>`
//! 3. switch the mirror's checkout to the branch (created from `FETCH_HEAD` if new)
//! 4. `git merge --ff-only FETCH_HEAD`; anything but a fast-forward fails the request
//!
//! Only the build worker calls this, so the mirror never has two writers.

use tracing::{error, info};

use crate::config::GitConfig;
use crate::contract::{BuildRequest, CommandRunner, CommandSpec};
use crate::error::{ExecError, PipelineError};
use crate::layout::Layout;

pub struct SourceSync {
    layout: Layout,
    git: GitConfig,
}

impl SourceSync {
    pub fn new(layout: &Layout, git: &GitConfig) -> Self {
        Self {
            layout: layout.clone(),
            git: git.clone(),
        }
    }

    fn git<I, S>(&self, args: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CommandSpec::new(self.git.program.clone(), args).timeout(self.git.timeout())
    }

    fn in_mirror(&self, spec: CommandSpec) -> CommandSpec {
        spec.current_dir(&self.layout.mirror_dir)
    }

    pub async fn sync<R>(&self, runner: &R, request: &BuildRequest) -> Result<(), PipelineError>
    where
        R: CommandRunner + ?Sized,
    {
        let branch = request.branch_name();

        if !self.layout.mirror_exists() {
            info!(
                repo_url = %request.repository_url,
                path = %self.layout.mirror_dir.display(),
                "[SYNC] Mirror missing, cloning"
            );
            let clone = self
                .git(["clone", request.repository_url.as_str()])
                .path_arg(&self.layout.mirror_dir);
            run_step(runner, "clone", &clone).await?;
        }

        let fetch = self.in_mirror(self.git([
            "fetch",
            request.repository_url.as_str(),
            request.reference.as_str(),
        ]));
        run_step(runner, "fetch", &fetch).await?;

        let local_ref = format!("refs/heads/{branch}");
        let verify = self.in_mirror(self.git(["rev-parse", "--verify", "--quiet", local_ref.as_str()]));
        let checkout = match runner.run(&verify).await {
            Ok(_) => self.in_mirror(self.git(["checkout", branch, "--"])),
            Err(ExecError::Failed { .. }) => {
                info!(branch = branch, "[SYNC] Creating mirror branch from fetched reference");
                self.in_mirror(self.git(["checkout", "-b", branch, "FETCH_HEAD"]))
            }
            Err(e) => return Err(step_failed("rev-parse", &verify, e)),
        };
        run_step(runner, "checkout", &checkout).await?;

        let merge = self.in_mirror(self.git(["merge", "--ff-only", "FETCH_HEAD"]));
        run_step(runner, "merge", &merge).await?;

        info!(
            reference = %request.reference,
            branch = branch,
            "[SYNC] Mirror up to date"
        );
        Ok(())
    }
}

async fn run_step<R>(runner: &R, step: &'static str, spec: &CommandSpec) -> Result<(), PipelineError>
where
    R: CommandRunner + ?Sized,
{
    runner
        .run(spec)
        .await
        .map(|_| ())
        .map_err(|e| step_failed(step, spec, e))
}

fn step_failed(step: &'static str, spec: &CommandSpec, source: ExecError) -> PipelineError {
    error!(
        step = step,
        command = %spec.display(),
        error = %source,
        output = %source.output(),
        "[SYNC][ERROR] git step failed"
    );
    PipelineError::Sync { step, source }
}
