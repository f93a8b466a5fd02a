//! Builder: renders one branch of the mirror in an isolated working copy.
//!
//! The working copy lives in a [`Workspace`], a temporary directory created
//! inside permanent storage (so the later rename is a same-filesystem move)
//! under a dot-prefixed name. Dropping the workspace removes it, whichever
//! way the request ends. A leftover from a crash is just an unreferenced
//! entry in storage and goes away on the next collection pass.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, error, info};

use crate::config::{BuildToolConfig, GitConfig};
use crate::contract::{BuildRequest, CommandRunner, CommandSpec};
use crate::error::PipelineError;
use crate::layout::Layout;

/// Name prefix of in-progress working copies inside permanent storage.
pub const WORKSPACE_PREFIX: &str = ".build-";

/// An ephemeral working copy holding freshly rendered output.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
    rendered: PathBuf,
}

impl Workspace {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// The tool's rendered-HTML directory inside the working copy.
    pub fn rendered(&self) -> &Path {
        &self.rendered
    }
}

pub struct Builder {
    layout: Layout,
    git: GitConfig,
    tool: BuildToolConfig,
}

impl Builder {
    pub fn new(layout: &Layout, git: &GitConfig, tool: &BuildToolConfig) -> Self {
        Self {
            layout: layout.clone(),
            git: git.clone(),
            tool: tool.clone(),
        }
    }

    pub async fn build<R>(&self, runner: &R, request: &BuildRequest) -> Result<Workspace, PipelineError>
    where
        R: CommandRunner + ?Sized,
    {
        let branch = request.branch_name();
        let dir = tempfile::Builder::new()
            .prefix(WORKSPACE_PREFIX)
            .tempdir_in(&self.layout.output_dir)
            .map_err(|source| {
                error!(error = ?source, path = %self.layout.output_dir.display(), "[BUILD][ERROR] Unable to create working directory");
                PipelineError::Workspace {
                    path: self.layout.output_dir.clone(),
                    source,
                }
            })?;
        let checkout = dir.path().join("repo");

        let clone = CommandSpec::new(self.git.program.clone(), ["clone", "-b", branch])
            .path_arg(&self.layout.mirror_dir)
            .path_arg(&checkout)
            .timeout(self.git.timeout());
        if let Err(source) = runner.run(&clone).await {
            error!(
                branch = branch,
                command = %clone.display(),
                error = %source,
                output = %source.output(),
                "[BUILD][ERROR] Unable to clone mirror into working copy"
            );
            return Err(PipelineError::Build { step: "clone", source });
        }

        let render = CommandSpec::new(self.tool.program.clone(), self.tool.args.clone())
            .current_dir(&checkout)
            .append_path(&self.tool.tool_path)
            .timeout(self.tool.timeout());
        info!(branch = branch, command = %render.display(), "[BUILD] Running documentation build");
        match runner.run(&render).await {
            Ok(out) => {
                debug!(branch = branch, output = %out.combined, "[BUILD] Build tool output");
            }
            Err(source) => {
                error!(
                    branch = branch,
                    command = %render.display(),
                    error = %source,
                    output = %source.output(),
                    "[BUILD][ERROR] Documentation build failed"
                );
                return Err(PipelineError::Build { step: "render", source });
            }
        }

        let rendered = checkout.join(&self.tool.output_subdir);
        if !rendered.is_dir() {
            error!(branch = branch, path = %rendered.display(), "[BUILD][ERROR] Build tool left no rendered output");
            return Err(PipelineError::MissingOutput(rendered));
        }

        info!(branch = branch, path = %rendered.display(), "[BUILD] Build finished");
        Ok(Workspace { dir, rendered })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{CommandOutput, MockCommandRunner};
    use crate::error::ExecError;

    fn setup() -> (tempfile::TempDir, Layout, Builder) {
        let tmp = tempfile::tempdir().unwrap();
        let layout = Layout::under(tmp.path());
        layout.ensure().unwrap();
        let builder = Builder::new(
            &layout,
            &GitConfig::default(),
            &BuildToolConfig::with_tool_path("/opt/sphinxenv/bin"),
        );
        (tmp, layout, builder)
    }

    fn storage_entries(layout: &Layout) -> usize {
        std::fs::read_dir(&layout.output_dir).unwrap().count()
    }

    #[tokio::test]
    async fn failed_build_removes_working_copy() {
        let (_tmp, layout, builder) = setup();
        let mut runner = MockCommandRunner::new();
        runner.expect_run().returning(|spec| {
            if spec.program == "make" {
                assert_eq!(spec.path_append.as_deref(), Some(Path::new("/opt/sphinxenv/bin")));
                Err(ExecError::Failed {
                    command: spec.display(),
                    code: Some(2),
                    output: "Sphinx error".into(),
                })
            } else {
                Ok(CommandOutput::default())
            }
        });

        let req = BuildRequest::new("r", "refs/heads/master", "abc");
        let err = builder.build(&runner, &req).await.unwrap_err();
        assert!(matches!(err, PipelineError::Build { step: "render", .. }), "{err:?}");
        assert_eq!(storage_entries(&layout), 0, "working copy must not survive");
    }

    #[tokio::test]
    async fn successful_tool_without_output_is_missing_output() {
        let (_tmp, layout, builder) = setup();
        let mut runner = MockCommandRunner::new();
        runner.expect_run().returning(|_| Ok(CommandOutput::default()));

        let req = BuildRequest::new("r", "refs/heads/master", "abc");
        let err = builder.build(&runner, &req).await.unwrap_err();
        assert!(matches!(err, PipelineError::MissingOutput(_)), "{err:?}");
        assert_eq!(storage_entries(&layout), 0);
    }

    #[tokio::test]
    async fn workspace_is_removed_on_drop() {
        let (_tmp, layout, builder) = setup();
        let mut runner = MockCommandRunner::new();
        runner.expect_run().returning(|spec| {
            if spec.program == "make" {
                let cwd = spec.cwd.clone().expect("build runs inside the checkout");
                std::fs::create_dir_all(cwd.join("_build/html")).unwrap();
                std::fs::write(cwd.join("_build/html/index.html"), "<h1>docs</h1>").unwrap();
            }
            Ok(CommandOutput::default())
        });

        let req = BuildRequest::new("r", "refs/heads/master", "abc");
        let workspace = builder.build(&runner, &req).await.expect("build should succeed");
        assert!(workspace.rendered().join("index.html").is_file());
        let name = workspace.path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(WORKSPACE_PREFIX));

        drop(workspace);
        assert_eq!(storage_entries(&layout), 0);
    }
}
