// Shared fixtures for the integration tests: a CommandRunner that simulates
// git and the documentation tool on the local filesystem.
#![allow(dead_code)]

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use branchdocs::config::Config;
use branchdocs::contract::{CommandOutput, CommandRunner, CommandSpec};
use branchdocs::error::ExecError;
use branchdocs::layout::Layout;

#[derive(Default)]
pub struct FakeState {
    pub log: Mutex<Vec<String>>,
    branches: Mutex<HashSet<String>>,
    failing: Mutex<HashSet<String>>,
}

/// Simulated git + build tool. Clones create directories, the build tool
/// writes `_build/html/index.html` into its working directory.
#[derive(Clone, Default)]
pub struct FakeRunner {
    pub state: Arc<FakeState>,
    delay: Option<Duration>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Each command sleeps first, to give concurrent work a chance to interleave.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// Make a step fail: a git subcommand ("clone", "fetch", "merge", ...) or the build program.
    pub fn fail(&self, step: &str) {
        self.state.failing.lock().unwrap().insert(step.to_string());
    }

    pub fn heal(&self, step: &str) {
        self.state.failing.lock().unwrap().remove(step);
    }

    pub fn record(&self, entry: impl Into<String>) {
        self.state.log.lock().unwrap().push(entry.into());
    }

    pub fn log(&self) -> Vec<String> {
        self.state.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ExecError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let step = if spec.program == "git" {
            spec.args[0].clone()
        } else {
            spec.program.clone()
        };
        self.record(spec.display());

        if self.state.failing.lock().unwrap().contains(&step) {
            return Err(ExecError::Failed {
                command: spec.display(),
                code: Some(2),
                output: format!("simulated {step} failure"),
            });
        }

        let args = &spec.args;
        match step.as_str() {
            "clone" if args.get(1).map(String::as_str) == Some("-b") => {
                let dest = PathBuf::from(&args[4]);
                fs::create_dir_all(&dest).unwrap();
                fs::write(dest.join("BRANCH"), &args[2]).unwrap();
            }
            "clone" => {
                fs::create_dir_all(PathBuf::from(&args[2]).join(".git")).unwrap();
                self.state.branches.lock().unwrap().insert("master".into());
            }
            "rev-parse" => {
                let branch = args[3].trim_start_matches("refs/heads/");
                if !self.state.branches.lock().unwrap().contains(branch) {
                    return Err(ExecError::Failed {
                        command: spec.display(),
                        code: Some(1),
                        output: String::new(),
                    });
                }
            }
            "checkout" if args[1] == "-b" => {
                self.state.branches.lock().unwrap().insert(args[2].clone());
            }
            "make" => {
                let cwd = spec.cwd.clone().expect("build runs in the working copy");
                let html = cwd.join("_build").join("html");
                fs::create_dir_all(&html).unwrap();
                let branch = fs::read_to_string(cwd.join("BRANCH")).unwrap_or_default();
                fs::write(html.join("index.html"), format!("<h1>{branch}</h1>")).unwrap();
            }
            _ => {}
        }
        Ok(CommandOutput::default())
    }
}

pub fn test_config(root: &Path) -> Config {
    Config::with_root(root, root.join("sphinxenv").join("bin"))
}

pub fn entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<_> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

pub fn pointer_target(layout: &Layout, branch: &str) -> Option<PathBuf> {
    fs::read_link(layout.pointer_path(branch)).ok()
}

/// Every pointer targets an existing storage dir and storage holds nothing else.
pub fn assert_consistent(layout: &Layout) {
    let mut targets = HashSet::new();
    for name in entries(&layout.branches_dir) {
        let target = fs::read_link(layout.pointer_path(&name)).unwrap();
        assert!(target.is_dir(), "pointer {name} dangles at {}", target.display());
        assert_eq!(
            target.parent(),
            Some(layout.output_dir.as_path()),
            "pointer {name} points outside storage"
        );
        targets.insert(target.file_name().unwrap().to_string_lossy().into_owned());
    }
    let stored: HashSet<_> = entries(&layout.output_dir).into_iter().collect();
    assert_eq!(stored, targets, "storage must equal the set of pointer targets");
}
