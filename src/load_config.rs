/// `load_config` module: Loads a static YAML config file and resolves it into the internal [`Config`].
///
/// This is the only place where user-supplied YAML is parsed. Every key is optional;
/// missing values fall back to the standard layout below a root directory.
///
/// # Root resolution
/// 1. `root:` in the file
/// 2. the `BRANCHDOCS_HOME` environment variable
/// 3. `$HOME/.sphinxsrv`
///
/// `mirror_dir`, `output_dir` and `branches_dir` override the individual directories.
/// A `timeout_secs` of `0` disables the limit for that tool.
///
/// # Errors
/// All errors in this module use `anyhow::Error` for context-rich diagnostics, and are surfaced at the CLI boundary.
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use crate::config::{BuildToolConfig, Config, GitConfig};
use crate::layout::Layout;

pub const HOME_ENV: &str = "BRANCHDOCS_HOME";

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    root: Option<PathBuf>,
    mirror_dir: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    branches_dir: Option<PathBuf>,
    #[serde(default)]
    git: RawGit,
    #[serde(default)]
    build: RawBuild,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawGit {
    program: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawBuild {
    program: Option<String>,
    args: Option<Vec<String>>,
    output_subdir: Option<PathBuf>,
    tool_path: Option<PathBuf>,
    timeout_secs: Option<u64>,
}

/// Loads a YAML config file and resolves defaults from the environment.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    parse_config(&config_content)
}

/// Resolves a config from YAML text. Empty text yields the all-default config.
pub fn parse_config(yaml: &str) -> Result<Config> {
    let raw: RawConfig = if yaml.trim().is_empty() {
        RawConfig::default()
    } else {
        match serde_yaml::from_str(yaml) {
            Ok(conf) => conf,
            Err(e) => {
                error!(error = ?e, "Failed to parse config YAML");
                return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
            }
        }
    };

    let root = match raw.root {
        Some(root) => root,
        None => default_root()?,
    };
    let standard = Layout::under(&root);
    let layout = Layout {
        mirror_dir: raw.mirror_dir.unwrap_or(standard.mirror_dir),
        output_dir: raw.output_dir.unwrap_or(standard.output_dir),
        branches_dir: raw.branches_dir.unwrap_or(standard.branches_dir),
    };

    let git_defaults = GitConfig::default();
    let git = GitConfig {
        program: raw.git.program.unwrap_or(git_defaults.program),
        timeout_secs: resolve_timeout(raw.git.timeout_secs, git_defaults.timeout_secs),
    };

    let tool_path = match raw.build.tool_path {
        Some(path) => path,
        None => home_dir()
            .context("build.tool_path not set and HOME is unavailable")?
            .join("sphinxenv")
            .join("bin"),
    };
    let build_defaults = BuildToolConfig::with_tool_path(tool_path);
    let build = BuildToolConfig {
        program: raw.build.program.unwrap_or(build_defaults.program),
        args: raw.build.args.unwrap_or(build_defaults.args),
        output_subdir: raw.build.output_subdir.unwrap_or(build_defaults.output_subdir),
        tool_path: build_defaults.tool_path,
        timeout_secs: resolve_timeout(raw.build.timeout_secs, build_defaults.timeout_secs),
    };

    if build.output_subdir.is_absolute() {
        anyhow::bail!(
            "build.output_subdir must be relative to the working copy, got {:?}",
            build.output_subdir
        );
    }

    let config = Config { layout, git, build };
    config.trace_loaded();
    Ok(config)
}

fn resolve_timeout(configured: Option<u64>, default: Option<u64>) -> Option<u64> {
    match configured {
        Some(0) => None,
        Some(secs) => Some(secs),
        None => default,
    }
}

fn default_root() -> Result<PathBuf> {
    if let Some(home) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(home));
    }
    let home = home_dir().with_context(|| format!("neither root, {HOME_ENV} nor HOME is set"))?;
    Ok(home.join(".sphinxsrv"))
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}
