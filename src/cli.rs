///
/// This module implements the CLI surface for branchdocs: command parsing and the
/// glue that wires a loaded [`Config`] into the build queue.
///
/// All pipeline logic lives in the library modules; this module only constructs
/// them, submits work and turns outcomes into an exit status.
///
/// Every command that writes to the layout first takes its advisory lock, so
/// concurrent invocations run one after another instead of interleaving.
///
/// ## Commands
/// - `init`: create the mirror, storage and pointer directories
/// - `build`: run one build request through the queue
/// - `hook`: decode push-event payload files and submit each as a request
/// - `serve`: run one worker for newline-delimited payloads read from stdin
/// - `collect`: run one garbage-collection pass
/// - `resolve`: print the branch pointer that would serve a URL path
use crate::config::Config;
use crate::contract::BuildRequest;
use crate::exec::ProcessRunner;
use crate::hook::{feed, request_from_payload};
use crate::load_config::{load_config, parse_config};
use crate::lock::RootLock;
use crate::pipeline::{Pipeline, RequestReport};
use crate::queue::{BuildQueue, ReportHook};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::io::BufReader;

/// CLI for branchdocs: publish per-branch documentation builds.
#[derive(Parser)]
#[clap(
    name = "branchdocs",
    version,
    about = "Build, publish and garbage-collect per-branch documentation"
)]
pub struct Cli {
    /// Path to the YAML config file; defaults apply when omitted
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the mirror, build output and branch pointer directories
    Init,
    /// Sync, build and publish one reference, then collect stale outputs
    Build {
        /// Reference to build, e.g. refs/heads/master
        #[clap(long)]
        reference: String,
        /// Repository URL to clone and fetch from
        #[clap(long)]
        repo: String,
        /// Commit the reference points at
        #[clap(long)]
        commit: String,
    },
    /// Submit push-event payload files ("-" reads stdin)
    Hook {
        #[clap(required = true)]
        payloads: Vec<PathBuf>,
    },
    /// Read push-event payloads from stdin, one JSON object per line, until EOF
    Serve,
    /// Delete build outputs no branch pointer references
    Collect,
    /// Print the branch pointer that serves a URL path
    Resolve { path: String },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => parse_config("")?,
    };

    match cli.command {
        Commands::Init => {
            config.layout.ensure().context("unable to create directories")?;
            println!("Initialised {}", config.layout.output_dir.display());
            Ok(())
        }
        Commands::Build {
            reference,
            repo,
            commit,
        } => {
            tracing::info!(command = "build", "Starting build");
            run_requests(&config, vec![BuildRequest::new(repo, reference, commit)]).await
        }
        Commands::Hook { payloads } => {
            let mut requests = Vec::new();
            for path in payloads {
                let payload = read_payload(&path)?;
                match request_from_payload(&payload)
                    .with_context(|| format!("invalid push payload in {}", path.display()))?
                {
                    Some(request) => requests.push(request),
                    None => println!("Ignored {}: no ref or repository url", path.display()),
                }
            }
            run_requests(&config, requests).await
        }
        Commands::Serve => {
            let _lock = lock_layout(&config).await?;
            let hook: ReportHook = Box::new(print_published);
            let queue =
                BuildQueue::start_with_hook(Pipeline::new(&config, ProcessRunner::new()), Some(hook));
            let fed = feed(&queue, BufReader::new(tokio::io::stdin())).await;
            queue.shutdown().await;
            let summary = fed?;
            println!(
                "Submitted {} request(s), ignored {}, discarded {} malformed",
                summary.submitted, summary.ignored, summary.malformed
            );
            Ok(())
        }
        Commands::Collect => {
            let _lock = lock_layout(&config).await?;
            let report = crate::collect::collect(&config.layout)?;
            for path in &report.deleted {
                println!("Deleted {}", path.display());
            }
            println!("Kept {} active build output(s)", report.active.len());
            Ok(())
        }
        Commands::Resolve { path } => {
            let branch = config.layout.resolve_branch(&path);
            println!("{}", config.layout.pointer_path(&branch).display());
            Ok(())
        }
    }
}

/// Runs requests through a fresh queue and fails if any of them failed.
async fn run_requests(config: &Config, requests: Vec<BuildRequest>) -> Result<()> {
    if requests.is_empty() {
        return Ok(());
    }
    let _lock = lock_layout(config).await?;

    let failures = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&failures);
    let hook: ReportHook = Box::new(move |report: &RequestReport| {
        let failed = match (&report.outcome, &report.collected) {
            (Err(e), _) => Some(e.to_string()),
            (Ok(_), Err(e)) => Some(e.to_string()),
            (Ok(_), Ok(_)) => {
                print_published(report);
                None
            }
        };
        if let Some(reason) = failed {
            if let Ok(mut failures) = sink.lock() {
                failures.push(format!("{}: {reason}", report.request.reference));
            }
        }
    });

    let queue = BuildQueue::start_with_hook(Pipeline::new(config, ProcessRunner::new()), Some(hook));
    for request in requests {
        queue.submit(request).await?;
    }
    queue.shutdown().await;

    let failures = failures
        .lock()
        .map_err(|_| anyhow::anyhow!("failure log poisoned"))?;
    if failures.is_empty() {
        Ok(())
    } else {
        anyhow::bail!("{} request(s) failed:\n{}", failures.len(), failures.join("\n"))
    }
}

/// Creates the layout if needed and waits for its lock.
async fn lock_layout(config: &Config) -> Result<RootLock> {
    config.layout.ensure().context("unable to create directories")?;
    let path = config.layout.lock_path();
    RootLock::acquire(&path)
        .await
        .with_context(|| format!("unable to lock {}", path.display()))
}

fn print_published(report: &RequestReport) {
    if let Ok(outcome) = &report.outcome {
        println!("{} -> {}", report.request.reference, outcome.path().display());
    }
}

fn read_payload(path: &PathBuf) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut payload = String::new();
        std::io::stdin()
            .read_to_string(&mut payload)
            .context("unable to read payload from stdin")?;
        Ok(payload)
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("unable to read payload {}", path.display()))
    }
}
