//! High-level pipeline: orchestrates sync → build → publish → collect for one request.
//!
//! # Responsibilities
//! - Fail-fast orchestration: the first failing stage aborts the request
//! - Garbage collection runs afterwards regardless of the request's outcome
//! - Every outcome is logged; nothing is reported back to the trigger
//!
//! # Callable From
//! - The [`crate::queue::BuildQueue`] worker, which guarantees one request at a time
//! - Integration tests, directly
//!
//! # Error Handling
//! Stage failures come back as [`PipelineError`] inside the [`RequestReport`];
//! they never escape as panics and never affect the next request.

use tracing::{error, info, info_span, Instrument};

use crate::builder::Builder;
use crate::collect::{collect, CollectReport};
use crate::config::Config;
use crate::contract::{BuildRequest, CommandRunner};
use crate::error::{CollectError, PipelineError};
use crate::layout::Layout;
use crate::mirror::SourceSync;
use crate::publish::{PublishOutcome, Publisher};

/// What happened to one request, for logs and tests.
#[derive(Debug)]
pub struct RequestReport {
    pub request: BuildRequest,
    pub outcome: Result<PublishOutcome, PipelineError>,
    pub collected: Result<CollectReport, CollectError>,
}

pub struct Pipeline<R> {
    runner: R,
    layout: Layout,
    sync: SourceSync,
    builder: Builder,
    publisher: Publisher,
}

impl<R: CommandRunner> Pipeline<R> {
    pub fn new(config: &Config, runner: R) -> Self {
        Self {
            runner,
            layout: config.layout.clone(),
            sync: SourceSync::new(&config.layout, &config.git),
            builder: Builder::new(&config.layout, &config.git, &config.build),
            publisher: Publisher::new(&config.layout),
        }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Processes one request end to end, then collects garbage.
    pub async fn handle(&self, request: BuildRequest) -> RequestReport {
        let span = info_span!(
            "build_request",
            reference = %request.reference,
            commit = %request.commit
        );
        async {
            info!(
                reference = %request.reference,
                branch = request.branch_name(),
                "Requested build of ref"
            );
            let outcome = self.process(&request).await;
            match &outcome {
                Ok(PublishOutcome::Published(path)) => {
                    info!(path = %path.display(), "Request completed, new build published")
                }
                Ok(PublishOutcome::Duplicate(path)) => {
                    info!(path = %path.display(), "Request completed, build already published")
                }
                Err(e) => error!(error = %e, "Request aborted"),
            }

            let collected = collect(&self.layout);
            if let Err(e) = &collected {
                error!(error = %e, "[GC][ERROR] Collection pass aborted");
            }

            RequestReport {
                request,
                outcome,
                collected,
            }
        }
        .instrument(span)
        .await
    }

    /// Sync, build and publish; the working copy is gone when this returns.
    pub async fn process(&self, request: &BuildRequest) -> Result<PublishOutcome, PipelineError> {
        validate(request)?;
        self.sync.sync(&self.runner, request).await?;
        let workspace = self.builder.build(&self.runner, request).await?;
        self.publisher.publish(workspace.rendered(), request)
    }
}

/// Rejects requests whose names would escape or collide in the layout.
fn validate(request: &BuildRequest) -> Result<(), PipelineError> {
    let branch = request.branch_name();
    let problem = if request.repository_url.is_empty() {
        Some("repository url is empty".to_string())
    } else if branch.is_empty() || branch.starts_with('.') {
        Some(format!("unusable branch name {branch:?} in reference {:?}", request.reference))
    } else if request.commit.is_empty() || request.commit.contains(['/', '\\']) {
        Some(format!("unusable commit {:?}", request.commit))
    } else {
        None
    };
    match problem {
        Some(msg) => {
            error!(reason = %msg, "Rejected build request");
            Err(PipelineError::InvalidRequest(msg))
        }
        None => Ok(()),
    }
}
