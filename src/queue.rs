//! BuildQueue: the single worker that owns every filesystem and subprocess
//! mutation.
//!
//! Intake is a rendezvous: [`BuildQueue::submit`] resolves once the worker
//! has taken the request, so a caller waits while a build is in flight and
//! nothing queues up beyond requests already waiting to be taken. Requests
//! are taken in submission order and each one runs to completion, garbage
//! collection included, before the next is taken.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::contract::{BuildRequest, CommandRunner};
use crate::error::QueueError;
use crate::pipeline::{Pipeline, RequestReport};

type Job = (BuildRequest, oneshot::Sender<()>);

/// Observer invoked by the worker after each request; tests use it to
/// inspect outcomes.
pub type ReportHook = Box<dyn Fn(&RequestReport) + Send + Sync>;

pub struct BuildQueue {
    intake: mpsc::Sender<Job>,
    worker: JoinHandle<()>,
}

impl BuildQueue {
    /// Spawns the worker. Call once at startup, before any trigger is accepted.
    pub fn start<R>(pipeline: Pipeline<R>) -> Self
    where
        R: CommandRunner + 'static,
    {
        Self::start_with_hook(pipeline, None)
    }

    pub fn start_with_hook<R>(pipeline: Pipeline<R>, hook: Option<ReportHook>) -> Self
    where
        R: CommandRunner + 'static,
    {
        // Capacity 1 is the smallest tokio allows; the ack below makes the
        // handoff a rendezvous regardless.
        let (intake, mut jobs) = mpsc::channel::<Job>(1);
        let pipeline = Arc::new(pipeline);
        let worker = tokio::spawn(async move {
            info!("[QUEUE] Build worker ready for duty");
            while let Some((request, accepted)) = jobs.recv().await {
                let _ = accepted.send(());
                let report = pipeline.handle(request).await;
                if let Some(hook) = &hook {
                    hook(&report);
                }
            }
            info!("[QUEUE] Intake closed, build worker exiting");
        });
        Self { intake, worker }
    }

    /// Hands `request` to the worker, waiting until the worker takes it.
    pub async fn submit(&self, request: BuildRequest) -> Result<(), QueueError> {
        let (accepted, taken) = oneshot::channel();
        info!(reference = %request.reference, commit = %request.commit, "[QUEUE] Submitting build request");
        self.intake
            .send((request, accepted))
            .await
            .map_err(|_| QueueError::Closed)?;
        taken.await.map_err(|_| QueueError::Closed)
    }

    /// Closes intake and waits for the in-flight request to finish.
    pub async fn shutdown(self) {
        drop(self.intake);
        if let Err(e) = self.worker.await {
            error!(error = ?e, "[QUEUE][ERROR] Build worker terminated abnormally");
        }
    }
}
