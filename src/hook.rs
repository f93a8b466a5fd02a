//! Push-event intake: turns a repository push notification payload into a
//! [`BuildRequest`].
//!
//! Only the fields the builder needs are decoded. HTTP transport and sender
//! allow-listing stay with whatever receives the notification.
//!
//! [`feed`] is the long-running intake: one payload per line, each handed
//! to the single [`BuildQueue`] worker.

use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info, warn};

use crate::contract::BuildRequest;
use crate::error::FeedError;
use crate::queue::BuildQueue;

#[derive(Debug, Clone, Deserialize)]
pub struct PushEvent {
    #[serde(rename = "ref", default)]
    pub reference: String,
    /// Commit the reference points at after the push.
    #[serde(default)]
    pub after: String,
    #[serde(default)]
    pub repository: Repository,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Repository {
    #[serde(default)]
    pub url: String,
}

impl PushEvent {
    pub fn from_json(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }

    /// The build request for this push, or `None` when the payload names no
    /// reference or repository (e.g. a ping).
    pub fn into_request(self) -> Option<BuildRequest> {
        if self.reference.is_empty() || self.repository.url.is_empty() {
            debug!(?self, "Ignoring push event without ref or repository url");
            return None;
        }
        info!(
            reference = %self.reference,
            repo_url = %self.repository.url,
            commit = %self.after,
            "Accepted push event"
        );
        Some(BuildRequest::new(self.repository.url, self.reference, self.after))
    }
}

/// Decodes a payload straight into a request.
pub fn request_from_payload(payload: &str) -> Result<Option<BuildRequest>, serde_json::Error> {
    Ok(PushEvent::from_json(payload)?.into_request())
}

/// Counts of what [`feed`] did with its input lines.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FeedSummary {
    pub submitted: usize,
    pub ignored: usize,
    pub malformed: usize,
}

/// Submits every newline-delimited push payload from `input` until EOF.
///
/// Malformed lines and pings are logged and skipped; each submission waits
/// for the worker to take the request.
pub async fn feed<I>(queue: &BuildQueue, input: I) -> Result<FeedSummary, FeedError>
where
    I: AsyncBufRead + Unpin,
{
    let mut summary = FeedSummary::default();
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match request_from_payload(line) {
            Ok(Some(request)) => {
                queue.submit(request).await?;
                summary.submitted += 1;
            }
            Ok(None) => summary.ignored += 1,
            Err(e) => {
                warn!(error = %e, "[INTAKE] Discarding malformed push payload");
                summary.malformed += 1;
            }
        }
    }
    info!(
        submitted = summary.submitted,
        ignored = summary.ignored,
        malformed = summary.malformed,
        "[INTAKE] Payload stream closed"
    );
    Ok(summary)
}
