// The queue worker must run requests one at a time, in submission order.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use branchdocs::contract::BuildRequest;
use branchdocs::pipeline::{Pipeline, RequestReport};
use branchdocs::publish::PublishOutcome;
use branchdocs::queue::{BuildQueue, ReportHook};
use common::{assert_consistent, entries, test_config, FakeRunner};

const REPO: &str = "https://example.com/project-docs.git";

/// Index of the request a logged command belongs to, when it names a branch.
fn owner(entry: &str, branches: &[String]) -> Option<usize> {
    branches.iter().position(|b| {
        entry.ends_with(&format!("refs/heads/{b}"))
            || entry.contains(&format!(" -b {b} "))
            || entry == format!("done {b}")
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn requests_never_interleave_and_keep_submission_order() {
    let tmp = tempfile::tempdir().unwrap();
    let config = test_config(tmp.path());
    config.layout.ensure().unwrap();

    let runner = FakeRunner::with_delay(Duration::from_millis(5));
    let recorder = runner.clone();
    let hook: ReportHook = Box::new(move |report: &RequestReport| {
        recorder.record(format!("done {}", report.request.branch_name()));
    });
    let queue = BuildQueue::start_with_hook(Pipeline::new(&config, runner.clone()), Some(hook));

    let branches: Vec<String> = (0..5).map(|i| format!("b{i}")).collect();
    for (i, branch) in branches.iter().enumerate() {
        queue
            .submit(BuildRequest::new(REPO, format!("refs/heads/{branch}"), format!("c{i}")))
            .await
            .expect("worker accepts requests");
    }
    queue.shutdown().await;

    let owners: Vec<usize> = runner
        .log()
        .iter()
        .filter_map(|entry| owner(entry, &branches))
        .collect();
    let mut sorted = owners.clone();
    sorted.sort();
    assert_eq!(owners, sorted, "phases of different requests interleaved: {:?}", runner.log());
    for i in 0..branches.len() {
        assert!(owners.contains(&i), "request {i} never ran");
    }

    assert_eq!(entries(&config.layout.branches_dir), branches);
    assert_consistent(&config.layout);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_submitters_are_served_one_by_one() {
    let tmp = tempfile::tempdir().unwrap();
    let config = test_config(tmp.path());
    config.layout.ensure().unwrap();

    let runner = FakeRunner::with_delay(Duration::from_millis(2));
    let in_flight = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&in_flight);
    let hook: ReportHook = Box::new(move |report: &RequestReport| {
        let outcome = match &report.outcome {
            Ok(PublishOutcome::Published(_)) => "published",
            Ok(PublishOutcome::Duplicate(_)) => "duplicate",
            Err(_) => "failed",
        };
        sink.lock().unwrap().push(outcome);
    });
    let queue = Arc::new(BuildQueue::start_with_hook(
        Pipeline::new(&config, runner.clone()),
        Some(hook),
    ));

    // Everyone pushes the same commit: exactly one build lands, the rest are duplicates.
    let submissions = (0..6).map(|_| {
        let queue = Arc::clone(&queue);
        async move {
            queue
                .submit(BuildRequest::new(REPO, "refs/heads/master", "abc123"))
                .await
        }
    });
    for result in futures::future::join_all(submissions).await {
        result.expect("submission accepted");
    }
    let queue = Arc::try_unwrap(queue).ok().expect("no other queue handles remain");
    queue.shutdown().await;

    let outcomes = in_flight.lock().unwrap().clone();
    assert_eq!(outcomes.len(), 6);
    assert_eq!(outcomes.iter().filter(|o| **o == "published").count(), 1);
    assert_eq!(outcomes.iter().filter(|o| **o == "duplicate").count(), 5);
    assert_eq!(entries(&config.layout.output_dir), vec!["master-abc123"]);
    assert_consistent(&config.layout);
}

#[tokio::test]
async fn shutdown_waits_for_the_last_taken_request() {
    let tmp = tempfile::tempdir().unwrap();
    let config = test_config(tmp.path());
    config.layout.ensure().unwrap();

    let queue = BuildQueue::start(Pipeline::new(
        &config,
        FakeRunner::with_delay(Duration::from_millis(20)),
    ));
    queue
        .submit(BuildRequest::new(REPO, "refs/heads/master", "abc123"))
        .await
        .expect("worker accepts requests");
    queue.shutdown().await;

    assert_eq!(entries(&config.layout.output_dir), vec!["master-abc123"]);
    assert_consistent(&config.layout);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn submit_waits_while_the_worker_is_busy() {
    let tmp = tempfile::tempdir().unwrap();
    let config = test_config(tmp.path());
    config.layout.ensure().unwrap();

    let runner = FakeRunner::with_delay(Duration::from_millis(40));
    let recorder = runner.clone();
    let hook: ReportHook = Box::new(move |report: &RequestReport| {
        recorder.record(format!("done {}", report.request.branch_name()));
    });
    let queue = Arc::new(BuildQueue::start_with_hook(
        Pipeline::new(&config, runner.clone()),
        Some(hook),
    ));

    queue
        .submit(BuildRequest::new(REPO, "refs/heads/first", "c1"))
        .await
        .expect("worker accepts requests");

    let second = tokio::spawn({
        let queue = Arc::clone(&queue);
        async move {
            queue
                .submit(BuildRequest::new(REPO, "refs/heads/second", "c2"))
                .await
        }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!second.is_finished(), "handoff completed while a build was in flight");

    second.await.unwrap().expect("worker accepts requests");
    assert!(
        runner.log().contains(&"done first".to_string()),
        "second request taken before the first finished: {:?}",
        runner.log()
    );

    let queue = Arc::try_unwrap(queue).ok().expect("no other queue handles remain");
    queue.shutdown().await;
    assert_eq!(entries(&config.layout.branches_dir), vec!["first", "second"]);
}
