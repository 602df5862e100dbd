//! Custom test assertions for integration tests

use release_archivist::{EntityLink, Event, Pipeline, TaskId};
use std::time::Duration;

/// Result of waiting for a task to finish
#[derive(Debug)]
pub enum WaitResult {
    /// Task completed with these entity links
    Completed(Vec<EntityLink>),
    /// Task failed with error message and code
    Failed { error: String, code: String },
    /// Timeout waiting for a terminal event
    Timeout,
    /// Channel closed unexpectedly
    ChannelClosed,
}

/// Wait for a task to reach a terminal state
///
/// Subscribe before submitting so the terminal event cannot be missed; pass
/// the receiver in here.
pub async fn wait_for_task(
    events: &mut tokio::sync::broadcast::Receiver<Event>,
    id: &TaskId,
    timeout: Duration,
) -> WaitResult {
    let result = tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(Event::TaskCompleted { id: event_id, links }) if &event_id == id => {
                    return WaitResult::Completed(links);
                }
                Ok(Event::TaskFailed {
                    id: event_id,
                    error,
                    code,
                }) if &event_id == id => {
                    return WaitResult::Failed { error, code };
                }
                Ok(_) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(_) => return WaitResult::ChannelClosed,
            }
        }
    })
    .await;

    result.unwrap_or(WaitResult::Timeout)
}

/// Submit `release` and wait until its task finishes
pub async fn run_release(
    pipeline: &Pipeline,
    release: release_archivist::Release,
) -> (TaskId, WaitResult) {
    let mut events = pipeline.subscribe();
    let id = pipeline
        .submit(release)
        .await
        .expect("Failed to submit release");
    let result = wait_for_task(&mut events, &id, Duration::from_secs(60)).await;
    (id, result)
}

/// Assert that a task completed and return its links
pub fn assert_completed(result: WaitResult) -> Vec<EntityLink> {
    match result {
        WaitResult::Completed(links) => links,
        other => panic!("expected completion, got {:?}", other),
    }
}
