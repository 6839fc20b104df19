//! Job queue integration tests against a real Redis.
//!
//! Skipped unless `TEST_REDIS_URL` is set. Each test runs on a uniquely
//! named queue, so they do not need to coordinate.

mod common;

use std::time::Duration;

macro_rules! require_redis {
    () => {
        if !common::has_test_redis() {
            eprintln!("TEST_REDIS_URL not set, skipping");
            return;
        }
    };
}

#[tokio::test]
async fn enqueue_dedups_by_job_id() {
    require_redis!();
    let queue = common::setup_test_queue("dedup").await;

    assert!(queue.enqueue("report-1", r#"{"reportId":1,"userId":9}"#).await.unwrap());
    assert!(!queue.enqueue("report-1", r#"{"reportId":1,"userId":9}"#).await.unwrap());
    // A different id is not affected
    assert!(queue.enqueue("report-2", r#"{"reportId":2,"userId":9}"#).await.unwrap());
}

#[tokio::test]
async fn dequeue_is_fifo_with_first_attempt_one() {
    require_redis!();
    let queue = common::setup_test_queue("fifo").await;

    queue.enqueue("report-1", "payload-1").await.unwrap();
    queue.enqueue("report-2", "payload-2").await.unwrap();

    let job = queue.next_job().await.unwrap().expect("job expected");
    assert_eq!(job.id, "report-1");
    assert_eq!(job.payload, "payload-1");
    assert_eq!(job.attempt, 1);
    assert!(!job.is_final_attempt());

    let job = queue.next_job().await.unwrap().expect("second job expected");
    assert_eq!(job.id, "report-2");
    assert!(queue.next_job().await.unwrap().is_none());
}

#[tokio::test]
async fn completed_jobs_leave_no_trace_and_can_be_enqueued_again() {
    require_redis!();
    let queue = common::setup_test_queue("complete").await;

    queue.enqueue("report-1", "payload").await.unwrap();
    let job = queue.next_job().await.unwrap().unwrap();
    queue.complete(&job).await.unwrap();

    assert!(queue.next_job().await.unwrap().is_none());
    // The id is free again and attempts start over
    assert!(queue.enqueue("report-1", "payload").await.unwrap());
    let job = queue.next_job().await.unwrap().unwrap();
    assert_eq!(job.attempt, 1);
}

#[tokio::test]
async fn removal_only_works_before_the_job_starts() {
    require_redis!();
    let queue = common::setup_test_queue("remove").await;

    queue.enqueue("report-1", "payload").await.unwrap();
    assert!(queue.remove_if_not_started("report-1").await.unwrap());
    assert!(queue.next_job().await.unwrap().is_none());

    queue.enqueue("report-1", "payload").await.unwrap();
    let job = queue.next_job().await.unwrap().unwrap();
    // Active jobs are the worker's problem, not the canceller's
    assert!(!queue.remove_if_not_started(&job.id).await.unwrap());
    // Unknown ids are a no-op
    assert!(!queue.remove_if_not_started("report-999").await.unwrap());
}

#[tokio::test]
async fn retry_redelivers_after_the_backoff_with_the_attempt_bumped() {
    require_redis!();
    // 50ms base backoff (see common::setup_test_queue)
    let queue = common::setup_test_queue("retry").await;

    queue.enqueue("report-1", "payload").await.unwrap();
    let job = queue.next_job().await.unwrap().unwrap();
    let delay = queue.retry_later(&job).await.unwrap();
    assert_eq!(delay, Duration::from_millis(50));

    // Not due yet
    assert!(queue.next_job().await.unwrap().is_none());
    tokio::time::sleep(Duration::from_millis(120)).await;

    let job = queue.next_job().await.unwrap().expect("redelivery expected");
    assert_eq!(job.id, "report-1");
    assert_eq!(job.attempt, 2);
    assert!(!job.is_final_attempt());

    // Second failure doubles the delay
    let delay = queue.retry_later(&job).await.unwrap();
    assert_eq!(delay, Duration::from_millis(100));
    tokio::time::sleep(Duration::from_millis(220)).await;
    let job = queue.next_job().await.unwrap().expect("third delivery expected");
    assert_eq!(job.attempt, 3);
    assert!(job.is_final_attempt());
}

#[tokio::test]
async fn delayed_jobs_can_still_be_removed() {
    require_redis!();
    let queue = common::setup_test_queue("remove-delayed").await;

    queue.enqueue("report-1", "payload").await.unwrap();
    let job = queue.next_job().await.unwrap().unwrap();
    queue.retry_later(&job).await.unwrap();

    // The cancel path catches jobs parked in the delayed set too
    assert!(queue.remove_if_not_started("report-1").await.unwrap());
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(queue.next_job().await.unwrap().is_none());
}

#[tokio::test]
async fn failed_jobs_are_parked_not_redelivered() {
    require_redis!();
    let queue = common::setup_test_queue("fail").await;

    queue.enqueue("report-1", "payload").await.unwrap();
    let job = queue.next_job().await.unwrap().unwrap();
    queue.fail(&job, "upstream client service is unavailable").await.unwrap();

    assert!(queue.next_job().await.unwrap().is_none());
    // A failed record does not block a fresh enqueue of the same id
    assert!(queue.enqueue("report-1", "payload").await.unwrap());
    let job = queue.next_job().await.unwrap().unwrap();
    assert_eq!(job.attempt, 1, "attempts reset on re-enqueue");
}

#[tokio::test]
async fn repeat_registration_replaces_by_name() {
    require_redis!();
    let queue = common::setup_test_queue("repeat").await;

    assert!(queue.repeat_pattern("delete-old-reports").await.unwrap().is_none());
    queue.register_repeat("delete-old-reports", "0 3 * * *").await.unwrap();
    queue.register_repeat("delete-old-reports", "0 4 * * *").await.unwrap();
    assert_eq!(
        queue.repeat_pattern("delete-old-reports").await.unwrap().as_deref(),
        Some("0 4 * * *")
    );
}
