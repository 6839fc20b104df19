//! Shared test helpers for integration tests.

#![allow(dead_code)]

/// Returns true if the test database URL is configured.
pub fn has_test_db() -> bool {
    std::env::var("TEST_DATABASE_URL").is_ok()
}

/// Returns true if the test Redis URL is configured.
pub fn has_test_redis() -> bool {
    std::env::var("TEST_REDIS_URL").is_ok()
}

pub fn test_db_url() -> String {
    std::env::var("TEST_DATABASE_URL")
        .expect("TEST_DATABASE_URL must be set for integration tests")
}

pub fn test_redis_url() -> String {
    std::env::var("TEST_REDIS_URL").expect("TEST_REDIS_URL must be set for integration tests")
}

/// Connect to the test database with the schema applied and tables emptied.
pub async fn setup_test_db() -> reportpipe::db::Database {
    let db = reportpipe::db::Database::connect(&test_db_url())
        .await
        .expect("failed to connect to test database");
    db.ensure_schema().await.expect("failed to apply schema");
    sqlx::raw_sql("TRUNCATE TABLE report_items, reports RESTART IDENTITY CASCADE")
        .execute(db.pool())
        .await
        .expect("failed to truncate tables");
    db
}

/// Open a job queue on a uniquely named namespace so parallel tests do not
/// collide, with any leftover keys from a previous run flushed.
pub async fn setup_test_queue(prefix: &str) -> reportpipe::queue::JobQueue {
    let name = format!(
        "{}-{}",
        prefix,
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    );
    reportpipe::queue::JobQueue::connect(
        &test_redis_url(),
        name,
        3,
        std::time::Duration::from_millis(50),
    )
    .await
    .expect("failed to connect to test redis")
}
