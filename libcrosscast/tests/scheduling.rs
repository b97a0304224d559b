//! Scheduled publishing workflows
//!
//! Full-stack scheduler tests: create scheduled posts through the
//! service, drive ticks at chosen instants, and verify claims hold under
//! concurrency.

use libcrosscast::config::{AppConfig, Config, DatabaseConfig};
use libcrosscast::db::Database;
use libcrosscast::platforms::{MockPublisher, MockPublisherFactory, PublisherFactory};
use libcrosscast::service::{CrosscastService, PostUpdate};
use libcrosscast::types::{NewConnection, NewPost, Platform, PostStatus};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

async fn create_test_db() -> (TempDir, Database) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let db = Database::new(&db_path.to_string_lossy()).await.unwrap();
    (temp_dir, db)
}

fn service_with(db: &Database, factory: Arc<dyn PublisherFactory>) -> CrosscastService {
    let config = Arc::new(Config {
        database: DatabaseConfig::default(),
        app: AppConfig {
            base_url: "https://crosscast.example".to_string(),
        },
        meta: None,
        google: None,
        twitter: None,
        linkedin: None,
    });
    CrosscastService::assemble(db.clone(), config, factory)
}

fn scheduled(caption: &str, at: i64) -> NewPost {
    NewPost {
        user_id: "alice".to_string(),
        title: None,
        caption: caption.to_string(),
        media_urls: vec![],
        platforms: vec![Platform::Twitter],
        scheduled_at: Some(at),
        metadata: serde_json::json!({}),
    }
}

#[tokio::test]
async fn test_scheduled_post_publishes_when_due() {
    let (_tmp, db) = create_test_db().await;
    db.save_connection("alice", &NewConnection::new(Platform::Twitter, "tok"))
        .await
        .unwrap();

    let service = service_with(
        &db,
        Arc::new(MockPublisherFactory::new().with(MockPublisher::succeeding(Platform::Twitter))),
    );

    let due_at = chrono::Utc::now().timestamp() + 120;
    let post = service.posts().create(scheduled("Timed", due_at)).await.unwrap();
    assert_eq!(post.status, PostStatus::Scheduled);

    // Not due yet
    let early = service.scheduler().tick_at(due_at - 60).await.unwrap();
    assert_eq!(early.processed, 0);
    assert_eq!(
        service.posts().get(&post.id).await.unwrap().status,
        PostStatus::Scheduled
    );

    // Due now
    let summary = service.scheduler().tick_at(due_at + 1).await.unwrap();
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.published, 1);

    let stored = service.posts().get(&post.id).await.unwrap();
    assert_eq!(stored.status, PostStatus::Published);
    assert!(stored.published_at.is_some());
    assert_eq!(stored.metadata["auto_published"], true);

    // Trail: created as scheduled, claimed, one platform row
    let logs = service.posts().logs(&post.id).await.unwrap();
    assert_eq!(logs.len(), 3);
    assert_eq!(logs[0].action, "post_created");
    assert_eq!(logs[0].status_after, Some(PostStatus::Scheduled));
    assert_eq!(logs[1].action, "publishing");
    assert_eq!(logs[1].status_before, Some(PostStatus::Scheduled));
    assert_eq!(logs[2].action, "platform_publish");
    assert_eq!(logs[2].status_after, Some(PostStatus::Published));
}

#[tokio::test]
async fn test_concurrent_ticks_publish_each_post_once() {
    let (_tmp, db) = create_test_db().await;
    db.save_connection("alice", &NewConnection::new(Platform::Twitter, "tok"))
        .await
        .unwrap();

    let mock = MockPublisher::succeeding(Platform::Twitter).with_delay(Duration::from_millis(30));
    let a = service_with(&db, Arc::new(MockPublisherFactory::new().with(mock.clone())));
    let b = service_with(&db, Arc::new(MockPublisherFactory::new().with(mock.clone())));

    let due_at = chrono::Utc::now().timestamp() + 60;
    for i in 0..3 {
        a.posts()
            .create(scheduled(&format!("Post {i}"), due_at))
            .await
            .unwrap();
    }

    let (ra, rb) = tokio::join!(
        a.scheduler().tick_at(due_at + 1),
        b.scheduler().tick_at(due_at + 1)
    );
    let (sa, sb) = (ra.unwrap(), rb.unwrap());

    assert_eq!(sa.processed + sb.processed, 3);
    assert_eq!(sa.published + sb.published, 3);
    assert_eq!(mock.publish_count(), 3);
}

#[tokio::test]
async fn test_failed_scheduled_post_stays_failed_until_rescheduled() {
    let (_tmp, db) = create_test_db().await;
    db.save_connection("alice", &NewConnection::new(Platform::Twitter, "tok"))
        .await
        .unwrap();

    let flaky = service_with(
        &db,
        Arc::new(
            MockPublisherFactory::new()
                .with(MockPublisher::transient_failure(Platform::Twitter, "503")),
        ),
    );

    let due_at = chrono::Utc::now().timestamp() + 60;
    let post = flaky.posts().create(scheduled("Flaky", due_at)).await.unwrap();

    let summary = flaky.scheduler().tick_at(due_at + 1).await.unwrap();
    assert_eq!(summary.failed, 1);
    assert_eq!(
        flaky.posts().get(&post.id).await.unwrap().status,
        PostStatus::Failed
    );

    // A later tick leaves it alone, failed posts are not auto-retried
    let later = flaky.scheduler().tick_at(due_at + 3600).await.unwrap();
    assert_eq!(later.processed, 0);

    // Reschedule and run against a healthy upstream
    let healthy = service_with(
        &db,
        Arc::new(MockPublisherFactory::new().with(MockPublisher::succeeding(Platform::Twitter))),
    );
    let retry_at = chrono::Utc::now().timestamp() + 7200;
    healthy
        .posts()
        .update(
            &post.id,
            PostUpdate {
                status: Some(PostStatus::Scheduled),
                scheduled_at: Some(retry_at),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let summary = healthy.scheduler().tick_at(retry_at + 1).await.unwrap();
    assert_eq!(summary.published, 1);
    assert_eq!(
        healthy.posts().get(&post.id).await.unwrap().status,
        PostStatus::Published
    );
}

#[tokio::test]
async fn test_due_posts_process_oldest_first() {
    let (_tmp, db) = create_test_db().await;
    db.save_connection("alice", &NewConnection::new(Platform::Twitter, "tok"))
        .await
        .unwrap();

    let mock = MockPublisher::succeeding(Platform::Twitter);
    let service = service_with(&db, Arc::new(MockPublisherFactory::new().with(mock.clone())));

    let base = chrono::Utc::now().timestamp() + 60;
    service.posts().create(scheduled("Second", base + 10)).await.unwrap();
    service.posts().create(scheduled("First", base)).await.unwrap();

    service.scheduler().tick_at(base + 60).await.unwrap();

    assert_eq!(mock.published_captions(), vec!["First", "Second"]);
}
