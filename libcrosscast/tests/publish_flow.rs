//! End-to-end publishing workflows
//!
//! These tests run the whole stack against a temp-file database: connect
//! platforms, create posts through the service, publish through the
//! engine, and check the resulting state and audit trail.

use libcrosscast::db::Database;
use libcrosscast::config::{AppConfig, Config, DatabaseConfig};
use libcrosscast::platforms::{MockPublisher, MockPublisherFactory, PublisherFactory};
use libcrosscast::service::{CrosscastService, PostUpdate};
use libcrosscast::types::{NewConnection, NewPost, Platform, PostStatus};
use libcrosscast::CrosscastError;
use std::sync::Arc;
use tempfile::TempDir;

async fn create_test_db() -> (TempDir, Database) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let db = Database::new(&db_path.to_string_lossy()).await.unwrap();
    (temp_dir, db)
}

fn test_config() -> Arc<Config> {
    Arc::new(Config {
        database: DatabaseConfig::default(),
        app: AppConfig {
            base_url: "https://crosscast.example".to_string(),
        },
        meta: None,
        google: None,
        twitter: None,
        linkedin: None,
    })
}

fn service_with(db: &Database, factory: Arc<dyn PublisherFactory>) -> CrosscastService {
    CrosscastService::assemble(db.clone(), test_config(), factory)
}

fn new_post(platforms: Vec<Platform>) -> NewPost {
    NewPost {
        user_id: "alice".to_string(),
        title: None,
        caption: "Hello from everywhere at once".to_string(),
        media_urls: vec![],
        platforms,
        scheduled_at: None,
        metadata: serde_json::json!({}),
    }
}

async fn connect(db: &Database, platform: Platform) {
    db.save_connection("alice", &NewConnection::new(platform, "token"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_complete_publish_workflow() {
    let (_tmp, db) = create_test_db().await;
    connect(&db, Platform::Twitter).await;
    connect(&db, Platform::Linkedin).await;

    let factory = Arc::new(
        MockPublisherFactory::new()
            .with(MockPublisher::succeeding(Platform::Twitter))
            .with(MockPublisher::succeeding(Platform::Linkedin)),
    );
    let service = service_with(&db, factory);

    let post = service
        .posts()
        .create(new_post(vec![Platform::Twitter, Platform::Linkedin]))
        .await
        .unwrap();
    assert_eq!(post.status, PostStatus::Draft);

    let published = service.posts().publish(&post.id).await.unwrap();
    assert_eq!(published.status, PostStatus::Published);
    assert!(published.published_at.is_some());

    let stored = service.posts().get(&post.id).await.unwrap();
    let results = stored.metadata["publish_results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r["success"] == true));

    // Audit trail: creation, publishing claim, one row per platform
    let logs = service.posts().logs(&post.id).await.unwrap();
    assert_eq!(logs.len(), 4);
    assert_eq!(logs[0].action, "post_created");
    assert_eq!(logs[1].action, "publishing");
    assert_eq!(logs[1].status_before, Some(PostStatus::Draft));
    assert_eq!(logs[1].status_after, Some(PostStatus::Publishing));
    for log in &logs[2..] {
        assert_eq!(log.action, "platform_publish");
        assert_eq!(log.status_before, Some(PostStatus::Publishing));
        assert_eq!(log.status_after, Some(PostStatus::Published));
    }
}

#[tokio::test]
async fn test_partial_failure_then_retry() {
    let (_tmp, db) = create_test_db().await;
    connect(&db, Platform::Twitter).await;
    connect(&db, Platform::Facebook).await;

    let flaky = Arc::new(
        MockPublisherFactory::new()
            .with(MockPublisher::succeeding(Platform::Twitter))
            .with(MockPublisher::transient_failure(Platform::Facebook, "503 upstream")),
    );
    let service = service_with(&db, flaky);

    let post = service
        .posts()
        .create(new_post(vec![Platform::Twitter, Platform::Facebook]))
        .await
        .unwrap();

    let failed = service.posts().publish(&post.id).await.unwrap();
    assert_eq!(failed.status, PostStatus::Failed);
    assert!(failed.published_at.is_none());

    // The per-outcome array names the failing platform
    let stored = service.posts().get(&post.id).await.unwrap();
    let results = stored.metadata["publish_results"].as_array().unwrap();
    let facebook = results.iter().find(|r| r["platform"] == "facebook").unwrap();
    assert_eq!(facebook["success"], false);

    // Once the upstream recovers, the failed post publishes cleanly
    let healthy = Arc::new(
        MockPublisherFactory::new()
            .with(MockPublisher::succeeding(Platform::Twitter))
            .with(MockPublisher::succeeding(Platform::Facebook)),
    );
    let service = service_with(&db, healthy);
    let retried = service.posts().publish(&post.id).await.unwrap();
    assert_eq!(retried.status, PostStatus::Published);
}

#[tokio::test]
async fn test_republish_is_rejected() {
    let (_tmp, db) = create_test_db().await;
    connect(&db, Platform::Twitter).await;

    let mock = MockPublisher::succeeding(Platform::Twitter);
    let service = service_with(
        &db,
        Arc::new(MockPublisherFactory::new().with(mock.clone())),
    );

    let post = service
        .posts()
        .create(new_post(vec![Platform::Twitter]))
        .await
        .unwrap();
    service.posts().publish(&post.id).await.unwrap();

    let err = service.posts().publish(&post.id).await.unwrap_err();
    assert!(matches!(err, CrosscastError::AlreadyPublished(_)));
    assert_eq!(mock.publish_count(), 1);
}

#[tokio::test]
async fn test_published_post_rejects_edits() {
    let (_tmp, db) = create_test_db().await;
    connect(&db, Platform::Twitter).await;

    let service = service_with(
        &db,
        Arc::new(MockPublisherFactory::new().with(MockPublisher::succeeding(Platform::Twitter))),
    );

    let post = service
        .posts()
        .create(new_post(vec![Platform::Twitter]))
        .await
        .unwrap();
    service.posts().publish(&post.id).await.unwrap();

    let err = service
        .posts()
        .update(
            &post.id,
            PostUpdate {
                caption: Some("Too late".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CrosscastError::AlreadyPublished(_)));
}

#[tokio::test]
async fn test_disconnected_platform_fails_post_but_not_process() {
    let (_tmp, db) = create_test_db().await;
    connect(&db, Platform::Twitter).await;
    // linkedin intentionally not connected

    let service = service_with(
        &db,
        Arc::new(
            MockPublisherFactory::new()
                .with(MockPublisher::succeeding(Platform::Twitter))
                .with(MockPublisher::succeeding(Platform::Linkedin)),
        ),
    );

    let post = service
        .posts()
        .create(new_post(vec![Platform::Twitter, Platform::Linkedin]))
        .await
        .unwrap();

    let result = service.posts().publish(&post.id).await.unwrap();
    assert_eq!(result.status, PostStatus::Failed);

    let stored = service.posts().get(&post.id).await.unwrap();
    let results = stored.metadata["publish_results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    let linkedin = results.iter().find(|r| r["platform"] == "linkedin").unwrap();
    assert!(linkedin["message"].as_str().unwrap().contains("not connected"));
}
