//! Mock publisher for testing
//!
//! A configurable stand-in that records calls and returns a scripted
//! outcome, plus a factory handing out clones that share state with the
//! originals so tests can assert on call counts after a publish run.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use crate::error::{CrosscastError, PublishError, Result};
use crate::types::{Connection, Platform, Post};

use super::{Publisher, PublisherFactory};

#[derive(Debug, Clone)]
enum MockOutcome {
    Success,
    Transient(String),
    Rejected(String),
    CredentialInvalid(String),
}

/// Mock publisher with shared call-recording state
#[derive(Clone)]
pub struct MockPublisher {
    platform: Platform,
    outcome: MockOutcome,
    delay: Duration,
    publish_count: Arc<Mutex<usize>>,
    published_captions: Arc<Mutex<Vec<String>>>,
}

impl MockPublisher {
    fn with_outcome(platform: Platform, outcome: MockOutcome) -> Self {
        Self {
            platform,
            outcome,
            delay: Duration::from_millis(0),
            publish_count: Arc::new(Mutex::new(0)),
            published_captions: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A publisher that always succeeds
    pub fn succeeding(platform: Platform) -> Self {
        Self::with_outcome(platform, MockOutcome::Success)
    }

    /// A publisher that fails with a retryable error
    pub fn transient_failure(platform: Platform, message: &str) -> Self {
        Self::with_outcome(platform, MockOutcome::Transient(message.to_string()))
    }

    /// A publisher whose provider rejects the payload
    pub fn rejecting(platform: Platform, message: &str) -> Self {
        Self::with_outcome(platform, MockOutcome::Rejected(message.to_string()))
    }

    /// A publisher whose credential reads as revoked upstream
    pub fn credential_invalid(platform: Platform) -> Self {
        Self::with_outcome(
            platform,
            MockOutcome::CredentialInvalid("Application has been deleted".to_string()),
        )
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn publish_count(&self) -> usize {
        *self.publish_count.lock().unwrap()
    }

    pub fn published_captions(&self) -> Vec<String> {
        self.published_captions.lock().unwrap().clone()
    }
}

#[async_trait]
impl Publisher for MockPublisher {
    fn name(&self) -> &str {
        self.platform.as_str()
    }

    async fn publish(
        &self,
        _conn: &Connection,
        post: &Post,
    ) -> std::result::Result<String, PublishError> {
        *self.publish_count.lock().unwrap() += 1;

        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }

        match &self.outcome {
            MockOutcome::Success => {
                self.published_captions
                    .lock()
                    .unwrap()
                    .push(post.caption.clone());
                Ok(format!("{}-mock-{}", self.platform, uuid::Uuid::new_v4()))
            }
            MockOutcome::Transient(m) => Err(PublishError::Transient(m.clone())),
            MockOutcome::Rejected(m) => Err(PublishError::Rejected(m.clone())),
            MockOutcome::CredentialInvalid(m) => Err(PublishError::CredentialInvalid(m.clone())),
        }
    }
}

/// Factory mapping platforms to preconfigured mocks
#[derive(Default)]
pub struct MockPublisherFactory {
    publishers: Mutex<HashMap<Platform, MockPublisher>>,
}

impl MockPublisherFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, publisher: MockPublisher) {
        self.publishers
            .lock()
            .unwrap()
            .insert(publisher.platform, publisher);
    }

    pub fn with(self, publisher: MockPublisher) -> Self {
        self.insert(publisher);
        self
    }
}

impl PublisherFactory for MockPublisherFactory {
    fn create(&self, platform: Platform) -> Result<Box<dyn Publisher>> {
        let publishers = self.publishers.lock().unwrap();
        publishers
            .get(&platform)
            .cloned()
            .map(|p| Box::new(p) as Box<dyn Publisher>)
            .ok_or_else(|| {
                CrosscastError::InvalidInput(format!("no mock publisher for {platform}"))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PostStatus;

    fn sample_conn() -> Connection {
        Connection {
            id: "c1".to_string(),
            user_id: "u1".to_string(),
            platform: Platform::Twitter,
            access_token: "tok".to_string(),
            refresh_token: None,
            expires_at: None,
            page_id: None,
            instagram_business_id: None,
            metadata: serde_json::json!({}),
            created_at: 0,
            updated_at: 0,
        }
    }

    fn sample_post() -> Post {
        Post {
            id: "p1".to_string(),
            user_id: "u1".to_string(),
            title: None,
            caption: "Mock content".to_string(),
            media_urls: vec![],
            platforms: vec![Platform::Twitter],
            status: PostStatus::Publishing,
            scheduled_at: None,
            published_at: None,
            metadata: serde_json::json!({}),
            created_at: 0,
            updated_at: 0,
        }
    }

    #[tokio::test]
    async fn test_mock_success_records_call() {
        let publisher = MockPublisher::succeeding(Platform::Twitter);
        let id = publisher
            .publish(&sample_conn(), &sample_post())
            .await
            .unwrap();
        assert!(id.starts_with("twitter-mock-"));
        assert_eq!(publisher.publish_count(), 1);
        assert_eq!(publisher.published_captions(), vec!["Mock content"]);
    }

    #[tokio::test]
    async fn test_mock_failure_outcomes() {
        let publisher = MockPublisher::rejecting(Platform::Facebook, "bad media");
        let err = publisher
            .publish(&sample_conn(), &sample_post())
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::Rejected(_)));

        let publisher = MockPublisher::credential_invalid(Platform::Instagram);
        let err = publisher
            .publish(&sample_conn(), &sample_post())
            .await
            .unwrap_err();
        assert!(err.is_credential_invalid());
    }

    #[tokio::test]
    async fn test_factory_clones_share_counters() {
        let mock = MockPublisher::succeeding(Platform::Twitter);
        let factory = MockPublisherFactory::new().with(mock.clone());

        let cloned = factory.create(Platform::Twitter).unwrap();
        cloned.publish(&sample_conn(), &sample_post()).await.unwrap();

        assert_eq!(mock.publish_count(), 1);
    }

    #[test]
    fn test_factory_unknown_platform_errors() {
        let factory = MockPublisherFactory::new();
        assert!(factory.create(Platform::Youtube).is_err());
    }
}
