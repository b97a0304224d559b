//! Publisher adapters, one per platform
//!
//! Each adapter speaks its platform's publish wire protocol and returns the
//! external post id. Failures come back tagged ([`PublishError`]) so the
//! orchestrator can tell a timeout from a rejected payload from a dead
//! credential. Adapters make exactly one attempt; retry policy belongs to
//! callers.

pub mod facebook;
pub mod instagram;
pub mod linkedin;
pub mod mock;
pub mod twitter;
pub mod youtube;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::db::Database;
use crate::error::{PublishError, Result};
use crate::types::{Connection, Platform, Post};

pub use facebook::FacebookPublisher;
pub use instagram::InstagramPublisher;
pub use linkedin::LinkedinPublisher;
pub use mock::{MockPublisher, MockPublisherFactory};
pub use twitter::TwitterPublisher;
pub use youtube::YoutubePublisher;

/// Timeout for single-call publish endpoints
pub const PUBLISH_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for media uploads, which scale with file size
pub const UPLOAD_TIMEOUT: Duration = Duration::from_secs(600);

#[async_trait]
pub trait Publisher: Send + Sync {
    fn name(&self) -> &str;

    /// Publish the post with the given connection and return the external
    /// post id.
    async fn publish(
        &self,
        conn: &Connection,
        post: &Post,
    ) -> std::result::Result<String, PublishError>;
}

/// Seam between the orchestrator and concrete adapters, so tests can swap
/// in mocks.
pub trait PublisherFactory: Send + Sync {
    fn create(&self, platform: Platform) -> Result<Box<dyn Publisher>>;
}

/// Production factory backed by provider HTTP clients
pub struct HttpPublisherFactory {
    config: Arc<Config>,
    db: Database,
}

impl HttpPublisherFactory {
    pub fn new(config: Arc<Config>, db: Database) -> Self {
        Self { config, db }
    }
}

impl PublisherFactory for HttpPublisherFactory {
    fn create(&self, platform: Platform) -> Result<Box<dyn Publisher>> {
        Ok(match platform {
            Platform::Facebook => Box::new(FacebookPublisher::new()?),
            Platform::Instagram => Box::new(InstagramPublisher::new()?),
            Platform::Youtube => Box::new(YoutubePublisher::new(&self.config, self.db.clone())?),
            Platform::Twitter => Box::new(TwitterPublisher::new()?),
            Platform::Linkedin => Box::new(LinkedinPublisher::new()?),
        })
    }
}

pub(crate) fn client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| PublishError::Transient(format!("failed to build http client: {e}")).into())
}

/// Map a transport-level failure. Timeouts and connection trouble are
/// retryable.
pub(crate) fn map_send_error(platform: &str, e: reqwest::Error) -> PublishError {
    PublishError::Transient(format!("{platform} request failed: {e}"))
}

/// Classify a non-success HTTP response by status class.
pub(crate) fn classify_status(platform: &str, status: reqwest::StatusCode, body: &str) -> PublishError {
    if status == reqwest::StatusCode::UNAUTHORIZED {
        PublishError::CredentialInvalid(format!("{platform} rejected the credential"))
    } else if status.is_server_error() {
        PublishError::Transient(format!("{platform} returned {status}"))
    } else {
        PublishError::Rejected(format!("{platform} returned {status}: {body}"))
    }
}

/// Signatures the Graph API uses when the app registration itself has been
/// removed or invalidated. Distinct from an ordinary bad request: the stored
/// Meta connections are useless and the user has to reconnect.
pub(crate) fn is_meta_app_invalid(body: &str) -> bool {
    if body.contains("Application has been deleted") || body.contains("Error validating application")
    {
        return true;
    }
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["code"].as_i64())
        == Some(190)
}

/// Classify a Graph API error response, catching the invalid-app signature.
pub(crate) fn classify_graph_error(
    platform: &str,
    status: reqwest::StatusCode,
    body: &str,
) -> PublishError {
    if is_meta_app_invalid(body) {
        return PublishError::CredentialInvalid(format!(
            "{platform} application access revoked, reconnect required"
        ));
    }
    classify_status(platform, status, body)
}
