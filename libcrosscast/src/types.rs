//! Core data types for crosscast

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CrosscastError;

/// A platform a user can connect and publish to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum Platform {
    Youtube,
    Instagram,
    Facebook,
    Twitter,
    Linkedin,
}

impl Platform {
    /// All supported platforms
    pub fn all() -> [Platform; 5] {
        [
            Platform::Youtube,
            Platform::Instagram,
            Platform::Facebook,
            Platform::Twitter,
            Platform::Linkedin,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Youtube => "youtube",
            Platform::Instagram => "instagram",
            Platform::Facebook => "facebook",
            Platform::Twitter => "twitter",
            Platform::Linkedin => "linkedin",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = CrosscastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "youtube" => Ok(Platform::Youtube),
            "instagram" => Ok(Platform::Instagram),
            "facebook" => Ok(Platform::Facebook),
            "twitter" => Ok(Platform::Twitter),
            "linkedin" => Ok(Platform::Linkedin),
            other => Err(CrosscastError::InvalidInput(format!(
                "Unknown platform: {}",
                other
            ))),
        }
    }
}

/// Lifecycle status of a post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum PostStatus {
    Draft,
    Scheduled,
    Publishing,
    Published,
    Failed,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Scheduled => "scheduled",
            PostStatus::Publishing => "publishing",
            PostStatus::Published => "published",
            PostStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostStatus {
    type Err = CrosscastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(PostStatus::Draft),
            "scheduled" => Ok(PostStatus::Scheduled),
            "publishing" => Ok(PostStatus::Publishing),
            "published" => Ok(PostStatus::Published),
            "failed" => Ok(PostStatus::Failed),
            other => Err(CrosscastError::InvalidInput(format!(
                "Unknown post status: {}",
                other
            ))),
        }
    }
}

/// Check a status transition against the lifecycle table.
///
/// `published` is terminal. Anything not in the table is rejected.
pub fn validate_transition(from: PostStatus, to: PostStatus) -> crate::Result<()> {
    use PostStatus::*;
    let allowed = match (from, to) {
        (Draft, Scheduled) | (Draft, Published) => true,
        (Scheduled, Draft) | (Scheduled, Published) | (Scheduled, Publishing) => true,
        (Publishing, Published) | (Publishing, Failed) => true,
        (Failed, Draft) | (Failed, Scheduled) => true,
        _ => false,
    };
    if allowed {
        Ok(())
    } else {
        Err(CrosscastError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

/// A stored OAuth grant for one (user, platform) pair
///
/// A connection is *usable* when `access_token` is non-empty. Disconnecting
/// clears the token fields but keeps the row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub id: String,
    pub user_id: String,
    pub platform: Platform,
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Unix timestamp (seconds) when the access token expires
    pub expires_at: Option<i64>,
    pub page_id: Option<String>,
    pub instagram_business_id: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Connection {
    pub fn is_usable(&self) -> bool {
        !self.access_token.is_empty()
    }
}

/// Fields written when saving a connection after an OAuth callback
#[derive(Debug, Clone)]
pub struct NewConnection {
    pub platform: Platform,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<i64>,
    pub page_id: Option<String>,
    pub instagram_business_id: Option<String>,
    pub metadata: serde_json::Value,
}

impl NewConnection {
    pub fn new(platform: Platform, access_token: impl Into<String>) -> Self {
        Self {
            platform,
            access_token: access_token.into(),
            refresh_token: None,
            expires_at: None,
            page_id: None,
            instagram_business_id: None,
            metadata: serde_json::json!({}),
        }
    }
}

/// Token-free view of a connection, safe to hand to display layers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionSummary {
    pub platform: Platform,
    pub connected: bool,
    pub metadata: serde_json::Value,
    pub created_at: i64,
}

/// A post destined for one or more platforms
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub user_id: String,
    pub title: Option<String>,
    pub caption: String,
    /// Public URLs of the media to publish, in order
    pub media_urls: Vec<String>,
    pub platforms: Vec<Platform>,
    pub status: PostStatus,
    pub scheduled_at: Option<i64>,
    pub published_at: Option<i64>,
    pub metadata: serde_json::Value,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Fields for creating a post
#[derive(Debug, Clone)]
pub struct NewPost {
    pub user_id: String,
    pub title: Option<String>,
    pub caption: String,
    pub media_urls: Vec<String>,
    pub platforms: Vec<Platform>,
    pub scheduled_at: Option<i64>,
    pub metadata: serde_json::Value,
}

/// One append-only audit row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostLog {
    /// Database row id, None until inserted
    pub id: Option<i64>,
    pub post_id: String,
    pub user_id: String,
    pub action: String,
    pub platform: Option<Platform>,
    pub status_before: Option<PostStatus>,
    pub status_after: Option<PostStatus>,
    pub message: String,
    pub error_details: Option<String>,
    pub created_at: i64,
}

/// Outcome of one platform's publish attempt, persisted in
/// `metadata.publish_results`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformOutcome {
    pub platform: Platform,
    pub success: bool,
    pub external_id: Option<String>,
    pub message: String,
}

/// Result of one scheduler pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct TickSummary {
    /// Posts this tick claimed and ran through the publish engine
    pub processed: usize,
    pub published: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}
