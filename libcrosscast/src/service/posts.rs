//! Post lifecycle service
//!
//! Validates input, enforces the status transition table on updates, and
//! delegates publish runs to the engine. Every post creation and status
//! change leaves an audit row.

use tracing::info;

use crate::db::Database;
use crate::error::{CrosscastError, Result};
use crate::publisher::PublishEngine;
use crate::types::{validate_transition, NewPost, Platform, Post, PostLog, PostStatus};

/// Partial update. Absent fields are left untouched.
#[derive(Debug, Default, Clone)]
pub struct PostUpdate {
    pub title: Option<String>,
    pub caption: Option<String>,
    pub media_urls: Option<Vec<String>>,
    pub platforms: Option<Vec<Platform>>,
    pub status: Option<PostStatus>,
    pub scheduled_at: Option<i64>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Clone)]
pub struct PostsService {
    db: Database,
    engine: PublishEngine,
}

impl PostsService {
    pub fn new(db: Database, engine: PublishEngine) -> Self {
        Self { db, engine }
    }

    /// Create a post. A future `scheduled_at` makes it scheduled; anything
    /// else lands as a draft with no schedule.
    pub async fn create(&self, new: NewPost) -> Result<Post> {
        let caption = new.caption.trim().to_string();
        if caption.is_empty() {
            return Err(CrosscastError::InvalidInput(
                "caption must not be empty".to_string(),
            ));
        }
        let platforms = dedup_platforms(new.platforms)?;

        let now = chrono::Utc::now().timestamp();
        let (status, scheduled_at) = match new.scheduled_at {
            Some(t) if t > now => (PostStatus::Scheduled, Some(t)),
            _ => (PostStatus::Draft, None),
        };

        let post = Post {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: new.user_id,
            title: new.title,
            caption,
            media_urls: new.media_urls,
            platforms,
            status,
            scheduled_at,
            published_at: None,
            metadata: new.metadata,
            created_at: now,
            updated_at: now,
        };
        self.db.create_post(&post).await?;

        self.db
            .append_log(&PostLog {
                id: None,
                post_id: post.id.clone(),
                user_id: post.user_id.clone(),
                action: "post_created".to_string(),
                platform: None,
                status_before: None,
                status_after: Some(status),
                message: format!("Post created as {status}"),
                error_details: None,
                created_at: now,
            })
            .await?;

        info!(post_id = %post.id, status = %status, "post created");
        Ok(post)
    }

    /// Apply a partial update. Published posts are immutable; posts mid-
    /// publish cannot be edited. Status changes go through the transition
    /// table and are logged.
    pub async fn update(&self, post_id: &str, update: PostUpdate) -> Result<Post> {
        let mut post = self
            .db
            .get_post(post_id)
            .await?
            .ok_or_else(|| CrosscastError::NotFound(format!("post {post_id}")))?;

        match post.status {
            PostStatus::Published => {
                return Err(CrosscastError::AlreadyPublished(post.id));
            }
            PostStatus::Publishing => {
                return Err(CrosscastError::PublishConflict(post.id));
            }
            _ => {}
        }

        if let Some(caption) = update.caption {
            let caption = caption.trim().to_string();
            if caption.is_empty() {
                return Err(CrosscastError::InvalidInput(
                    "caption must not be empty".to_string(),
                ));
            }
            post.caption = caption;
        }
        if let Some(title) = update.title {
            post.title = Some(title);
        }
        if let Some(media_urls) = update.media_urls {
            post.media_urls = media_urls;
        }
        if let Some(platforms) = update.platforms {
            post.platforms = dedup_platforms(platforms)?;
        }
        if let Some(scheduled_at) = update.scheduled_at {
            post.scheduled_at = Some(scheduled_at);
        }
        if let Some(metadata) = update.metadata {
            post.metadata = metadata;
        }

        let status_before = post.status;
        if let Some(next) = update.status {
            if next != post.status {
                validate_transition(post.status, next)?;
                match next {
                    PostStatus::Scheduled => {
                        let now = chrono::Utc::now().timestamp();
                        match post.scheduled_at {
                            Some(t) if t > now => {}
                            _ => {
                                return Err(CrosscastError::InvalidInput(
                                    "scheduling requires a future scheduled_at".to_string(),
                                ));
                            }
                        }
                    }
                    PostStatus::Draft => {
                        post.scheduled_at = None;
                    }
                    PostStatus::Published => {
                        // Manual mark-as-published, no fan-out happened
                        post.published_at = Some(chrono::Utc::now().timestamp());
                    }
                    _ => {}
                }
                post.status = next;
            }
        }

        self.db.update_post(&post).await?;

        if post.status != status_before {
            self.db
                .append_log(&PostLog {
                    id: None,
                    post_id: post.id.clone(),
                    user_id: post.user_id.clone(),
                    action: "status_changed".to_string(),
                    platform: None,
                    status_before: Some(status_before),
                    status_after: Some(post.status),
                    message: format!("Status changed from {status_before} to {}", post.status),
                    error_details: None,
                    created_at: chrono::Utc::now().timestamp(),
                })
                .await?;
        }

        Ok(post)
    }

    /// Publish a post immediately.
    pub async fn publish(&self, post_id: &str) -> Result<Post> {
        self.engine.publish(post_id).await
    }

    pub async fn get(&self, post_id: &str) -> Result<Post> {
        self.db
            .get_post(post_id)
            .await?
            .ok_or_else(|| CrosscastError::NotFound(format!("post {post_id}")))
    }

    pub async fn list(&self, user_id: &str, status: Option<PostStatus>) -> Result<Vec<Post>> {
        self.db.list_posts(user_id, status).await
    }

    /// The post's full audit trail, oldest first.
    pub async fn logs(&self, post_id: &str) -> Result<Vec<PostLog>> {
        self.db.get_post_logs(post_id).await
    }
}

/// Reject an empty selection and drop duplicates, keeping first-seen order.
fn dedup_platforms(platforms: Vec<Platform>) -> Result<Vec<Platform>> {
    if platforms.is_empty() {
        return Err(CrosscastError::InvalidInput(
            "at least one platform is required".to_string(),
        ));
    }
    let mut seen = Vec::with_capacity(platforms.len());
    for p in platforms {
        if !seen.contains(&p) {
            seen.push(p);
        }
    }
    Ok(seen)
}
