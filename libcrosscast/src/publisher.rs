//! Publish orchestration
//!
//! Drives a post through its lifecycle: claim it with a conditional status
//! update, fan out to each selected platform's adapter, aggregate the
//! outcomes all-or-nothing, and persist the final state plus the full
//! per-platform result array in one update. A post never stays in
//! `publishing` once an attempt finishes or fails.

use std::sync::Arc;
use tracing::{error, info, warn};

use crate::db::Database;
use crate::error::{CrosscastError, Result};
use crate::platforms::PublisherFactory;
use crate::types::{Platform, PlatformOutcome, Post, PostLog, PostStatus};

/// How a publish attempt was started; scheduled runs mark the post as
/// auto-published on success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PublishOrigin {
    Manual,
    Scheduled,
}

#[derive(Clone)]
pub struct PublishEngine {
    db: Database,
    factory: Arc<dyn PublisherFactory>,
}

impl PublishEngine {
    pub fn new(db: Database, factory: Arc<dyn PublisherFactory>) -> Self {
        Self { db, factory }
    }

    /// Publish a post now.
    ///
    /// Already-published posts are a no-op error, posts mid-publish a
    /// conflict. Draft, scheduled, and failed posts are claimed and run.
    pub async fn publish(&self, post_id: &str) -> Result<Post> {
        let post = self
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

        let claimed = self
            .db
            .claim_for_publishing(
                &post.id,
                &[PostStatus::Draft, PostStatus::Scheduled, PostStatus::Failed],
            )
            .await?;
        if !claimed {
            // Someone else got here between the read and the claim
            return Err(CrosscastError::PublishConflict(post.id));
        }

        self.run_claimed(post, PublishOrigin::Manual).await
    }

    /// Publish a due scheduled post on behalf of the scheduler.
    ///
    /// Returns None when another tick already claimed it; exactly one
    /// concurrent caller wins the conditional update.
    pub async fn publish_scheduled(&self, post: Post) -> Result<Option<Post>> {
        let claimed = self
            .db
            .claim_for_publishing(&post.id, &[PostStatus::Scheduled])
            .await?;
        if !claimed {
            return Ok(None);
        }
        self.run_claimed(post, PublishOrigin::Scheduled).await.map(Some)
    }

    /// Run a claimed post through fan-out and final persistence. If the
    /// attempt errors mid-flight the post is forced to `failed`, unless its
    /// final status was already persisted before the error surfaced.
    async fn run_claimed(&self, post: Post, origin: PublishOrigin) -> Result<Post> {
        let post_id = post.id.clone();
        let user_id = post.user_id.clone();

        match self.attempt(post, origin).await {
            Ok(updated) => Ok(updated),
            Err(e) => {
                error!(post_id, error = %e, "publish attempt errored, forcing failed status");

                let mut metadata = match self.db.get_post(&post_id).await {
                    Ok(Some(p)) => p.metadata,
                    _ => serde_json::json!({}),
                };
                metadata["error"] = serde_json::Value::String(e.to_string());

                // The conditional update only fires while the post is still
                // in `publishing`; a post whose final status landed before
                // the error keeps that status
                match self.db.fail_if_publishing(&post_id, &metadata).await {
                    Ok(true) => {
                        let log = PostLog {
                            id: None,
                            post_id: post_id.clone(),
                            user_id,
                            action: "publish_error".to_string(),
                            platform: None,
                            status_before: Some(PostStatus::Publishing),
                            status_after: Some(PostStatus::Failed),
                            message: "Publishing failed".to_string(),
                            error_details: Some(e.to_string()),
                            created_at: chrono::Utc::now().timestamp(),
                        };
                        if let Err(log_err) = self.db.append_log(&log).await {
                            warn!(post_id, error = %log_err, "failed to append error log row");
                        }
                    }
                    Ok(false) => {
                        info!(post_id, "post already left publishing, keeping its stored status");
                    }
                    Err(persist_err) => {
                        warn!(post_id, error = %persist_err, "failed to persist failed status");
                    }
                }

                Err(e)
            }
        }
    }

    async fn attempt(&self, mut post: Post, origin: PublishOrigin) -> Result<Post> {
        let status_before = post.status;
        post.status = PostStatus::Publishing;

        self.db
            .append_log(&PostLog {
                id: None,
                post_id: post.id.clone(),
                user_id: post.user_id.clone(),
                action: "publishing".to_string(),
                platform: None,
                status_before: Some(status_before),
                status_after: Some(PostStatus::Publishing),
                message: format!("Publishing to {} platform(s)", post.platforms.len()),
                error_details: None,
                created_at: chrono::Utc::now().timestamp(),
            })
            .await?;

        // Sequential fan-out, one attempt per platform, failures captured
        // as outcomes rather than aborting the loop
        let mut outcomes = Vec::with_capacity(post.platforms.len());
        for platform in post.platforms.clone() {
            outcomes.push(self.publish_one(platform, &post).await);
        }

        let all_succeeded = !outcomes.is_empty() && outcomes.iter().all(|o| o.success);
        let final_status = if all_succeeded {
            PostStatus::Published
        } else {
            PostStatus::Failed
        };
        let published_at = all_succeeded.then(|| chrono::Utc::now().timestamp());

        post.metadata["publish_results"] = serde_json::to_value(&outcomes)
            .map_err(|e| CrosscastError::InvalidInput(format!("unserializable outcomes: {e}")))?;
        if origin == PublishOrigin::Scheduled && all_succeeded {
            post.metadata["auto_published"] = serde_json::Value::Bool(true);
        }

        self.db
            .finish_publish(&post.id, final_status, published_at, &post.metadata)
            .await?;

        for outcome in &outcomes {
            self.db
                .append_log(&PostLog {
                    id: None,
                    post_id: post.id.clone(),
                    user_id: post.user_id.clone(),
                    action: "platform_publish".to_string(),
                    platform: Some(outcome.platform),
                    status_before: Some(PostStatus::Publishing),
                    status_after: Some(final_status),
                    message: outcome.message.clone(),
                    error_details: (!outcome.success).then(|| outcome.message.clone()),
                    created_at: chrono::Utc::now().timestamp(),
                })
                .await?;
        }

        post.status = final_status;
        post.published_at = published_at;

        info!(
            post_id = %post.id,
            status = %final_status,
            platforms = outcomes.len(),
            "publish attempt finished"
        );
        Ok(post)
    }

    /// One platform, one attempt. Every failure mode collapses into an
    /// outcome so the rest of the fan-out continues.
    async fn publish_one(&self, platform: Platform, post: &Post) -> PlatformOutcome {
        let conn = match self.db.get_connection(&post.user_id, platform).await {
            Ok(Some(conn)) => conn,
            Ok(None) => {
                return PlatformOutcome {
                    platform,
                    success: false,
                    external_id: None,
                    message: format!("{platform} is not connected"),
                };
            }
            Err(e) => {
                warn!(post_id = %post.id, %platform, error = %e, "connection lookup failed");
                return PlatformOutcome {
                    platform,
                    success: false,
                    external_id: None,
                    message: format!("connection lookup failed: {e}"),
                };
            }
        };

        let publisher = match self.factory.create(platform) {
            Ok(p) => p,
            Err(e) => {
                return PlatformOutcome {
                    platform,
                    success: false,
                    external_id: None,
                    message: format!("publisher unavailable: {e}"),
                };
            }
        };

        match publisher.publish(&conn, post).await {
            Ok(external_id) => PlatformOutcome {
                platform,
                success: true,
                external_id: Some(external_id),
                message: format!("Published to {platform}"),
            },
            Err(e) => {
                warn!(post_id = %post.id, %platform, error = %e, "platform publish failed");

                if e.is_credential_invalid()
                    && matches!(platform, Platform::Facebook | Platform::Instagram)
                {
                    // The Meta app grant is dead; both stored connections are
                    // useless until the user reconnects
                    if let Err(clear_err) = self.db.clear_meta_connections(&post.user_id).await {
                        warn!(user_id = %post.user_id, error = %clear_err, "failed to clear meta connections");
                    } else {
                        info!(user_id = %post.user_id, "cleared meta connections after invalid-app error");
                    }
                }

                PlatformOutcome {
                    platform,
                    success: false,
                    external_id: None,
                    message: e.to_string(),
                }
            }
        }
    }
}
