//! Scheduled publishing
//!
//! A tick selects every scheduled post whose time has come and hands each
//! to the publish engine. The engine's conditional claim makes ticks safe
//! to overlap: a post picked up by two ticks is only fanned out once.

use tracing::{info, warn};

use crate::db::Database;
use crate::error::Result;
use crate::publisher::PublishEngine;
use crate::types::{PostStatus, TickSummary};

#[derive(Clone)]
pub struct Scheduler {
    db: Database,
    engine: PublishEngine,
}

impl Scheduler {
    pub fn new(db: Database, engine: PublishEngine) -> Self {
        Self { db, engine }
    }

    /// Process everything due right now.
    pub async fn tick(&self) -> Result<TickSummary> {
        self.tick_at(chrono::Utc::now().timestamp()).await
    }

    /// Process everything due at the given instant. A post that errors
    /// still counts as processed; its error lands in the summary and the
    /// engine has already moved it out of `publishing`.
    pub async fn tick_at(&self, now: i64) -> Result<TickSummary> {
        let due = self.db.due_scheduled_posts(now).await?;
        let mut summary = TickSummary::default();

        for post in due {
            let post_id = post.id.clone();
            match self.engine.publish_scheduled(post).await {
                Ok(Some(updated)) => {
                    summary.processed += 1;
                    match updated.status {
                        PostStatus::Published => summary.published += 1,
                        _ => summary.failed += 1,
                    }
                }
                Ok(None) => {
                    // Lost the claim to a concurrent tick, nothing to do
                }
                Err(e) => {
                    warn!(post_id, error = %e, "scheduled publish errored");
                    summary.processed += 1;
                    summary.failed += 1;
                    summary.errors.push(format!("{post_id}: {e}"));
                }
            }
        }

        info!(
            processed = summary.processed,
            published = summary.published,
            failed = summary.failed,
            "scheduler tick finished"
        );
        Ok(summary)
    }
}
