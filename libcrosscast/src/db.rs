//! Database operations for crosscast
//!
//! Connections are upserted against a UNIQUE (user_id, platform) constraint,
//! and post status claims go through a single conditional UPDATE. The status
//! column is the only coordination point between concurrent publishers.

use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;

use crate::error::{DbError, Result};
use crate::types::{
    Connection, ConnectionSummary, NewConnection, Platform, Post, PostLog, PostStatus,
};

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

fn decode_json(raw: &str, column: &str) -> Result<serde_json::Value> {
    serde_json::from_str(raw)
        .map_err(|e| DbError::Decode(format!("{column}: {e}")).into())
}

fn map_connection_row(r: &sqlx::sqlite::SqliteRow) -> Result<Connection> {
    Ok(Connection {
        id: r.get("id"),
        user_id: r.get("user_id"),
        platform: Platform::from_str(&r.get::<String, _>("platform"))
            .map_err(|e| DbError::Decode(e.to_string()))?,
        access_token: r.get("access_token"),
        refresh_token: r.get("refresh_token"),
        expires_at: r.get("expires_at"),
        page_id: r.get("page_id"),
        instagram_business_id: r.get("instagram_business_id"),
        metadata: decode_json(&r.get::<String, _>("metadata"), "metadata")?,
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    })
}

fn map_post_row(r: &sqlx::sqlite::SqliteRow) -> Result<Post> {
    let platforms_raw: String = r.get("platforms");
    let platforms: Vec<Platform> = serde_json::from_str(&platforms_raw)
        .map_err(|e| DbError::Decode(format!("platforms: {e}")))?;
    let media_raw: String = r.get("media_urls");
    let media_urls: Vec<String> = serde_json::from_str(&media_raw)
        .map_err(|e| DbError::Decode(format!("media_urls: {e}")))?;

    Ok(Post {
        id: r.get("id"),
        user_id: r.get("user_id"),
        title: r.get("title"),
        caption: r.get("caption"),
        media_urls,
        platforms,
        status: PostStatus::from_str(&r.get::<String, _>("status"))
            .map_err(|e| DbError::Decode(e.to_string()))?,
        scheduled_at: r.get("scheduled_at"),
        published_at: r.get("published_at"),
        metadata: decode_json(&r.get::<String, _>("metadata"), "metadata")?,
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    })
}

impl Database {
    /// Open (creating if needed) the database at the given path and run
    /// migrations.
    pub async fn new(db_path: &str) -> Result<Self> {
        let expanded_path = shellexpand::tilde(db_path).to_string();
        let path = Path::new(&expanded_path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(DbError::Io)?;
        }

        // mode=rwc creates the file on first open
        let db_url = format!("sqlite://{}?mode=rwc", expanded_path.replace('\\', "/"));

        let pool = SqlitePool::connect(&db_url)
            .await
            .map_err(DbError::Sqlx)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DbError::Migration)?;

        Ok(Self { pool })
    }

    /// Wrap an existing pool. The caller is responsible for migrations.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ----- connections -----

    /// Insert or update the connection for (user, platform) in one statement.
    ///
    /// Concurrent callbacks for the same pair cannot produce duplicate rows;
    /// last write wins on the token fields.
    pub async fn save_connection(&self, user_id: &str, new: &NewConnection) -> Result<Connection> {
        let now = chrono::Utc::now().timestamp();
        let id = uuid::Uuid::new_v4().to_string();
        let metadata = new.metadata.to_string();

        sqlx::query(
            r#"
            INSERT INTO connected_accounts
                (id, user_id, platform, access_token, refresh_token, expires_at,
                 page_id, instagram_business_id, metadata, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (user_id, platform) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                expires_at = excluded.expires_at,
                page_id = excluded.page_id,
                instagram_business_id = excluded.instagram_business_id,
                metadata = excluded.metadata,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&id)
        .bind(user_id)
        .bind(new.platform.as_str())
        .bind(&new.access_token)
        .bind(&new.refresh_token)
        .bind(new.expires_at)
        .bind(&new.page_id)
        .bind(&new.instagram_business_id)
        .bind(&metadata)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(DbError::Sqlx)?;

        let row = self
            .fetch_connection_row(user_id, new.platform)
            .await?
            .ok_or_else(|| DbError::Decode("connection vanished after upsert".to_string()))?;
        Ok(row)
    }

    async fn fetch_connection_row(
        &self,
        user_id: &str,
        platform: Platform,
    ) -> Result<Option<Connection>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, platform, access_token, refresh_token, expires_at,
                   page_id, instagram_business_id, metadata, created_at, updated_at
            FROM connected_accounts
            WHERE user_id = ? AND platform = ?
            "#,
        )
        .bind(user_id)
        .bind(platform.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::Sqlx)?;

        row.map(|r| map_connection_row(&r)).transpose()
    }

    /// Get the usable connection for (user, platform).
    ///
    /// A cleared or absent connection is "not connected", reported as None
    /// rather than an error.
    pub async fn get_connection(
        &self,
        user_id: &str,
        platform: Platform,
    ) -> Result<Option<Connection>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, platform, access_token, refresh_token, expires_at,
                   page_id, instagram_business_id, metadata, created_at, updated_at
            FROM connected_accounts
            WHERE user_id = ? AND platform = ? AND access_token <> ''
            "#,
        )
        .bind(user_id)
        .bind(platform.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::Sqlx)?;

        row.map(|r| map_connection_row(&r)).transpose()
    }

    /// Clear the token fields in place, keeping the row for audit history.
    /// Succeeds whether or not a row existed.
    pub async fn disconnect(&self, user_id: &str, platform: Platform) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            UPDATE connected_accounts
            SET access_token = '', refresh_token = NULL, expires_at = NULL, updated_at = ?
            WHERE user_id = ? AND platform = ?
            "#,
        )
        .bind(now)
        .bind(user_id)
        .bind(platform.as_str())
        .execute(&self.pool)
        .await
        .map_err(DbError::Sqlx)?;

        Ok(())
    }

    /// Clear both Meta-backed connections after an invalid-app signal.
    pub async fn clear_meta_connections(&self, user_id: &str) -> Result<()> {
        self.disconnect(user_id, Platform::Facebook).await?;
        self.disconnect(user_id, Platform::Instagram).await?;
        Ok(())
    }

    /// Token-free connection list for display layers.
    pub async fn list_connections(&self, user_id: &str) -> Result<Vec<ConnectionSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT platform, access_token <> '' AS connected, metadata, created_at
            FROM connected_accounts
            WHERE user_id = ?
            ORDER BY platform
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::Sqlx)?;

        rows.iter()
            .map(|r| {
                Ok(ConnectionSummary {
                    platform: Platform::from_str(&r.get::<String, _>("platform"))
                        .map_err(|e| DbError::Decode(e.to_string()))?,
                    connected: r.get::<i32, _>("connected") != 0,
                    metadata: decode_json(&r.get::<String, _>("metadata"), "metadata")?,
                    created_at: r.get("created_at"),
                })
            })
            .collect()
    }

    /// Write refreshed tokens back, leaving metadata and platform ids alone.
    ///
    /// A None refresh token or expiry keeps the stored value; providers only
    /// rotate those sometimes.
    pub async fn update_connection_tokens(
        &self,
        user_id: &str,
        platform: Platform,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: Option<i64>,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            UPDATE connected_accounts
            SET access_token = ?,
                refresh_token = COALESCE(?, refresh_token),
                expires_at = COALESCE(?, expires_at),
                updated_at = ?
            WHERE user_id = ? AND platform = ?
            "#,
        )
        .bind(access_token)
        .bind(refresh_token)
        .bind(expires_at)
        .bind(now)
        .bind(user_id)
        .bind(platform.as_str())
        .execute(&self.pool)
        .await
        .map_err(DbError::Sqlx)?;

        Ok(())
    }

    // ----- posts -----

    pub async fn create_post(&self, post: &Post) -> Result<()> {
        let platforms = serde_json::to_string(&post.platforms)
            .map_err(|e| DbError::Decode(e.to_string()))?;
        let media_urls = serde_json::to_string(&post.media_urls)
            .map_err(|e| DbError::Decode(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO posts
                (id, user_id, title, caption, media_urls, platforms, status,
                 scheduled_at, published_at, metadata, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&post.id)
        .bind(&post.user_id)
        .bind(&post.title)
        .bind(&post.caption)
        .bind(&media_urls)
        .bind(&platforms)
        .bind(post.status.as_str())
        .bind(post.scheduled_at)
        .bind(post.published_at)
        .bind(post.metadata.to_string())
        .bind(post.created_at)
        .bind(post.updated_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::Sqlx)?;

        Ok(())
    }

    pub async fn get_post(&self, post_id: &str) -> Result<Option<Post>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, title, caption, media_urls, platforms, status,
                   scheduled_at, published_at, metadata, created_at, updated_at
            FROM posts WHERE id = ?
            "#,
        )
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::Sqlx)?;

        row.map(|r| map_post_row(&r)).transpose()
    }

    /// Overwrite the mutable fields of a post. Status transition rules are
    /// enforced by callers before this point.
    pub async fn update_post(&self, post: &Post) -> Result<()> {
        let platforms = serde_json::to_string(&post.platforms)
            .map_err(|e| DbError::Decode(e.to_string()))?;
        let media_urls = serde_json::to_string(&post.media_urls)
            .map_err(|e| DbError::Decode(e.to_string()))?;
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            UPDATE posts
            SET title = ?, caption = ?, media_urls = ?, platforms = ?, status = ?,
                scheduled_at = ?, published_at = ?, metadata = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&post.title)
        .bind(&post.caption)
        .bind(&media_urls)
        .bind(&platforms)
        .bind(post.status.as_str())
        .bind(post.scheduled_at)
        .bind(post.published_at)
        .bind(post.metadata.to_string())
        .bind(now)
        .bind(&post.id)
        .execute(&self.pool)
        .await
        .map_err(DbError::Sqlx)?;

        Ok(())
    }

    /// Atomically move a post to `publishing` if its current status is one of
    /// `from`. Returns whether this caller won the claim.
    pub async fn claim_for_publishing(
        &self,
        post_id: &str,
        from: &[PostStatus],
    ) -> Result<bool> {
        let placeholders = vec!["?"; from.len()].join(", ");
        let query_str = format!(
            "UPDATE posts SET status = 'publishing', updated_at = ? WHERE id = ? AND status IN ({})",
            placeholders
        );

        let now = chrono::Utc::now().timestamp();
        let mut query = sqlx::query(&query_str).bind(now).bind(post_id);
        for status in from {
            query = query.bind(status.as_str());
        }

        let result = query.execute(&self.pool).await.map_err(DbError::Sqlx)?;
        Ok(result.rows_affected() == 1)
    }

    /// Force a stuck attempt to `failed`, but only while the post is still
    /// mid-publish. Returns whether the update applied; a post that already
    /// reached a final status is left alone.
    pub async fn fail_if_publishing(
        &self,
        post_id: &str,
        metadata: &serde_json::Value,
    ) -> Result<bool> {
        let now = chrono::Utc::now().timestamp();
        let result = sqlx::query(
            r#"
            UPDATE posts
            SET status = 'failed', metadata = ?, updated_at = ?
            WHERE id = ? AND status = 'publishing'
            "#,
        )
        .bind(metadata.to_string())
        .bind(now)
        .bind(post_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::Sqlx)?;
        Ok(result.rows_affected() == 1)
    }

    /// Persist the final outcome of a publish attempt in one update.
    pub async fn finish_publish(
        &self,
        post_id: &str,
        status: PostStatus,
        published_at: Option<i64>,
        metadata: &serde_json::Value,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            UPDATE posts
            SET status = ?, published_at = ?, metadata = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(published_at)
        .bind(metadata.to_string())
        .bind(now)
        .bind(post_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::Sqlx)?;

        Ok(())
    }

    /// Scheduled posts whose time has come, earliest due first.
    pub async fn due_scheduled_posts(&self, now: i64) -> Result<Vec<Post>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, title, caption, media_urls, platforms, status,
                   scheduled_at, published_at, metadata, created_at, updated_at
            FROM posts
            WHERE status = 'scheduled' AND scheduled_at IS NOT NULL AND scheduled_at <= ?
            ORDER BY scheduled_at ASC
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::Sqlx)?;

        rows.iter().map(map_post_row).collect()
    }

    pub async fn list_posts(
        &self,
        user_id: &str,
        status: Option<PostStatus>,
    ) -> Result<Vec<Post>> {
        let rows = if let Some(status) = status {
            sqlx::query(
                r#"
                SELECT id, user_id, title, caption, media_urls, platforms, status,
                       scheduled_at, published_at, metadata, created_at, updated_at
                FROM posts WHERE user_id = ? AND status = ?
                ORDER BY created_at DESC
                "#,
            )
            .bind(user_id)
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query(
                r#"
                SELECT id, user_id, title, caption, media_urls, platforms, status,
                       scheduled_at, published_at, metadata, created_at, updated_at
                FROM posts WHERE user_id = ?
                ORDER BY created_at DESC
                "#,
            )
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
        }
        .map_err(DbError::Sqlx)?;

        rows.iter().map(map_post_row).collect()
    }

    // ----- post logs -----

    pub async fn append_log(&self, log: &PostLog) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO post_logs
                (post_id, user_id, action, platform, status_before, status_after,
                 message, error_details, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&log.post_id)
        .bind(&log.user_id)
        .bind(&log.action)
        .bind(log.platform.map(|p| p.as_str()))
        .bind(log.status_before.map(|s| s.as_str()))
        .bind(log.status_after.map(|s| s.as_str()))
        .bind(&log.message)
        .bind(&log.error_details)
        .bind(log.created_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::Sqlx)?;

        Ok(())
    }

    pub async fn get_post_logs(&self, post_id: &str) -> Result<Vec<PostLog>> {
        let rows = sqlx::query(
            r#"
            SELECT id, post_id, user_id, action, platform, status_before, status_after,
                   message, error_details, created_at
            FROM post_logs
            WHERE post_id = ?
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::Sqlx)?;

        rows.iter()
            .map(|r| {
                let platform = r
                    .get::<Option<String>, _>("platform")
                    .map(|s| Platform::from_str(&s))
                    .transpose()
                    .map_err(|e| DbError::Decode(e.to_string()))?;
                let status_before = r
                    .get::<Option<String>, _>("status_before")
                    .map(|s| PostStatus::from_str(&s))
                    .transpose()
                    .map_err(|e| DbError::Decode(e.to_string()))?;
                let status_after = r
                    .get::<Option<String>, _>("status_after")
                    .map(|s| PostStatus::from_str(&s))
                    .transpose()
                    .map_err(|e| DbError::Decode(e.to_string()))?;

                Ok(PostLog {
                    id: r.get("id"),
                    post_id: r.get("post_id"),
                    user_id: r.get("user_id"),
                    action: r.get("action"),
                    platform,
                    status_before,
                    status_after,
                    message: r.get("message"),
                    error_details: r.get("error_details"),
                    created_at: r.get("created_at"),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> Database {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        Database::from_pool(pool)
    }

    fn sample_post(user_id: &str, status: PostStatus) -> Post {
        let now = chrono::Utc::now().timestamp();
        Post {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            title: None,
            caption: "Hello".to_string(),
            media_urls: vec!["https://cdn.example/a.jpg".to_string()],
            platforms: vec![Platform::Facebook, Platform::Twitter],
            status,
            scheduled_at: None,
            published_at: None,
            metadata: serde_json::json!({}),
            created_at: now,
            updated_at: now,
        }
    }

    async fn connection_row_count(db: &Database) -> i64 {
        sqlx::query("SELECT COUNT(*) AS c FROM connected_accounts")
            .fetch_one(db.pool())
            .await
            .unwrap()
            .get("c")
    }

    #[tokio::test]
    async fn test_save_connection_twice_keeps_one_row() {
        let db = test_db().await;

        let mut new = NewConnection::new(Platform::Twitter, "token-1");
        new.metadata = serde_json::json!({"username": "alice"});
        db.save_connection("u1", &new).await.unwrap();

        new.access_token = "token-2".to_string();
        let saved = db.save_connection("u1", &new).await.unwrap();

        assert_eq!(connection_row_count(&db).await, 1);
        assert_eq!(saved.access_token, "token-2");
        assert_eq!(saved.metadata["username"], "alice");
    }

    #[tokio::test]
    async fn test_concurrent_saves_never_duplicate() {
        let db = test_db().await;

        let mut handles = Vec::new();
        for i in 0..8 {
            let db = db.clone();
            handles.push(tokio::spawn(async move {
                let new = NewConnection::new(Platform::Linkedin, format!("token-{i}"));
                db.save_connection("u1", &new).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(connection_row_count(&db).await, 1);
    }

    #[tokio::test]
    async fn test_get_connection_requires_usable_token() {
        let db = test_db().await;

        let new = NewConnection::new(Platform::Facebook, "fb-token");
        db.save_connection("u1", &new).await.unwrap();
        assert!(db.get_connection("u1", Platform::Facebook).await.unwrap().is_some());

        db.disconnect("u1", Platform::Facebook).await.unwrap();
        // Row is still there, but the connection reads as not connected
        assert!(db.get_connection("u1", Platform::Facebook).await.unwrap().is_none());
        assert_eq!(connection_row_count(&db).await, 1);
    }

    #[tokio::test]
    async fn test_disconnect_without_connection_is_idempotent() {
        let db = test_db().await;
        db.disconnect("u1", Platform::Youtube).await.unwrap();
        db.disconnect("u1", Platform::Youtube).await.unwrap();
        assert_eq!(connection_row_count(&db).await, 0);
    }

    #[tokio::test]
    async fn test_list_connections_excludes_tokens() {
        let db = test_db().await;

        let mut new = NewConnection::new(Platform::Youtube, "yt-token");
        new.metadata = serde_json::json!({"channel_name": "My Channel"});
        db.save_connection("u1", &new).await.unwrap();
        db.save_connection("u1", &NewConnection::new(Platform::Twitter, "tw-token"))
            .await
            .unwrap();
        db.disconnect("u1", Platform::Twitter).await.unwrap();

        let list = db.list_connections("u1").await.unwrap();
        assert_eq!(list.len(), 2);
        let yt = list.iter().find(|c| c.platform == Platform::Youtube).unwrap();
        assert!(yt.connected);
        assert_eq!(yt.metadata["channel_name"], "My Channel");
        let tw = list.iter().find(|c| c.platform == Platform::Twitter).unwrap();
        assert!(!tw.connected);
    }

    #[tokio::test]
    async fn test_update_tokens_preserves_metadata_and_refresh_token() {
        let db = test_db().await;

        let mut new = NewConnection::new(Platform::Youtube, "old-access");
        new.refresh_token = Some("refresh-1".to_string());
        new.metadata = serde_json::json!({"channel_id": "UC123"});
        db.save_connection("u1", &new).await.unwrap();

        // Rotation without a new refresh token keeps the old one
        db.update_connection_tokens("u1", Platform::Youtube, "new-access", None, Some(999))
            .await
            .unwrap();

        let conn = db.get_connection("u1", Platform::Youtube).await.unwrap().unwrap();
        assert_eq!(conn.access_token, "new-access");
        assert_eq!(conn.refresh_token.as_deref(), Some("refresh-1"));
        assert_eq!(conn.expires_at, Some(999));
        assert_eq!(conn.metadata["channel_id"], "UC123");
    }

    #[tokio::test]
    async fn test_clear_meta_connections() {
        let db = test_db().await;
        db.save_connection("u1", &NewConnection::new(Platform::Facebook, "fb"))
            .await
            .unwrap();
        db.save_connection("u1", &NewConnection::new(Platform::Instagram, "ig"))
            .await
            .unwrap();
        db.save_connection("u1", &NewConnection::new(Platform::Twitter, "tw"))
            .await
            .unwrap();

        db.clear_meta_connections("u1").await.unwrap();

        assert!(db.get_connection("u1", Platform::Facebook).await.unwrap().is_none());
        assert!(db.get_connection("u1", Platform::Instagram).await.unwrap().is_none());
        assert!(db.get_connection("u1", Platform::Twitter).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_post_round_trip() {
        let db = test_db().await;
        let mut post = sample_post("u1", PostStatus::Draft);
        post.title = Some("A title".to_string());
        post.metadata = serde_json::json!({"subtype": "reel"});

        db.create_post(&post).await.unwrap();
        let loaded = db.get_post(&post.id).await.unwrap().unwrap();

        assert_eq!(loaded.caption, "Hello");
        assert_eq!(loaded.title.as_deref(), Some("A title"));
        assert_eq!(loaded.platforms, vec![Platform::Facebook, Platform::Twitter]);
        assert_eq!(loaded.media_urls, vec!["https://cdn.example/a.jpg"]);
        assert_eq!(loaded.status, PostStatus::Draft);
        assert_eq!(loaded.metadata["subtype"], "reel");
    }

    #[tokio::test]
    async fn test_claim_only_succeeds_from_allowed_status() {
        let db = test_db().await;
        let post = sample_post("u1", PostStatus::Draft);
        db.create_post(&post).await.unwrap();

        assert!(!db
            .claim_for_publishing(&post.id, &[PostStatus::Scheduled])
            .await
            .unwrap());

        assert!(db
            .claim_for_publishing(&post.id, &[PostStatus::Draft, PostStatus::Scheduled])
            .await
            .unwrap());

        let loaded = db.get_post(&post.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, PostStatus::Publishing);

        // Second claim loses: the post is no longer in an allowed status
        assert!(!db
            .claim_for_publishing(&post.id, &[PostStatus::Draft, PostStatus::Scheduled])
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_claims_exactly_one_winner() {
        let db = test_db().await;
        let mut post = sample_post("u1", PostStatus::Scheduled);
        post.scheduled_at = Some(chrono::Utc::now().timestamp() - 5);
        db.create_post(&post).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let db = db.clone();
            let id = post.id.clone();
            handles.push(tokio::spawn(async move {
                db.claim_for_publishing(&id, &[PostStatus::Scheduled]).await
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_due_scheduled_posts_ordering() {
        let db = test_db().await;
        let now = chrono::Utc::now().timestamp();

        let mut late = sample_post("u1", PostStatus::Scheduled);
        late.scheduled_at = Some(now - 10);
        let mut early = sample_post("u1", PostStatus::Scheduled);
        early.scheduled_at = Some(now - 100);
        let mut future = sample_post("u1", PostStatus::Scheduled);
        future.scheduled_at = Some(now + 3600);
        let mut draft = sample_post("u1", PostStatus::Draft);
        draft.scheduled_at = Some(now - 100);

        for p in [&late, &early, &future, &draft] {
            db.create_post(p).await.unwrap();
        }

        let due = db.due_scheduled_posts(now).await.unwrap();
        assert_eq!(due.len(), 2);
        assert_eq!(due[0].id, early.id);
        assert_eq!(due[1].id, late.id);
    }

    #[tokio::test]
    async fn test_post_logs_append_and_order() {
        let db = test_db().await;
        let post = sample_post("u1", PostStatus::Scheduled);
        db.create_post(&post).await.unwrap();

        let base = chrono::Utc::now().timestamp();
        for (i, action) in ["publishing", "platform_publish"].iter().enumerate() {
            db.append_log(&PostLog {
                id: None,
                post_id: post.id.clone(),
                user_id: post.user_id.clone(),
                action: action.to_string(),
                platform: if i == 1 { Some(Platform::Facebook) } else { None },
                status_before: Some(PostStatus::Scheduled),
                status_after: Some(PostStatus::Publishing),
                message: format!("step {i}"),
                error_details: None,
                created_at: base + i as i64,
            })
            .await
            .unwrap();
        }

        let logs = db.get_post_logs(&post.id).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].action, "publishing");
        assert_eq!(logs[1].action, "platform_publish");
        assert_eq!(logs[1].platform, Some(Platform::Facebook));
        assert!(logs[0].id.is_some());
    }

    #[tokio::test]
    async fn test_fail_if_publishing_never_demotes_published() {
        let db = test_db().await;
        let post = sample_post("u1", PostStatus::Draft);
        db.create_post(&post).await.unwrap();
        db.claim_for_publishing(&post.id, &[PostStatus::Draft]).await.unwrap();

        let meta = serde_json::json!({"error": "boom"});
        assert!(db.fail_if_publishing(&post.id, &meta).await.unwrap());
        let loaded = db.get_post(&post.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, PostStatus::Failed);
        assert_eq!(loaded.metadata["error"], "boom");

        // Once a post reaches published the guard refuses to touch it
        let now = chrono::Utc::now().timestamp();
        db.claim_for_publishing(&post.id, &[PostStatus::Failed]).await.unwrap();
        db.finish_publish(&post.id, PostStatus::Published, Some(now), &serde_json::json!({}))
            .await
            .unwrap();
        assert!(!db.fail_if_publishing(&post.id, &meta).await.unwrap());
        let loaded = db.get_post(&post.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, PostStatus::Published);
        assert_eq!(loaded.published_at, Some(now));
    }

    #[tokio::test]
    async fn test_finish_publish_single_update() {
        let db = test_db().await;
        let post = sample_post("u1", PostStatus::Draft);
        db.create_post(&post).await.unwrap();
        db.claim_for_publishing(&post.id, &[PostStatus::Draft]).await.unwrap();

        let now = chrono::Utc::now().timestamp();
        let metadata = serde_json::json!({
            "publish_results": [
                {"platform": "facebook", "success": true, "external_id": "1_2", "message": "ok"}
            ]
        });
        db.finish_publish(&post.id, PostStatus::Published, Some(now), &metadata)
            .await
            .unwrap();

        let loaded = db.get_post(&post.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, PostStatus::Published);
        assert_eq!(loaded.published_at, Some(now));
        assert_eq!(loaded.metadata["publish_results"][0]["platform"], "facebook");
    }
}
