//! YouTube publisher
//!
//! Refreshes the Google access token first when it is near expiry, writing
//! rotated tokens straight back to the connection store, then runs the
//! resumable upload protocol: initiate, PUT the video bytes, and a
//! best-effort thumbnail call whose failure never fails the upload.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::Config;
use crate::db::Database;
use crate::error::{PublishError, Result};
use crate::oauth::google::refresh_access_token;
use crate::oauth::http_client;
use crate::types::{Connection, Platform, Post};

use super::{classify_status, client, map_send_error, Publisher, UPLOAD_TIMEOUT};

const UPLOAD_URL: &str = "https://www.googleapis.com/upload/youtube/v3/videos";
const THUMBNAIL_URL: &str = "https://www.googleapis.com/upload/youtube/v3/thumbnails/set";

/// Refresh when the stored token has less than this many seconds left.
const REFRESH_MARGIN_SECS: i64 = 60;

pub struct YoutubePublisher {
    /// Long-timeout client for the video bytes
    upload_http: reqwest::Client,
    /// Short-timeout client for token refresh
    oauth_http: reqwest::Client,
    client_id: String,
    client_secret: String,
    db: Database,
}

impl YoutubePublisher {
    pub fn new(config: &Config, db: Database) -> Result<Self> {
        let provider = config.provider(Platform::Youtube)?;
        Ok(Self {
            upload_http: client(UPLOAD_TIMEOUT)?,
            oauth_http: http_client()?,
            client_id: provider.client_id.clone(),
            client_secret: provider.client_secret.clone(),
            db,
        })
    }

    /// Return a token valid long enough for the upload, refreshing and
    /// writing back if needed. A failed write-back is logged and does not
    /// fail the in-flight publish.
    async fn fresh_token(&self, conn: &Connection) -> std::result::Result<String, PublishError> {
        let now = chrono::Utc::now().timestamp();
        let near_expiry = conn
            .expires_at
            .map(|t| t - now < REFRESH_MARGIN_SECS)
            .unwrap_or(false);

        if !near_expiry {
            return Ok(conn.access_token.clone());
        }

        let refresh_token = conn.refresh_token.as_deref().ok_or_else(|| {
            PublishError::CredentialInvalid(
                "youtube token expired and no refresh token is stored".to_string(),
            )
        })?;

        let refreshed = refresh_access_token(
            &self.oauth_http,
            &self.client_id,
            &self.client_secret,
            refresh_token,
        )
        .await
        .map_err(|e| {
            PublishError::CredentialInvalid(format!("youtube token refresh failed: {e}"))
        })?;

        if let Err(e) = self
            .db
            .update_connection_tokens(
                &conn.user_id,
                Platform::Youtube,
                &refreshed.access_token,
                refreshed.refresh_token.as_deref(),
                refreshed.expires_at,
            )
            .await
        {
            warn!(user_id = %conn.user_id, error = %e, "failed to write refreshed youtube tokens back");
        } else {
            info!(user_id = %conn.user_id, "refreshed youtube tokens written back");
        }

        Ok(refreshed.access_token)
    }

    async fn download_media(&self, url: &str) -> std::result::Result<Vec<u8>, PublishError> {
        let response = self
            .upload_http
            .get(url)
            .send()
            .await
            .map_err(|e| map_send_error("youtube", e))?;
        if !response.status().is_success() {
            return Err(PublishError::Rejected(format!(
                "media url returned {}",
                response.status()
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| map_send_error("youtube", e))?;
        Ok(bytes.to_vec())
    }

    async fn set_thumbnail(&self, token: &str, video_id: &str, thumbnail_url: &str) {
        let result: std::result::Result<(), PublishError> = async {
            let bytes = self.download_media(thumbnail_url).await?;
            let response = self
                .upload_http
                .post(THUMBNAIL_URL)
                .query(&[("videoId", video_id)])
                .bearer_auth(token)
                .header("Content-Type", "image/jpeg")
                .body(bytes)
                .send()
                .await
                .map_err(|e| map_send_error("youtube", e))?;
            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(classify_status("youtube", status, &body));
            }
            Ok(())
        }
        .await;

        // Thumbnail failure must not fail the primary upload
        if let Err(e) = result {
            warn!(video_id, error = %e, "thumbnail set failed, keeping upload");
        }
    }
}

#[async_trait]
impl Publisher for YoutubePublisher {
    fn name(&self) -> &str {
        "youtube"
    }

    async fn publish(
        &self,
        conn: &Connection,
        post: &Post,
    ) -> std::result::Result<String, PublishError> {
        let media_url = post.media_urls.first().ok_or_else(|| {
            PublishError::Rejected("youtube requires a video url".to_string())
        })?;

        let token = self.fresh_token(conn).await?;
        let video = self.download_media(media_url).await?;

        let title = post
            .title
            .clone()
            .unwrap_or_else(|| post.caption.chars().take(100).collect());
        let body = serde_json::json!({
            "snippet": {
                "title": title,
                "description": post.caption,
                "categoryId": "22",
            },
            "status": {
                "privacyStatus": "public",
                "selfDeclaredMadeForKids": false,
            },
        });

        // Initiate the resumable session
        let response = self
            .upload_http
            .post(UPLOAD_URL)
            .query(&[("uploadType", "resumable"), ("part", "snippet,status")])
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_send_error("youtube", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status("youtube", status, &text));
        }

        let session_url = response
            .headers()
            .get("location")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                PublishError::Transient("youtube returned no resumable session url".to_string())
            })?
            .to_string();

        // Ship the bytes
        let response = self
            .upload_http
            .put(&session_url)
            .bearer_auth(&token)
            .header("Content-Type", "video/*")
            .body(video)
            .send()
            .await
            .map_err(|e| map_send_error("youtube", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status("youtube", status, &text));
        }

        let uploaded: serde_json::Value = response
            .json()
            .await
            .map_err(|e| map_send_error("youtube", e))?;
        let video_id = uploaded["id"]
            .as_str()
            .ok_or_else(|| {
                PublishError::Rejected("youtube upload response carried no video id".to_string())
            })?
            .to_string();

        if let Some(thumbnail_url) = post.metadata["thumbnail_url"].as_str() {
            self.set_thumbnail(&token, &video_id, thumbnail_url).await;
        }

        info!(video_id, "published to youtube");
        Ok(video_id)
    }
}
