//! Instagram publisher
//!
//! Two-phase Graph API protocol: create a media container referencing a
//! public media URL, give the provider a fixed settle interval to process it,
//! then publish by container id. Stories and reels use their container
//! media types; plain posts use `image_url`.

use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

use crate::error::{PublishError, Result};
use crate::types::{Connection, Post};

use super::{classify_graph_error, client, map_send_error, Publisher, PUBLISH_TIMEOUT};

const GRAPH_BASE: &str = "https://graph.facebook.com/v25.0";

/// Provider-side container processing is asynchronous; publishing too early
/// fails with "media not ready".
const SETTLE_INTERVAL: Duration = Duration::from_secs(3);

pub struct InstagramPublisher {
    http: reqwest::Client,
}

impl InstagramPublisher {
    pub fn new() -> Result<Self> {
        Ok(Self {
            http: client(PUBLISH_TIMEOUT)?,
        })
    }

    async fn graph_post(
        &self,
        url: String,
        form: &[(&str, &str)],
    ) -> std::result::Result<serde_json::Value, PublishError> {
        let response = self
            .http
            .post(url)
            .form(form)
            .send()
            .await
            .map_err(|e| map_send_error("instagram", e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| map_send_error("instagram", e))?;

        if !status.is_success() {
            return Err(classify_graph_error("instagram", status, &body));
        }
        serde_json::from_str(&body)
            .map_err(|e| PublishError::Rejected(format!("instagram returned invalid json: {e}")))
    }
}

fn is_video_url(url: &str) -> bool {
    let path = url.split('?').next().unwrap_or(url).to_ascii_lowercase();
    path.ends_with(".mp4") || path.ends_with(".mov") || path.ends_with(".m4v")
}

#[async_trait]
impl Publisher for InstagramPublisher {
    fn name(&self) -> &str {
        "instagram"
    }

    async fn publish(
        &self,
        conn: &Connection,
        post: &Post,
    ) -> std::result::Result<String, PublishError> {
        let ig_id = conn
            .instagram_business_id
            .as_deref()
            .or_else(|| conn.metadata["instagram_business_id"].as_str())
            .ok_or_else(|| {
                PublishError::Rejected(
                    "instagram connection has no business account id".to_string(),
                )
            })?;

        let media_url = post.media_urls.first().ok_or_else(|| {
            PublishError::Rejected("instagram requires a media url".to_string())
        })?;

        let subtype = post.metadata["subtype"].as_str().unwrap_or("post");

        // Phase 1: container
        let mut form: Vec<(&str, &str)> = vec![
            ("caption", post.caption.as_str()),
            ("access_token", conn.access_token.as_str()),
        ];
        match (subtype, is_video_url(media_url)) {
            ("story", true) => {
                form.push(("video_url", media_url.as_str()));
                form.push(("media_type", "STORIES"));
            }
            ("story", false) => {
                form.push(("image_url", media_url.as_str()));
                form.push(("media_type", "STORIES"));
            }
            (_, true) => {
                form.push(("video_url", media_url.as_str()));
                form.push(("media_type", "REELS"));
            }
            (_, false) => {
                form.push(("image_url", media_url.as_str()));
            }
        }

        let container = self
            .graph_post(format!("{GRAPH_BASE}/{ig_id}/media"), &form)
            .await?;
        let creation_id = container["id"].as_str().ok_or_else(|| {
            PublishError::Rejected("instagram container response carried no id".to_string())
        })?;

        tokio::time::sleep(SETTLE_INTERVAL).await;

        // Phase 2: publish by container id
        let published = self
            .graph_post(
                format!("{GRAPH_BASE}/{ig_id}/media_publish"),
                &[
                    ("creation_id", creation_id),
                    ("access_token", conn.access_token.as_str()),
                ],
            )
            .await?;

        let external_id = published["id"]
            .as_str()
            .ok_or_else(|| {
                PublishError::Rejected("instagram publish response carried no id".to_string())
            })?
            .to_string();

        info!(ig_id, external_id, "published to instagram");
        Ok(external_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Platform, PostStatus};

    fn connection(ig_id: Option<&str>) -> Connection {
        Connection {
            id: "c1".to_string(),
            user_id: "u1".to_string(),
            platform: Platform::Instagram,
            access_token: "tok".to_string(),
            refresh_token: None,
            expires_at: None,
            page_id: Some("page-1".to_string()),
            instagram_business_id: ig_id.map(String::from),
            metadata: serde_json::json!({}),
            created_at: 0,
            updated_at: 0,
        }
    }

    fn post_with_media(media: Vec<&str>) -> Post {
        Post {
            id: "p1".to_string(),
            user_id: "u1".to_string(),
            title: None,
            caption: "Hello".to_string(),
            media_urls: media.into_iter().map(String::from).collect(),
            platforms: vec![Platform::Instagram],
            status: PostStatus::Publishing,
            scheduled_at: None,
            published_at: None,
            metadata: serde_json::json!({}),
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn test_video_url_detection() {
        assert!(is_video_url("https://cdn.example/clip.mp4"));
        assert!(is_video_url("https://cdn.example/clip.MOV?sig=abc"));
        assert!(!is_video_url("https://cdn.example/pic.jpg"));
        assert!(!is_video_url("https://cdn.example/pic.jpg?name=a.mp4x"));
    }

    #[tokio::test]
    async fn test_missing_business_account_is_rejected() {
        let publisher = InstagramPublisher::new().unwrap();
        let err = publisher
            .publish(&connection(None), &post_with_media(vec!["https://cdn.example/a.jpg"]))
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_missing_media_is_rejected() {
        let publisher = InstagramPublisher::new().unwrap();
        let err = publisher
            .publish(&connection(Some("ig-1")), &post_with_media(vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::Rejected(ref m) if m.contains("media")));
    }
}
