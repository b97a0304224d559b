//! Facebook page publisher
//!
//! One Graph API call with the page access token: `/photos` when the post
//! carries media, `/feed` for text-only posts.

use async_trait::async_trait;
use tracing::info;

use crate::error::{PublishError, Result};
use crate::types::{Connection, Post};

use super::{classify_graph_error, client, map_send_error, Publisher, PUBLISH_TIMEOUT};

const GRAPH_BASE: &str = "https://graph.facebook.com/v25.0";

pub struct FacebookPublisher {
    http: reqwest::Client,
}

impl FacebookPublisher {
    pub fn new() -> Result<Self> {
        Ok(Self {
            http: client(PUBLISH_TIMEOUT)?,
        })
    }
}

#[async_trait]
impl Publisher for FacebookPublisher {
    fn name(&self) -> &str {
        "facebook"
    }

    async fn publish(
        &self,
        conn: &Connection,
        post: &Post,
    ) -> std::result::Result<String, PublishError> {
        let page_id = conn
            .page_id
            .as_deref()
            .or_else(|| conn.metadata["page_id"].as_str())
            .ok_or_else(|| {
                PublishError::Rejected("facebook connection has no page id".to_string())
            })?;

        let response = if let Some(media_url) = post.media_urls.first() {
            self.http
                .post(format!("{GRAPH_BASE}/{page_id}/photos"))
                .form(&[
                    ("url", media_url.as_str()),
                    ("caption", post.caption.as_str()),
                    ("access_token", conn.access_token.as_str()),
                ])
                .send()
                .await
        } else {
            self.http
                .post(format!("{GRAPH_BASE}/{page_id}/feed"))
                .form(&[
                    ("message", post.caption.as_str()),
                    ("access_token", conn.access_token.as_str()),
                ])
                .send()
                .await
        }
        .map_err(|e| map_send_error("facebook", e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| map_send_error("facebook", e))?;

        if !status.is_success() {
            return Err(classify_graph_error("facebook", status, &body));
        }

        let value: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| PublishError::Rejected(format!("facebook returned invalid json: {e}")))?;
        let external_id = value["post_id"]
            .as_str()
            .or_else(|| value["id"].as_str())
            .ok_or_else(|| {
                PublishError::Rejected("facebook response carried no post id".to_string())
            })?
            .to_string();

        info!(page_id, external_id, "published to facebook");
        Ok(external_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Platform;

    fn connection_without_page() -> Connection {
        Connection {
            id: "c1".to_string(),
            user_id: "u1".to_string(),
            platform: Platform::Facebook,
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
            caption: "Hello".to_string(),
            media_urls: vec![],
            platforms: vec![Platform::Facebook],
            status: crate::types::PostStatus::Publishing,
            scheduled_at: None,
            published_at: None,
            metadata: serde_json::json!({}),
            created_at: 0,
            updated_at: 0,
        }
    }

    #[tokio::test]
    async fn test_missing_page_id_is_rejected_not_transient() {
        let publisher = FacebookPublisher::new().unwrap();
        let err = publisher
            .publish(&connection_without_page(), &sample_post())
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::Rejected(_)));
    }
}
