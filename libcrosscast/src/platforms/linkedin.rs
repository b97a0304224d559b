//! LinkedIn publisher: single bearer-token POST of a UGC share.

use async_trait::async_trait;
use tracing::info;

use crate::error::{PublishError, Result};
use crate::types::{Connection, Post};

use super::{classify_status, client, map_send_error, Publisher, PUBLISH_TIMEOUT};

const UGC_POSTS_URL: &str = "https://api.linkedin.com/v2/ugcPosts";

pub struct LinkedinPublisher {
    http: reqwest::Client,
}

impl LinkedinPublisher {
    pub fn new() -> Result<Self> {
        Ok(Self {
            http: client(PUBLISH_TIMEOUT)?,
        })
    }
}

#[async_trait]
impl Publisher for LinkedinPublisher {
    fn name(&self) -> &str {
        "linkedin"
    }

    async fn publish(
        &self,
        conn: &Connection,
        post: &Post,
    ) -> std::result::Result<String, PublishError> {
        let member_id = conn.metadata["id"].as_str().ok_or_else(|| {
            PublishError::Rejected("linkedin connection has no member id".to_string())
        })?;

        let body = serde_json::json!({
            "author": format!("urn:li:person:{member_id}"),
            "lifecycleState": "PUBLISHED",
            "specificContent": {
                "com.linkedin.ugc.ShareContent": {
                    "shareCommentary": { "text": post.caption },
                    "shareMediaCategory": "NONE",
                }
            },
            "visibility": {
                "com.linkedin.ugc.MemberNetworkVisibility": "PUBLIC",
            },
        });

        let response = self
            .http
            .post(UGC_POSTS_URL)
            .bearer_auth(&conn.access_token)
            .header("X-Restli-Protocol-Version", "2.0.0")
            .json(&body)
            .send()
            .await
            .map_err(|e| map_send_error("linkedin", e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| map_send_error("linkedin", e))?;

        if !status.is_success() {
            return Err(classify_status("linkedin", status, &text));
        }

        let value: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| PublishError::Rejected(format!("linkedin returned invalid json: {e}")))?;
        let external_id = value["id"]
            .as_str()
            .ok_or_else(|| {
                PublishError::Rejected("linkedin response carried no share id".to_string())
            })?
            .to_string();

        info!(external_id, "published to linkedin");
        Ok(external_id)
    }
}
