//! Twitter publisher: single bearer-token POST to the tweets endpoint.

use async_trait::async_trait;
use tracing::info;

use crate::error::{PublishError, Result};
use crate::types::{Connection, Post};

use super::{classify_status, client, map_send_error, Publisher, PUBLISH_TIMEOUT};

const TWEETS_URL: &str = "https://api.twitter.com/2/tweets";

pub struct TwitterPublisher {
    http: reqwest::Client,
}

impl TwitterPublisher {
    pub fn new() -> Result<Self> {
        Ok(Self {
            http: client(PUBLISH_TIMEOUT)?,
        })
    }
}

#[async_trait]
impl Publisher for TwitterPublisher {
    fn name(&self) -> &str {
        "twitter"
    }

    async fn publish(
        &self,
        conn: &Connection,
        post: &Post,
    ) -> std::result::Result<String, PublishError> {
        let response = self
            .http
            .post(TWEETS_URL)
            .bearer_auth(&conn.access_token)
            .json(&serde_json::json!({ "text": post.caption }))
            .send()
            .await
            .map_err(|e| map_send_error("twitter", e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| map_send_error("twitter", e))?;

        if !status.is_success() {
            return Err(classify_status("twitter", status, &body));
        }

        let value: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| PublishError::Rejected(format!("twitter returned invalid json: {e}")))?;
        let external_id = value["data"]["id"]
            .as_str()
            .ok_or_else(|| {
                PublishError::Rejected("twitter response carried no tweet id".to_string())
            })?
            .to_string();

        info!(external_id, "published to twitter");
        Ok(external_id)
    }
}
