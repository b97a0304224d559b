//! Google OAuth for YouTube
//!
//! Requests offline access so a refresh token comes back; the refresh leg is
//! reused by the YouTube publisher, which writes rotated tokens straight back
//! to the connection store.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{error, info};

use crate::config::Config;
use crate::db::Database;
use crate::error::{OAuthError, Result};
use crate::types::{Connection, NewConnection, Platform};

use super::{
    build_url, http_client, random_state, require_code, AuthorizeRedirect, CallbackParams,
    OAuthProvider,
};

const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const REVOKE_URL: &str = "https://oauth2.googleapis.com/revoke";
const CHANNELS_URL: &str = "https://www.googleapis.com/youtube/v3/channels";
const SCOPES: &str =
    "https://www.googleapis.com/auth/youtube.upload https://www.googleapis.com/auth/youtube";

pub struct GoogleOAuth {
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    http: reqwest::Client,
    db: Database,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChannelList {
    #[serde(default)]
    items: Vec<Channel>,
}

#[derive(Debug, Deserialize)]
struct Channel {
    id: String,
    snippet: ChannelSnippet,
}

#[derive(Debug, Deserialize)]
struct ChannelSnippet {
    title: String,
    #[serde(default)]
    thumbnails: serde_json::Value,
}

/// Tokens coming out of a refresh-grant exchange
#[derive(Debug, Clone)]
pub struct RefreshedTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<i64>,
}

/// Exchange a refresh token for a fresh access token.
pub async fn refresh_access_token(
    http: &reqwest::Client,
    client_id: &str,
    client_secret: &str,
    refresh_token: &str,
) -> Result<RefreshedTokens> {
    let response = http
        .post(TOKEN_URL)
        .form(&[
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ])
        .send()
        .await
        .map_err(OAuthError::Http)?;

    if !response.status().is_success() {
        let body = response.text().await.unwrap_or_default();
        error!(provider = "google", %body, "token refresh failed");
        return Err(OAuthError::ExchangeFailed {
            provider: "google".to_string(),
            detail: "refresh grant rejected".to_string(),
        }
        .into());
    }

    let tokens: TokenResponse = response.json().await.map_err(OAuthError::Http)?;
    let access_token = tokens.access_token.ok_or_else(|| OAuthError::ExchangeFailed {
        provider: "google".to_string(),
        detail: "refresh response carried no access token".to_string(),
    })?;
    Ok(RefreshedTokens {
        access_token,
        refresh_token: tokens.refresh_token,
        expires_at: tokens
            .expires_in
            .map(|secs| chrono::Utc::now().timestamp() + secs),
    })
}

impl GoogleOAuth {
    pub fn new(config: &Config, db: Database) -> Result<Self> {
        let provider = config.provider(Platform::Youtube)?;
        Ok(Self {
            client_id: provider.client_id.clone(),
            client_secret: provider.client_secret.clone(),
            redirect_uri: config.redirect_uri(Platform::Youtube),
            http: http_client()?,
            db,
        })
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenResponse> {
        let response = self
            .http
            .post(TOKEN_URL)
            .form(&[
                ("code", code),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(OAuthError::Http)?;

        let status = response.status();
        let tokens: TokenResponse = response.json().await.map_err(OAuthError::Http)?;

        if !status.is_success() {
            error!(provider = "google", ?tokens.error, "code exchange failed");
            if tokens.error.as_deref() == Some("redirect_uri_mismatch") {
                return Err(OAuthError::RedirectMismatch.into());
            }
            return Err(OAuthError::ExchangeFailed {
                provider: "google".to_string(),
                detail: "code exchange rejected".to_string(),
            }
            .into());
        }
        Ok(tokens)
    }

    async fn fetch_channel(&self, access_token: &str) -> Result<Channel> {
        let response = self
            .http
            .get(CHANNELS_URL)
            .query(&[("part", "snippet"), ("mine", "true")])
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(OAuthError::Http)?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(provider = "google", %body, "channel fetch failed");
            return Err(OAuthError::EnrichmentFailed {
                provider: "google".to_string(),
                detail: "channel fetch rejected".to_string(),
            }
            .into());
        }

        let channels: ChannelList = response.json().await.map_err(OAuthError::Http)?;
        channels
            .items
            .into_iter()
            .next()
            .ok_or_else(|| OAuthError::NoChannelFound.into())
    }
}

#[async_trait]
impl OAuthProvider for GoogleOAuth {
    fn platform(&self) -> Platform {
        Platform::Youtube
    }

    fn authorize(&self) -> Result<AuthorizeRedirect> {
        let state = random_state();
        // access_type=offline with prompt=consent is the only combination
        // that reliably returns a refresh token
        let url = build_url(
            AUTH_URL,
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", SCOPES),
                ("access_type", "offline"),
                ("prompt", "consent"),
                ("state", state.as_str()),
            ],
        )?;
        Ok(AuthorizeRedirect {
            url,
            state,
            cookie: None,
        })
    }

    async fn handle_callback(
        &self,
        user_id: &str,
        params: &CallbackParams,
    ) -> Result<Vec<Connection>> {
        let code = require_code(params)?;

        let tokens = self.exchange_code(code).await?;
        let access_token = tokens.access_token.ok_or_else(|| OAuthError::ExchangeFailed {
            provider: "google".to_string(),
            detail: "response carried no access token".to_string(),
        })?;

        let channel = self.fetch_channel(&access_token).await?;
        let thumbnail = channel.snippet.thumbnails["default"]["url"]
            .as_str()
            .unwrap_or_default()
            .to_string();

        let mut new = NewConnection::new(Platform::Youtube, access_token);
        new.refresh_token = tokens.refresh_token;
        new.expires_at = tokens
            .expires_in
            .map(|secs| chrono::Utc::now().timestamp() + secs);
        new.metadata = serde_json::json!({
            "channel_id": channel.id,
            "channel_name": channel.snippet.title,
            "thumbnail": thumbnail,
        });

        let saved = self.db.save_connection(user_id, &new).await?;
        info!(user_id, channel_id = %channel.id, "youtube channel connected");
        Ok(vec![saved])
    }

    async fn revoke(&self, conn: &Connection) -> Result<()> {
        let response = self
            .http
            .post(REVOKE_URL)
            .form(&[("token", conn.access_token.as_str())])
            .send()
            .await
            .map_err(OAuthError::Http)?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OAuthError::EnrichmentFailed {
                provider: "google".to_string(),
                detail: format!("revoke rejected: {body}"),
            }
            .into());
        }
        Ok(())
    }
}
