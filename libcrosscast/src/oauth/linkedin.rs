//! LinkedIn OAuth2

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

const AUTH_URL: &str = "https://www.linkedin.com/oauth/v2/authorization";
const TOKEN_URL: &str = "https://www.linkedin.com/oauth/v2/accessToken";
const ME_URL: &str = "https://api.linkedin.com/v2/me";
const SCOPES: &str = "openid profile w_member_social";

pub struct LinkedinOAuth {
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    http: reqwest::Client,
    db: Database,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Profile {
    id: String,
    #[serde(rename = "localizedFirstName", default)]
    first_name: String,
    #[serde(rename = "localizedLastName", default)]
    last_name: String,
}

impl LinkedinOAuth {
    pub fn new(config: &Config, db: Database) -> Result<Self> {
        let provider = config.provider(Platform::Linkedin)?;
        Ok(Self {
            client_id: provider.client_id.clone(),
            client_secret: provider.client_secret.clone(),
            redirect_uri: config.redirect_uri(Platform::Linkedin),
            http: http_client()?,
            db,
        })
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenResponse> {
        let response = self
            .http
            .post(TOKEN_URL)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(OAuthError::Http)?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(provider = "linkedin", %body, "code exchange failed");
            return Err(OAuthError::ExchangeFailed {
                provider: "linkedin".to_string(),
                detail: "code exchange rejected".to_string(),
            }
            .into());
        }
        Ok(response.json().await.map_err(OAuthError::Http)?)
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<Profile> {
        let response = self
            .http
            .get(ME_URL)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(OAuthError::Http)?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(provider = "linkedin", %body, "profile fetch failed");
            return Err(OAuthError::EnrichmentFailed {
                provider: "linkedin".to_string(),
                detail: "profile fetch rejected".to_string(),
            }
            .into());
        }
        Ok(response.json().await.map_err(OAuthError::Http)?)
    }
}

#[async_trait]
impl OAuthProvider for LinkedinOAuth {
    fn platform(&self) -> Platform {
        Platform::Linkedin
    }

    fn authorize(&self) -> Result<AuthorizeRedirect> {
        let state = random_state();
        let url = build_url(
            AUTH_URL,
            &[
                ("response_type", "code"),
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("state", state.as_str()),
                ("scope", SCOPES),
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
            provider: "linkedin".to_string(),
            detail: "response carried no access token".to_string(),
        })?;

        let profile = self.fetch_profile(&access_token).await?;

        let mut new = NewConnection::new(Platform::Linkedin, access_token);
        new.expires_at = tokens
            .expires_in
            .map(|secs| chrono::Utc::now().timestamp() + secs);
        new.metadata = serde_json::json!({
            "id": profile.id,
            "firstName": profile.first_name,
            "lastName": profile.last_name,
        });

        let saved = self.db.save_connection(user_id, &new).await?;
        info!(user_id, linkedin_id = %profile.id, "linkedin account connected");
        Ok(vec![saved])
    }

    // LinkedIn has no remote revoke wired up; disconnect is local-only.
}
