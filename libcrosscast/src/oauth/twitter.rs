//! Twitter OAuth2 with PKCE
//!
//! The code verifier crosses the redirect round trip in a short-lived
//! http-only cookie scoped to the twitter connect path; the transport layer
//! sets it from [`AuthorizeRedirect::cookie`] and hands it back through
//! [`CallbackParams::verifier`].

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use tracing::{error, info};

use crate::config::Config;
use crate::db::Database;
use crate::error::{OAuthError, Result};
use crate::types::{Connection, NewConnection, Platform};

use super::{
    build_url, http_client, pkce_pair, random_state, require_code, AuthorizeRedirect,
    CallbackParams, OAuthProvider, VerifierCookie,
};

const AUTH_URL: &str = "https://twitter.com/i/oauth2/authorize";
const TOKEN_URL: &str = "https://api.twitter.com/2/oauth2/token";
const ME_URL: &str = "https://api.twitter.com/2/users/me";
const SCOPES: &str = "tweet.read tweet.write users.read offline.access";

pub const VERIFIER_COOKIE_NAME: &str = "twitter_code_verifier";

pub struct TwitterOAuth {
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
}

#[derive(Debug, Deserialize)]
struct MeResponse {
    data: Profile,
}

#[derive(Debug, Deserialize)]
struct Profile {
    id: String,
    name: String,
    username: String,
}

impl TwitterOAuth {
    pub fn new(config: &Config, db: Database) -> Result<Self> {
        let provider = config.provider(Platform::Twitter)?;
        Ok(Self {
            client_id: provider.client_id.clone(),
            client_secret: provider.client_secret.clone(),
            redirect_uri: config.redirect_uri(Platform::Twitter),
            http: http_client()?,
            db,
        })
    }

    async fn exchange_code(&self, code: &str, verifier: &str) -> Result<TokenResponse> {
        let basic = STANDARD.encode(format!("{}:{}", self.client_id, self.client_secret));
        let response = self
            .http
            .post(TOKEN_URL)
            .header("Authorization", format!("Basic {basic}"))
            .form(&[
                ("code", code),
                ("grant_type", "authorization_code"),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("code_verifier", verifier),
            ])
            .send()
            .await
            .map_err(OAuthError::Http)?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(provider = "twitter", %body, "code exchange failed");
            return Err(OAuthError::ExchangeFailed {
                provider: "twitter".to_string(),
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
            error!(provider = "twitter", %body, "users/me fetch failed");
            return Err(OAuthError::EnrichmentFailed {
                provider: "twitter".to_string(),
                detail: "profile fetch rejected".to_string(),
            }
            .into());
        }
        let me: MeResponse = response.json().await.map_err(OAuthError::Http)?;
        Ok(me.data)
    }
}

#[async_trait]
impl OAuthProvider for TwitterOAuth {
    fn platform(&self) -> Platform {
        Platform::Twitter
    }

    fn authorize(&self) -> Result<AuthorizeRedirect> {
        let state = random_state();
        let (verifier, challenge) = pkce_pair();

        let url = build_url(
            AUTH_URL,
            &[
                ("response_type", "code"),
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("scope", SCOPES),
                ("state", state.as_str()),
                ("code_challenge", challenge.as_str()),
                ("code_challenge_method", "S256"),
            ],
        )?;

        Ok(AuthorizeRedirect {
            url,
            state,
            cookie: Some(VerifierCookie::new(
                VERIFIER_COOKIE_NAME,
                verifier,
                "/api/connect/twitter",
            )),
        })
    }

    async fn handle_callback(
        &self,
        user_id: &str,
        params: &CallbackParams,
    ) -> Result<Vec<Connection>> {
        let code = require_code(params)?;
        let verifier = params
            .verifier
            .as_deref()
            .ok_or(OAuthError::MissingVerifier)?;

        let tokens = self.exchange_code(code, verifier).await?;
        let access_token = tokens.access_token.ok_or_else(|| OAuthError::ExchangeFailed {
            provider: "twitter".to_string(),
            detail: "response carried no access token".to_string(),
        })?;

        let profile = self.fetch_profile(&access_token).await?;

        let mut new = NewConnection::new(Platform::Twitter, access_token);
        new.refresh_token = tokens.refresh_token;
        new.expires_at = tokens
            .expires_in
            .map(|secs| chrono::Utc::now().timestamp() + secs);
        new.metadata = serde_json::json!({
            "id": profile.id,
            "name": profile.name,
            "username": profile.username,
        });

        let saved = self.db.save_connection(user_id, &new).await?;
        info!(user_id, username = %profile.username, "twitter account connected");
        Ok(vec![saved])
    }

    // No remote revoke endpoint is wired up; disconnect is local-only.
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, DatabaseConfig, ProviderConfig};
    use sqlx::sqlite::SqlitePool;

    async fn test_setup() -> TwitterOAuth {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        let config = Config {
            database: DatabaseConfig::default(),
            app: AppConfig {
                base_url: "https://crosscast.example".to_string(),
            },
            meta: None,
            google: None,
            twitter: Some(ProviderConfig {
                client_id: "tw-id".to_string(),
                client_secret: "tw-secret".to_string(),
            }),
            linkedin: None,
        };
        TwitterOAuth::new(&config, Database::from_pool(pool)).unwrap()
    }

    #[tokio::test]
    async fn test_authorize_sets_pkce_cookie() {
        let oauth = test_setup().await;
        let redirect = oauth.authorize().unwrap();

        assert!(redirect.url.contains("code_challenge_method=S256"));
        assert!(redirect.url.contains("code_challenge="));

        let cookie = redirect.cookie.unwrap();
        assert_eq!(cookie.name, VERIFIER_COOKIE_NAME);
        assert_eq!(cookie.max_age_secs, 300);
        assert!(cookie.http_only);
        assert!(cookie.secure);
        assert_eq!(cookie.path, "/api/connect/twitter");
        // The verifier itself must not leak into the authorize URL
        assert!(!redirect.url.contains(&cookie.value));
    }

    #[tokio::test]
    async fn test_callback_requires_verifier() {
        let oauth = test_setup().await;
        let params = CallbackParams {
            code: Some("abc".to_string()),
            ..Default::default()
        };
        let err = oauth.handle_callback("u1", &params).await.unwrap_err();
        match err {
            crate::CrosscastError::OAuth(e) => assert_eq!(e.code(), "no_verifier"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_revoke_is_local_only() {
        let oauth = test_setup().await;
        let conn = Connection {
            id: "c1".to_string(),
            user_id: "u1".to_string(),
            platform: Platform::Twitter,
            access_token: "tok".to_string(),
            refresh_token: None,
            expires_at: None,
            page_id: None,
            instagram_business_id: None,
            metadata: serde_json::json!({}),
            created_at: 0,
            updated_at: 0,
        };
        // Default impl: succeeds without any network call
        oauth.revoke(&conn).await.unwrap();
    }
}
