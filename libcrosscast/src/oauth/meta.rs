//! Meta OAuth: one flow connecting Facebook pages and, when a page has a
//! linked Instagram Business Account, Instagram as well.
//!
//! The callback leg performs the short-to-long-lived token exchange before
//! anything is persisted, then walks `me/accounts` probing each page for a
//! linked Instagram account. The first page that yields a platform wins;
//! later pages never overwrite a saved connection.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::db::Database;
use crate::error::{OAuthError, Result};
use crate::types::{Connection, NewConnection, Platform};

use super::{
    build_url, http_client, random_state, require_code, AuthorizeRedirect, CallbackParams,
    OAuthProvider,
};

const GRAPH_BASE: &str = "https://graph.facebook.com/v25.0";
const DIALOG_URL: &str = "https://www.facebook.com/v25.0/dialog/oauth";
const SCOPES: &str =
    "pages_show_list,pages_read_engagement,pages_manage_posts,instagram_basic,instagram_content_publish";

/// Long-lived tokens run about 60 days; assumed when the exchange response
/// omits expires_in.
const LONG_LIVED_DEFAULT_SECS: i64 = 60 * 24 * 60 * 60;

pub struct MetaOAuth {
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
struct PageList {
    #[serde(default)]
    data: Vec<Page>,
}

#[derive(Debug, Deserialize)]
struct Page {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IgProbe {
    instagram_business_account: Option<IgAccount>,
}

#[derive(Debug, Deserialize)]
struct IgAccount {
    id: String,
}

impl MetaOAuth {
    pub fn new(config: &Config, db: Database) -> Result<Self> {
        let provider = config.provider(Platform::Facebook)?;
        Ok(Self {
            client_id: provider.client_id.clone(),
            client_secret: provider.client_secret.clone(),
            redirect_uri: config.redirect_uri(Platform::Facebook),
            http: http_client()?,
            db,
        })
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenResponse> {
        let response = self
            .http
            .get(format!("{GRAPH_BASE}/oauth/access_token"))
            .query(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("code", code),
            ])
            .send()
            .await
            .map_err(OAuthError::Http)?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(provider = "meta", %body, "code exchange failed");
            return Err(OAuthError::ExchangeFailed {
                provider: "meta".to_string(),
                detail: "code exchange rejected".to_string(),
            }
            .into());
        }
        Ok(response.json().await.map_err(OAuthError::Http)?)
    }

    /// Second hop: upgrade the short-lived user token. If the provider does
    /// not hand back a new token, the short-lived one is kept.
    async fn exchange_long_lived(&self, short_token: &str) -> Result<(String, i64)> {
        let response = self
            .http
            .get(format!("{GRAPH_BASE}/oauth/access_token"))
            .query(&[
                ("grant_type", "fb_exchange_token"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("fb_exchange_token", short_token),
            ])
            .send()
            .await
            .map_err(OAuthError::Http)?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(provider = "meta", %body, "long-lived exchange failed, keeping short-lived token");
            return Ok((short_token.to_string(), LONG_LIVED_DEFAULT_SECS));
        }

        let tokens: TokenResponse = response.json().await.map_err(OAuthError::Http)?;
        match tokens.access_token {
            Some(token) => Ok((token, tokens.expires_in.unwrap_or(LONG_LIVED_DEFAULT_SECS))),
            None => Ok((short_token.to_string(), LONG_LIVED_DEFAULT_SECS)),
        }
    }

    async fn list_pages(&self, user_token: &str) -> Result<Vec<Page>> {
        let response = self
            .http
            .get(format!("{GRAPH_BASE}/me/accounts"))
            .query(&[("access_token", user_token)])
            .send()
            .await
            .map_err(OAuthError::Http)?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(provider = "meta", %body, "me/accounts fetch failed");
            return Err(OAuthError::EnrichmentFailed {
                provider: "meta".to_string(),
                detail: "failed to list pages".to_string(),
            }
            .into());
        }
        let pages: PageList = response.json().await.map_err(OAuthError::Http)?;
        Ok(pages.data)
    }

    async fn probe_instagram(&self, page_id: &str, page_token: &str) -> Option<String> {
        let response = self
            .http
            .get(format!("{GRAPH_BASE}/{page_id}"))
            .query(&[
                ("fields", "instagram_business_account"),
                ("access_token", page_token),
            ])
            .send()
            .await;

        match response {
            Ok(r) if r.status().is_success() => match r.json::<IgProbe>().await {
                Ok(probe) => probe.instagram_business_account.map(|a| a.id),
                Err(e) => {
                    warn!(provider = "meta", page_id, error = %e, "instagram probe decode failed");
                    None
                }
            },
            Ok(r) => {
                warn!(provider = "meta", page_id, status = %r.status(), "instagram probe rejected");
                None
            }
            Err(e) => {
                warn!(provider = "meta", page_id, error = %e, "instagram probe failed");
                None
            }
        }
    }
}

#[async_trait]
impl OAuthProvider for MetaOAuth {
    fn platform(&self) -> Platform {
        Platform::Facebook
    }

    fn authorize(&self) -> Result<AuthorizeRedirect> {
        let state = random_state();
        let url = build_url(
            DIALOG_URL,
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("state", state.as_str()),
                ("scope", SCOPES),
                ("response_type", "code"),
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

        let short = self.exchange_code(code).await?;
        let short_token = short.access_token.ok_or_else(|| OAuthError::ExchangeFailed {
            provider: "meta".to_string(),
            detail: "response carried no access token".to_string(),
        })?;

        let (long_token, expires_in) = self.exchange_long_lived(&short_token).await?;
        let expires_at = chrono::Utc::now().timestamp() + expires_in;

        let pages = self.list_pages(&long_token).await?;
        if pages.is_empty() {
            return Err(OAuthError::NoPagesFound.into());
        }

        let mut saved = Vec::new();
        let mut have_facebook = false;
        let mut have_instagram = false;

        for page in &pages {
            if have_facebook && have_instagram {
                break;
            }

            let page_token = match &page.access_token {
                Some(t) => t.clone(),
                None => continue,
            };
            let page_name = page.name.clone().unwrap_or_default();

            if !have_facebook {
                let mut new = NewConnection::new(Platform::Facebook, page_token.clone());
                new.expires_at = Some(expires_at);
                new.page_id = Some(page.id.clone());
                new.metadata = serde_json::json!({
                    "page_id": page.id,
                    "page_name": page_name,
                    "long_lived_user_token": long_token,
                });
                saved.push(self.db.save_connection(user_id, &new).await?);
                have_facebook = true;
                info!(user_id, page_id = %page.id, "facebook page connected");
            }

            if !have_instagram {
                if let Some(ig_id) = self.probe_instagram(&page.id, &page_token).await {
                    let mut new = NewConnection::new(Platform::Instagram, page_token.clone());
                    new.expires_at = Some(expires_at);
                    new.page_id = Some(page.id.clone());
                    new.instagram_business_id = Some(ig_id.clone());
                    new.metadata = serde_json::json!({
                        "page_id": page.id,
                        "page_name": page_name,
                        "instagram_business_id": ig_id,
                        "long_lived_user_token": long_token,
                    });
                    saved.push(self.db.save_connection(user_id, &new).await?);
                    have_instagram = true;
                    info!(user_id, ig_id, "instagram business account connected");
                }
            }
        }

        if saved.is_empty() {
            return Err(OAuthError::NoPagesFound.into());
        }
        Ok(saved)
    }

    /// DELETE the granted permissions on the page (or `me` when no page id
    /// is stored). Failures surface as errors for the caller to log; the
    /// local disconnect does not depend on this.
    async fn revoke(&self, conn: &Connection) -> Result<()> {
        let target = conn.page_id.as_deref().unwrap_or("me");
        let response = self
            .http
            .delete(format!("{GRAPH_BASE}/{target}/permissions"))
            .query(&[("access_token", conn.access_token.as_str())])
            .send()
            .await
            .map_err(OAuthError::Http)?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OAuthError::EnrichmentFailed {
                provider: "meta".to_string(),
                detail: format!("permission delete rejected: {body}"),
            }
            .into());
        }
        Ok(())
    }
}
