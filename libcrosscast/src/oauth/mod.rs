//! OAuth connection flows
//!
//! One provider per platform family behind a common trait: build the
//! authorize redirect, handle the callback (code exchange, token upgrade,
//! profile enrichment, persistence), and best-effort remote revocation.
//!
//! Every network call here runs against a client with a hard 8 second
//! timeout. Provider endpoints are outside our control and must never hold a
//! callback open indefinitely.

pub mod google;
pub mod linkedin;
pub mod meta;
pub mod twitter;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::time::Duration;

use crate::config::Config;
use crate::db::Database;
use crate::error::{OAuthError, Result};
use crate::types::{Connection, Platform};

pub use google::GoogleOAuth;
pub use linkedin::LinkedinOAuth;
pub use meta::MetaOAuth;
pub use twitter::TwitterOAuth;

/// Hard timeout for token and profile endpoints
pub const OAUTH_TIMEOUT: Duration = Duration::from_secs(8);

/// Lifetime of the PKCE verifier cookie, seconds
pub const VERIFIER_COOKIE_MAX_AGE: u64 = 300;

/// Everything the transport layer needs to start an authorization round trip
#[derive(Debug, Clone)]
pub struct AuthorizeRedirect {
    /// Provider authorize URL to redirect the user to
    pub url: String,
    /// CSRF state embedded in the URL, for the transport to verify on return
    pub state: String,
    /// Cookie the transport must set when the flow needs PKCE
    pub cookie: Option<VerifierCookie>,
}

/// A short-lived cookie that carries the PKCE verifier across the redirect
/// round trip and nowhere else.
#[derive(Debug, Clone)]
pub struct VerifierCookie {
    pub name: String,
    pub value: String,
    pub path: String,
    pub max_age_secs: u64,
    pub http_only: bool,
    pub secure: bool,
}

impl VerifierCookie {
    pub fn new(name: &str, value: String, path: &str) -> Self {
        Self {
            name: name.to_string(),
            value,
            path: path.to_string(),
            max_age_secs: VERIFIER_COOKIE_MAX_AGE,
            http_only: true,
            secure: true,
        }
    }
}

/// Query parameters and cookie material arriving at a callback
#[derive(Debug, Clone, Default)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    /// PKCE verifier recovered from the cookie, where applicable
    pub verifier: Option<String>,
}

#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Primary platform this provider connects. Meta saves an Instagram
    /// connection alongside the Facebook one when a linked business account
    /// exists.
    fn platform(&self) -> Platform;

    /// Build the authorize redirect, including fresh CSRF state.
    fn authorize(&self) -> Result<AuthorizeRedirect>;

    /// Run the callback leg: exchange the code, upgrade/enrich as the
    /// provider requires, persist, and return the saved connection(s).
    async fn handle_callback(
        &self,
        user_id: &str,
        params: &CallbackParams,
    ) -> Result<Vec<Connection>>;

    /// Best-effort remote revocation. The default is local-only.
    async fn revoke(&self, _conn: &Connection) -> Result<()> {
        Ok(())
    }
}

/// Build the provider for a platform. Fails with a configuration error when
/// the provider's credentials are absent, before any network traffic.
pub fn create_provider(
    platform: Platform,
    config: &Config,
    db: Database,
) -> Result<Box<dyn OAuthProvider>> {
    Ok(match platform {
        Platform::Facebook | Platform::Instagram => Box::new(MetaOAuth::new(config, db)?),
        Platform::Youtube => Box::new(GoogleOAuth::new(config, db)?),
        Platform::Twitter => Box::new(TwitterOAuth::new(config, db)?),
        Platform::Linkedin => Box::new(LinkedinOAuth::new(config, db)?),
    })
}

pub(crate) fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(OAUTH_TIMEOUT)
        .build()
        .map_err(|e| OAuthError::Http(e).into())
}

/// Build a URL from a constant base plus encoded query parameters.
pub(crate) fn build_url(base: &str, params: &[(&str, &str)]) -> Result<String> {
    let url = url::Url::parse_with_params(base, params).map_err(OAuthError::Url)?;
    Ok(url.to_string())
}

/// Random CSRF state: 16 bytes, hex encoded.
pub fn random_state() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// PKCE verifier/challenge pair (S256).
pub fn pkce_pair() -> (String, String) {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    let verifier = URL_SAFE_NO_PAD.encode(bytes);
    let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
    (verifier, challenge)
}

/// Extract the authorization code, honoring a provider-reported error first.
pub(crate) fn require_code(params: &CallbackParams) -> Result<&str> {
    if let Some(err) = &params.error {
        return Err(OAuthError::ProviderDenied(err.clone()).into());
    }
    params
        .code
        .as_deref()
        .ok_or_else(|| OAuthError::MissingCode.into())
}
