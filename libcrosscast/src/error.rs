//! Error types for crosscast
//!
//! Errors are layered: each subsystem has its own enum, and `CrosscastError`
//! wraps them at the library boundary. OAuth errors carry a stable, coded
//! reason suitable for a redirect query parameter; the full provider payload
//! only ever goes to the server-side log.

use thiserror::Error;

/// Result type alias used throughout the library
pub type Result<T> = std::result::Result<T, CrosscastError>;

/// Top-level error type
#[derive(Error, Debug)]
pub enum CrosscastError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("OAuth error: {0}")]
    OAuth(#[from] OAuthError),

    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Post {0} is already published")]
    AlreadyPublished(String),

    #[error("Post {0} is already being published")]
    PublishConflict(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("No credentials configured for provider '{0}'. Add a [{0}] section with client id and secret to the config file")]
    MissingProvider(String),

    #[error("Missing required config field: {0}")]
    MissingField(String),
}

/// Database errors
#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database query failed: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Database migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Database file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to decode stored value: {0}")]
    Decode(String),
}

/// OAuth connection-flow errors
///
/// Every variant maps to a short stable code via [`OAuthError::code`]; the
/// transport layer puts that code in the redirect back to the user.
#[derive(Error, Debug)]
pub enum OAuthError {
    #[error("Provider reported an authorization error: {0}")]
    ProviderDenied(String),

    #[error("Callback is missing the authorization code")]
    MissingCode,

    #[error("Callback is missing the PKCE code verifier")]
    MissingVerifier,

    #[error("Token exchange with {provider} failed: {detail}")]
    ExchangeFailed { provider: String, detail: String },

    #[error("Redirect URI was rejected by the provider")]
    RedirectMismatch,

    #[error("Failed to fetch profile from {provider}: {detail}")]
    EnrichmentFailed { provider: String, detail: String },

    #[error("No Facebook pages are linked to this account")]
    NoPagesFound,

    #[error("No YouTube channel found for this account")]
    NoChannelFound,

    #[error("Platform '{0}' is not connected")]
    NotConnected(String),

    #[error("Provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to build provider URL: {0}")]
    Url(#[from] url::ParseError),
}

impl OAuthError {
    /// Stable user-facing reason code for redirect query parameters.
    pub fn code(&self) -> &'static str {
        match self {
            OAuthError::ProviderDenied(_) => "access_denied",
            OAuthError::MissingCode => "no_code",
            OAuthError::MissingVerifier => "no_verifier",
            OAuthError::ExchangeFailed { .. } => "token_exchange_failed",
            OAuthError::RedirectMismatch => "redirect_mismatch",
            OAuthError::EnrichmentFailed { .. } => "profile_fetch_failed",
            OAuthError::NoPagesFound => "no_pages_found",
            OAuthError::NoChannelFound => "no_channel_found",
            OAuthError::NotConnected(_) => "not_connected",
            OAuthError::Http(_) => "provider_unreachable",
            OAuthError::Url(_) => "internal_error",
        }
    }
}

/// Publish attempt failures, tagged by what a caller can do about them
#[derive(Error, Debug)]
pub enum PublishError {
    /// Network trouble or a provider 5xx. Retrying the same payload may work.
    #[error("Transient failure: {0}")]
    Transient(String),

    /// The provider rejected the payload. Retrying without changing the
    /// post will fail again.
    #[error("Rejected by provider: {0}")]
    Rejected(String),

    /// The stored credential or the app registration is no longer valid.
    /// The user has to reconnect the platform.
    #[error("Credential invalid, reconnect required: {0}")]
    CredentialInvalid(String),
}

impl PublishError {
    pub fn is_credential_invalid(&self) -> bool {
        matches!(self, PublishError::CredentialInvalid(_))
    }
}

impl CrosscastError {
    /// Map errors to process exit codes for the CLI tools.
    ///
    /// - 1: general error
    /// - 2: credential/authorization failure
    /// - 3: invalid input
    pub fn exit_code(&self) -> i32 {
        match self {
            CrosscastError::OAuth(_) => 2,
            CrosscastError::Publish(PublishError::CredentialInvalid(_)) => 2,
            CrosscastError::InvalidInput(_)
            | CrosscastError::InvalidTransition { .. }
            | CrosscastError::AlreadyPublished(_)
            | CrosscastError::PublishConflict(_)
            | CrosscastError::NotFound(_) => 3,
            _ => 1,
        }
    }
}
