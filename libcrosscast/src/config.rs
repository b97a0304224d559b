//! Configuration loading
//!
//! Configuration lives in a TOML file resolved from `CROSSCAST_CONFIG` or the
//! platform config directory. Provider credential tables are optional at load
//! time; using a provider whose table is missing fails with a distinct
//! configuration error before any network call is made.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{ConfigError, Result};
use crate::types::Platform;

pub const CONFIG_ENV_VAR: &str = "CROSSCAST_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,

    pub app: AppConfig,

    /// Meta app credentials (Facebook + Instagram)
    pub meta: Option<ProviderConfig>,
    /// Google app credentials (YouTube)
    pub google: Option<ProviderConfig>,
    pub twitter: Option<ProviderConfig>,
    pub linkedin: Option<ProviderConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "~/.local/share/crosscast/crosscast.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Public base URL of the deployment, used to build OAuth redirect URIs
    pub base_url: String,
}

/// OAuth client credentials for one provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub client_id: String,
    pub client_secret: String,
}

impl Config {
    /// Load configuration from the resolved path.
    pub fn load() -> Result<Self> {
        let path = resolve_config_path();
        Self::load_from_path(&path)
    }

    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Config = toml::from_str(&contents).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.app.base_url.is_empty() {
            return Err(ConfigError::MissingField("app.base_url".to_string()));
        }
        for (name, provider) in [
            ("meta", &self.meta),
            ("google", &self.google),
            ("twitter", &self.twitter),
            ("linkedin", &self.linkedin),
        ] {
            if let Some(p) = provider {
                if p.client_id.is_empty() {
                    return Err(ConfigError::MissingField(format!("{name}.client_id")));
                }
                if p.client_secret.is_empty() {
                    return Err(ConfigError::MissingField(format!("{name}.client_secret")));
                }
            }
        }
        Ok(())
    }

    /// Credentials for the provider backing a platform.
    ///
    /// Facebook and Instagram share the Meta app; YouTube uses the Google
    /// app. Missing credentials are a server configuration fault, reported
    /// before any external call.
    pub fn provider(&self, platform: Platform) -> Result<&ProviderConfig> {
        let (name, provider) = match platform {
            Platform::Facebook | Platform::Instagram => ("meta", &self.meta),
            Platform::Youtube => ("google", &self.google),
            Platform::Twitter => ("twitter", &self.twitter),
            Platform::Linkedin => ("linkedin", &self.linkedin),
        };
        provider
            .as_ref()
            .ok_or_else(|| ConfigError::MissingProvider(name.to_string()).into())
    }

    /// Redirect URI registered with the provider for a platform's callback.
    pub fn redirect_uri(&self, platform: Platform) -> String {
        format!(
            "{}/api/connect/{}/callback",
            self.app.base_url.trim_end_matches('/'),
            platform
        )
    }
}

/// Resolve the config file path: `CROSSCAST_CONFIG` wins, then the platform
/// config directory, then `./crosscast.toml` as a last resort.
pub fn resolve_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        return PathBuf::from(shellexpand::tilde(&path).into_owned());
    }
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("crosscast").join("config.toml");
    }
    PathBuf::from("crosscast.toml")
}
