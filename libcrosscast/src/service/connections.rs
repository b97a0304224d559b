//! Connection lifecycle service
//!
//! Thin orchestration over the OAuth providers and the connection store:
//! start an authorize flow, complete a callback, list what a user has
//! connected, and disconnect with best-effort remote revocation.

use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::db::Database;
use crate::error::Result;
use crate::oauth::{create_provider, AuthorizeRedirect, CallbackParams};
use crate::types::{Connection, ConnectionSummary, Platform};

#[derive(Clone)]
pub struct ConnectionsService {
    db: Database,
    config: Arc<Config>,
}

impl ConnectionsService {
    pub fn new(db: Database, config: Arc<Config>) -> Self {
        Self { db, config }
    }

    /// Build the authorize redirect for a platform. Fails before any
    /// network traffic when the provider is not configured.
    pub fn begin_connect(&self, platform: Platform) -> Result<AuthorizeRedirect> {
        let provider = create_provider(platform, &self.config, self.db.clone())?;
        provider.authorize()
    }

    /// Run the callback leg and persist the resulting connection(s).
    /// Meta returns two rows when a linked Instagram account exists.
    pub async fn complete_connect(
        &self,
        user_id: &str,
        platform: Platform,
        params: &CallbackParams,
    ) -> Result<Vec<Connection>> {
        let provider = create_provider(platform, &self.config, self.db.clone())?;
        let connections = provider.handle_callback(user_id, params).await?;
        info!(
            user_id,
            %platform,
            saved = connections.len(),
            "connect flow completed"
        );
        Ok(connections)
    }

    /// Disconnect a platform. Remote revocation is attempted first but a
    /// failure there never blocks the local disconnect, and disconnecting
    /// something already disconnected is a no-op.
    pub async fn disconnect(&self, user_id: &str, platform: Platform) -> Result<()> {
        if let Some(conn) = self.db.get_connection(user_id, platform).await? {
            match create_provider(platform, &self.config, self.db.clone()) {
                Ok(provider) => {
                    if let Err(e) = provider.revoke(&conn).await {
                        warn!(user_id, %platform, error = %e, "remote revocation failed, disconnecting locally");
                    }
                }
                Err(e) => {
                    warn!(user_id, %platform, error = %e, "provider unavailable for revocation, disconnecting locally");
                }
            }
        }

        self.db.disconnect(user_id, platform).await?;
        info!(user_id, %platform, "disconnected");
        Ok(())
    }

    /// Token-free summaries of every stored connection for a user.
    pub async fn list(&self, user_id: &str) -> Result<Vec<ConnectionSummary>> {
        self.db.list_connections(user_id).await
    }
}
