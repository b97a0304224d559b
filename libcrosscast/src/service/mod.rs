//! Service layer for Crosscast
//!
//! A clean, testable API over the connection store, the OAuth providers,
//! and the publish engine, consumable by any interface (CLI, HTTP, cron)
//! without duplicating business logic.
//!
//! # Architecture
//!
//! The layer follows a facade pattern with `CrosscastService` as the main
//! entry point, coordinating specialized sub-services:
//!
//! - `ConnectionsService`: OAuth connect, disconnect, and listing
//! - `PostsService`: post creation, updates, and immediate publishing
//! - `Scheduler`: due-post processing for cron-style callers
//!
//! # Example
//!
//! ```no_run
//! use libcrosscast::service::CrosscastService;
//! use libcrosscast::types::{NewPost, Platform};
//!
//! # async fn example() -> libcrosscast::Result<()> {
//! let service = CrosscastService::new().await?;
//!
//! let post = service
//!     .posts()
//!     .create(NewPost {
//!         user_id: "alice".to_string(),
//!         title: None,
//!         caption: "Hello from everywhere at once".to_string(),
//!         media_urls: vec![],
//!         platforms: vec![Platform::Twitter, Platform::Linkedin],
//!         scheduled_at: None,
//!         metadata: serde_json::json!({}),
//!     })
//!     .await?;
//!
//! service.posts().publish(&post.id).await?;
//! # Ok(())
//! # }
//! ```

pub mod connections;
pub mod posts;

pub use connections::ConnectionsService;
pub use posts::{PostUpdate, PostsService};

use std::sync::Arc;

use crate::config::Config;
use crate::db::Database;
use crate::error::Result;
use crate::platforms::{HttpPublisherFactory, PublisherFactory};
use crate::publisher::PublishEngine;
use crate::scheduler::Scheduler;

/// Main service facade coordinating all sub-services
///
/// All sub-services share the same `Database` handle and `Arc<Config>`,
/// so cloning the facade is cheap.
#[derive(Clone)]
pub struct CrosscastService {
    db: Database,
    connections: ConnectionsService,
    posts: PostsService,
    scheduler: Scheduler,
}

impl CrosscastService {
    /// Create a service from the default configuration location.
    pub async fn new() -> Result<Self> {
        let config = Config::load()?;
        Self::from_config(config).await
    }

    /// Create a service from a pre-built configuration, opening (and
    /// migrating) the database it points at.
    pub async fn from_config(config: Config) -> Result<Self> {
        let db = Database::new(&config.database.path).await?;
        let config = Arc::new(config);
        let factory = Arc::new(HttpPublisherFactory::new(config.clone(), db.clone()));
        Ok(Self::assemble(db, config, factory))
    }

    /// Wire the facade from parts. Tests inject a mock publisher factory
    /// and an in-memory database here.
    pub fn assemble(
        db: Database,
        config: Arc<Config>,
        factory: Arc<dyn PublisherFactory>,
    ) -> Self {
        let engine = PublishEngine::new(db.clone(), factory);
        Self {
            connections: ConnectionsService::new(db.clone(), config),
            posts: PostsService::new(db.clone(), engine.clone()),
            scheduler: Scheduler::new(db.clone(), engine),
            db,
        }
    }

    pub fn connections(&self) -> &ConnectionsService {
        &self.connections
    }

    pub fn posts(&self) -> &PostsService {
        &self.posts
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Direct database access for callers that need raw queries.
    pub fn database(&self) -> &Database {
        &self.db
    }
}
