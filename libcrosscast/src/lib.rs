//! Crosscast - one post, every platform
//!
//! This library provides the core of a multi-platform social publisher:
//! OAuth connection lifecycle for YouTube, Instagram, Facebook, Twitter,
//! and LinkedIn, a post status machine with an append-only audit trail,
//! and a scheduler that publishes due posts exactly once.

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod oauth;
pub mod platforms;
pub mod publisher;
pub mod scheduler;
pub mod service;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use db::Database;
pub use error::{CrosscastError, Result};
pub use publisher::PublishEngine;
pub use scheduler::Scheduler;
pub use types::{Connection, Platform, Post, PostLog, PostStatus, TickSummary};
