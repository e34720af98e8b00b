//! Post storage
//!
//! The scheduler only talks to [`PostStore`]. Which backend sits behind it is
//! decided once at startup by [`open`] from `[storage]` in the config:
//!
//! - `sqlite` - [`crate::db::Database`], the default
//! - `json` - [`json::JsonFileStore`], a single JSON document on disk
//!
//! [`memory::MemoryStore`] is not selectable from config; it backs tests and
//! dry runs.

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{StorageBackend, StorageConfig};
use crate::db::Database;
use crate::error::Result;
use crate::types::{AttemptRecord, NewPost, Post, PostUpdate};

pub mod json;
pub mod memory;

/// Durable table of posts keyed by id
///
/// There is no locking discipline: every method is a plain read or a plain
/// write, and concurrent scans of the same queue are expected to be prevented
/// by whoever triggers them.
#[async_trait]
pub trait PostStore: Send + Sync {
    /// All posts, in the backend's iteration order
    async fn list(&self) -> Result<Vec<Post>>;

    async fn get(&self, id: &str) -> Result<Option<Post>>;

    /// Insert a new post and return it with its assigned id
    async fn create(&self, new: NewPost) -> Result<Post>;

    /// Apply a partial update and return the updated post
    ///
    /// # Errors
    ///
    /// `StoreError::NotFound` if no post has this id.
    async fn update(&self, id: &str, update: PostUpdate) -> Result<Post>;

    /// # Errors
    ///
    /// `StoreError::NotFound` if no post has this id.
    async fn delete(&self, id: &str) -> Result<()>;

    /// Append one entry to a post's attempt log
    async fn record_attempt(&self, record: &AttemptRecord) -> Result<()>;

    /// Attempt log of a post, oldest first
    async fn attempt_log(&self, post_id: &str) -> Result<Vec<AttemptRecord>>;
}

/// Open the configured storage backend
pub async fn open(config: &StorageConfig) -> Result<Arc<dyn PostStore>> {
    let path = shellexpand::tilde(&config.path).to_string();
    let store: Arc<dyn PostStore> = match config.backend {
        StorageBackend::Sqlite => Arc::new(Database::new(&path).await?),
        StorageBackend::Json => Arc::new(json::JsonFileStore::open(&path).await?),
    };
    tracing::debug!(backend = ?config.backend, path = %path, "Opened post store");
    Ok(store)
}
