//! In-process post store

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{Result, StoreError};
use crate::store::PostStore;
use crate::types::{AttemptRecord, NewPost, Post, PostUpdate};

/// Post store held entirely in memory
///
/// `list` returns posts in insertion order. Nothing survives the process,
/// which makes it the store for tests and `--dry-run` worker runs.
#[derive(Default)]
pub struct MemoryStore {
    posts: RwLock<Vec<Post>>,
    attempts: RwLock<Vec<AttemptRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with existing posts, keeping their ids
    pub fn with_posts(posts: Vec<Post>) -> Self {
        Self {
            posts: RwLock::new(posts),
            attempts: RwLock::default(),
        }
    }

    /// Insert a fully formed post as is
    pub async fn insert(&self, post: Post) {
        self.posts.write().await.push(post);
    }
}

#[async_trait]
impl PostStore for MemoryStore {
    async fn list(&self) -> Result<Vec<Post>> {
        Ok(self.posts.read().await.clone())
    }

    async fn get(&self, id: &str) -> Result<Option<Post>> {
        Ok(self.posts.read().await.iter().find(|p| p.id == id).cloned())
    }

    async fn create(&self, new: NewPost) -> Result<Post> {
        let post = Post::from_new(new);
        self.posts.write().await.push(post.clone());
        Ok(post)
    }

    async fn update(&self, id: &str, update: PostUpdate) -> Result<Post> {
        let mut posts = self.posts.write().await;
        let post = posts
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        post.apply(&update);
        Ok(post.clone())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut posts = self.posts.write().await;
        let before = posts.len();
        posts.retain(|p| p.id != id);
        if posts.len() == before {
            return Err(StoreError::NotFound(id.to_string()).into());
        }
        drop(posts);

        self.attempts.write().await.retain(|a| a.post_id != id);
        Ok(())
    }

    async fn record_attempt(&self, record: &AttemptRecord) -> Result<()> {
        self.attempts.write().await.push(record.clone());
        Ok(())
    }

    async fn attempt_log(&self, post_id: &str) -> Result<Vec<AttemptRecord>> {
        Ok(self
            .attempts
            .read()
            .await
            .iter()
            .filter(|a| a.post_id == post_id)
            .cloned()
            .collect())
    }
}
