//! Post store backed by a single JSON document
//!
//! The whole queue is loaded at open and rewritten after every mutation. Writes
//! go to a sibling `.tmp` file which is then renamed over the document, so a
//! crash mid-write leaves the previous version intact.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use crate::error::{Result, StoreError};
use crate::store::PostStore;
use crate::types::{AttemptRecord, NewPost, Post, PostUpdate};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Document {
    #[serde(default)]
    posts: Vec<Post>,
    #[serde(default)]
    attempts: Vec<AttemptRecord>,
}

pub struct JsonFileStore {
    path: PathBuf,
    document: Mutex<Document>,
}

impl JsonFileStore {
    /// Open the document at `path`, creating an empty one if it does not exist
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let document = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Document::default(),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(StoreError::Serialization)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let document = Document::default();
                write_document(&path, &document).await?;
                document
            }
            Err(e) => return Err(StoreError::IoError(e).into()),
        };

        tracing::debug!(
            path = %path.display(),
            posts = document.posts.len(),
            "Loaded JSON post store"
        );

        Ok(Self {
            path,
            document: Mutex::new(document),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` on a copy of the document and persist it; memory is only
    /// replaced once the write succeeded
    async fn mutate<T>(&self, f: impl FnOnce(&mut Document) -> Result<T>) -> Result<T> {
        let mut guard = self.document.lock().await;
        let mut next = guard.clone();
        let value = f(&mut next)?;
        write_document(&self.path, &next).await?;
        *guard = next;
        Ok(value)
    }
}

async fn write_document(path: &Path, document: &Document) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(StoreError::IoError)?;
        }
    }

    let bytes = serde_json::to_vec_pretty(document).map_err(StoreError::Serialization)?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, bytes)
        .await
        .map_err(StoreError::IoError)?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(StoreError::IoError)?;
    Ok(())
}

#[async_trait]
impl PostStore for JsonFileStore {
    async fn list(&self) -> Result<Vec<Post>> {
        Ok(self.document.lock().await.posts.clone())
    }

    async fn get(&self, id: &str) -> Result<Option<Post>> {
        Ok(self
            .document
            .lock()
            .await
            .posts
            .iter()
            .find(|p| p.id == id)
            .cloned())
    }

    async fn create(&self, new: NewPost) -> Result<Post> {
        let post = Post::from_new(new);
        let created = post.clone();
        self.mutate(move |doc| {
            doc.posts.push(post);
            Ok(())
        })
        .await?;
        Ok(created)
    }

    async fn update(&self, id: &str, update: PostUpdate) -> Result<Post> {
        self.mutate(|doc| {
            let post = doc
                .posts
                .iter_mut()
                .find(|p| p.id == id)
                .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
            post.apply(&update);
            Ok(post.clone())
        })
        .await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.mutate(|doc| {
            let before = doc.posts.len();
            doc.posts.retain(|p| p.id != id);
            if doc.posts.len() == before {
                return Err(StoreError::NotFound(id.to_string()).into());
            }
            doc.attempts.retain(|a| a.post_id != id);
            Ok(())
        })
        .await
    }

    async fn record_attempt(&self, record: &AttemptRecord) -> Result<()> {
        self.mutate(|doc| {
            doc.attempts.push(record.clone());
            Ok(())
        })
        .await
    }

    async fn attempt_log(&self, post_id: &str) -> Result<Vec<AttemptRecord>> {
        Ok(self
            .document
            .lock()
            .await
            .attempts
            .iter()
            .filter(|a| a.post_id == post_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AutopostError;
    use crate::types::PostStatus;
    use tempfile::TempDir;

    fn instagram_post() -> NewPost {
        NewPost {
            caption: Some("hello".to_string()),
            platforms: "instagram".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_open_creates_missing_document() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data").join("queue.json");

        let store = JsonFileStore::open(&path).await.unwrap();

        assert!(path.exists());
        assert!(store.list().await.unwrap().is_empty());
        assert!(!temp_dir.path().join("data").join("queue.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_mutations_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("queue.json");

        let id = {
            let store = JsonFileStore::open(&path).await.unwrap();
            let post = store.create(instagram_post()).await.unwrap();
            store
                .update(&post.id, PostUpdate::status(PostStatus::Error).with_attempts(3))
                .await
                .unwrap();
            store
                .record_attempt(&AttemptRecord {
                    post_id: post.id.clone(),
                    platform: "instagram".to_string(),
                    attempt: 2,
                    attempted_at: 100,
                    success: false,
                    platform_post_id: None,
                    error_message: Some("HTTP 500".to_string()),
                })
                .await
                .unwrap();
            post.id
        };

        let store = JsonFileStore::open(&path).await.unwrap();
        let post = store.get(&id).await.unwrap().unwrap();
        assert_eq!(post.status, PostStatus::Error);
        assert_eq!(post.attempts, 3);
        assert_eq!(store.attempt_log(&id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_document_is_plain_json() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("queue.json");
        let store = JsonFileStore::open(&path).await.unwrap();
        store.create(instagram_post()).await.unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["posts"][0]["platforms"], "instagram");
        assert_eq!(value["posts"][0]["status"], "draft");
    }

    #[tokio::test]
    async fn test_corrupt_document_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("queue.json");
        std::fs::write(&path, "{ not json").unwrap();

        let result = JsonFileStore::open(&path).await;
        assert!(matches!(
            result,
            Err(AutopostError::Store(StoreError::Serialization(_)))
        ));
    }

    #[tokio::test]
    async fn test_missing_ids_are_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonFileStore::open(temp_dir.path().join("queue.json"))
            .await
            .unwrap();

        let result = store.update("missing", PostUpdate::status(PostStatus::Posted)).await;
        assert!(matches!(result, Err(AutopostError::Store(StoreError::NotFound(_)))));

        let result = store.delete("missing").await;
        assert!(matches!(result, Err(AutopostError::Store(StoreError::NotFound(_)))));
    }
}
