//! End-to-end scheduler tests against real stores
//!
//! These tests verify complete scans:
//! - Partial failures across platforms of one post
//! - The shared attempt budget running out
//! - Unknown platforms
//! - Store outages in the middle of a scan

use anyhow::Result;
use async_trait::async_trait;
use libautopost::error::StoreError;
use libautopost::platforms::mock::MockPublisher;
use libautopost::platforms::Publisher;
use libautopost::store::json::JsonFileStore;
use libautopost::store::memory::MemoryStore;
use libautopost::{
    AttemptRecord, Database, NewPost, PlatformResult, Post, PostStatus, PostStore, PostUpdate,
    PublisherRegistry, QueueScanner, RetryPolicy,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Default policy with millisecond backoff so real-time tests stay fast
fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        initial_backoff: Duration::from_millis(1),
        ..RetryPolicy::default()
    }
}

async fn create_test_db() -> Result<(TempDir, Arc<Database>)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let db = Database::new(&db_path.to_string_lossy()).await?;
    Ok((temp_dir, Arc::new(db)))
}

async fn due_post(store: &dyn PostStore, platforms: &str) -> Result<Post> {
    Ok(store
        .create(NewPost {
            caption: Some("Scheduled post".to_string()),
            platforms: platforms.to_string(),
            approved: true,
            status: PostStatus::Scheduled,
            scheduled_at: Some(chrono::Utc::now().timestamp() - 60),
            ..Default::default()
        })
        .await?)
}

fn registry(publishers: &[Arc<MockPublisher>]) -> PublisherRegistry {
    let mut registry = PublisherRegistry::new();
    for publisher in publishers {
        let publisher: Arc<dyn Publisher> = publisher.clone();
        registry.register(publisher);
    }
    registry
}

fn results_of(post: &Post) -> Result<Vec<PlatformResult>> {
    let response = post.response.as_deref().unwrap_or("[]");
    Ok(serde_json::from_str(response)?)
}

#[tokio::test]
async fn test_retry_on_second_platform_still_posts() -> Result<()> {
    let (_temp_dir, db) = create_test_db().await?;
    let post = due_post(db.as_ref(), "instagram,youtube").await?;

    let instagram = Arc::new(MockPublisher::success("instagram"));
    let youtube = Arc::new(MockPublisher::fail_then_succeed("youtube", 2, "upload timed out"));
    let scanner = QueueScanner::new(
        db.clone(),
        registry(&[instagram.clone(), youtube.clone()]),
        fast_policy(),
    );

    let report = scanner.run().await?;
    assert_eq!(report.due, 1);
    assert_eq!(report.posted, 1);

    let stored = db.get(&post.id).await?.expect("post exists");
    assert_eq!(stored.status, PostStatus::Posted);
    assert_eq!(stored.attempts, 2, "only youtube's two failures count");
    assert_eq!(instagram.call_count(), 1);
    assert_eq!(youtube.call_count(), 3);
    assert_eq!(
        stored.post_id.as_deref(),
        Some("instagram:instagram-mock-1,youtube:youtube-mock-3")
    );

    let log = db.attempt_log(&post.id).await?;
    let summary: Vec<(&str, u32, bool)> = log
        .iter()
        .map(|r| (r.platform.as_str(), r.attempt, r.success))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("instagram", 0, true),
            ("youtube", 0, false),
            ("youtube", 1, false),
            ("youtube", 2, true),
        ]
    );

    Ok(())
}

#[tokio::test]
async fn test_always_failing_platform_ends_in_error() -> Result<()> {
    let (_temp_dir, db) = create_test_db().await?;
    let post = due_post(db.as_ref(), "instagram,youtube").await?;

    let instagram = Arc::new(MockPublisher::success("instagram"));
    let youtube = Arc::new(MockPublisher::always_fail("youtube", "quota exceeded"));
    let scanner = QueueScanner::new(
        db.clone(),
        registry(&[instagram.clone(), youtube.clone()]),
        fast_policy(),
    );

    let report = scanner.run().await?;
    assert_eq!(report.failed, 1);
    assert_eq!(report.posted, 0);

    let stored = db.get(&post.id).await?.expect("post exists");
    assert_eq!(stored.status, PostStatus::Error);
    assert_eq!(stored.attempts, 3);
    assert_eq!(youtube.call_count(), 3);
    assert_eq!(stored.post_id.as_deref(), Some("instagram:instagram-mock-1"));

    let results = results_of(&stored)?;
    assert_eq!(results.len(), 2);
    assert!(results[0].success);
    assert!(!results[1].success);
    assert!(results[1]
        .error
        .as_deref()
        .unwrap_or_default()
        .contains("quota exceeded"));

    Ok(())
}

#[tokio::test]
async fn test_failed_post_is_not_picked_up_again() -> Result<()> {
    let (_temp_dir, db) = create_test_db().await?;
    due_post(db.as_ref(), "youtube").await?;

    let youtube = Arc::new(MockPublisher::always_fail("youtube", "down"));
    let scanner = QueueScanner::new(db.clone(), registry(&[youtube.clone()]), fast_policy());

    scanner.run().await?;
    let second = scanner.run().await?;

    assert_eq!(second.due, 0);
    assert_eq!(youtube.call_count(), 3);
    Ok(())
}

#[tokio::test]
async fn test_unknown_platform_fails_without_spending_attempts() -> Result<()> {
    let (_temp_dir, db) = create_test_db().await?;
    let post = due_post(db.as_ref(), "tiktok").await?;

    let instagram = Arc::new(MockPublisher::success("instagram"));
    let scanner = QueueScanner::new(db.clone(), registry(&[instagram.clone()]), fast_policy());

    let started = std::time::Instant::now();
    let report = scanner.run().await?;
    assert!(started.elapsed() < Duration::from_secs(1));

    assert_eq!(report.failed, 1);
    let stored = db.get(&post.id).await?.expect("post exists");
    assert_eq!(stored.status, PostStatus::Error);
    assert_eq!(stored.attempts, 0);
    assert_eq!(instagram.call_count(), 0);

    let results = results_of(&stored)?;
    assert_eq!(results[0].platform, "tiktok");
    assert!(results[0]
        .error
        .as_deref()
        .unwrap_or_default()
        .contains("Unknown platform"));

    Ok(())
}

#[tokio::test]
async fn test_scan_over_json_store_persists_to_disk() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("queue.json");
    let store = Arc::new(JsonFileStore::open(&path).await?);
    let post = due_post(store.as_ref(), "instagram").await?;

    let instagram = Arc::new(MockPublisher::success("instagram"));
    let scanner = QueueScanner::new(store.clone(), registry(&[instagram]), fast_policy());
    scanner.run().await?;

    let reopened = JsonFileStore::open(&path).await?;
    let stored = reopened.get(&post.id).await?.expect("post exists");
    assert_eq!(stored.status, PostStatus::Posted);
    assert_eq!(reopened.attempt_log(&post.id).await?.len(), 1);

    Ok(())
}

/// Memory store whose updates start failing after a number of successful ones
struct FlakyStore {
    inner: MemoryStore,
    healthy_updates: AtomicUsize,
    /// Only updates of this post fail; `None` means every post
    failing_post: Option<String>,
    update_calls: AtomicUsize,
}

impl FlakyStore {
    fn new(healthy_updates: usize, failing_post: Option<String>) -> Self {
        Self {
            inner: MemoryStore::new(),
            healthy_updates: AtomicUsize::new(healthy_updates),
            failing_post,
            update_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl PostStore for FlakyStore {
    async fn list(&self) -> libautopost::Result<Vec<Post>> {
        self.inner.list().await
    }

    async fn get(&self, id: &str) -> libautopost::Result<Option<Post>> {
        self.inner.get(id).await
    }

    async fn create(&self, new: NewPost) -> libautopost::Result<Post> {
        self.inner.create(new).await
    }

    async fn update(&self, id: &str, update: PostUpdate) -> libautopost::Result<Post> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        let affected = self.failing_post.as_deref().map_or(true, |failing| failing == id);
        if affected {
            let remaining = self.healthy_updates.load(Ordering::SeqCst);
            if remaining == 0 {
                return Err(StoreError::Unavailable("connection refused".to_string()).into());
            }
            self.healthy_updates.store(remaining - 1, Ordering::SeqCst);
        }
        self.inner.update(id, update).await
    }

    async fn delete(&self, id: &str) -> libautopost::Result<()> {
        self.inner.delete(id).await
    }

    async fn record_attempt(&self, record: &AttemptRecord) -> libautopost::Result<()> {
        self.inner.record_attempt(record).await
    }

    async fn attempt_log(&self, post_id: &str) -> libautopost::Result<Vec<AttemptRecord>> {
        self.inner.attempt_log(post_id).await
    }
}

#[tokio::test]
async fn test_store_outage_leaves_first_post_posting_and_still_tries_second() -> Result<()> {
    // One healthy update: post A's move to `posting`
    let store = Arc::new(FlakyStore::new(1, None));
    let a = due_post(store.as_ref(), "instagram").await?;
    let b = due_post(store.as_ref(), "instagram").await?;

    let instagram = Arc::new(MockPublisher::success("instagram"));
    let scanner = QueueScanner::new(store.clone(), registry(&[instagram.clone()]), fast_policy());

    let report = scanner.run().await?;
    assert_eq!(report.due, 2);
    assert_eq!(report.aborted, 2);
    assert_eq!(report.posted, 0);

    // A: posting write, final write. B: posting write.
    assert_eq!(store.update_calls.load(Ordering::SeqCst), 3);
    assert_eq!(instagram.published_posts(), vec![a.id.clone()]);

    let a = store.get(&a.id).await?.expect("post A exists");
    assert_eq!(a.status, PostStatus::Posting);
    let b = store.get(&b.id).await?.expect("post B exists");
    assert_eq!(b.status, PostStatus::Scheduled);

    Ok(())
}

#[tokio::test]
async fn test_store_errors_are_contained_per_post() -> Result<()> {
    let due = || NewPost {
        platforms: "instagram".to_string(),
        approved: true,
        status: PostStatus::Scheduled,
        scheduled_at: Some(chrono::Utc::now().timestamp() - 60),
        ..Default::default()
    };
    let a = Post::from_new(due());
    let b = Post::from_new(due());

    // Only A's writes break, after its move to `posting`
    let store = Arc::new(FlakyStore::new(1, Some(a.id.clone())));
    store.inner.insert(a.clone()).await;
    store.inner.insert(b.clone()).await;

    let instagram = Arc::new(MockPublisher::success("instagram"));
    let scanner = QueueScanner::new(store.clone(), registry(&[instagram.clone()]), fast_policy());

    let report = scanner.run().await?;
    assert_eq!(report.aborted, 1);
    assert_eq!(report.posted, 1);

    assert_eq!(
        store.get(&a.id).await?.expect("post A exists").status,
        PostStatus::Posting
    );
    assert_eq!(
        store.get(&b.id).await?.expect("post B exists").status,
        PostStatus::Posted
    );

    Ok(())
}

#[tokio::test]
async fn test_failed_list_fails_the_scan() -> Result<()> {
    struct DownStore;

    #[async_trait]
    impl PostStore for DownStore {
        async fn list(&self) -> libautopost::Result<Vec<Post>> {
            Err(StoreError::Unavailable("no route to host".to_string()).into())
        }
        async fn get(&self, _id: &str) -> libautopost::Result<Option<Post>> {
            Ok(None)
        }
        async fn create(&self, _new: NewPost) -> libautopost::Result<Post> {
            Err(StoreError::Unavailable("read only".to_string()).into())
        }
        async fn update(&self, id: &str, _update: PostUpdate) -> libautopost::Result<Post> {
            Err(StoreError::NotFound(id.to_string()).into())
        }
        async fn delete(&self, id: &str) -> libautopost::Result<()> {
            Err(StoreError::NotFound(id.to_string()).into())
        }
        async fn record_attempt(&self, _record: &AttemptRecord) -> libautopost::Result<()> {
            Ok(())
        }
        async fn attempt_log(&self, _post_id: &str) -> libautopost::Result<Vec<AttemptRecord>> {
            Ok(Vec::new())
        }
    }

    let scanner = QueueScanner::new(Arc::new(DownStore), PublisherRegistry::new(), fast_policy());
    let err = scanner.run().await.unwrap_err();
    assert!(err.is_store_error());
    assert_eq!(err.exit_code(), 1);

    Ok(())
}
