//! Per-post orchestration across target platforms

use std::sync::Arc;
use tracing::{error, info, warn};

use crate::error::{Result, StoreError};
use crate::events::{Event, EventBus};
use crate::platforms::PublisherRegistry;
use crate::scheduler::attempt::{AttemptController, AttemptOutcome};
use crate::scheduler::RetryPolicy;
use crate::store::PostStore;
use crate::types::{PlatformResult, Post, PostStatus, PostUpdate};

/// Result of dispatching one post
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOutcome {
    pub post_id: String,
    /// `Posted` or `Error`
    pub status: PostStatus,
    /// One entry per platform, in publish order
    pub results: Vec<PlatformResult>,
}

impl DispatchOutcome {
    pub fn is_posted(&self) -> bool {
        self.status == PostStatus::Posted
    }
}

pub struct PostDispatcher {
    store: Arc<dyn PostStore>,
    attempts: AttemptController,
    events: EventBus,
}

impl PostDispatcher {
    pub fn new(
        store: Arc<dyn PostStore>,
        registry: PublisherRegistry,
        policy: RetryPolicy,
        events: EventBus,
    ) -> Self {
        let attempts = AttemptController::new(store.clone(), registry, policy, events.clone());
        Self {
            store,
            attempts,
            events,
        }
    }

    /// Publish `post` to each of its platforms in order
    ///
    /// The post is marked `posting` before any publisher runs and ends as
    /// `posted` only if every platform succeeded. A failing platform never
    /// stops the ones after it.
    ///
    /// # Errors
    ///
    /// Only store errors. When one occurs the post is left in whatever state
    /// was last written, typically `posting`.
    pub async fn dispatch(&self, post: Post) -> Result<DispatchOutcome> {
        let started_at = chrono::Utc::now().timestamp();
        let mut post = self
            .store
            .update(
                &post.id,
                PostUpdate::status(PostStatus::Posting).with_last_attempt_at(started_at),
            )
            .await?;

        let platforms = post.platform_list();
        info!(post_id = %post.id, platforms = ?platforms, attempts = post.attempts, "Dispatching post");
        self.events.emit(Event::DispatchStarted {
            post_id: post.id.clone(),
            platforms: platforms.clone(),
        });

        let mut results = Vec::with_capacity(platforms.len());
        for platform in &platforms {
            let result = match self.attempts.attempt(&mut post, platform).await? {
                AttemptOutcome::Published(receipt) => PlatformResult {
                    platform: platform.clone(),
                    success: true,
                    platform_post_id: receipt.platform_post_id,
                    error: None,
                },
                AttemptOutcome::Failed(e) => {
                    error!(post_id = %post.id, platform = %platform, error = %e, "Platform failed permanently");
                    PlatformResult {
                        platform: platform.clone(),
                        success: false,
                        platform_post_id: None,
                        error: Some(e.to_string()),
                    }
                }
            };
            results.push(result);
        }

        if results.is_empty() {
            warn!(post_id = %post.id, "Post has no target platforms");
        }
        let all_succeeded = !results.is_empty() && results.iter().all(|r| r.success);
        let status = if all_succeeded {
            PostStatus::Posted
        } else {
            PostStatus::Error
        };

        let mut update = PostUpdate::status(status)
            .with_last_attempt_at(chrono::Utc::now().timestamp());
        let remote_ids = remote_ids(&results);
        if !remote_ids.is_empty() {
            update.post_id = Some(remote_ids);
        }
        update.response = Some(serde_json::to_string(&results).map_err(StoreError::Serialization)?);
        self.store.update(&post.id, update).await?;

        info!(
            post_id = %post.id,
            status = %status,
            attempts = post.attempts,
            succeeded = results.iter().filter(|r| r.success).count(),
            total = results.len(),
            "Dispatch finished"
        );
        self.events.emit(Event::DispatchCompleted {
            post_id: post.id.clone(),
            status,
            results: results.clone(),
        });

        Ok(DispatchOutcome {
            post_id: post.id,
            status,
            results,
        })
    }
}

/// `platform:id` pairs of the platforms that reported a remote id
fn remote_ids(results: &[PlatformResult]) -> String {
    results
        .iter()
        .filter_map(|r| {
            r.platform_post_id
                .as_ref()
                .map(|id| format!("{}:{}", r.platform, id))
        })
        .collect::<Vec<_>>()
        .join(",")
}
