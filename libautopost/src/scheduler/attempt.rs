//! Retry loop for one (post, platform) pair
//!
//! ```text
//! Idle -> Trying -> Success
//!           |
//!           +-> RetryWait -> Trying
//!           +-> PermanentFailure
//! ```
//!
//! Every failed try bumps `Post::attempts` by one and writes it to the store
//! before anything else happens, so a crash mid-loop leaves the count durable.
//! With [`RetryBudget::Shared`] that same counter is the budget: it is carried
//! over from earlier platforms of the post and never reset here.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::RetryBudget;
use crate::error::{AutopostError, PlatformError, Result};
use crate::events::{Event, EventBus};
use crate::platforms::{PublishReceipt, PublisherRegistry};
use crate::scheduler::RetryPolicy;
use crate::store::PostStore;
use crate::types::{AttemptRecord, Post, PostUpdate};

/// Final state of one platform's loop
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Published(PublishReceipt),
    /// No more tries for this platform in this dispatch
    Failed(PlatformError),
}

impl AttemptOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AttemptOutcome::Published(_))
    }
}

pub struct AttemptController {
    store: Arc<dyn PostStore>,
    registry: PublisherRegistry,
    policy: RetryPolicy,
    events: EventBus,
}

impl AttemptController {
    pub fn new(
        store: Arc<dyn PostStore>,
        registry: PublisherRegistry,
        policy: RetryPolicy,
        events: EventBus,
    ) -> Self {
        Self {
            store,
            registry,
            policy,
            events,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Drive `platform` for `post` until it succeeds or runs out of tries
    ///
    /// `post` is the dispatcher's in-memory copy; its `attempts` and
    /// `last_attempt_at` are kept equal to what was written to the store.
    ///
    /// # Errors
    ///
    /// Only store errors from persisting the attempt counter. Publisher
    /// failures are reported through [`AttemptOutcome::Failed`].
    pub async fn attempt(&self, post: &mut Post, platform: &str) -> Result<AttemptOutcome> {
        let publisher = match self.registry.resolve(platform) {
            Ok(publisher) => publisher,
            Err(e) => {
                warn!(post_id = %post.id, platform = %platform, "No publisher registered for platform");
                self.log_attempt(post, platform, post.attempts, Err(&e)).await;
                return Ok(self.give_up(post, platform, e));
            }
        };

        // Tries used against the budget of this loop
        let mut used = match self.policy.budget {
            RetryBudget::Shared => post.attempts,
            RetryBudget::PerPlatform => 0,
        };

        loop {
            if used >= self.policy.max_attempts {
                let error = PlatformError::Publish(format!(
                    "retry budget exhausted ({} of {} attempts used)",
                    used, self.policy.max_attempts
                ));
                return Ok(self.give_up(post, platform, error));
            }

            debug!(post_id = %post.id, platform = %platform, attempt = used + 1, "Publishing");

            let error = match publisher.publish(post).await {
                Ok(receipt) => {
                    if used > 0 {
                        info!(post_id = %post.id, platform = %platform, attempt = used + 1, "Published after retry");
                    }
                    self.log_attempt(post, platform, post.attempts, Ok(&receipt)).await;
                    self.events.emit(Event::PlatformPublished {
                        post_id: post.id.clone(),
                        platform: platform.to_string(),
                        platform_post_id: receipt.platform_post_id.clone(),
                    });
                    return Ok(AttemptOutcome::Published(receipt));
                }
                Err(AutopostError::Platform(e)) => e,
                Err(other) => PlatformError::Publish(other.to_string()),
            };

            let tried = post.attempts;
            let now = chrono::Utc::now().timestamp();
            let attempts = tried.saturating_add(1);
            self.store
                .update(
                    &post.id,
                    PostUpdate::default()
                        .with_attempts(attempts)
                        .with_last_attempt_at(now),
                )
                .await?;
            post.attempts = attempts;
            post.last_attempt_at = Some(now);
            used = used.saturating_add(1);

            self.log_attempt(post, platform, tried, Err(&error)).await;

            warn!(
                post_id = %post.id,
                platform = %platform,
                attempts = post.attempts,
                max_attempts = self.policy.max_attempts,
                error = %error,
                "Publish attempt failed"
            );
            self.events.emit(Event::AttemptFailed {
                post_id: post.id.clone(),
                platform: platform.to_string(),
                attempts: post.attempts,
                error: error.to_string(),
            });

            if used >= self.policy.max_attempts || !error.is_retryable() {
                return Ok(self.give_up(post, platform, error));
            }

            let delay = self.policy.backoff_for(used);
            debug!(post_id = %post.id, platform = %platform, delay_ms = delay.as_millis() as u64, "Waiting before retry");
            self.events.emit(Event::RetryScheduled {
                post_id: post.id.clone(),
                platform: platform.to_string(),
                delay_ms: delay.as_millis() as u64,
            });
            tokio::time::sleep(delay).await;
        }
    }

    fn give_up(&self, post: &Post, platform: &str, error: PlatformError) -> AttemptOutcome {
        warn!(post_id = %post.id, platform = %platform, error = %error, "Giving up on platform");
        self.events.emit(Event::PlatformFailed {
            post_id: post.id.clone(),
            platform: platform.to_string(),
            error: error.to_string(),
        });
        AttemptOutcome::Failed(error)
    }

    /// Append to the attempt log; a failing write is only logged
    ///
    /// `attempt` is the counter value before the try.
    async fn log_attempt(
        &self,
        post: &Post,
        platform: &str,
        attempt: u32,
        outcome: std::result::Result<&PublishReceipt, &PlatformError>,
    ) {
        let record = AttemptRecord {
            post_id: post.id.clone(),
            platform: platform.to_string(),
            attempt,
            attempted_at: chrono::Utc::now().timestamp(),
            success: outcome.is_ok(),
            platform_post_id: outcome
                .ok()
                .and_then(|receipt| receipt.platform_post_id.clone()),
            error_message: outcome.err().map(|e| e.to_string()),
        };

        if let Err(e) = self.store.record_attempt(&record).await {
            warn!(post_id = %post.id, platform = %platform, error = %e, "Failed to record attempt");
        }
    }
}
