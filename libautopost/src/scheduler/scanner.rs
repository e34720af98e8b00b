//! Queue scan: find due posts and dispatch them one by one

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::error::Result;
use crate::events::{Event, EventBus};
use crate::platforms::PublisherRegistry;
use crate::scheduler::dispatch::PostDispatcher;
use crate::scheduler::RetryPolicy;
use crate::store::PostStore;
use crate::types::Post;

/// Counts from one scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReport {
    /// Posts read from the store
    pub scanned: usize,
    /// Posts that were due and handed to the dispatcher
    pub due: usize,
    pub posted: usize,
    /// Dispatches that finished with status `error`
    pub failed: usize,
    /// Dispatches cut short by a store error
    pub aborted: usize,
}

pub struct QueueScanner {
    store: Arc<dyn PostStore>,
    dispatcher: PostDispatcher,
    events: EventBus,
}

impl QueueScanner {
    pub fn new(store: Arc<dyn PostStore>, registry: PublisherRegistry, policy: RetryPolicy) -> Self {
        Self::with_events(store, registry, policy, EventBus::default())
    }

    pub fn with_events(
        store: Arc<dyn PostStore>,
        registry: PublisherRegistry,
        policy: RetryPolicy,
        events: EventBus,
    ) -> Self {
        let dispatcher = PostDispatcher::new(store.clone(), registry, policy, events.clone());
        Self {
            store,
            dispatcher,
            events,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Scan against the current wall clock
    pub async fn run(&self) -> Result<ScanReport> {
        self.run_at(chrono::Utc::now().timestamp()).await
    }

    /// Dispatch every post due at `now`
    ///
    /// Posts are dispatched sequentially in store order. A store error inside
    /// one post's dispatch is logged and counted as aborted; the scan moves on
    /// to the next post.
    ///
    /// # Errors
    ///
    /// Only when the post list itself cannot be read.
    pub async fn run_at(&self, now: i64) -> Result<ScanReport> {
        let posts = self.store.list().await?;
        let mut report = ScanReport {
            scanned: posts.len(),
            ..Default::default()
        };

        let due = select_due(posts, now);
        report.due = due.len();
        debug!(scanned = report.scanned, due = report.due, "Selected due posts");

        for post in due {
            let post_id = post.id.clone();
            match self.dispatcher.dispatch(post).await {
                Ok(outcome) if outcome.is_posted() => report.posted += 1,
                Ok(_) => report.failed += 1,
                Err(e) => {
                    error!(post_id = %post_id, error = %e, "Dispatch aborted by store error");
                    report.aborted += 1;
                }
            }
        }

        info!(
            scanned = report.scanned,
            due = report.due,
            posted = report.posted,
            failed = report.failed,
            aborted = report.aborted,
            "Scan complete"
        );
        self.events.emit(Event::ScanCompleted {
            scanned: report.scanned,
            due: report.due,
            posted: report.posted,
            failed: report.failed,
            aborted: report.aborted,
        });

        Ok(report)
    }
}

/// Posts that are scheduled, approved and due at `now`, in input order
pub fn select_due(posts: Vec<Post>, now: i64) -> Vec<Post> {
    posts.into_iter().filter(|post| post.is_due(now)).collect()
}
