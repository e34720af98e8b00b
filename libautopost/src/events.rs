//! Scheduler event bus
//!
//! The dispatcher and scanner report progress here in addition to logging.
//! Subscribers (the worker's `--verbose` output, tests) each get their own
//! copy of every event emitted after they subscribed.
//!
//! Emission never blocks: with no subscribers the event is dropped, and a
//! lagging subscriber loses the oldest buffered events.
//!
//! ```
//! use libautopost::events::{Event, EventBus};
//!
//! # async fn example() {
//! let bus = EventBus::new(100);
//! let mut receiver = bus.subscribe();
//!
//! bus.emit(Event::DispatchStarted {
//!     post_id: "abc123".to_string(),
//!     platforms: vec!["instagram".to_string()],
//! });
//!
//! if let Ok(event) = receiver.recv().await {
//!     println!("{:?}", event);
//! }
//! # }
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::{PlatformResult, PostStatus};

pub type EventReceiver = broadcast::Receiver<Event>;

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    /// * `capacity` - events buffered per subscriber before the oldest are dropped
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: Event) {
        // Err only means nobody is listening
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Post marked `posting`; platforms in publish order
    DispatchStarted {
        post_id: String,
        platforms: Vec<String>,
    },

    /// One publish try failed; `attempts` is the post counter after the failure
    AttemptFailed {
        post_id: String,
        platform: String,
        attempts: u32,
        error: String,
    },

    /// Waiting before the next try of the same platform
    RetryScheduled {
        post_id: String,
        platform: String,
        delay_ms: u64,
    },

    PlatformPublished {
        post_id: String,
        platform: String,
        platform_post_id: Option<String>,
    },

    /// No further tries for this platform in this dispatch
    PlatformFailed {
        post_id: String,
        platform: String,
        error: String,
    },

    DispatchCompleted {
        post_id: String,
        status: PostStatus,
        results: Vec<PlatformResult>,
    },

    ScanCompleted {
        scanned: usize,
        due: usize,
        posted: usize,
        failed: usize,
        aborted: usize,
    },
}
