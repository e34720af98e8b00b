//! Autopost - scheduled multi-platform publishing for social media posts
//!
//! Posts are generated or written as drafts, approved by a person, and then
//! published at their scheduled time by the queue scanner in
//! [`scheduler`]. Publishing to each platform is retried with exponential
//! backoff, and one platform failing never keeps the others from being tried.

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod generator;
pub mod logging;
pub mod platforms;
pub mod scheduler;
pub mod scheduling;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use db::Database;
pub use error::{AutopostError, Result};
pub use platforms::{PublishReceipt, Publisher, PublisherRegistry};
pub use scheduler::scanner::{QueueScanner, ScanReport};
pub use scheduler::RetryPolicy;
pub use store::PostStore;
pub use types::{AttemptRecord, NewPost, PlatformResult, Post, PostStatus, PostUpdate};
