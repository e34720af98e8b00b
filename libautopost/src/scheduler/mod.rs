//! Publish scheduler
//!
//! Three layers, outermost first:
//!
//! - [`scanner::QueueScanner`] picks the due posts out of the store and hands
//!   them to the dispatcher one at a time.
//! - [`dispatch::PostDispatcher`] walks one post through its platforms in
//!   order and turns the per-platform outcomes into `posted` or `error`.
//! - [`attempt::AttemptController`] runs the bounded retry loop for one
//!   (post, platform) pair.
//!
//! Everything runs sequentially. The scanner does not own a timer; callers
//! (the `autopost-send` poll loop, cron, a test) decide when to call
//! [`scanner::QueueScanner::run`].
//!
//! ```no_run
//! use libautopost::config::Config;
//! use libautopost::platforms::PublisherRegistry;
//! use libautopost::scheduler::{scanner::QueueScanner, RetryPolicy};
//!
//! # async fn example() -> libautopost::error::Result<()> {
//! let config = Config::load()?;
//! let store = libautopost::store::open(&config.storage).await?;
//! let registry = PublisherRegistry::from_config(&config.platforms);
//!
//! let scanner = QueueScanner::new(store, registry, RetryPolicy::from_config(&config.scheduler));
//! let report = scanner.run().await?;
//! println!("{} posted, {} failed", report.posted, report.failed);
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use crate::config::{RetryBudget, SchedulerConfig};

pub mod attempt;
pub mod dispatch;
pub mod scanner;

/// Bounds and pacing of the per-platform retry loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub multiplier: u32,
    pub budget: RetryBudget,
}

impl Default for RetryPolicy {
    /// Three tries, waiting 2s then 6s, one budget shared by all platforms
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(2000),
            multiplier: 3,
            budget: RetryBudget::Shared,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            multiplier: config.backoff_multiplier,
            budget: config.retry_budget,
        }
    }

    /// Delay before the retry that follows the `n`-th failure
    ///
    /// `initial_backoff * multiplier^(n-1)`, saturating instead of overflowing.
    /// `n = 0` is treated like `n = 1`.
    pub fn backoff_for(&self, n: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(n.saturating_sub(1));
        self.initial_backoff.saturating_mul(factor)
    }

    /// Same policy without any waiting, for dry runs
    pub fn without_backoff(mut self) -> Self {
        self.initial_backoff = Duration::ZERO;
        self
    }
}
