//! Scripted publisher for tests
//!
//! A `MockPublisher` plays back a list of outcomes, one per publish call, then
//! repeats a fallback outcome forever. It counts calls and remembers which
//! posts it published so tests can assert on retry behavior without any
//! network access.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::error::{PlatformError, Result};
use crate::platforms::{PublishReceipt, Publisher};
use crate::types::Post;

#[derive(Debug, Clone)]
pub enum MockOutcome {
    Succeed,
    Fail(PlatformError),
}

pub struct MockPublisher {
    name: String,
    script: Mutex<VecDeque<MockOutcome>>,
    fallback: MockOutcome,
    delay: Duration,
    calls: AtomicUsize,
    published: Mutex<Vec<String>>,
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockPublisher {
    /// Play `script` in order, then repeat `fallback`
    pub fn scripted(name: &str, script: Vec<MockOutcome>, fallback: MockOutcome) -> Self {
        Self {
            name: name.to_string(),
            script: Mutex::new(script.into()),
            fallback,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            published: Mutex::new(Vec::new()),
        }
    }

    pub fn success(name: &str) -> Self {
        Self::scripted(name, vec![], MockOutcome::Succeed)
    }

    pub fn always_fail(name: &str, error: &str) -> Self {
        Self::scripted(
            name,
            vec![],
            MockOutcome::Fail(PlatformError::Publish(error.to_string())),
        )
    }

    /// Fail the first `failures` calls, succeed afterwards
    pub fn fail_then_succeed(name: &str, failures: usize, error: &str) -> Self {
        let script = (0..failures)
            .map(|_| MockOutcome::Fail(PlatformError::Publish(error.to_string())))
            .collect();
        Self::scripted(name, script, MockOutcome::Succeed)
    }

    /// Sleep this long inside every publish call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Ids of the posts successfully published, in call order
    pub fn published_posts(&self) -> Vec<String> {
        locked(&self.published).clone()
    }

    fn next_outcome(&self) -> MockOutcome {
        locked(&self.script)
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl Publisher for MockPublisher {
    fn name(&self) -> &str {
        &self.name
    }

    async fn publish(&self, post: &Post) -> Result<PublishReceipt> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match self.next_outcome() {
            MockOutcome::Succeed => {
                locked(&self.published).push(post.id.clone());
                Ok(PublishReceipt::with_id(format!("{}-mock-{}", self.name, call)))
            }
            MockOutcome::Fail(error) => Err(error.into()),
        }
    }
}
