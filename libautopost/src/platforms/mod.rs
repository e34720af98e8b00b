//! Platform publishers and the registry that names them
//!
//! A publisher performs exactly one publish try of a post on one platform.
//! Retrying is never the publisher's job; the scheduler's attempt loop owns
//! every retry decision.
//!
//! Platforms are configured as `[platforms.<name>]` tables, each pointing at
//! an external program (see [`command::CommandPublisher`]):
//!
//! ```no_run
//! use libautopost::config::Config;
//! use libautopost::platforms::PublisherRegistry;
//!
//! # fn example() -> libautopost::error::Result<()> {
//! let config = Config::load()?;
//! let registry = PublisherRegistry::from_config(&config.platforms);
//! for name in registry.names() {
//!     println!("{}", name);
//! }
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::config::PlatformConfig;
use crate::error::{PlatformError, Result};
use crate::types::Post;

pub mod command;
pub mod dry_run;

// Also used by the integration tests of the binaries
pub mod mock;

/// What a successful publish reports back
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PublishReceipt {
    /// Id of the post on the remote platform, when the platform returns one
    pub platform_post_id: Option<String>,
    /// Raw platform response, kept for the dispatch summary
    pub response: Option<serde_json::Value>,
}

impl PublishReceipt {
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            platform_post_id: Some(id.into()),
            response: None,
        }
    }
}

/// One destination platform
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Lowercase platform name as it appears in a post's `platforms` field
    fn name(&self) -> &str;

    /// Make one publish try
    ///
    /// # Errors
    ///
    /// Any `PlatformError` describing why this try failed. The caller decides
    /// whether to try again.
    async fn publish(&self, post: &Post) -> Result<PublishReceipt>;
}

/// Platform name to publisher
#[derive(Clone, Default)]
pub struct PublisherRegistry {
    publishers: HashMap<String, Arc<dyn Publisher>>,
}

impl PublisherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build command publishers for every enabled `[platforms.<name>]` table
    pub fn from_config(platforms: &BTreeMap<String, PlatformConfig>) -> Self {
        let mut registry = Self::new();
        for (name, config) in platforms {
            if !config.enabled {
                tracing::debug!(platform = %name, "Platform disabled, not registering");
                continue;
            }
            registry.register(Arc::new(command::CommandPublisher::new(name, config)));
        }
        registry
    }

    /// Dry-run publishers under every enabled platform name
    pub fn dry_run(platforms: &BTreeMap<String, PlatformConfig>) -> Self {
        let mut registry = Self::new();
        for (name, config) in platforms {
            if config.enabled {
                registry.register(Arc::new(dry_run::DryRunPublisher::new(name)));
            }
        }
        registry
    }

    /// Register a publisher under its own name, replacing any previous one
    pub fn register(&mut self, publisher: Arc<dyn Publisher>) {
        self.publishers
            .insert(publisher.name().to_string(), publisher);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Publisher>> {
        self.publishers.get(name).cloned()
    }

    /// Like [`get`](Self::get), but an unregistered name is an error
    pub fn resolve(&self, name: &str) -> std::result::Result<Arc<dyn Publisher>, PlatformError> {
        self.get(name)
            .ok_or_else(|| PlatformError::UnknownPlatform(name.to_string()))
    }

    /// Registered platform names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.publishers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.publishers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.publishers.is_empty()
    }
}
