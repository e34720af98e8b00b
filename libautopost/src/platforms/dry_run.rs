use async_trait::async_trait;

use crate::error::Result;
use crate::platforms::{PublishReceipt, Publisher};
use crate::types::Post;

/// Publisher that only logs what it would have published
pub struct DryRunPublisher {
    name: String,
}

impl DryRunPublisher {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl Publisher for DryRunPublisher {
    fn name(&self) -> &str {
        &self.name
    }

    async fn publish(&self, post: &Post) -> Result<PublishReceipt> {
        tracing::info!(
            platform = %self.name,
            post_id = %post.id,
            caption = post.caption.as_deref().unwrap_or(""),
            "[dry run] would publish"
        );
        Ok(PublishReceipt::with_id(format!("dry-run-{}", post.id)))
    }
}
