//! Content and image generation clients
//!
//! Generation is a single request per call; nothing here retries. The output
//! only ever becomes a `draft` post, which a person approves before the
//! scheduler will touch it.

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{info, warn};

use crate::error::Result;
use crate::store::PostStore;
use crate::types::{NewPost, Post, PostStatus};

pub mod content;
pub mod image;

/// Image URL stored when image generation fails, so the draft is still created
pub const PLACEHOLDER_IMAGE_URL: &str =
    "https://via.placeholder.com/1024x1792.png?text=Image+Generation+Failed";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub topic: String,
    pub tone: String,
    /// `short`, `medium` or `long`
    pub length: String,
    /// Link the call to action points at
    pub destination_url: Option<String>,
}

impl GenerationRequest {
    pub fn new(topic: &str, tone: &str) -> Self {
        Self {
            topic: topic.to_string(),
            tone: tone.to_string(),
            length: "medium".to_string(),
            destination_url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedContent {
    pub caption: String,
    #[serde(default, deserialize_with = "hashtag_list")]
    pub hashtags: Vec<String>,
    #[serde(default)]
    pub image_prompt: String,
    #[serde(default)]
    pub alt_text: Option<String>,
    #[serde(default)]
    pub cta: Option<String>,
}

impl GeneratedContent {
    /// Hashtags as stored on a post: space separated
    pub fn hashtag_line(&self) -> String {
        self.hashtags.join(" ")
    }
}

/// Models return hashtags either as a list or as one string
fn hashtag_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Tags {
        List(Vec<String>),
        Line(String),
    }

    Ok(match Tags::deserialize(deserializer)? {
        Tags::List(tags) => tags,
        Tags::Line(line) => line
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|tag| !tag.is_empty())
            .map(str::to_string)
            .collect(),
    })
}

#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedContent>;

    /// `count` variations on one topic in a single request
    async fn generate_batch(
        &self,
        topic: &str,
        tone: &str,
        count: usize,
    ) -> Result<Vec<GeneratedContent>>;
}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// URL (possibly a `data:` URL) of an image for `prompt`
    async fn generate_image(&self, prompt: &str) -> Result<String>;
}

/// Generate `count` posts about the request's topic and store them as drafts
///
/// A failed image falls back to [`PLACEHOLDER_IMAGE_URL`]; a failed content
/// request fails the whole call before anything is stored.
pub async fn generate_drafts(
    store: &dyn PostStore,
    content: &dyn ContentGenerator,
    images: &dyn ImageGenerator,
    request: &GenerationRequest,
    count: usize,
    platforms: &str,
) -> Result<Vec<Post>> {
    let generated = if count > 1 {
        content
            .generate_batch(&request.topic, &request.tone, count)
            .await?
    } else {
        vec![content.generate(request).await?]
    };

    let mut drafts = Vec::with_capacity(generated.len());
    for item in generated {
        let image_url = match images.generate_image(&item.image_prompt).await {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, "Image generation failed, using placeholder");
                PLACEHOLDER_IMAGE_URL.to_string()
            }
        };

        let post = store
            .create(NewPost {
                topic: Some(request.topic.clone()),
                caption: Some(item.caption.clone()),
                hashtags: Some(item.hashtag_line()),
                image_prompt: Some(item.image_prompt.clone()),
                image_url: Some(image_url),
                platforms: platforms.to_string(),
                status: PostStatus::Draft,
                ..Default::default()
            })
            .await?;
        drafts.push(post);
    }

    info!(topic = %request.topic, count = drafts.len(), "Generated draft posts");
    Ok(drafts)
}
