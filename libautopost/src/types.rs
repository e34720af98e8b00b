//! Core types for Autopost

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::AutopostError;

/// A queued social media post and its publishing state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub topic: Option<String>,
    pub caption: Option<String>,
    pub hashtags: Option<String>,
    pub image_prompt: Option<String>,
    pub image_url: Option<String>,
    /// Comma-delimited target platforms, in publish order
    pub platforms: String,
    pub scheduled_at: Option<i64>,
    pub approved: bool,
    pub status: PostStatus,
    /// Remote ids reported by publishers, as `platform:id` pairs
    pub post_id: Option<String>,
    /// JSON summary of the last dispatch
    pub response: Option<String>,
    pub created_at: i64,
    pub last_attempt_at: Option<i64>,
    /// Failed publish tries over the lifetime of the post
    pub attempts: u32,
}

impl Post {
    /// Build a stored post from creation fields, assigning a fresh id
    pub fn from_new(new: NewPost) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            topic: new.topic,
            caption: new.caption,
            hashtags: new.hashtags,
            image_prompt: new.image_prompt,
            image_url: new.image_url,
            platforms: new.platforms,
            scheduled_at: new.scheduled_at,
            approved: new.approved,
            status: new.status,
            post_id: None,
            response: None,
            created_at: chrono::Utc::now().timestamp(),
            last_attempt_at: None,
            attempts: 0,
        }
    }

    /// Target platforms in publish order
    ///
    /// Entries are trimmed; empty entries and repeats are dropped.
    pub fn platform_list(&self) -> Vec<String> {
        let mut platforms: Vec<String> = Vec::new();
        for name in self.platforms.split(',').map(str::trim) {
            if !name.is_empty() && !platforms.iter().any(|p| p == name) {
                platforms.push(name.to_string());
            }
        }
        platforms
    }

    /// Whether the scanner should dispatch this post at `now`
    pub fn is_due(&self, now: i64) -> bool {
        self.status == PostStatus::Scheduled
            && self.approved
            && self.scheduled_at.is_some_and(|at| at <= now)
    }

    /// Overwrite every field that is set on `update`
    pub fn apply(&mut self, update: &PostUpdate) {
        if let Some(topic) = &update.topic {
            self.topic = Some(topic.clone());
        }
        if let Some(caption) = &update.caption {
            self.caption = Some(caption.clone());
        }
        if let Some(hashtags) = &update.hashtags {
            self.hashtags = Some(hashtags.clone());
        }
        if let Some(image_prompt) = &update.image_prompt {
            self.image_prompt = Some(image_prompt.clone());
        }
        if let Some(image_url) = &update.image_url {
            self.image_url = Some(image_url.clone());
        }
        if let Some(platforms) = &update.platforms {
            self.platforms = platforms.clone();
        }
        if let Some(scheduled_at) = update.scheduled_at {
            self.scheduled_at = Some(scheduled_at);
        }
        if let Some(approved) = update.approved {
            self.approved = approved;
        }
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(post_id) = &update.post_id {
            self.post_id = Some(post_id.clone());
        }
        if let Some(response) = &update.response {
            self.response = Some(response.clone());
        }
        if let Some(last_attempt_at) = update.last_attempt_at {
            self.last_attempt_at = Some(last_attempt_at);
        }
        if let Some(attempts) = update.attempts {
            self.attempts = attempts;
        }
    }
}

/// Lifecycle of a post
///
/// `draft -> scheduled` happens through the approval flow; the scheduler owns
/// `scheduled -> posting -> posted | error`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Draft,
    Scheduled,
    Posting,
    Posted,
    Error,
}

impl PostStatus {
    pub const ALL: [PostStatus; 5] = [
        PostStatus::Draft,
        PostStatus::Scheduled,
        PostStatus::Posting,
        PostStatus::Posted,
        PostStatus::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Scheduled => "scheduled",
            PostStatus::Posting => "posting",
            PostStatus::Posted => "posted",
            PostStatus::Error => "error",
        }
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostStatus {
    type Err = AutopostError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "draft" => Ok(PostStatus::Draft),
            "scheduled" => Ok(PostStatus::Scheduled),
            "posting" => Ok(PostStatus::Posting),
            "posted" => Ok(PostStatus::Posted),
            "error" => Ok(PostStatus::Error),
            other => Err(AutopostError::InvalidInput(format!(
                "Unknown post status '{}'. Valid options: draft, scheduled, posting, posted, error",
                other
            ))),
        }
    }
}

/// Fields supplied when creating a post; the store assigns the id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPost {
    pub topic: Option<String>,
    pub caption: Option<String>,
    pub hashtags: Option<String>,
    pub image_prompt: Option<String>,
    pub image_url: Option<String>,
    pub platforms: String,
    pub scheduled_at: Option<i64>,
    pub approved: bool,
    pub status: PostStatus,
}

impl Default for NewPost {
    fn default() -> Self {
        Self {
            topic: None,
            caption: None,
            hashtags: None,
            image_prompt: None,
            image_url: None,
            platforms: String::new(),
            scheduled_at: None,
            approved: false,
            status: PostStatus::Draft,
        }
    }
}

/// Partial field update; `None` leaves a field untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostUpdate {
    pub topic: Option<String>,
    pub caption: Option<String>,
    pub hashtags: Option<String>,
    pub image_prompt: Option<String>,
    pub image_url: Option<String>,
    pub platforms: Option<String>,
    pub scheduled_at: Option<i64>,
    pub approved: Option<bool>,
    pub status: Option<PostStatus>,
    pub post_id: Option<String>,
    pub response: Option<String>,
    pub last_attempt_at: Option<i64>,
    pub attempts: Option<u32>,
}

impl PostUpdate {
    pub fn status(status: PostStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn with_last_attempt_at(mut self, at: i64) -> Self {
        self.last_attempt_at = Some(at);
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = Some(attempts);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == PostUpdate::default()
    }
}

/// One publish try of one post on one platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub post_id: String,
    pub platform: String,
    /// Value of the post's attempt counter when this try started
    pub attempt: u32,
    pub attempted_at: i64,
    pub success: bool,
    pub platform_post_id: Option<String>,
    pub error_message: Option<String>,
}

/// Outcome of one platform within a dispatch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformResult {
    pub platform: String,
    pub success: bool,
    pub platform_post_id: Option<String>,
    pub error: Option<String>,
}
