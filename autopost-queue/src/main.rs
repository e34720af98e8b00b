//! autopost-queue - Manage the post queue
//!
//! Unix-style tool for creating, generating, approving and inspecting posts.

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use libautopost::error::StoreError;
use libautopost::generator::content::OpenAiContentGenerator;
use libautopost::generator::image::StabilityImageGenerator;
use libautopost::generator::{self, GenerationRequest, ImageGenerator, PLACEHOLDER_IMAGE_URL};
use libautopost::logging::{LogFormat, LoggingConfig};
use libautopost::scheduling::{format_timestamp, parse_schedule};
use libautopost::{
    AutopostError, Config, NewPost, Post, PostStatus, PostStore, PostUpdate, Result,
};
use std::collections::BTreeMap;
use tracing::{debug, warn};

#[derive(Parser, Debug)]
#[command(name = "autopost-queue")]
#[command(version)]
#[command(about = "Manage the autopost queue")]
#[command(long_about = "\
autopost-queue - Manage the autopost queue

DESCRIPTION:
    autopost-queue creates posts (by hand or with the content generator),
    approves and schedules them, and shows what happened when autopost-send
    published them. Only approved posts in the 'scheduled' state are ever
    published.

COMMANDS:
    create      Create a post from a caption
    generate    Generate draft posts about a topic
    list        List posts
    show        Show one post
    approve     Approve a post and schedule it
    reschedule  Move a post to a new time and reset its attempts
    update      Edit fields of a post
    delete      Remove a post
    history     Show the publish attempts of a post
    stats       Show queue statistics

USAGE EXAMPLES:
    # Generate three drafts for Instagram and YouTube
    autopost-queue generate --topic \"rooftop gardens\" --count 3 --platforms instagram,youtube

    # Approve a draft for tomorrow morning
    autopost-queue approve <POST_ID> --at \"tomorrow 9am\"

    # Retry a post that ended in error
    autopost-queue reschedule <POST_ID> now

    # Machine-readable listing
    autopost-queue list --status scheduled --format json

CONFIGURATION:
    Configuration file: ~/.config/autopost/config.toml
    Queue location:     ~/.local/share/autopost/posts.db

    Override with environment variables:
        AUTOPOST_CONFIG    - Path to config file
        AUTOPOST_STORAGE   - Storage backend (sqlite or json)
        AUTOPOST_DB_PATH   - Path to the queue file

EXIT CODES:
    0 - Success
    1 - Operation failed (unknown post, storage or generator error)
    2 - Configuration error (including missing API keys)
    3 - Invalid input (bad time, status or format)
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a post from a caption
    Create {
        #[arg(long)]
        caption: String,

        /// Comma-separated target platforms, in publish order
        #[arg(long)]
        platforms: String,

        #[arg(long)]
        hashtags: Option<String>,

        #[arg(long)]
        topic: Option<String>,

        #[arg(long)]
        image_url: Option<String>,

        /// Approve and schedule immediately (e.g. "now", "in 2h", "tomorrow 9am")
        #[arg(long, value_name = "TIME")]
        at: Option<String>,
    },

    /// Generate draft posts about a topic
    Generate {
        #[arg(long)]
        topic: String,

        #[arg(long, default_value = "engaging")]
        tone: String,

        /// Number of variations to generate
        #[arg(long, default_value_t = 1)]
        count: usize,

        /// Comma-separated target platforms, in publish order
        #[arg(long)]
        platforms: String,

        /// Link the call to action should point at
        #[arg(long)]
        url: Option<String>,
    },

    /// List posts
    List {
        /// Only show posts with this status
        #[arg(short, long)]
        status: Option<String>,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show one post
    Show {
        post_id: String,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Approve a post and schedule it
    Approve {
        post_id: String,

        /// Publish time; keeps the existing time, or now if there is none
        #[arg(long, value_name = "TIME")]
        at: Option<String>,
    },

    /// Move a post to a new time and reset its attempts
    Reschedule {
        post_id: String,

        /// New publish time (e.g. "tomorrow 3pm", "in 2h", "now")
        time: String,
    },

    /// Edit fields of a post
    Update {
        post_id: String,

        #[arg(long)]
        caption: Option<String>,

        #[arg(long)]
        hashtags: Option<String>,

        #[arg(long)]
        platforms: Option<String>,

        #[arg(long)]
        topic: Option<String>,

        #[arg(long)]
        image_url: Option<String>,
    },

    /// Remove a post and its attempt log
    Delete { post_id: String },

    /// Show the publish attempts of a post
    History {
        post_id: String,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show queue statistics
    Stats {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    fn parse(format: &str) -> Result<Self> {
        match format {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(AutopostError::InvalidInput(format!(
                "Invalid format '{}'. Must be 'text' or 'json'",
                other
            ))),
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::new(LogFormat::Text, "error".to_string(), cli.verbose).init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let store = libautopost::store::open(&config.storage).await?;
    let store = store.as_ref();

    match cli.command {
        Commands::Create {
            caption,
            platforms,
            hashtags,
            topic,
            image_url,
            at,
        } => {
            cmd_create(store, caption, platforms, hashtags, topic, image_url, at.as_deref()).await
        }
        Commands::Generate {
            topic,
            tone,
            count,
            platforms,
            url,
        } => cmd_generate(store, &config, &topic, &tone, count, &platforms, url).await,
        Commands::List { status, format } => cmd_list(store, status.as_deref(), &format).await,
        Commands::Show { post_id, format } => cmd_show(store, &post_id, &format).await,
        Commands::Approve { post_id, at } => cmd_approve(store, &post_id, at.as_deref()).await,
        Commands::Reschedule { post_id, time } => cmd_reschedule(store, &post_id, &time).await,
        Commands::Update {
            post_id,
            caption,
            hashtags,
            platforms,
            topic,
            image_url,
        } => {
            let update = PostUpdate {
                caption,
                hashtags,
                platforms: platforms.map(|p| normalize_platforms(&p)).transpose()?,
                topic,
                image_url,
                ..Default::default()
            };
            cmd_update(store, &post_id, update).await
        }
        Commands::Delete { post_id } => cmd_delete(store, &post_id).await,
        Commands::History { post_id, format } => cmd_history(store, &post_id, &format).await,
        Commands::Stats { format } => cmd_stats(store, &format).await,
    }
}

/// Trim and re-join a comma-separated platform list, rejecting an empty one
fn normalize_platforms(platforms: &str) -> Result<String> {
    let names: Vec<&str> = platforms
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    if names.is_empty() {
        return Err(AutopostError::InvalidInput(
            "At least one platform is required".to_string(),
        ));
    }
    Ok(names.join(","))
}

async fn require_post(store: &dyn PostStore, post_id: &str) -> Result<Post> {
    store
        .get(post_id)
        .await?
        .ok_or_else(|| StoreError::NotFound(post_id.to_string()).into())
}

async fn cmd_create(
    store: &dyn PostStore,
    caption: String,
    platforms: String,
    hashtags: Option<String>,
    topic: Option<String>,
    image_url: Option<String>,
    at: Option<&str>,
) -> Result<()> {
    if caption.trim().is_empty() {
        return Err(AutopostError::InvalidInput(
            "Caption cannot be empty".to_string(),
        ));
    }

    let mut new = NewPost {
        topic,
        caption: Some(caption),
        hashtags,
        image_url,
        platforms: normalize_platforms(&platforms)?,
        ..Default::default()
    };
    if let Some(at) = at {
        new.scheduled_at = Some(parse_schedule(at)?.timestamp());
        new.approved = true;
        new.status = PostStatus::Scheduled;
    }

    let post = store.create(new).await?;
    debug!(post_id = %post.id, status = %post.status, "Created post");
    println!("{}", post.id);
    Ok(())
}

async fn cmd_generate(
    store: &dyn PostStore,
    config: &Config,
    topic: &str,
    tone: &str,
    count: usize,
    platforms: &str,
    url: Option<String>,
) -> Result<()> {
    if count == 0 {
        return Err(AutopostError::InvalidInput(
            "Count must be at least 1".to_string(),
        ));
    }
    let platforms = normalize_platforms(platforms)?;

    let content = OpenAiContentGenerator::from_config(&config.generator)?;
    let images: Box<dyn ImageGenerator> =
        match StabilityImageGenerator::from_config(&config.generator) {
            Ok(images) => Box::new(images),
            Err(e) => {
                warn!(error = %e, "Image generation disabled, using placeholder images");
                Box::new(PlaceholderImages)
            }
        };

    let mut request = GenerationRequest::new(topic, tone);
    request.destination_url = url;

    let drafts = generator::generate_drafts(
        store,
        &content,
        images.as_ref(),
        &request,
        count,
        &platforms,
    )
    .await?;

    for draft in drafts {
        println!("{}", draft.id);
    }
    Ok(())
}

/// Stand-in when no image API key is configured
struct PlaceholderImages;

#[async_trait]
impl ImageGenerator for PlaceholderImages {
    async fn generate_image(&self, _prompt: &str) -> Result<String> {
        Ok(PLACEHOLDER_IMAGE_URL.to_string())
    }
}

async fn cmd_list(store: &dyn PostStore, status: Option<&str>, format: &str) -> Result<()> {
    let format = OutputFormat::parse(format)?;
    let status: Option<PostStatus> = status.map(str::parse).transpose()?;

    let mut posts = store.list().await?;
    if let Some(status) = status {
        posts.retain(|p| p.status == status);
    }

    match format {
        OutputFormat::Json => print_json(&posts)?,
        OutputFormat::Text => {
            let now = chrono::Utc::now().timestamp();
            for post in &posts {
                let caption = truncate_content(post.caption.as_deref().unwrap_or(""), 50);
                let when = match (post.status, post.scheduled_at) {
                    (PostStatus::Scheduled, Some(ts)) => format_time_until(now, ts),
                    _ => format_timestamp(post.scheduled_at),
                };
                println!(
                    "{} | {} | {} | {} | {}",
                    post.id, post.status, post.platforms, when, caption
                );
            }
        }
    }
    Ok(())
}

async fn cmd_show(store: &dyn PostStore, post_id: &str, format: &str) -> Result<()> {
    let format = OutputFormat::parse(format)?;
    let post = require_post(store, post_id).await?;

    if format == OutputFormat::Json {
        return print_json(&post);
    }

    println!("ID:           {}", post.id);
    println!("Status:       {}", post.status);
    println!("Approved:     {}", if post.approved { "yes" } else { "no" });
    println!("Platforms:    {}", post.platforms);
    println!("Scheduled:    {}", format_timestamp(post.scheduled_at));
    println!("Attempts:     {}", post.attempts);
    println!("Last attempt: {}", format_timestamp(post.last_attempt_at));
    println!("Created:      {}", format_timestamp(Some(post.created_at)));
    if let Some(topic) = &post.topic {
        println!("Topic:        {}", topic);
    }
    if let Some(hashtags) = &post.hashtags {
        println!("Hashtags:     {}", hashtags);
    }
    if let Some(image_url) = &post.image_url {
        println!("Image:        {}", truncate_content(image_url, 80));
    }
    if let Some(remote) = &post.post_id {
        println!("Remote IDs:   {}", remote);
    }
    if let Some(caption) = &post.caption {
        println!();
        println!("{}", caption);
    }
    Ok(())
}

async fn cmd_approve(store: &dyn PostStore, post_id: &str, at: Option<&str>) -> Result<()> {
    let post = require_post(store, post_id).await?;
    if matches!(post.status, PostStatus::Posting | PostStatus::Posted) {
        return Err(AutopostError::InvalidInput(format!(
            "Post {} is already {}",
            post_id, post.status
        )));
    }

    let scheduled_at = match at {
        Some(at) => parse_schedule(at)?.timestamp(),
        None => post
            .scheduled_at
            .unwrap_or_else(|| chrono::Utc::now().timestamp()),
    };

    // A failed post gets a fresh attempt budget, as with reschedule
    let attempts = (post.status == PostStatus::Error).then_some(0);

    let update = PostUpdate {
        approved: Some(true),
        status: Some(PostStatus::Scheduled),
        scheduled_at: Some(scheduled_at),
        attempts,
        ..Default::default()
    };
    store.update(post_id, update).await?;

    println!("Approved {} for {}", post_id, format_timestamp(Some(scheduled_at)));
    Ok(())
}

async fn cmd_reschedule(store: &dyn PostStore, post_id: &str, time: &str) -> Result<()> {
    let scheduled_at = parse_schedule(time)?.timestamp();
    let post = require_post(store, post_id).await?;
    if post.status == PostStatus::Posting {
        return Err(AutopostError::InvalidInput(format!(
            "Post {} is being published right now",
            post_id
        )));
    }

    // Fresh attempt budget; approval is left as it is
    let update = PostUpdate {
        status: Some(PostStatus::Scheduled),
        scheduled_at: Some(scheduled_at),
        attempts: Some(0),
        ..Default::default()
    };
    store.update(post_id, update).await?;

    println!("Rescheduled {} for {}", post_id, format_timestamp(Some(scheduled_at)));
    Ok(())
}

async fn cmd_update(store: &dyn PostStore, post_id: &str, update: PostUpdate) -> Result<()> {
    if update.is_empty() {
        return Err(AutopostError::InvalidInput(
            "Nothing to update; pass at least one field".to_string(),
        ));
    }
    store.update(post_id, update).await?;
    println!("Updated {}", post_id);
    Ok(())
}

async fn cmd_delete(store: &dyn PostStore, post_id: &str) -> Result<()> {
    store.delete(post_id).await?;
    println!("Deleted {}", post_id);
    Ok(())
}

async fn cmd_history(store: &dyn PostStore, post_id: &str, format: &str) -> Result<()> {
    let format = OutputFormat::parse(format)?;
    require_post(store, post_id).await?;
    let log = store.attempt_log(post_id).await?;

    match format {
        OutputFormat::Json => print_json(&log)?,
        OutputFormat::Text => {
            for record in &log {
                let detail = if record.success {
                    format!("ok {}", record.platform_post_id.as_deref().unwrap_or("-"))
                } else {
                    format!("failed: {}", record.error_message.as_deref().unwrap_or("-"))
                };
                println!(
                    "{} | {} | attempt {} | {}",
                    format_timestamp(Some(record.attempted_at)),
                    record.platform,
                    record.attempt,
                    detail
                );
            }
        }
    }
    Ok(())
}

async fn cmd_stats(store: &dyn PostStore, format: &str) -> Result<()> {
    let format = OutputFormat::parse(format)?;
    let posts = store.list().await?;
    let now = chrono::Utc::now().timestamp();

    let mut by_status: BTreeMap<&'static str, usize> =
        PostStatus::ALL.iter().map(|s| (s.as_str(), 0)).collect();
    for post in &posts {
        *by_status.entry(post.status.as_str()).or_default() += 1;
    }
    let due = posts.iter().filter(|p| p.is_due(now)).count();
    let awaiting_approval = posts
        .iter()
        .filter(|p| p.status == PostStatus::Scheduled && !p.approved)
        .count();
    let next = posts
        .iter()
        .filter(|p| p.status == PostStatus::Scheduled && p.approved)
        .filter_map(|p| p.scheduled_at)
        .filter(|ts| *ts > now)
        .min();

    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "total": posts.len(),
                "by_status": by_status,
                "due": due,
                "awaiting_approval": awaiting_approval,
                "next_scheduled_at": next,
            });
            print_json(&json)?;
        }
        OutputFormat::Text => {
            println!("Total posts: {}", posts.len());
            for (status, count) in &by_status {
                println!("  {:<10} {}", status, count);
            }
            println!("Due now: {}", due);
            println!("Awaiting approval: {}", awaiting_approval);
            match next {
                Some(ts) => println!("Next post: {}", format_time_until(now, ts)),
                None => println!("Next post: none"),
            }
        }
    }
    Ok(())
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(StoreError::from)?;
    println!("{}", json);
    Ok(())
}

/// Truncate content to max length with ellipsis
fn truncate_content(content: &str, max_len: usize) -> String {
    let single_line = content.replace('\n', " ");
    if single_line.chars().count() <= max_len {
        single_line
    } else {
        let truncated: String = single_line.chars().take(max_len).collect();
        format!("{}...", truncated)
    }
}

/// Format time until scheduled time in human-readable format
fn format_time_until(now: i64, scheduled_at: i64) -> String {
    let diff = scheduled_at - now;

    if diff <= 0 {
        return "due".to_string();
    }

    let minutes = diff / 60;
    let hours = minutes / 60;
    let days = hours / 24;

    if days > 0 {
        format!("in {} day{}", days, if days == 1 { "" } else { "s" })
    } else if hours > 0 {
        format!("in {} hour{}", hours, if hours == 1 { "" } else { "s" })
    } else if minutes > 0 {
        format!("in {} minute{}", minutes, if minutes == 1 { "" } else { "s" })
    } else {
        "in <1 minute".to_string()
    }
}
