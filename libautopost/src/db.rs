//! SQLite post store

use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};
use std::path::Path;

use crate::error::{Result, StoreError};
use crate::store::PostStore;
use crate::types::{AttemptRecord, NewPost, Post, PostUpdate};

const POST_COLUMNS: &str = "id, topic, caption, hashtags, image_prompt, image_url, platforms, \
     scheduled_at, approved, status, post_id, response, created_at, last_attempt_at, attempts";

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection
    pub async fn new(db_path: &str) -> Result<Self> {
        // Expand path and create parent directories
        let expanded_path = shellexpand::tilde(db_path).to_string();
        let path = Path::new(&expanded_path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(StoreError::IoError)?;
        }

        // mode=rwc creates the file on first use; forward slashes keep the URL valid on Windows
        let db_url = format!("sqlite://{}?mode=rwc", expanded_path.replace('\\', "/"));

        let pool = SqlitePool::connect(&db_url)
            .await
            .map_err(StoreError::SqlxError)?;

        Self::migrate(pool).await
    }

    /// Private in-memory database; a single connection so every query sees the same data
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(StoreError::SqlxError)?;

        Self::migrate(pool).await
    }

    async fn migrate(pool: SqlitePool) -> Result<Self> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(StoreError::MigrationError)?;

        Ok(Self { pool })
    }

    /// Get the underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn fetch_post(&self, id: &str) -> Result<Option<Post>> {
        let row = sqlx::query(&format!("SELECT {} FROM posts WHERE id = ?", POST_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::SqlxError)?;

        row.as_ref().map(row_to_post).transpose()
    }
}

fn row_to_post(r: &SqliteRow) -> Result<Post> {
    Ok(Post {
        id: r.get("id"),
        topic: r.get("topic"),
        caption: r.get("caption"),
        hashtags: r.get("hashtags"),
        image_prompt: r.get("image_prompt"),
        image_url: r.get("image_url"),
        platforms: r.get("platforms"),
        scheduled_at: r.get("scheduled_at"),
        approved: r.get("approved"),
        status: r.get::<String, _>("status").parse()?,
        post_id: r.get("post_id"),
        response: r.get("response"),
        created_at: r.get("created_at"),
        last_attempt_at: r.get("last_attempt_at"),
        attempts: r.get::<i64, _>("attempts").max(0) as u32,
    })
}

#[async_trait]
impl PostStore for Database {
    async fn list(&self) -> Result<Vec<Post>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM posts ORDER BY created_at DESC, id",
            POST_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::SqlxError)?;

        rows.iter().map(row_to_post).collect()
    }

    async fn get(&self, id: &str) -> Result<Option<Post>> {
        self.fetch_post(id).await
    }

    async fn create(&self, new: NewPost) -> Result<Post> {
        let post = Post::from_new(new);

        sqlx::query(&format!(
            "INSERT INTO posts ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            POST_COLUMNS
        ))
        .bind(&post.id)
        .bind(&post.topic)
        .bind(&post.caption)
        .bind(&post.hashtags)
        .bind(&post.image_prompt)
        .bind(&post.image_url)
        .bind(&post.platforms)
        .bind(post.scheduled_at)
        .bind(post.approved)
        .bind(post.status.as_str())
        .bind(&post.post_id)
        .bind(&post.response)
        .bind(post.created_at)
        .bind(post.last_attempt_at)
        .bind(post.attempts as i64)
        .execute(&self.pool)
        .await
        .map_err(StoreError::SqlxError)?;

        Ok(post)
    }

    async fn update(&self, id: &str, update: PostUpdate) -> Result<Post> {
        if update.is_empty() {
            return self
                .fetch_post(id)
                .await?
                .ok_or_else(|| StoreError::NotFound(id.to_string()).into());
        }

        let mut query = QueryBuilder::<Sqlite>::new("UPDATE posts SET ");
        {
            let mut set = query.separated(", ");
            if let Some(v) = update.topic {
                set.push("topic = ").push_bind_unseparated(v);
            }
            if let Some(v) = update.caption {
                set.push("caption = ").push_bind_unseparated(v);
            }
            if let Some(v) = update.hashtags {
                set.push("hashtags = ").push_bind_unseparated(v);
            }
            if let Some(v) = update.image_prompt {
                set.push("image_prompt = ").push_bind_unseparated(v);
            }
            if let Some(v) = update.image_url {
                set.push("image_url = ").push_bind_unseparated(v);
            }
            if let Some(v) = update.platforms {
                set.push("platforms = ").push_bind_unseparated(v);
            }
            if let Some(v) = update.scheduled_at {
                set.push("scheduled_at = ").push_bind_unseparated(v);
            }
            if let Some(v) = update.approved {
                set.push("approved = ").push_bind_unseparated(v);
            }
            if let Some(v) = update.status {
                set.push("status = ").push_bind_unseparated(v.as_str());
            }
            if let Some(v) = update.post_id {
                set.push("post_id = ").push_bind_unseparated(v);
            }
            if let Some(v) = update.response {
                set.push("response = ").push_bind_unseparated(v);
            }
            if let Some(v) = update.last_attempt_at {
                set.push("last_attempt_at = ").push_bind_unseparated(v);
            }
            if let Some(v) = update.attempts {
                set.push("attempts = ").push_bind_unseparated(v as i64);
            }
        }
        query.push(" WHERE id = ").push_bind(id);

        let result = query
            .build()
            .execute(&self.pool)
            .await
            .map_err(StoreError::SqlxError)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id.to_string()).into());
        }

        self.fetch_post(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()).into())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM posts WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(StoreError::SqlxError)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id.to_string()).into());
        }
        Ok(())
    }

    async fn record_attempt(&self, record: &AttemptRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO post_attempts
                (post_id, platform, attempt, attempted_at, success, platform_post_id, error_message)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.post_id)
        .bind(&record.platform)
        .bind(record.attempt as i64)
        .bind(record.attempted_at)
        .bind(record.success)
        .bind(&record.platform_post_id)
        .bind(&record.error_message)
        .execute(&self.pool)
        .await
        .map_err(StoreError::SqlxError)?;

        Ok(())
    }

    async fn attempt_log(&self, post_id: &str) -> Result<Vec<AttemptRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT post_id, platform, attempt, attempted_at, success, platform_post_id, error_message
            FROM post_attempts
            WHERE post_id = ?
            ORDER BY id
            "#,
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::SqlxError)?;

        Ok(rows
            .iter()
            .map(|r| AttemptRecord {
                post_id: r.get("post_id"),
                platform: r.get("platform"),
                attempt: r.get::<i64, _>("attempt").max(0) as u32,
                attempted_at: r.get("attempted_at"),
                success: r.get("success"),
                platform_post_id: r.get("platform_post_id"),
                error_message: r.get("error_message"),
            })
            .collect())
    }
}
