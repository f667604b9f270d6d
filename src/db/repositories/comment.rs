//! Comment and like repository
//!
//! Database operations for comments and likes.

use crate::db::{Backend, DynDatabasePool};
use crate::error::{WriteError, WriteResult};
use crate::models::{Comment, ConnectedComment, Like};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySql, MySqlPool, Row, Sqlite, SqlitePool};
use std::sync::Arc;

/// Comment repository trait
#[async_trait]
pub trait CommentRepository: Send + Sync {
    /// Create a comment whose post is connected by slug and whose author is
    /// connected by email.
    ///
    /// Fails with `PreconditionNotMet` when either side does not exist.
    async fn create_connected(&self, input: &ConnectedComment) -> WriteResult<Comment>;

    /// List comments of a post, oldest first
    async fn list_for_post(&self, post_id: i64) -> WriteResult<Vec<Comment>>;

    /// Count comments of a post
    async fn count_for_post(&self, post_id: i64) -> WriteResult<i64>;

    /// Count likes of a post
    async fn count_likes_for_post(&self, post_id: i64) -> WriteResult<i64>;
}

/// SQLx-based comment repository implementation
pub struct SqlxCommentRepository {
    pool: DynDatabasePool,
}

impl SqlxCommentRepository {
    /// Create a new SQLx comment repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CommentRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl CommentRepository for SqlxCommentRepository {
    async fn create_connected(&self, input: &ConnectedComment) -> WriteResult<Comment> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => create_connected_sqlite(pool, input).await,
            Backend::Mysql(pool) => create_connected_mysql(pool, input).await,
        }
    }

    async fn list_for_post(&self, post_id: i64) -> WriteResult<Vec<Comment>> {
        let sql = "SELECT id, content, post_id, author_id, created_at FROM comments WHERE post_id = ? ORDER BY id";
        let comments = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(post_id)
                .fetch_all(pool)
                .await
                .context("Failed to list comments")?
                .iter()
                .map(row_to_comment_sqlite)
                .collect::<Result<Vec<_>>>()?,
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(post_id)
                .fetch_all(pool)
                .await
                .context("Failed to list comments")?
                .iter()
                .map(row_to_comment_mysql)
                .collect::<Result<Vec<_>>>()?,
        };
        Ok(comments)
    }

    async fn count_for_post(&self, post_id: i64) -> WriteResult<i64> {
        self.count_rows("SELECT COUNT(*) as count FROM comments WHERE post_id = ?", post_id)
            .await
    }

    async fn count_likes_for_post(&self, post_id: i64) -> WriteResult<i64> {
        self.count_rows("SELECT COUNT(*) as count FROM likes WHERE post_id = ?", post_id)
            .await
    }
}

impl SqlxCommentRepository {
    async fn count_rows(&self, sql: &str, post_id: i64) -> WriteResult<i64> {
        let count = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(post_id)
                .fetch_one(pool)
                .await
                .context("Failed to count rows")?
                .try_get("count")
                .context("Failed to read count")?,
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(post_id)
                .fetch_one(pool)
                .await
                .context("Failed to count rows")?
                .try_get("count")
                .context("Failed to read count")?,
        };
        Ok(count)
    }
}

// The connected insert resolves both natural keys in the same statement, so
// zero inserted rows means the post or the author is missing.
const CONNECTED_INSERT: &str = r#"
    INSERT INTO comments (content, post_id, author_id, created_at)
    SELECT ?, p.id, u.id, ?
    FROM posts p
    INNER JOIN users u ON u.email = ?
    WHERE p.slug = ?
"#;

fn connection_missing(input: &ConnectedComment) -> WriteError {
    WriteError::precondition(format!(
        "Post {} or author {} not found",
        input.post_slug, input.author_email
    ))
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_connected_sqlite(pool: &SqlitePool, input: &ConnectedComment) -> WriteResult<Comment> {
    let now = Utc::now();
    let result = sqlx::query(CONNECTED_INSERT)
        .bind(&input.content)
        .bind(now)
        .bind(&input.author_email)
        .bind(&input.post_slug)
        .execute(pool)
        .await
        .context("Failed to create comment")?;

    if result.rows_affected() == 0 {
        return Err(connection_missing(input));
    }

    let comment = get_comment_by_id_sqlite(pool, result.last_insert_rowid())
        .await?
        .ok_or_else(|| anyhow::anyhow!("Comment not found after insert"))?;
    Ok(comment)
}

pub(crate) async fn insert_comment_sqlite<'e, E>(
    executor: E,
    content: &str,
    post_id: i64,
    author_id: i64,
    now: DateTime<Utc>,
) -> Result<Comment>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        "INSERT INTO comments (content, post_id, author_id, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(content)
    .bind(post_id)
    .bind(author_id)
    .bind(now)
    .execute(executor)
    .await
    .context("Failed to create comment")?;

    Ok(Comment {
        id: result.last_insert_rowid(),
        content: content.to_string(),
        post_id,
        author_id,
        created_at: now,
    })
}

pub(crate) async fn insert_like_sqlite<'e, E>(
    executor: E,
    user_id: i64,
    post_id: i64,
    now: DateTime<Utc>,
) -> Result<Like>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query("INSERT INTO likes (user_id, post_id, created_at) VALUES (?, ?, ?)")
        .bind(user_id)
        .bind(post_id)
        .bind(now)
        .execute(executor)
        .await
        .context("Failed to create like")?;

    Ok(Like {
        id: result.last_insert_rowid(),
        user_id,
        post_id,
        created_at: now,
    })
}

async fn get_comment_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<Comment>> {
    let row = sqlx::query("SELECT id, content, post_id, author_id, created_at FROM comments WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get comment by ID")?;

    row.map(|row| row_to_comment_sqlite(&row)).transpose()
}

fn row_to_comment_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Comment> {
    Ok(Comment {
        id: row.try_get("id")?,
        content: row.try_get("content")?,
        post_id: row.try_get("post_id")?,
        author_id: row.try_get("author_id")?,
        created_at: row.try_get("created_at")?,
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_connected_mysql(pool: &MySqlPool, input: &ConnectedComment) -> WriteResult<Comment> {
    let now = Utc::now();
    let result = sqlx::query(CONNECTED_INSERT)
        .bind(&input.content)
        .bind(now)
        .bind(&input.author_email)
        .bind(&input.post_slug)
        .execute(pool)
        .await
        .context("Failed to create comment")?;

    if result.rows_affected() == 0 {
        return Err(connection_missing(input));
    }

    let comment = get_comment_by_id_mysql(pool, result.last_insert_id() as i64)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Comment not found after insert"))?;
    Ok(comment)
}

pub(crate) async fn insert_comment_mysql<'e, E>(
    executor: E,
    content: &str,
    post_id: i64,
    author_id: i64,
    now: DateTime<Utc>,
) -> Result<Comment>
where
    E: sqlx::Executor<'e, Database = MySql>,
{
    let result = sqlx::query(
        "INSERT INTO comments (content, post_id, author_id, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(content)
    .bind(post_id)
    .bind(author_id)
    .bind(now)
    .execute(executor)
    .await
    .context("Failed to create comment")?;

    Ok(Comment {
        id: result.last_insert_id() as i64,
        content: content.to_string(),
        post_id,
        author_id,
        created_at: now,
    })
}

pub(crate) async fn insert_like_mysql<'e, E>(
    executor: E,
    user_id: i64,
    post_id: i64,
    now: DateTime<Utc>,
) -> Result<Like>
where
    E: sqlx::Executor<'e, Database = MySql>,
{
    let result = sqlx::query("INSERT INTO likes (user_id, post_id, created_at) VALUES (?, ?, ?)")
        .bind(user_id)
        .bind(post_id)
        .bind(now)
        .execute(executor)
        .await
        .context("Failed to create like")?;

    Ok(Like {
        id: result.last_insert_id() as i64,
        user_id,
        post_id,
        created_at: now,
    })
}

async fn get_comment_by_id_mysql(pool: &MySqlPool, id: i64) -> Result<Option<Comment>> {
    let row = sqlx::query("SELECT id, content, post_id, author_id, created_at FROM comments WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get comment by ID")?;

    row.map(|row| row_to_comment_mysql(&row)).transpose()
}

fn row_to_comment_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Comment> {
    Ok(Comment {
        id: row.try_get("id")?,
        content: row.try_get("content")?,
        post_id: row.try_get("post_id")?,
        author_id: row.try_get("author_id")?,
        created_at: row.try_get("created_at")?,
    })
}
