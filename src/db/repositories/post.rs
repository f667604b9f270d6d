//! Post repository
//!
//! Database operations for posts, their tags and their categories.
//!
//! This module provides:
//! - `PostRepository` trait defining the interface for post data access
//! - `SqlxPostRepository` implementing the trait for SQLite and MySQL
//!
//! The generated batch insert and the random view bump are plain SQL
//! statements whose variable parts are always bound, never formatted in.

use crate::db::{Backend, DynDatabasePool};
use crate::error::{WriteError, WriteResult};
use crate::models::{Category, NewPost, Post, PostWithRelations, StalePostFilter, Tag};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySql, MySqlPool, Row, Sqlite, SqlitePool};
use std::sync::Arc;

use super::user::{get_user_by_email_mysql, get_user_by_email_sqlite, get_user_by_id_mysql, get_user_by_id_sqlite};

const POST_COLUMNS: &str = "id, title, slug, content, excerpt, published, published_at, view_count, author_id, created_at, updated_at";

/// Title prefix of generated batch posts
pub const BATCH_TITLE_PREFIX: &str = "Batch Post ";
/// Slug prefix of generated batch posts
pub const BATCH_SLUG_PREFIX: &str = "batch-post-";
/// Content prefix of generated batch posts
pub const BATCH_CONTENT_PREFIX: &str = "This is batch content for post ";

/// Random view increment in 1..=100; `abs(random())` overflows on i64::MIN
const SQLITE_RANDOM_VIEWS: &str = "((random() % 100) + 100) % 100 + 1";

/// Post repository trait
#[async_trait]
pub trait PostRepository: Send + Sync {
    /// Create a post connected to an existing author (by email) together with
    /// newly created tags and categories, in one transaction.
    ///
    /// Fails with `PreconditionNotMet` when the author does not exist.
    async fn create_with_relations(&self, input: &NewPost) -> WriteResult<PostWithRelations>;

    /// Get post by ID
    async fn get_by_id(&self, id: i64) -> WriteResult<Option<Post>>;

    /// Get post by slug
    async fn get_by_slug(&self, slug: &str) -> WriteResult<Option<Post>>;

    /// Load a post with its author, tags and categories
    async fn get_with_relations(&self, slug: &str) -> WriteResult<Option<PostWithRelations>>;

    /// Publish every unpublished post that has content
    async fn publish_drafts_with_content(&self, now: DateTime<Utc>) -> WriteResult<u64>;

    /// Insert `count` generated posts authored by the first user, skipping
    /// slug collisions
    async fn insert_generated_batch(&self, count: i64) -> WriteResult<u64>;

    /// Add a random amount in `1..=100` to the view count of every published post
    async fn bump_published_view_counts(&self) -> WriteResult<u64>;

    /// Delete every post matching all conditions of `filter`
    async fn delete_matching(&self, filter: &StalePostFilter) -> WriteResult<u64>;

    /// Count total posts
    async fn count(&self) -> WriteResult<i64>;
}

/// SQLx-based post repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxPostRepository {
    pool: DynDatabasePool,
}

impl SqlxPostRepository {
    /// Create a new SQLx post repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn PostRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl PostRepository for SqlxPostRepository {
    async fn create_with_relations(&self, input: &NewPost) -> WriteResult<PostWithRelations> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => create_with_relations_sqlite(pool, input).await,
            Backend::Mysql(pool) => create_with_relations_mysql(pool, input).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> WriteResult<Option<Post>> {
        let post = match self.pool.backend() {
            Backend::Sqlite(pool) => get_post_by_id_sqlite(pool, id).await?,
            Backend::Mysql(pool) => get_post_by_id_mysql(pool, id).await?,
        };
        Ok(post)
    }

    async fn get_by_slug(&self, slug: &str) -> WriteResult<Option<Post>> {
        let sql = format!("SELECT {} FROM posts WHERE slug = ?", POST_COLUMNS);
        let post = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(&sql)
                .bind(slug)
                .fetch_optional(pool)
                .await
                .context("Failed to get post by slug")?
                .map(|row| row_to_post_sqlite(&row))
                .transpose()?,
            Backend::Mysql(pool) => sqlx::query(&sql)
                .bind(slug)
                .fetch_optional(pool)
                .await
                .context("Failed to get post by slug")?
                .map(|row| row_to_post_mysql(&row))
                .transpose()?,
        };
        Ok(post)
    }

    async fn get_with_relations(&self, slug: &str) -> WriteResult<Option<PostWithRelations>> {
        let Some(post) = self.get_by_slug(slug).await? else {
            return Ok(None);
        };
        let loaded = match self.pool.backend() {
            Backend::Sqlite(pool) => load_relations_sqlite(pool, post).await?,
            Backend::Mysql(pool) => load_relations_mysql(pool, post).await?,
        };
        Ok(Some(loaded))
    }

    async fn publish_drafts_with_content(&self, now: DateTime<Utc>) -> WriteResult<u64> {
        let sql = r#"
            UPDATE posts
            SET published = ?, published_at = ?, updated_at = ?
            WHERE published = ? AND content IS NOT NULL
        "#;
        let affected = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(true)
                .bind(now)
                .bind(now)
                .bind(false)
                .execute(pool)
                .await
                .context("Failed to publish draft posts")?
                .rows_affected(),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(true)
                .bind(now)
                .bind(now)
                .bind(false)
                .execute(pool)
                .await
                .context("Failed to publish draft posts")?
                .rows_affected(),
        };
        Ok(affected)
    }

    async fn insert_generated_batch(&self, count: i64) -> WriteResult<u64> {
        if count < 1 {
            return Ok(0);
        }
        let inserted = match self.pool.backend() {
            Backend::Sqlite(pool) => insert_generated_batch_sqlite(pool, count).await?,
            Backend::Mysql(pool) => insert_generated_batch_mysql(pool, count).await?,
        };
        Ok(inserted)
    }

    async fn bump_published_view_counts(&self) -> WriteResult<u64> {
        let affected = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(&format!(
                "UPDATE posts SET view_count = view_count + {} WHERE published = ?",
                SQLITE_RANDOM_VIEWS
            ))
            .bind(true)
            .execute(pool)
            .await
            .context("Failed to bump view counts")?
            .rows_affected(),
            Backend::Mysql(pool) => sqlx::query(
                "UPDATE posts SET view_count = view_count + FLOOR(RAND() * 100) + 1 WHERE published = ?",
            )
            .bind(true)
            .execute(pool)
            .await
            .context("Failed to bump view counts")?
            .rows_affected(),
        };
        Ok(affected)
    }

    async fn delete_matching(&self, filter: &StalePostFilter) -> WriteResult<u64> {
        let sql = "DELETE FROM posts WHERE published = ? AND created_at < ? AND view_count = ?";
        let deleted = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(filter.published)
                .bind(filter.created_before)
                .bind(filter.view_count)
                .execute(pool)
                .await
                .context("Failed to delete posts")?
                .rows_affected(),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(filter.published)
                .bind(filter.created_before)
                .bind(filter.view_count)
                .execute(pool)
                .await
                .context("Failed to delete posts")?
                .rows_affected(),
        };
        Ok(deleted)
    }

    async fn count(&self) -> WriteResult<i64> {
        let sql = "SELECT COUNT(*) as count FROM posts";
        let count = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .fetch_one(pool)
                .await
                .context("Failed to count posts")?
                .try_get("count")
                .context("Failed to read post count")?,
            Backend::Mysql(pool) => sqlx::query(sql)
                .fetch_one(pool)
                .await
                .context("Failed to count posts")?
                .try_get("count")
                .context("Failed to read post count")?,
        };
        Ok(count)
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_with_relations_sqlite(pool: &SqlitePool, input: &NewPost) -> WriteResult<PostWithRelations> {
    let now = Utc::now();
    let published_at = input.published.then_some(now);
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let author = get_user_by_email_sqlite(&mut *tx, &input.author_email)
        .await?
        .ok_or_else(|| WriteError::precondition(format!("Author not found: {}", input.author_email)))?;

    let result = sqlx::query(
        r#"
        INSERT INTO posts (title, slug, content, excerpt, published, published_at, view_count, author_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, 0, ?, ?, ?)
        "#,
    )
    .bind(&input.title)
    .bind(&input.slug)
    .bind(&input.content)
    .bind(&input.excerpt)
    .bind(input.published)
    .bind(published_at)
    .bind(author.id)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await
    .with_context(|| format!("Failed to create post {}", input.slug))?;
    let post_id = result.last_insert_rowid();

    let mut tags = Vec::with_capacity(input.tags.len());
    for tag in &input.tags {
        let tag_id = sqlx::query("INSERT INTO tags (name, slug, color, created_at) VALUES (?, ?, ?, ?)")
            .bind(&tag.name)
            .bind(&tag.slug)
            .bind(&tag.color)
            .bind(now)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to create tag {}", tag.slug))?
            .last_insert_rowid();
        sqlx::query("INSERT INTO post_tags (post_id, tag_id) VALUES (?, ?)")
            .bind(post_id)
            .bind(tag_id)
            .execute(&mut *tx)
            .await
            .context("Failed to link tag to post")?;
        tags.push(Tag {
            id: tag_id,
            name: tag.name.clone(),
            slug: tag.slug.clone(),
            color: tag.color.clone(),
            created_at: now,
        });
    }

    let mut categories = Vec::with_capacity(input.categories.len());
    for category in &input.categories {
        let category_id =
            sqlx::query("INSERT INTO categories (name, slug, description, created_at) VALUES (?, ?, ?, ?)")
                .bind(&category.name)
                .bind(&category.slug)
                .bind(&category.description)
                .bind(now)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("Failed to create category {}", category.slug))?
                .last_insert_rowid();
        sqlx::query("INSERT INTO post_categories (post_id, category_id) VALUES (?, ?)")
            .bind(post_id)
            .bind(category_id)
            .execute(&mut *tx)
            .await
            .context("Failed to link category to post")?;
        categories.push(Category {
            id: category_id,
            name: category.name.clone(),
            slug: category.slug.clone(),
            description: category.description.clone(),
            created_at: now,
        });
    }

    let post = get_post_by_id_sqlite(&mut *tx, post_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Post not found after insert: {}", input.slug))?;

    tx.commit().await.context("Failed to commit post creation")?;

    Ok(PostWithRelations {
        post,
        author,
        tags,
        categories,
    })
}

pub(crate) async fn get_post_by_id_sqlite<'e, E>(executor: E, id: i64) -> Result<Option<Post>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(&format!("SELECT {} FROM posts WHERE id = ?", POST_COLUMNS))
        .bind(id)
        .fetch_optional(executor)
        .await
        .context("Failed to get post by ID")?;

    row.map(|row| row_to_post_sqlite(&row)).transpose()
}

pub(crate) async fn get_first_published_sqlite<'e, E>(executor: E) -> Result<Option<Post>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(&format!(
        "SELECT {} FROM posts WHERE published = ? ORDER BY id LIMIT 1",
        POST_COLUMNS
    ))
    .bind(true)
    .fetch_optional(executor)
    .await
    .context("Failed to get first published post")?;

    row.map(|row| row_to_post_sqlite(&row)).transpose()
}

async fn load_relations_sqlite(pool: &SqlitePool, post: Post) -> Result<PostWithRelations> {
    let author = get_user_by_id_sqlite(pool, post.author_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Author {} of post {} not found", post.author_id, post.slug))?;

    let tags = sqlx::query(
        r#"
        SELECT t.id, t.name, t.slug, t.color, t.created_at
        FROM tags t
        INNER JOIN post_tags pt ON t.id = pt.tag_id
        WHERE pt.post_id = ?
        ORDER BY t.id
        "#,
    )
    .bind(post.id)
    .fetch_all(pool)
    .await
    .context("Failed to get tags for post")?
    .iter()
    .map(row_to_tag_sqlite)
    .collect::<Result<Vec<_>>>()?;

    let categories = sqlx::query(
        r#"
        SELECT c.id, c.name, c.slug, c.description, c.created_at
        FROM categories c
        INNER JOIN post_categories pc ON c.id = pc.category_id
        WHERE pc.post_id = ?
        ORDER BY c.id
        "#,
    )
    .bind(post.id)
    .fetch_all(pool)
    .await
    .context("Failed to get categories for post")?
    .iter()
    .map(row_to_category_sqlite)
    .collect::<Result<Vec<_>>>()?;

    Ok(PostWithRelations {
        post,
        author,
        tags,
        categories,
    })
}

async fn insert_generated_batch_sqlite(pool: &SqlitePool, count: i64) -> Result<u64> {
    let now = Utc::now();
    let result = sqlx::query(
        r#"
        WITH RECURSIVE seq(n) AS (
            SELECT 1
            UNION ALL
            SELECT n + 1 FROM seq WHERE n < ?
        )
        INSERT OR IGNORE INTO posts (title, slug, content, published, published_at, view_count, author_id, created_at, updated_at)
        SELECT ? || n, ? || n, ? || n, ?, ?, 0, (SELECT id FROM users ORDER BY id LIMIT 1), ?, ?
        FROM seq
        "#,
    )
    .bind(count)
    .bind(BATCH_TITLE_PREFIX)
    .bind(BATCH_SLUG_PREFIX)
    .bind(BATCH_CONTENT_PREFIX)
    .bind(true)
    .bind(now)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to insert generated posts")?;

    Ok(result.rows_affected())
}

fn row_to_post_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Post> {
    Ok(Post {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        slug: row.try_get("slug")?,
        content: row.try_get("content")?,
        excerpt: row.try_get("excerpt")?,
        published: row.try_get("published")?,
        published_at: row.try_get("published_at")?,
        view_count: row.try_get("view_count")?,
        author_id: row.try_get("author_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_tag_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Tag> {
    Ok(Tag {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        slug: row.try_get("slug")?,
        color: row.try_get("color")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_category_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Category> {
    Ok(Category {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        slug: row.try_get("slug")?,
        description: row.try_get("description")?,
        created_at: row.try_get("created_at")?,
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_with_relations_mysql(pool: &MySqlPool, input: &NewPost) -> WriteResult<PostWithRelations> {
    let now = Utc::now();
    let published_at = input.published.then_some(now);
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let author = get_user_by_email_mysql(&mut *tx, &input.author_email)
        .await?
        .ok_or_else(|| WriteError::precondition(format!("Author not found: {}", input.author_email)))?;

    let result = sqlx::query(
        r#"
        INSERT INTO posts (title, slug, content, excerpt, published, published_at, view_count, author_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, 0, ?, ?, ?)
        "#,
    )
    .bind(&input.title)
    .bind(&input.slug)
    .bind(&input.content)
    .bind(&input.excerpt)
    .bind(input.published)
    .bind(published_at)
    .bind(author.id)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await
    .with_context(|| format!("Failed to create post {}", input.slug))?;
    let post_id = result.last_insert_id() as i64;

    let mut tags = Vec::with_capacity(input.tags.len());
    for tag in &input.tags {
        let tag_id = sqlx::query("INSERT INTO tags (name, slug, color, created_at) VALUES (?, ?, ?, ?)")
            .bind(&tag.name)
            .bind(&tag.slug)
            .bind(&tag.color)
            .bind(now)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to create tag {}", tag.slug))?
            .last_insert_id() as i64;
        sqlx::query("INSERT INTO post_tags (post_id, tag_id) VALUES (?, ?)")
            .bind(post_id)
            .bind(tag_id)
            .execute(&mut *tx)
            .await
            .context("Failed to link tag to post")?;
        tags.push(Tag {
            id: tag_id,
            name: tag.name.clone(),
            slug: tag.slug.clone(),
            color: tag.color.clone(),
            created_at: now,
        });
    }

    let mut categories = Vec::with_capacity(input.categories.len());
    for category in &input.categories {
        let category_id =
            sqlx::query("INSERT INTO categories (name, slug, description, created_at) VALUES (?, ?, ?, ?)")
                .bind(&category.name)
                .bind(&category.slug)
                .bind(&category.description)
                .bind(now)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("Failed to create category {}", category.slug))?
                .last_insert_id() as i64;
        sqlx::query("INSERT INTO post_categories (post_id, category_id) VALUES (?, ?)")
            .bind(post_id)
            .bind(category_id)
            .execute(&mut *tx)
            .await
            .context("Failed to link category to post")?;
        categories.push(Category {
            id: category_id,
            name: category.name.clone(),
            slug: category.slug.clone(),
            description: category.description.clone(),
            created_at: now,
        });
    }

    let post = get_post_by_id_mysql(&mut *tx, post_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Post not found after insert: {}", input.slug))?;

    tx.commit().await.context("Failed to commit post creation")?;

    Ok(PostWithRelations {
        post,
        author,
        tags,
        categories,
    })
}

pub(crate) async fn get_post_by_id_mysql<'e, E>(executor: E, id: i64) -> Result<Option<Post>>
where
    E: sqlx::Executor<'e, Database = MySql>,
{
    let row = sqlx::query(&format!("SELECT {} FROM posts WHERE id = ?", POST_COLUMNS))
        .bind(id)
        .fetch_optional(executor)
        .await
        .context("Failed to get post by ID")?;

    row.map(|row| row_to_post_mysql(&row)).transpose()
}

pub(crate) async fn get_first_published_mysql<'e, E>(executor: E) -> Result<Option<Post>>
where
    E: sqlx::Executor<'e, Database = MySql>,
{
    let row = sqlx::query(&format!(
        "SELECT {} FROM posts WHERE published = ? ORDER BY id LIMIT 1 FOR UPDATE",
        POST_COLUMNS
    ))
    .bind(true)
    .fetch_optional(executor)
    .await
    .context("Failed to get first published post")?;

    row.map(|row| row_to_post_mysql(&row)).transpose()
}

async fn load_relations_mysql(pool: &MySqlPool, post: Post) -> Result<PostWithRelations> {
    let author = get_user_by_id_mysql(pool, post.author_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Author {} of post {} not found", post.author_id, post.slug))?;

    let tags = sqlx::query(
        r#"
        SELECT t.id, t.name, t.slug, t.color, t.created_at
        FROM tags t
        INNER JOIN post_tags pt ON t.id = pt.tag_id
        WHERE pt.post_id = ?
        ORDER BY t.id
        "#,
    )
    .bind(post.id)
    .fetch_all(pool)
    .await
    .context("Failed to get tags for post")?
    .iter()
    .map(row_to_tag_mysql)
    .collect::<Result<Vec<_>>>()?;

    let categories = sqlx::query(
        r#"
        SELECT c.id, c.name, c.slug, c.description, c.created_at
        FROM categories c
        INNER JOIN post_categories pc ON c.id = pc.category_id
        WHERE pc.post_id = ?
        ORDER BY c.id
        "#,
    )
    .bind(post.id)
    .fetch_all(pool)
    .await
    .context("Failed to get categories for post")?
    .iter()
    .map(row_to_category_mysql)
    .collect::<Result<Vec<_>>>()?;

    Ok(PostWithRelations {
        post,
        author,
        tags,
        categories,
    })
}

async fn insert_generated_batch_mysql(pool: &MySqlPool, count: i64) -> Result<u64> {
    let now = Utc::now();
    let result = sqlx::query(
        r#"
        INSERT IGNORE INTO posts (title, slug, content, published, published_at, view_count, author_id, created_at, updated_at)
        WITH RECURSIVE seq (n) AS (
            SELECT 1
            UNION ALL
            SELECT n + 1 FROM seq WHERE n < ?
        )
        SELECT CONCAT(?, n), CONCAT(?, n), CONCAT(?, n), ?, ?, 0,
               (SELECT id FROM users ORDER BY id LIMIT 1), ?, ?
        FROM seq
        "#,
    )
    .bind(count)
    .bind(BATCH_TITLE_PREFIX)
    .bind(BATCH_SLUG_PREFIX)
    .bind(BATCH_CONTENT_PREFIX)
    .bind(true)
    .bind(now)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to insert generated posts")?;

    Ok(result.rows_affected())
}

fn row_to_post_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Post> {
    Ok(Post {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        slug: row.try_get("slug")?,
        content: row.try_get("content")?,
        excerpt: row.try_get("excerpt")?,
        published: row.try_get("published")?,
        published_at: row.try_get("published_at")?,
        view_count: row.try_get("view_count")?,
        author_id: row.try_get("author_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_tag_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Tag> {
    Ok(Tag {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        slug: row.try_get("slug")?,
        color: row.try_get("color")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_category_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Category> {
    Ok(Category {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        slug: row.try_get("slug")?,
        description: row.try_get("description")?,
        created_at: row.try_get("created_at")?,
    })
}
