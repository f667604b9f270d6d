//! User interaction repository
//!
//! Records a reader's interaction with a post as one transaction: a comment,
//! a like and a view counter increment become visible together or not at
//! all. Every early return drops the open transaction, which rolls it back.

use crate::db::{Backend, DynDatabasePool};
use crate::error::{WriteError, WriteResult};
use crate::models::Interaction;
use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, SqlitePool};
use std::sync::Arc;

use super::comment::{insert_comment_mysql, insert_comment_sqlite, insert_like_mysql, insert_like_sqlite};
use super::post::{get_first_published_mysql, get_first_published_sqlite, get_post_by_id_mysql, get_post_by_id_sqlite};
use super::user::{get_user_by_email_mysql, get_user_by_email_sqlite};

const INCREMENT_VIEWS: &str = "UPDATE posts SET view_count = view_count + 1, updated_at = ? WHERE id = ?";

/// Interaction repository trait
#[async_trait]
pub trait InteractionRepository: Send + Sync {
    /// Comment on and like the first published post as the user with
    /// `actor_email`, then count one more view of it.
    ///
    /// Fails with `PreconditionNotMet` when there is no published post or no
    /// such user; nothing is written in that case.
    async fn record(&self, actor_email: &str, comment: &str) -> WriteResult<Interaction>;
}

/// SQLx-based interaction repository implementation
pub struct SqlxInteractionRepository {
    pool: DynDatabasePool,
}

impl SqlxInteractionRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn InteractionRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl InteractionRepository for SqlxInteractionRepository {
    async fn record(&self, actor_email: &str, comment: &str) -> WriteResult<Interaction> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => record_sqlite(pool, actor_email, comment).await,
            Backend::Mysql(pool) => record_mysql(pool, actor_email, comment).await,
        }
    }
}

async fn record_sqlite(pool: &SqlitePool, actor_email: &str, content: &str) -> WriteResult<Interaction> {
    let now = Utc::now();
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let target = get_first_published_sqlite(&mut *tx)
        .await?
        .ok_or_else(|| WriteError::precondition("No published post found"))?;
    let actor = get_user_by_email_sqlite(&mut *tx, actor_email)
        .await?
        .ok_or_else(|| WriteError::precondition(format!("User not found: {}", actor_email)))?;

    let comment = insert_comment_sqlite(&mut *tx, content, target.id, actor.id, now).await?;
    let like = insert_like_sqlite(&mut *tx, actor.id, target.id, now).await?;

    sqlx::query(INCREMENT_VIEWS)
        .bind(now)
        .bind(target.id)
        .execute(&mut *tx)
        .await
        .context("Failed to increment view count")?;

    let post = get_post_by_id_sqlite(&mut *tx, target.id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Post {} vanished during interaction", target.id))?;

    tx.commit().await.context("Failed to commit interaction")?;

    Ok(Interaction { comment, like, post })
}

async fn record_mysql(pool: &MySqlPool, actor_email: &str, content: &str) -> WriteResult<Interaction> {
    let now = Utc::now();
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let target = get_first_published_mysql(&mut *tx)
        .await?
        .ok_or_else(|| WriteError::precondition("No published post found"))?;
    let actor = get_user_by_email_mysql(&mut *tx, actor_email)
        .await?
        .ok_or_else(|| WriteError::precondition(format!("User not found: {}", actor_email)))?;

    let comment = insert_comment_mysql(&mut *tx, content, target.id, actor.id, now).await?;
    let like = insert_like_mysql(&mut *tx, actor.id, target.id, now).await?;

    sqlx::query(INCREMENT_VIEWS)
        .bind(now)
        .bind(target.id)
        .execute(&mut *tx)
        .await
        .context("Failed to increment view count")?;

    let post = get_post_by_id_mysql(&mut *tx, target.id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Post {} vanished during interaction", target.id))?;

    tx.commit().await.context("Failed to commit interaction")?;

    Ok(Interaction { comment, like, post })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{seed_users, seed_with_guide_post, setup_pool, GUIDE_SLUG};
    use crate::db::repositories::{
        CommentRepository, PostRepository, SqlxCommentRepository, SqlxPostRepository,
        SqlxUserRepository, UserRepository,
    };

    async fn table_count(pool: &DynDatabasePool, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(pool.as_sqlite().unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_record_writes_comment_like_and_view() {
        let pool = setup_pool().await;
        let before = seed_with_guide_post(&pool).await;
        let repo = SqlxInteractionRepository::new(pool.clone());

        let interaction = repo
            .record("bob@example.com", "Great read")
            .await
            .expect("Failed to record interaction");

        let bob = SqlxUserRepository::new(pool.clone())
            .get_by_email("bob@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(interaction.post.id, before.id);
        assert_eq!(interaction.post.view_count, before.view_count + 1);
        assert_eq!(interaction.comment.author_id, bob.id);
        assert_eq!(interaction.comment.post_id, before.id);
        assert_eq!(interaction.like.user_id, bob.id);

        let comments = SqlxCommentRepository::new(pool.clone());
        assert_eq!(comments.count_for_post(before.id).await.unwrap(), 1);
        assert_eq!(comments.count_likes_for_post(before.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_record_targets_lowest_published_id() {
        let pool = setup_pool().await;
        let first = seed_with_guide_post(&pool).await;
        SqlxPostRepository::new(pool.clone()).insert_generated_batch(2).await.unwrap();

        let interaction = SqlxInteractionRepository::new(pool.clone())
            .record("bob@example.com", "Nice")
            .await
            .unwrap();

        assert_eq!(interaction.post.id, first.id);
        assert_eq!(interaction.post.slug, GUIDE_SLUG);
    }

    #[tokio::test]
    async fn test_record_missing_actor_writes_nothing() {
        let pool = setup_pool().await;
        let before = seed_with_guide_post(&pool).await;
        let repo = SqlxInteractionRepository::new(pool.clone());

        let err = repo.record("ghost@example.com", "Hello").await.unwrap_err();

        assert!(err.is_precondition());
        assert_eq!(table_count(&pool, "comments").await, 0);
        assert_eq!(table_count(&pool, "likes").await, 0);
        let after = SqlxPostRepository::new(pool.clone()).get_by_id(before.id).await.unwrap().unwrap();
        assert_eq!(after.view_count, before.view_count);
    }

    #[tokio::test]
    async fn test_record_without_published_post() {
        let pool = setup_pool().await;
        SqlxUserRepository::new(pool.clone()).create_many(&seed_users()).await.unwrap();

        let err = SqlxInteractionRepository::new(pool.clone())
            .record("bob@example.com", "Hello")
            .await
            .unwrap_err();

        assert!(err.is_precondition());
        assert_eq!(table_count(&pool, "comments").await, 0);
    }

    #[tokio::test]
    async fn test_record_rolls_back_when_view_update_fails() {
        let pool = setup_pool().await;
        let before = seed_with_guide_post(&pool).await;
        pool.execute(
            "CREATE TRIGGER reject_view_update BEFORE UPDATE OF view_count ON posts \
             BEGIN SELECT RAISE(ABORT, 'view counter locked'); END;",
        )
        .await
        .expect("Failed to create trigger");

        let err = SqlxInteractionRepository::new(pool.clone())
            .record("bob@example.com", "Hello")
            .await
            .unwrap_err();

        assert!(err.is_storage());
        assert!(err.to_string().contains("Failed to increment view count"));
        assert_eq!(table_count(&pool, "comments").await, 0);
        assert_eq!(table_count(&pool, "likes").await, 0);
        let after = SqlxPostRepository::new(pool.clone()).get_by_id(before.id).await.unwrap().unwrap();
        assert_eq!(after.view_count, before.view_count);
    }

    #[tokio::test]
    async fn test_second_like_by_same_user_rolls_back_comment() {
        let pool = setup_pool().await;
        let post = seed_with_guide_post(&pool).await;
        let repo = SqlxInteractionRepository::new(pool.clone());
        repo.record("bob@example.com", "First").await.unwrap();

        let err = repo.record("bob@example.com", "Second").await.unwrap_err();

        assert!(err.is_storage());
        let comments = SqlxCommentRepository::new(pool.clone());
        assert_eq!(comments.count_for_post(post.id).await.unwrap(), 1);
        assert_eq!(comments.count_likes_for_post(post.id).await.unwrap(), 1);
        let after = SqlxPostRepository::new(pool.clone()).get_by_id(post.id).await.unwrap().unwrap();
        assert_eq!(after.view_count, 1);
    }
}
