//! Write service
//!
//! One method per write pattern of the demonstration run:
//! - batch insert that skips duplicates
//! - nested create of a post with its relations
//! - the user interaction transaction
//! - bulk conditional updates
//! - upserts keyed on email
//! - raw parameterized statements
//! - conditional bulk delete
//!
//! The concurrent step lives in [`super::fanout`].

use chrono::{Duration, Utc};
use std::sync::Arc;

use crate::db::repositories::{
    InteractionRepository, PostRepository, SqlxInteractionRepository, SqlxPostRepository,
    SqlxUserRepository, UserRepository,
};
use crate::db::DynDatabasePool;
use crate::error::WriteResult;
use crate::models::{
    BulkUpdateCounts, Interaction, NewPost, NewUser, PostWithRelations, RawWriteCounts,
    StalePostFilter, UpsertUser, User,
};

use super::demo_data::{INTERACTION_COMMENT, STALE_POST_DAYS};

/// Window in which a user counts as recently created
const RECENT_USER_HOURS: i64 = 24;

/// Service running the single-operation write patterns
pub struct WriteService {
    users: Arc<dyn UserRepository>,
    posts: Arc<dyn PostRepository>,
    interactions: Arc<dyn InteractionRepository>,
}

impl WriteService {
    /// Create a write service over explicit repositories
    pub fn new(
        users: Arc<dyn UserRepository>,
        posts: Arc<dyn PostRepository>,
        interactions: Arc<dyn InteractionRepository>,
    ) -> Self {
        Self {
            users,
            posts,
            interactions,
        }
    }

    /// Create a write service backed by the SQLx repositories over `pool`
    pub fn from_pool(pool: &DynDatabasePool) -> Self {
        Self::new(
            SqlxUserRepository::boxed(pool.clone()),
            SqlxPostRepository::boxed(pool.clone()),
            SqlxInteractionRepository::boxed(pool.clone()),
        )
    }

    /// Insert users, skipping any that collide on email or username.
    ///
    /// Returns the number of users actually inserted.
    pub async fn create_users_in_batch(&self, users: &[NewUser]) -> WriteResult<u64> {
        let created = self.users.create_many(users).await?;
        tracing::info!(requested = users.len(), created, "Created users in batch");
        Ok(created)
    }

    /// Create a post with its author connected and its tags and categories
    /// created, all or nothing.
    pub async fn create_post_with_relations(&self, input: &NewPost) -> WriteResult<PostWithRelations> {
        let created = self.posts.create_with_relations(input).await?;
        match serde_json::to_string_pretty(&created) {
            Ok(json) => tracing::info!("Created post:\n{}", json),
            Err(e) => tracing::warn!("Created post {} (not serializable: {})", created.post.slug, e),
        }
        Ok(created)
    }

    /// Comment on, like and view the first published post as `actor_email`
    pub async fn user_interaction(&self, actor_email: &str) -> WriteResult<Interaction> {
        let interaction = match self.interactions.record(actor_email, INTERACTION_COMMENT).await {
            Ok(interaction) => interaction,
            Err(e) => {
                tracing::error!("Interaction transaction failed: {}", e);
                return Err(e);
            }
        };
        tracing::info!(
            post = %interaction.post.slug,
            comment_id = interaction.comment.id,
            like_id = interaction.like.id,
            view_count = interaction.post.view_count,
            "Interaction transaction committed"
        );
        Ok(interaction)
    }

    /// Activate users created in the last day and publish every draft that
    /// has content
    pub async fn bulk_update(&self) -> WriteResult<BulkUpdateCounts> {
        let now = Utc::now();
        let activated_users = self
            .users
            .activate_created_since(now - Duration::hours(RECENT_USER_HOURS))
            .await?;
        let published_posts = self.posts.publish_drafts_with_content(now).await?;

        tracing::info!("Activated {} users", activated_users);
        tracing::info!("Published {} posts", published_posts);
        Ok(BulkUpdateCounts {
            activated_users,
            published_posts,
        })
    }

    /// Upsert each user by email, in order
    pub async fn upsert_users(&self, inputs: &[UpsertUser]) -> WriteResult<Vec<User>> {
        let mut results = Vec::with_capacity(inputs.len());
        for input in inputs {
            let user = self.users.upsert_by_email(input).await?;
            tracing::debug!(id = user.id, email = %user.email, "Upserted user");
            results.push(user);
        }
        tracing::info!("Upserted {} users", results.len());
        Ok(results)
    }

    /// Insert `batch_post_count` generated posts and bump the view counts of
    /// published posts with plain parameterized SQL
    pub async fn raw_sql_writes(&self, batch_post_count: i64) -> WriteResult<RawWriteCounts> {
        let inserted = self.posts.insert_generated_batch(batch_post_count).await?;
        let updated = self.posts.bump_published_view_counts().await?;

        tracing::info!("Raw batch insert affected {} rows", inserted);
        tracing::info!("Raw view count update affected {} rows", updated);
        Ok(RawWriteCounts { inserted, updated })
    }

    /// Delete unpublished, never viewed posts older than the stale window
    pub async fn conditional_delete(&self) -> WriteResult<u64> {
        let filter = StalePostFilter::unpublished_older_than(STALE_POST_DAYS, Utc::now());
        let deleted = self.posts.delete_matching(&filter).await?;
        tracing::info!("Deleted {} stale posts", deleted);
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{seed_with_guide_post, setup_pool};
    use crate::services::demo_data::{guide_post, seed_users, upsert_users};

    #[tokio::test]
    async fn test_batch_then_post() {
        let pool = setup_pool().await;
        let service = WriteService::from_pool(&pool);

        assert_eq!(service.create_users_in_batch(&seed_users()).await.unwrap(), 3);
        assert_eq!(service.create_users_in_batch(&seed_users()).await.unwrap(), 0);

        let post = service.create_post_with_relations(&guide_post()).await.unwrap();
        assert_eq!(post.author.username, "alice_dev");
    }

    #[tokio::test]
    async fn test_user_interaction_with_missing_actor() {
        let pool = setup_pool().await;
        seed_with_guide_post(&pool).await;
        let service = WriteService::from_pool(&pool);

        let err = service.user_interaction("nobody@example.com").await.unwrap_err();

        assert!(err.is_precondition());
    }

    #[tokio::test]
    async fn test_bulk_update_counts() {
        let pool = setup_pool().await;
        seed_with_guide_post(&pool).await;
        let service = WriteService::from_pool(&pool);

        let counts = service.bulk_update().await.unwrap();

        assert_eq!(counts.activated_users, 3);
        assert_eq!(counts.published_posts, 0);
    }

    #[tokio::test]
    async fn test_upsert_users_in_order() {
        let pool = setup_pool().await;
        seed_with_guide_post(&pool).await;
        let service = WriteService::from_pool(&pool);

        let users = service.upsert_users(&upsert_users()).await.unwrap();

        assert_eq!(users.len(), 2);
        assert_eq!(users[0].email, "admin@example.com");
        assert_eq!(users[1].username, "alice_updated");
        assert_eq!(users[1].display_name(), "Alice Johnson Updated");
    }

    #[tokio::test]
    async fn test_raw_sql_writes() {
        let pool = setup_pool().await;
        seed_with_guide_post(&pool).await;
        let service = WriteService::from_pool(&pool);

        let counts = service.raw_sql_writes(5).await.unwrap();

        assert_eq!(counts, RawWriteCounts { inserted: 5, updated: 6 });
    }

    #[tokio::test]
    async fn test_conditional_delete_keeps_fresh_posts() {
        let pool = setup_pool().await;
        seed_with_guide_post(&pool).await;
        let service = WriteService::from_pool(&pool);

        assert_eq!(service.conditional_delete().await.unwrap(), 0);
    }
}
