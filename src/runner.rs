//! Demonstration run
//!
//! Runs the write steps in order against one pool. The first failing step
//! stops the run. The pool is closed once the run ends, whatever the outcome.

use serde::Serialize;

use crate::config::RunConfig;
use crate::db::DynDatabasePool;
use crate::error::WriteResult;
use crate::models::{BulkUpdateCounts, Interaction, PostWithRelations, RawWriteCounts, User};
use crate::services::demo_data::{
    concurrent_comments, guide_post, profile_upsert, seed_users, upsert_users, PROFILE_USER_EMAIL,
    PROFILE_USER_FIRST_NAME,
};
use crate::services::{ConcurrentWrites, FanoutService, ProfileUpdate, WriteService};

/// Steps of the run, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    BatchCreateUsers,
    NestedCreatePost,
    UserInteraction,
    BulkUpdate,
    Upsert,
    RawSql,
    ConcurrentWrites,
    ConditionalDelete,
}

impl Step {
    pub fn number(self) -> u8 {
        match self {
            Step::BatchCreateUsers => 1,
            Step::NestedCreatePost => 2,
            Step::UserInteraction => 3,
            Step::BulkUpdate => 4,
            Step::Upsert => 5,
            Step::RawSql => 6,
            Step::ConcurrentWrites => 7,
            Step::ConditionalDelete => 8,
        }
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Step::BatchCreateUsers => "batch create users",
            Step::NestedCreatePost => "create post with relations",
            Step::UserInteraction => "user interaction transaction",
            Step::BulkUpdate => "bulk conditional update",
            Step::Upsert => "upsert users",
            Step::RawSql => "raw SQL writes",
            Step::ConcurrentWrites => "concurrent writes",
            Step::ConditionalDelete => "conditional delete",
        };
        write!(f, "{}. {}", self.number(), name)
    }
}

/// What every step of a successful run wrote
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub users_created: u64,
    pub post: PostWithRelations,
    pub interaction: Interaction,
    pub bulk_update: BulkUpdateCounts,
    pub upserted: Vec<User>,
    pub raw_sql: RawWriteCounts,
    pub concurrent: ConcurrentWrites,
    /// `None` unless the conditional delete was enabled
    pub deleted_posts: Option<u64>,
}

/// A run that stopped at a failing step
#[derive(Debug, thiserror::Error)]
#[error("Step {step} failed: {source}")]
pub struct RunError {
    pub step: Step,
    #[source]
    pub source: crate::error::WriteError,
}

/// Run every step against `pool`, then close the pool
pub async fn run(pool: DynDatabasePool, config: &RunConfig) -> Result<RunSummary, RunError> {
    let result = run_steps(&pool, config).await;
    pool.close().await;
    tracing::debug!("Database pool closed");

    match &result {
        Ok(_) => tracing::info!("All steps completed"),
        Err(e) => tracing::error!("{}", e),
    }
    result
}

async fn run_steps(pool: &DynDatabasePool, config: &RunConfig) -> Result<RunSummary, RunError> {
    let writes = WriteService::from_pool(pool);
    let fanout = FanoutService::from_pool(pool);

    let users_created = step(Step::BatchCreateUsers, writes.create_users_in_batch(&seed_users())).await?;
    let post = step(Step::NestedCreatePost, writes.create_post_with_relations(&guide_post())).await?;
    let interaction = step(
        Step::UserInteraction,
        writes.user_interaction(&config.interaction_email),
    )
    .await?;
    let bulk_update = step(Step::BulkUpdate, writes.bulk_update()).await?;
    let upserted = step(Step::Upsert, writes.upsert_users(&upsert_users())).await?;
    let raw_sql = step(Step::RawSql, writes.raw_sql_writes(config.batch_post_count)).await?;

    let update = ProfileUpdate {
        email: PROFILE_USER_EMAIL.to_string(),
        first_name: PROFILE_USER_FIRST_NAME.to_string(),
        profile: profile_upsert(),
    };
    let concurrent = step(Step::ConcurrentWrites, fanout.run(concurrent_comments(), update)).await?;

    let deleted_posts = if config.conditional_delete {
        Some(step(Step::ConditionalDelete, writes.conditional_delete()).await?)
    } else {
        tracing::info!("Skipping step {} (not enabled)", Step::ConditionalDelete);
        None
    };

    Ok(RunSummary {
        users_created,
        post,
        interaction,
        bulk_update,
        upserted,
        raw_sql,
        concurrent,
        deleted_posts,
    })
}

async fn step<T>(
    step: Step,
    operation: impl std::future::Future<Output = WriteResult<T>>,
) -> Result<T, RunError> {
    tracing::info!("Running step {}", step);
    operation.await.map_err(|source| RunError { step, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::setup_pool;
    use crate::db::repositories::{PostRepository, SqlxPostRepository};

    #[tokio::test]
    async fn test_full_run() {
        let pool = setup_pool().await;

        let summary = run(pool.clone(), &RunConfig::default()).await.expect("Run failed");

        assert_eq!(summary.users_created, 3);
        assert_eq!(summary.post.tags.len(), 3);
        assert_eq!(summary.interaction.post.view_count, 1);
        assert_eq!(summary.bulk_update.activated_users, 3);
        assert_eq!(summary.upserted.len(), 2);
        assert_eq!(summary.raw_sql, RawWriteCounts { inserted: 5, updated: 6 });
        assert_eq!(summary.concurrent.comments.len(), 2);
        assert_eq!(summary.deleted_posts, None);
        assert!(pool.is_closed());
    }

    #[tokio::test]
    async fn test_conditional_delete_is_opt_in() {
        let pool = setup_pool().await;
        let config = RunConfig {
            conditional_delete: true,
            ..RunConfig::default()
        };

        let summary = run(pool, &config).await.expect("Run failed");

        assert_eq!(summary.deleted_posts, Some(0));
    }

    #[tokio::test]
    async fn test_missing_actor_stops_at_interaction_and_closes_pool() {
        let pool = setup_pool().await;
        let config = RunConfig {
            interaction_email: "nobody@example.com".to_string(),
            ..RunConfig::default()
        };

        let err = run(pool.clone(), &config).await.unwrap_err();

        assert_eq!(err.step, Step::UserInteraction);
        assert!(err.source.is_precondition());
        assert!(pool.is_closed());
    }

    #[tokio::test]
    async fn test_rerun_fails_on_existing_post() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = crate::config::DatabaseConfig {
            driver: crate::config::DatabaseDriver::Sqlite,
            url: dir.path().join("rerun.db").to_string_lossy().into_owned(),
        };
        let first = crate::db::create_pool(&config).await.unwrap();
        crate::db::migrations::run_migrations(&first).await.unwrap();
        run(first, &RunConfig::default()).await.expect("First run failed");

        let second = crate::db::create_pool(&config).await.unwrap();
        let err = run(second.clone(), &RunConfig::default()).await.unwrap_err();

        assert_eq!(err.step, Step::NestedCreatePost);
        assert!(err.source.is_storage());
        assert!(second.is_closed());
    }

    #[tokio::test]
    async fn test_later_steps_skipped_after_failure() {
        let dir = tempfile::TempDir::new().unwrap();
        let db = crate::config::DatabaseConfig {
            driver: crate::config::DatabaseDriver::Sqlite,
            url: dir.path().join("stopped.db").to_string_lossy().into_owned(),
        };
        let pool = crate::db::create_pool(&db).await.unwrap();
        crate::db::migrations::run_migrations(&pool).await.unwrap();
        let config = RunConfig {
            interaction_email: "nobody@example.com".to_string(),
            ..RunConfig::default()
        };

        run(pool, &config).await.unwrap_err();

        // Only the guide post exists: the raw SQL batch never ran.
        let reopened = crate::db::create_pool(&db).await.unwrap();
        assert_eq!(SqlxPostRepository::new(reopened.clone()).count().await.unwrap(), 1);
        reopened.close().await;
    }

    #[tokio::test]
    #[ignore = "needs an empty MySQL database in MYSQL_TEST_URL"]
    async fn test_full_run_mysql() {
        let url = std::env::var("MYSQL_TEST_URL").expect("MYSQL_TEST_URL not set");
        let pool = crate::db::create_pool(&crate::config::DatabaseConfig::from_url(&url))
            .await
            .expect("Failed to connect to MySQL");
        crate::db::migrations::run_migrations(&pool).await.unwrap();

        let summary = run(pool, &RunConfig::default()).await.expect("Run failed");

        assert_eq!(summary.users_created, 3);
        assert_eq!(summary.interaction.post.view_count, 1);
        assert_eq!(summary.raw_sql.inserted, 5);
        assert_eq!(summary.concurrent.comments.len(), 2);
    }

    #[test]
    fn test_step_display() {
        assert_eq!(Step::RawSql.to_string(), "6. raw SQL writes");
        assert_eq!(Step::ConditionalDelete.number(), 8);
    }
}
