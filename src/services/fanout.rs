//! Concurrent independent writes
//!
//! Spawns each write as its own task over the shared pool and waits for all
//! of them. The writes are independent: there is no transaction spanning
//! them, so when one fails the others that succeeded stay applied. The first
//! failure in declaration order is reported.

use futures::future::join_all;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::db::repositories::{
    CommentRepository, SqlxCommentRepository, SqlxUserRepository, UserRepository,
};
use crate::db::DynDatabasePool;
use crate::error::{WriteError, WriteResult};
use crate::models::{Comment, ConnectedComment, ProfileUpsert, User};

/// Update of a user's first name together with their profile
#[derive(Debug, Clone)]
pub struct ProfileUpdate {
    pub email: String,
    pub first_name: String,
    pub profile: ProfileUpsert,
}

/// Results of the concurrent step, in declaration order
#[derive(Debug, Clone, serde::Serialize)]
pub struct ConcurrentWrites {
    pub comments: Vec<Comment>,
    pub user: User,
}

enum Written {
    Comment(Comment),
    User(User),
}

/// Runs independent writes concurrently
pub struct FanoutService {
    users: Arc<dyn UserRepository>,
    comments: Arc<dyn CommentRepository>,
}

impl FanoutService {
    pub fn new(users: Arc<dyn UserRepository>, comments: Arc<dyn CommentRepository>) -> Self {
        Self { users, comments }
    }

    pub fn from_pool(pool: &DynDatabasePool) -> Self {
        Self::new(
            SqlxUserRepository::boxed(pool.clone()),
            SqlxCommentRepository::boxed(pool.clone()),
        )
    }

    /// Create every comment and apply the profile update concurrently.
    ///
    /// All tasks are awaited before returning, even after a failure.
    pub async fn run(
        &self,
        comments: Vec<ConnectedComment>,
        update: ProfileUpdate,
    ) -> WriteResult<ConcurrentWrites> {
        let mut handles: Vec<JoinHandle<WriteResult<Written>>> = Vec::with_capacity(comments.len() + 1);

        for input in comments {
            let repo = Arc::clone(&self.comments);
            handles.push(tokio::spawn(async move {
                repo.create_connected(&input).await.map(Written::Comment)
            }));
        }

        let repo = Arc::clone(&self.users);
        handles.push(tokio::spawn(async move {
            repo.update_with_profile(&update.email, &update.first_name, &update.profile)
                .await
                .map(Written::User)
        }));

        let total = handles.len();
        let mut created = Vec::new();
        let mut user = None;
        let mut first_error = None;

        for joined in join_all(handles).await {
            let outcome = joined.map_err(WriteError::from).and_then(|result| result);
            match outcome {
                Ok(Written::Comment(comment)) => created.push(comment),
                Ok(Written::User(updated)) => user = Some(updated),
                Err(e) => {
                    tracing::error!("Concurrent write failed: {}", e);
                    first_error.get_or_insert(e);
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }

        let user = user.ok_or_else(|| anyhow::anyhow!("Profile update produced no user"))?;
        tracing::info!("Concurrent writes completed: {}", total);
        Ok(ConcurrentWrites {
            comments: created,
            user,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DatabaseConfig, DatabaseDriver};
    use crate::db::repositories::test_support::{seed_with_guide_post, GUIDE_SLUG};
    use crate::db::{create_pool, migrations::run_migrations};
    use crate::services::demo_data::{
        concurrent_comments, profile_upsert, PROFILE_USER_EMAIL, PROFILE_USER_FIRST_NAME,
    };
    use tempfile::TempDir;

    async fn file_pool(dir: &TempDir, name: &str) -> DynDatabasePool {
        let config = DatabaseConfig {
            driver: DatabaseDriver::Sqlite,
            url: dir.path().join(name).to_string_lossy().into_owned(),
        };
        let pool = create_pool(&config).await.expect("Failed to create pool");
        run_migrations(&pool).await.expect("Failed to run migrations");
        pool
    }

    fn charlie_update() -> ProfileUpdate {
        ProfileUpdate {
            email: PROFILE_USER_EMAIL.to_string(),
            first_name: PROFILE_USER_FIRST_NAME.to_string(),
            profile: profile_upsert(),
        }
    }

    /// (comment content, author email) pairs plus charlie's name and bio
    async fn snapshot(pool: &DynDatabasePool) -> (Vec<(String, String)>, Option<String>, Option<String>) {
        let sqlite = pool.as_sqlite().unwrap();
        let comments: Vec<(String, String)> = sqlx::query_as(
            "SELECT c.content, u.email FROM comments c JOIN users u ON u.id = c.author_id ORDER BY c.content",
        )
        .fetch_all(sqlite)
        .await
        .unwrap();
        let (first_name,): (Option<String>,) =
            sqlx::query_as("SELECT first_name FROM users WHERE email = ?")
                .bind(PROFILE_USER_EMAIL)
                .fetch_one(sqlite)
                .await
                .unwrap();
        let bio: Option<(Option<String>,)> = sqlx::query_as(
            "SELECT p.bio FROM profiles p JOIN users u ON u.id = p.user_id WHERE u.email = ?",
        )
        .bind(PROFILE_USER_EMAIL)
        .fetch_optional(sqlite)
        .await
        .unwrap();
        (comments, first_name, bio.and_then(|(b,)| b))
    }

    #[tokio::test]
    async fn test_fanout_matches_sequential_execution() {
        let dir = TempDir::new().unwrap();
        let concurrent_pool = file_pool(&dir, "concurrent.db").await;
        let sequential_pool = file_pool(&dir, "sequential.db").await;
        seed_with_guide_post(&concurrent_pool).await;
        seed_with_guide_post(&sequential_pool).await;

        let written = FanoutService::from_pool(&concurrent_pool)
            .run(concurrent_comments(), charlie_update())
            .await
            .expect("Concurrent writes failed");
        assert_eq!(written.comments.len(), 2);
        assert_eq!(written.user.first_name.as_deref(), Some("Charlie Updated"));

        let comments = SqlxCommentRepository::new(sequential_pool.clone());
        for input in concurrent_comments() {
            comments.create_connected(&input).await.unwrap();
        }
        let update = charlie_update();
        SqlxUserRepository::new(sequential_pool.clone())
            .update_with_profile(&update.email, &update.first_name, &update.profile)
            .await
            .unwrap();

        let concurrent = snapshot(&concurrent_pool).await;
        assert_eq!(concurrent, snapshot(&sequential_pool).await);
        assert_eq!(concurrent.2.as_deref(), Some("Full-stack developer"));

        concurrent_pool.close().await;
        sequential_pool.close().await;
    }

    #[tokio::test]
    async fn test_second_run_updates_existing_profile() {
        let dir = TempDir::new().unwrap();
        let pool = file_pool(&dir, "twice.db").await;
        seed_with_guide_post(&pool).await;
        let service = FanoutService::from_pool(&pool);

        service.run(concurrent_comments(), charlie_update()).await.unwrap();
        service.run(concurrent_comments(), charlie_update()).await.unwrap();

        let (comments, _, bio) = snapshot(&pool).await;
        assert_eq!(comments.len(), 4);
        assert_eq!(bio.as_deref(), Some("Senior full-stack developer"));
        pool.close().await;
    }

    #[tokio::test]
    async fn test_failure_keeps_successful_siblings() {
        let dir = TempDir::new().unwrap();
        let pool = file_pool(&dir, "partial.db").await;
        seed_with_guide_post(&pool).await;

        let inputs = vec![
            ConnectedComment::new("kept", GUIDE_SLUG, "alice@example.com"),
            ConnectedComment::new("lost", GUIDE_SLUG, "ghost@example.com"),
        ];
        let err = FanoutService::from_pool(&pool)
            .run(inputs, charlie_update())
            .await
            .unwrap_err();

        assert!(err.is_precondition());
        let (comments, first_name, _) = snapshot(&pool).await;
        assert_eq!(comments, vec![("kept".to_string(), "alice@example.com".to_string())]);
        assert_eq!(first_name.as_deref(), Some("Charlie Updated"));
        pool.close().await;
    }

    #[tokio::test]
    async fn test_first_error_in_declaration_order_wins() {
        let dir = TempDir::new().unwrap();
        let pool = file_pool(&dir, "order.db").await;
        seed_with_guide_post(&pool).await;

        let inputs = vec![ConnectedComment::new("x", "missing-post", "alice@example.com")];
        let update = ProfileUpdate {
            email: "ghost@example.com".to_string(),
            ..charlie_update()
        };
        let err = FanoutService::from_pool(&pool).run(inputs, update).await.unwrap_err();

        assert!(err.to_string().contains("missing-post"));
        pool.close().await;
    }
}
