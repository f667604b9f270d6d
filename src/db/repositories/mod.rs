//! Database repositories
//!
//! Repository pattern implementations for database access.
//! Each repository owns the SQL for one group of tables, in a SQLite and a
//! MySQL flavour.

pub mod comment;
pub mod interaction;
pub mod post;
pub mod user;

pub use comment::{CommentRepository, SqlxCommentRepository};
pub use interaction::{InteractionRepository, SqlxInteractionRepository};
pub use post::{PostRepository, SqlxPostRepository};
pub use user::{SqlxUserRepository, UserRepository};

#[cfg(test)]
pub(crate) mod test_support {
    use crate::db::{create_test_pool, migrations::run_migrations, DynDatabasePool};
    use crate::models::Post;

    use super::{PostRepository, SqlxPostRepository, SqlxUserRepository, UserRepository};

    pub use crate::services::demo_data::{guide_post, seed_users, GUIDE_SLUG};

    /// Fresh in-memory database with the schema applied
    pub async fn setup_pool() -> DynDatabasePool {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        run_migrations(&pool).await.expect("Failed to run migrations");
        pool
    }

    /// Seed users and the guide post, returning the post
    pub async fn seed_with_guide_post(pool: &DynDatabasePool) -> Post {
        SqlxUserRepository::new(pool.clone())
            .create_many(&seed_users())
            .await
            .expect("Failed to seed users");
        SqlxPostRepository::new(pool.clone())
            .create_with_relations(&guide_post())
            .await
            .expect("Failed to seed post")
            .post
    }
}
