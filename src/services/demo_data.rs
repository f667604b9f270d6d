//! Records written by the demonstration run

use crate::models::{
    ConnectedComment, NewCategory, NewPost, NewTag, NewUser, ProfileInput, ProfileUpsert,
    UpsertUser,
};

/// Slug of the post every later step connects to
pub const GUIDE_SLUG: &str = "aurora-postgresql-performance-guide";

/// Comment left by the interaction transaction
pub const INTERACTION_COMMENT: &str = "Great article, I learned a lot!";

/// Email of the user whose name and profile the concurrent step updates
pub const PROFILE_USER_EMAIL: &str = "charlie@example.com";

/// First name the concurrent step gives that user
pub const PROFILE_USER_FIRST_NAME: &str = "Charlie Updated";

/// Age in days after which an unpublished, unviewed post counts as stale
pub const STALE_POST_DAYS: i64 = 30;

pub fn seed_users() -> Vec<NewUser> {
    vec![
        NewUser::new("alice@example.com", "alice_dev", "Alice", "Johnson"),
        NewUser::new("bob@example.com", "bob_writer", "Bob", "Smith"),
        NewUser::new("charlie@example.com", "charlie_tech", "Charlie", "Brown"),
    ]
}

pub fn guide_post() -> NewPost {
    NewPost {
        title: "Aurora PostgreSQL Performance Guide".to_string(),
        slug: GUIDE_SLUG.to_string(),
        content: Some("A detailed guide to tuning Aurora PostgreSQL for performance...".to_string()),
        excerpt: Some("learn how to optimize Aurora PostgreSQL for better performance".to_string()),
        published: true,
        author_email: "alice@example.com".to_string(),
        tags: vec![
            NewTag::new("PostgreSQL", "postgresql", "#336791"),
            NewTag::new("AWS", "aws", "#ff9900"),
            NewTag::new("Performance", "performance", "#28a745"),
        ],
        categories: vec![
            NewCategory::new("Database", "database", "Articles about databases"),
            NewCategory::new("Cloud", "cloud", "Cloud computing"),
        ],
    }
}

/// Upsert inputs, applied in order: one new user, one existing
pub fn upsert_users() -> Vec<UpsertUser> {
    vec![
        NewUser::new("admin@example.com", "admin", "Admin", "User"),
        NewUser::new("alice@example.com", "alice_updated", "Alice", "Johnson Updated"),
    ]
}

/// Comments written concurrently on the guide post
pub fn concurrent_comments() -> Vec<ConnectedComment> {
    vec![
        ConnectedComment::new("Concurrent comment 1", GUIDE_SLUG, "alice@example.com"),
        ConnectedComment::new("Concurrent comment 2", GUIDE_SLUG, "bob@example.com"),
    ]
}

pub fn profile_upsert() -> ProfileUpsert {
    ProfileUpsert {
        create: ProfileInput {
            bio: Some("Full-stack developer".to_string()),
            website: Some("https://charlie.dev".to_string()),
        },
        update: ProfileInput {
            bio: Some("Senior full-stack developer".to_string()),
            website: Some("https://charlie.dev".to_string()),
        },
    }
}
