//! Comment and like models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Post;

/// Comment entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub content: String,
    pub post_id: i64,
    pub author_id: i64,
    pub created_at: DateTime<Utc>,
}

/// Like entity, unique per (user, post)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Like {
    pub id: i64,
    pub user_id: i64,
    pub post_id: i64,
    pub created_at: DateTime<Utc>,
}

/// Input for a comment whose post and author are connected by natural keys
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectedComment {
    pub content: String,
    pub post_slug: String,
    pub author_email: String,
}

impl ConnectedComment {
    pub fn new(content: &str, post_slug: &str, author_email: &str) -> Self {
        Self {
            content: content.to_string(),
            post_slug: post_slug.to_string(),
            author_email: author_email.to_string(),
        }
    }
}

/// Everything written by one user interaction unit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Interaction {
    pub comment: Comment,
    pub like: Like,
    /// The post as read back after its view counter was incremented
    pub post: Post,
}
