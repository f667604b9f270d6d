//! Post, tag and category models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::User;

/// Post entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub title: String,
    /// URL slug (unique)
    pub slug: String,
    pub content: Option<String>,
    pub excerpt: Option<String>,
    pub published: bool,
    pub published_at: Option<DateTime<Utc>>,
    pub view_count: i64,
    pub author_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Tag entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub color: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Category entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for a tag created together with a post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTag {
    pub name: String,
    pub slug: String,
    pub color: Option<String>,
}

impl NewTag {
    pub fn new(name: &str, slug: &str, color: &str) -> Self {
        Self {
            name: name.to_string(),
            slug: slug.to_string(),
            color: Some(color.to_string()),
        }
    }
}

/// Input for a category created together with a post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCategory {
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
}

impl NewCategory {
    pub fn new(name: &str, slug: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            slug: slug.to_string(),
            description: Some(description.to_string()),
        }
    }
}

/// Input for the nested post create.
///
/// The author is connected by email; tags and categories are created and
/// linked in the same transaction as the post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPost {
    pub title: String,
    pub slug: String,
    pub content: Option<String>,
    pub excerpt: Option<String>,
    pub published: bool,
    pub author_email: String,
    #[serde(default)]
    pub tags: Vec<NewTag>,
    #[serde(default)]
    pub categories: Vec<NewCategory>,
}

/// A post with its author, tags and categories loaded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostWithRelations {
    #[serde(flatten)]
    pub post: Post,
    pub author: User,
    pub tags: Vec<Tag>,
    pub categories: Vec<Category>,
}

/// Filter for the conditional bulk delete.
///
/// All three conditions must hold for a post to be removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StalePostFilter {
    pub published: bool,
    pub created_before: DateTime<Utc>,
    pub view_count: i64,
}

impl StalePostFilter {
    /// Unpublished posts older than `days` that were never viewed
    pub fn unpublished_older_than(days: i64, now: DateTime<Utc>) -> Self {
        Self {
            published: false,
            created_before: now - chrono::Duration::days(days),
            view_count: 0,
        }
    }
}

/// Affected-row counts of the raw SQL step
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RawWriteCounts {
    pub inserted: u64,
    pub updated: u64,
}

/// Row counts of the bulk conditional update step
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BulkUpdateCounts {
    pub activated_users: u64,
    pub published_posts: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_filter_cutoff() {
        let now = Utc::now();
        let filter = StalePostFilter::unpublished_older_than(30, now);

        assert!(!filter.published);
        assert_eq!(filter.view_count, 0);
        assert_eq!(now - filter.created_before, chrono::Duration::days(30));
    }

    #[test]
    fn test_post_with_relations_flattens_post() {
        let now = Utc::now();
        let author = User {
            id: 7,
            email: "alice@example.com".to_string(),
            username: "alice_dev".to_string(),
            first_name: None,
            last_name: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        let value = serde_json::to_value(PostWithRelations {
            post: Post {
                id: 1,
                title: "T".to_string(),
                slug: "t".to_string(),
                content: None,
                excerpt: None,
                published: true,
                published_at: Some(now),
                view_count: 0,
                author_id: 7,
                created_at: now,
                updated_at: now,
            },
            author,
            tags: vec![],
            categories: vec![],
        })
        .unwrap();

        assert_eq!(value["slug"], "t");
        assert_eq!(value["author"]["username"], "alice_dev");
        assert!(value["tags"].as_array().unwrap().is_empty());
    }
}
