//! Data models
//!
//! Rows of the blog schema (User, Profile, Post, Tag, Category, Comment, Like),
//! the inputs the write operations take and the composite results they
//! return.

mod comment;
mod post;
mod user;

pub use comment::{Comment, ConnectedComment, Interaction, Like};
pub use post::{
    BulkUpdateCounts, Category, NewCategory, NewPost, NewTag, Post, PostWithRelations,
    RawWriteCounts, StalePostFilter, Tag,
};
pub use user::{NewUser, Profile, ProfileInput, ProfileUpsert, UpsertUser, User};
