//! Database layer
//!
//! Connection pooling, schema migrations and repositories for the blog
//! schema. Two drivers are supported:
//! - SQLite (default, also used by the test suite)
//! - MySQL
//!
//! The driver is selected from configuration, usually inferred from the
//! scheme of `DATABASE_URL`.
//!
//! # Usage
//!
//! ```ignore
//! use blogwrites::config::DatabaseConfig;
//! use blogwrites::db::{create_pool, migrations};
//!
//! let config = DatabaseConfig::from_url("data/blog.db");
//! let pool = create_pool(&config).await?;
//! migrations::run_migrations(&pool).await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, redact_url, Backend, DatabasePool, DynDatabasePool,
    MysqlDatabase, SqliteDatabase,
};
