//! User repository
//!
//! Database operations for users and their profiles.
//!
//! This module provides:
//! - `UserRepository` trait defining the interface for user data access
//! - `SqlxUserRepository` implementing the trait for SQLite and MySQL

use crate::db::{Backend, DynDatabasePool};
use crate::error::{WriteError, WriteResult};
use crate::models::{NewUser, Profile, ProfileUpsert, UpsertUser, User};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySql, MySqlPool, QueryBuilder, Row, Sqlite, SqlitePool};
use std::sync::Arc;

const USER_COLUMNS: &str =
    "id, email, username, first_name, last_name, is_active, created_at, updated_at";

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert users in one statement, skipping rows that collide on a
    /// unique key. Returns the number of rows actually inserted.
    async fn create_many(&self, users: &[NewUser]) -> WriteResult<u64>;

    /// Get user by ID
    async fn get_by_id(&self, id: i64) -> WriteResult<Option<User>>;

    /// Get user by email
    async fn get_by_email(&self, email: &str) -> WriteResult<Option<User>>;

    /// Mark every user created at or after `since` as active
    async fn activate_created_since(&self, since: DateTime<Utc>) -> WriteResult<u64>;

    /// Insert a user, or update username and names of the user with the
    /// same email
    async fn upsert_by_email(&self, input: &UpsertUser) -> WriteResult<User>;

    /// Change a user's first name and upsert their profile atomically.
    ///
    /// Fails with `PreconditionNotMet` when no user has `email`.
    async fn update_with_profile(
        &self,
        email: &str,
        first_name: &str,
        profile: &ProfileUpsert,
    ) -> WriteResult<User>;

    /// Get the profile of a user
    async fn get_profile(&self, user_id: i64) -> WriteResult<Option<Profile>>;

    /// Count total users
    async fn count(&self) -> WriteResult<i64>;
}

/// SQLx-based user repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    /// Create a new SQLx user repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create_many(&self, users: &[NewUser]) -> WriteResult<u64> {
        if users.is_empty() {
            return Ok(0);
        }
        let inserted = match self.pool.backend() {
            Backend::Sqlite(pool) => create_many_sqlite(pool, users).await?,
            Backend::Mysql(pool) => create_many_mysql(pool, users).await?,
        };
        Ok(inserted)
    }

    async fn get_by_id(&self, id: i64) -> WriteResult<Option<User>> {
        let user = match self.pool.backend() {
            Backend::Sqlite(pool) => get_user_by_id_sqlite(pool, id).await?,
            Backend::Mysql(pool) => get_user_by_id_mysql(pool, id).await?,
        };
        Ok(user)
    }

    async fn get_by_email(&self, email: &str) -> WriteResult<Option<User>> {
        let user = match self.pool.backend() {
            Backend::Sqlite(pool) => get_user_by_email_sqlite(pool, email).await?,
            Backend::Mysql(pool) => get_user_by_email_mysql(pool, email).await?,
        };
        Ok(user)
    }

    async fn activate_created_since(&self, since: DateTime<Utc>) -> WriteResult<u64> {
        let sql = "UPDATE users SET is_active = ?, updated_at = ? WHERE created_at >= ?";
        let now = Utc::now();
        let affected = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(true)
                .bind(now)
                .bind(since)
                .execute(pool)
                .await
                .context("Failed to activate recent users")?
                .rows_affected(),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(true)
                .bind(now)
                .bind(since)
                .execute(pool)
                .await
                .context("Failed to activate recent users")?
                .rows_affected(),
        };
        Ok(affected)
    }

    async fn upsert_by_email(&self, input: &UpsertUser) -> WriteResult<User> {
        let user = match self.pool.backend() {
            Backend::Sqlite(pool) => upsert_user_sqlite(pool, input).await?,
            Backend::Mysql(pool) => upsert_user_mysql(pool, input).await?,
        };
        Ok(user)
    }

    async fn update_with_profile(
        &self,
        email: &str,
        first_name: &str,
        profile: &ProfileUpsert,
    ) -> WriteResult<User> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => update_with_profile_sqlite(pool, email, first_name, profile).await,
            Backend::Mysql(pool) => update_with_profile_mysql(pool, email, first_name, profile).await,
        }
    }

    async fn get_profile(&self, user_id: i64) -> WriteResult<Option<Profile>> {
        let sql = "SELECT id, user_id, bio, website, created_at, updated_at FROM profiles WHERE user_id = ?";
        let profile = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(user_id)
                .fetch_optional(pool)
                .await
                .context("Failed to get profile")?
                .map(|row| row_to_profile_sqlite(&row))
                .transpose()?,
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(user_id)
                .fetch_optional(pool)
                .await
                .context("Failed to get profile")?
                .map(|row| row_to_profile_mysql(&row))
                .transpose()?,
        };
        Ok(profile)
    }

    async fn count(&self) -> WriteResult<i64> {
        let sql = "SELECT COUNT(*) as count FROM users";
        let count = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .fetch_one(pool)
                .await
                .context("Failed to count users")?
                .try_get("count")
                .context("Failed to read user count")?,
            Backend::Mysql(pool) => sqlx::query(sql)
                .fetch_one(pool)
                .await
                .context("Failed to count users")?
                .try_get("count")
                .context("Failed to read user count")?,
        };
        Ok(count)
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_many_sqlite(pool: &SqlitePool, users: &[NewUser]) -> Result<u64> {
    let now = Utc::now();
    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
        "INSERT INTO users (email, username, first_name, last_name, is_active, created_at, updated_at) ",
    );
    builder.push_values(users, |mut row, user| {
        row.push_bind(user.email.clone())
            .push_bind(user.username.clone())
            .push_bind(user.first_name.clone())
            .push_bind(user.last_name.clone())
            .push_bind(false)
            .push_bind(now)
            .push_bind(now);
    });
    builder.push(" ON CONFLICT DO NOTHING");

    let result = builder
        .build()
        .execute(pool)
        .await
        .context("Failed to create users")?;

    Ok(result.rows_affected())
}

pub(crate) async fn get_user_by_id_sqlite<'e, E>(executor: E, id: i64) -> Result<Option<User>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
        .bind(id)
        .fetch_optional(executor)
        .await
        .context("Failed to get user by ID")?;

    row.map(|row| row_to_user_sqlite(&row)).transpose()
}

pub(crate) async fn get_user_by_email_sqlite<'e, E>(executor: E, email: &str) -> Result<Option<User>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(&format!("SELECT {} FROM users WHERE email = ?", USER_COLUMNS))
        .bind(email)
        .fetch_optional(executor)
        .await
        .context("Failed to get user by email")?;

    row.map(|row| row_to_user_sqlite(&row)).transpose()
}

async fn upsert_user_sqlite(pool: &SqlitePool, input: &UpsertUser) -> Result<User> {
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO users (email, username, first_name, last_name, is_active, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(email) DO UPDATE SET
            username = excluded.username,
            first_name = excluded.first_name,
            last_name = excluded.last_name,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&input.email)
    .bind(&input.username)
    .bind(&input.first_name)
    .bind(&input.last_name)
    .bind(false)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .with_context(|| format!("Failed to upsert user {}", input.email))?;

    get_user_by_email_sqlite(pool, &input.email)
        .await?
        .ok_or_else(|| anyhow::anyhow!("User not found after upsert: {}", input.email))
}

async fn update_with_profile_sqlite(
    pool: &SqlitePool,
    email: &str,
    first_name: &str,
    profile: &ProfileUpsert,
) -> WriteResult<User> {
    let now = Utc::now();
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    // Write first so the transaction holds the write lock before it reads.
    let updated = sqlx::query("UPDATE users SET first_name = ?, updated_at = ? WHERE email = ?")
        .bind(first_name)
        .bind(now)
        .bind(email)
        .execute(&mut *tx)
        .await
        .context("Failed to update user")?;
    if updated.rows_affected() == 0 {
        return Err(WriteError::precondition(format!("User not found: {}", email)));
    }

    let user = get_user_by_email_sqlite(&mut *tx, email)
        .await?
        .ok_or_else(|| WriteError::precondition(format!("User not found: {}", email)))?;

    sqlx::query(
        r#"
        INSERT INTO profiles (user_id, bio, website, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(user_id) DO UPDATE SET
            bio = ?,
            website = ?,
            updated_at = ?
        "#,
    )
    .bind(user.id)
    .bind(&profile.create.bio)
    .bind(&profile.create.website)
    .bind(now)
    .bind(now)
    .bind(&profile.update.bio)
    .bind(&profile.update.website)
    .bind(now)
    .execute(&mut *tx)
    .await
    .context("Failed to upsert profile")?;

    tx.commit().await.context("Failed to commit user update")?;
    Ok(user)
}

fn row_to_user_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        username: row.try_get("username")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_profile_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Profile> {
    Ok(Profile {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        bio: row.try_get("bio")?,
        website: row.try_get("website")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_many_mysql(pool: &MySqlPool, users: &[NewUser]) -> Result<u64> {
    let now = Utc::now();
    let mut builder: QueryBuilder<MySql> = QueryBuilder::new(
        "INSERT IGNORE INTO users (email, username, first_name, last_name, is_active, created_at, updated_at) ",
    );
    builder.push_values(users, |mut row, user| {
        row.push_bind(user.email.clone())
            .push_bind(user.username.clone())
            .push_bind(user.first_name.clone())
            .push_bind(user.last_name.clone())
            .push_bind(false)
            .push_bind(now)
            .push_bind(now);
    });

    let result = builder
        .build()
        .execute(pool)
        .await
        .context("Failed to create users")?;

    Ok(result.rows_affected())
}

pub(crate) async fn get_user_by_id_mysql<'e, E>(executor: E, id: i64) -> Result<Option<User>>
where
    E: sqlx::Executor<'e, Database = MySql>,
{
    let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
        .bind(id)
        .fetch_optional(executor)
        .await
        .context("Failed to get user by ID")?;

    row.map(|row| row_to_user_mysql(&row)).transpose()
}

pub(crate) async fn get_user_by_email_mysql<'e, E>(executor: E, email: &str) -> Result<Option<User>>
where
    E: sqlx::Executor<'e, Database = MySql>,
{
    let row = sqlx::query(&format!("SELECT {} FROM users WHERE email = ?", USER_COLUMNS))
        .bind(email)
        .fetch_optional(executor)
        .await
        .context("Failed to get user by email")?;

    row.map(|row| row_to_user_mysql(&row)).transpose()
}

async fn upsert_user_mysql(pool: &MySqlPool, input: &UpsertUser) -> Result<User> {
    let now = Utc::now();
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    // ON DUPLICATE KEY UPDATE would also fire on the username key, so the
    // email match is resolved explicitly under a row lock.
    let existing: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE email = ? FOR UPDATE")
        .bind(&input.email)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to get user by email")?;

    match existing {
        Some(id) => {
            sqlx::query(
                "UPDATE users SET username = ?, first_name = ?, last_name = ?, updated_at = ? WHERE id = ?",
            )
            .bind(&input.username)
            .bind(&input.first_name)
            .bind(&input.last_name)
            .bind(now)
            .bind(id)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to upsert user {}", input.email))?;
        }
        None => {
            sqlx::query(
                r#"
                INSERT INTO users (email, username, first_name, last_name, is_active, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&input.email)
            .bind(&input.username)
            .bind(&input.first_name)
            .bind(&input.last_name)
            .bind(false)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to upsert user {}", input.email))?;
        }
    }

    let user = get_user_by_email_mysql(&mut *tx, &input.email)
        .await?
        .ok_or_else(|| anyhow::anyhow!("User not found after upsert: {}", input.email))?;

    tx.commit().await.context("Failed to commit user upsert")?;
    Ok(user)
}

async fn update_with_profile_mysql(
    pool: &MySqlPool,
    email: &str,
    first_name: &str,
    profile: &ProfileUpsert,
) -> WriteResult<User> {
    let now = Utc::now();
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    // Locks the user row for the rest of the transaction.
    let user = sqlx::query(&format!("SELECT {} FROM users WHERE email = ? FOR UPDATE", USER_COLUMNS))
        .bind(email)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to get user by email")?
        .map(|row| row_to_user_mysql(&row))
        .transpose()?
        .ok_or_else(|| WriteError::precondition(format!("User not found: {}", email)))?;

    sqlx::query("UPDATE users SET first_name = ?, updated_at = ? WHERE id = ?")
        .bind(first_name)
        .bind(now)
        .bind(user.id)
        .execute(&mut *tx)
        .await
        .context("Failed to update user")?;

    sqlx::query(
        r#"
        INSERT INTO profiles (user_id, bio, website, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
        ON DUPLICATE KEY UPDATE
            bio = ?,
            website = ?,
            updated_at = ?
        "#,
    )
    .bind(user.id)
    .bind(&profile.create.bio)
    .bind(&profile.create.website)
    .bind(now)
    .bind(now)
    .bind(&profile.update.bio)
    .bind(&profile.update.website)
    .bind(now)
    .execute(&mut *tx)
    .await
    .context("Failed to upsert profile")?;

    let user = get_user_by_id_mysql(&mut *tx, user.id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("User not found after update: {}", email))?;

    tx.commit().await.context("Failed to commit user update")?;
    Ok(user)
}

fn row_to_user_mysql(row: &sqlx::mysql::MySqlRow) -> Result<User> {
    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        username: row.try_get("username")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_profile_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Profile> {
    Ok(Profile {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        bio: row.try_get("bio")?,
        website: row.try_get("website")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
