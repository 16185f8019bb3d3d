//! SQLite-backed user and profile repositories.

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};

use super::{ProfileRepository, StoreError, UserRepository};
use crate::models::{RecommendationProfile, Session, User};

/// Execute a migration file statement by statement, skipping comment lines.
async fn execute_sql(pool: &SqlitePool, sql: &str) -> Result<(), StoreError> {
    for statement in sql.split(';') {
        let cleaned: String = statement
            .lines()
            .filter(|line| !line.trim().starts_with("--"))
            .collect::<Vec<_>>()
            .join("\n");
        let trimmed = cleaned.trim();
        if !trimmed.is_empty() {
            sqlx::query(trimmed).execute(pool).await?;
        }
    }
    Ok(())
}

async fn run_migrations(pool: &SqlitePool) -> Result<(), StoreError> {
    execute_sql(pool, include_str!("../../migrations/001_users.sql")).await?;
    execute_sql(
        pool,
        include_str!("../../migrations/002_recommendation_profiles.sql"),
    )
    .await?;
    Ok(())
}

/// Opens the database at `database_url`, creating it if needed, and brings the
/// schema up to date.
///
/// An in-memory database lives as long as its single connection, so the pool
/// keeps exactly one open for its whole lifetime.
pub async fn connect(database_url: &str) -> Result<SqlitePool, StoreError> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = if database_url.contains(":memory:") {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?
    } else {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&pool)
            .await?;
        pool
    };

    run_migrations(&pool).await?;
    tracing::info!("database ready");
    Ok(pool)
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[derive(FromRow)]
struct UserRow {
    id: String,
    display_name: String,
    country: String,
    plan: String,
    email: String,
    session: String,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, StoreError> {
        Ok(User {
            id: row.id,
            display_name: row.display_name,
            country: row.country,
            plan: row.plan,
            email: row.email,
            session: serde_json::from_str(&row.session)?,
        })
    }
}

/// The `users` table.
#[derive(Clone)]
pub struct SqliteUserRepository {
    pool: SqlitePool,
}

impl SqliteUserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for SqliteUserRepository {
    async fn find(&self, id: &str) -> Result<Option<User>, StoreError> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, display_name, country, plan, email, session FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(User::try_from).transpose()
    }

    async fn insert(&self, user: User) -> Result<(), StoreError> {
        let session = serde_json::to_string(&user.session)?;
        sqlx::query(
            "INSERT INTO users (id, display_name, country, plan, email, session) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&user.id)
        .bind(&user.display_name)
        .bind(&user.country)
        .bind(&user.plan)
        .bind(&user.email)
        .bind(&session)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Duplicate(user.id.clone())
            } else {
                e.into()
            }
        })?;
        Ok(())
    }

    async fn update_session(&self, id: &str, session: Session) -> Result<(), StoreError> {
        let blob = serde_json::to_string(&session)?;
        let result = sqlx::query(
            "UPDATE users SET session = ?, updated_at = datetime('now') WHERE id = ?",
        )
        .bind(&blob)
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }
}

/// The append-only `recommendation_profiles` table. Each record is stored as
/// JSON next to the columns it is looked up by.
#[derive(Clone)]
pub struct SqliteProfileRepository {
    pool: SqlitePool,
}

impl SqliteProfileRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProfileRepository for SqliteProfileRepository {
    async fn insert(&self, profile: RecommendationProfile) -> Result<(), StoreError> {
        let blob = serde_json::to_string(&profile)?;
        sqlx::query(
            "INSERT INTO recommendation_profiles (id, creator_id, snapshot_id, created_at, profile) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(profile.id.to_string())
        .bind(&profile.creator_id)
        .bind(&profile.snapshot_id)
        .bind(profile.created_at.to_rfc3339())
        .bind(&blob)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Duplicate(profile.id.to_string())
            } else {
                e.into()
            }
        })?;
        Ok(())
    }

    async fn list_for_creator(
        &self,
        creator_id: &str,
    ) -> Result<Vec<RecommendationProfile>, StoreError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT profile FROM recommendation_profiles WHERE creator_id = ? ORDER BY rowid",
        )
        .bind(creator_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|(blob,)| serde_json::from_str(&blob).map_err(StoreError::from))
            .collect()
    }
}
