//! `users` table access.

use anyhow::Result;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use crate::models::{format_ts, now_ts, User};

/// A user row together with its stored bcrypt hash.
#[derive(Debug, Clone)]
pub struct StoredUser {
    pub user: User,
    pub password_hash: String,
}

fn user_from_row(row: &SqliteRow) -> User {
    User {
        id: row.get("id"),
        email: row.get("email"),
        is_active: row.get("is_active"),
        created_at: format_ts(row.get("created_at")),
    }
}

/// Insert a user. Returns `None` when the email is already registered.
pub async fn create_user(
    pool: &SqlitePool,
    email: &str,
    password_hash: &str,
) -> Result<Option<User>> {
    let now = now_ts();
    let result = sqlx::query(
        "INSERT INTO users (email, password_hash, is_active, created_at) VALUES (?, ?, 1, ?)",
    )
    .bind(email)
    .bind(password_hash)
    .bind(now)
    .execute(pool)
    .await;

    match result {
        Ok(done) => Ok(Some(User {
            id: done.last_insert_rowid(),
            email: email.to_string(),
            is_active: true,
            created_at: format_ts(now),
        })),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub async fn find_by_email(pool: &SqlitePool, email: &str) -> Result<Option<StoredUser>> {
    let row = sqlx::query(
        "SELECT id, email, password_hash, is_active, created_at FROM users WHERE email = ?",
    )
    .bind(email)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| StoredUser {
        user: user_from_row(&row),
        password_hash: row.get("password_hash"),
    }))
}

pub async fn set_active(pool: &SqlitePool, user_id: i64, active: bool) -> Result<bool> {
    let result = sqlx::query("UPDATE users SET is_active = ? WHERE id = ?")
        .bind(active)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn count_users(pool: &SqlitePool) -> Result<i64> {
    Ok(sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await?)
}

/// Remove every user; their submissions go with them.
pub async fn delete_all(pool: &SqlitePool) -> Result<u64> {
    let result = sqlx::query("DELETE FROM users").execute(pool).await?;
    Ok(result.rows_affected())
}
