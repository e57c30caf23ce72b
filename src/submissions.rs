//! Questionnaire submissions and the demo seed data.

use anyhow::Result;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use crate::auth::hash_password_blocking;
use crate::models::{format_ts, now_ts, Submission};
use crate::users;

pub const SEED_PASSWORD: &str = "password123";

pub const SEED_EMAILS: &[&str] = &[
    "john.doe@example.com",
    "jane.smith@example.com",
    "bob.wilson@example.com",
    "alice.brown@example.com",
    "charlie.johnson@example.com",
];

/// `(questionnaire_title, step, is_complete)`, assigned to seed users round-robin.
pub const SEED_SUBMISSIONS: &[(&str, i64, bool)] = &[
    ("Living Will", 1, false),
    ("Living Will", 2, false),
    ("Living Will", 3, true),
    ("Mirror will", 1, true),
    ("Mirror will", 2, false),
    ("Single Will - Scotland", 1, false),
    ("LPA Health & Welfare - Scotland", 1, true),
    ("LPA Health & Welfare - Scotland", 2, true),
    ("Executor Toolkit Plus", 1, true),
    ("Executor Toolkit", 1, true),
    ("Executor Toolkit", 1, false),
    ("Executor Toolkit Plus", 2, false),
];

fn submission_from_row(row: &SqliteRow) -> Submission {
    Submission {
        id: row.get("id"),
        user_id: row.get("user_id"),
        questionnaire_title: row.get("questionnaire_title"),
        step: row.get("step"),
        is_complete: row.get("is_complete"),
        created_at: format_ts(row.get("created_at")),
        updated_at: format_ts(row.get("updated_at")),
    }
}

pub async fn create(
    pool: &SqlitePool,
    user_id: i64,
    questionnaire_title: &str,
    step: i64,
    is_complete: bool,
) -> Result<i64> {
    let now = now_ts();
    let result = sqlx::query(
        r#"
        INSERT INTO submissions (user_id, questionnaire_title, step, is_complete, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(user_id)
    .bind(questionnaire_title)
    .bind(step)
    .bind(is_complete)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(result.last_insert_rowid())
}

/// The user's submissions, most recently updated first.
pub async fn list_for_user(pool: &SqlitePool, user_id: i64) -> Result<Vec<Submission>> {
    let rows = sqlx::query(
        r#"
        SELECT id, user_id, questionnaire_title, step, is_complete, created_at, updated_at
        FROM submissions
        WHERE user_id = ?
        ORDER BY updated_at DESC, id DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(submission_from_row).collect())
}

/// One submission, only if it belongs to `user_id`.
pub async fn get_for_user(pool: &SqlitePool, user_id: i64, id: i64) -> Result<Option<Submission>> {
    let row = sqlx::query(
        r#"
        SELECT id, user_id, questionnaire_title, step, is_complete, created_at, updated_at
        FROM submissions
        WHERE id = ? AND user_id = ?
        "#,
    )
    .bind(id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.as_ref().map(submission_from_row))
}

#[derive(Debug, PartialEq, Eq)]
pub enum SeedOutcome {
    Seeded { users: usize, submissions: usize },
    /// Users already exist and `force` was not set.
    Skipped { existing_users: i64 },
}

/// Create the demo users and their submissions.
///
/// Without `force`, an existing user table is left alone. With it, every
/// user (and by cascade every submission) is deleted first.
pub async fn seed(pool: &SqlitePool, force: bool) -> Result<SeedOutcome> {
    let existing_users = users::count_users(pool).await?;
    if existing_users > 0 && !force {
        return Ok(SeedOutcome::Skipped { existing_users });
    }
    if force {
        let removed = users::delete_all(pool).await?;
        tracing::info!(removed, "cleared existing users and submissions");
    }

    let mut user_ids = Vec::with_capacity(SEED_EMAILS.len());
    for email in SEED_EMAILS {
        let hash = hash_password_blocking(SEED_PASSWORD.to_string()).await?;
        if let Some(user) = users::create_user(pool, email, &hash).await? {
            user_ids.push(user.id);
        }
    }
    if user_ids.is_empty() {
        anyhow::bail!("no seed users could be created");
    }

    for (i, (title, step, is_complete)) in SEED_SUBMISSIONS.iter().enumerate() {
        create(pool, user_ids[i % user_ids.len()], title, *step, *is_complete).await?;
    }

    tracing::info!(
        users = user_ids.len(),
        submissions = SEED_SUBMISSIONS.len(),
        "seed data created"
    );
    Ok(SeedOutcome::Seeded {
        users: user_ids.len(),
        submissions: SEED_SUBMISSIONS.len(),
    })
}
