//! Conversation and message persistence.
//!
//! Messages are immutable and always read in `(created_at, id)` order.
//! Deleting a conversation deletes its messages through the foreign key
//! cascade.

use anyhow::Result;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use ragchat_core::compose::DEFAULT_TITLE;
use ragchat_core::models::{HistoryMessage, Role};

use crate::models::{format_ts, now_ts, Conversation, Message};

pub const DEFAULT_LIST_LIMIT: i64 = 20;
pub const MAX_LIST_LIMIT: i64 = 100;

fn conversation_from_row(row: &SqliteRow) -> Conversation {
    Conversation {
        id: row.get("id"),
        title: row.get("title"),
        created_at: format_ts(row.get("created_at")),
        updated_at: format_ts(row.get("updated_at")),
        message_count: row.get("message_count"),
    }
}

/// Create a conversation; a missing or blank title becomes `"New Conversation"`.
pub async fn create(pool: &SqlitePool, title: Option<&str>) -> Result<Conversation> {
    let title = title
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(DEFAULT_TITLE);
    let now = now_ts();

    let result = sqlx::query(
        "INSERT INTO conversations (title, created_at, updated_at) VALUES (?, ?, ?)",
    )
    .bind(title)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(Conversation {
        id: result.last_insert_rowid(),
        title: title.to_string(),
        created_at: format_ts(now),
        updated_at: format_ts(now),
        message_count: 0,
    })
}

pub async fn get(pool: &SqlitePool, id: i64) -> Result<Option<Conversation>> {
    let row = sqlx::query(
        r#"
        SELECT c.id, c.title, c.created_at, c.updated_at,
               (SELECT COUNT(*) FROM messages m WHERE m.conversation_id = c.id) AS message_count
        FROM conversations c
        WHERE c.id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.as_ref().map(conversation_from_row))
}

pub async fn exists(pool: &SqlitePool, id: i64) -> Result<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT id FROM conversations WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(found.is_some())
}

/// Page of conversations, most recently updated first, plus the total count.
pub async fn list(pool: &SqlitePool, skip: i64, limit: i64) -> Result<(Vec<Conversation>, i64)> {
    let skip = skip.max(0);
    let limit = limit.clamp(1, MAX_LIST_LIMIT);

    let rows = sqlx::query(
        r#"
        SELECT c.id, c.title, c.created_at, c.updated_at,
               (SELECT COUNT(*) FROM messages m WHERE m.conversation_id = c.id) AS message_count
        FROM conversations c
        ORDER BY c.updated_at DESC, c.id DESC
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(limit)
    .bind(skip)
    .fetch_all(pool)
    .await?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM conversations")
        .fetch_one(pool)
        .await?;

    Ok((rows.iter().map(conversation_from_row).collect(), total))
}

/// Delete a conversation and its messages. Returns `false` if it did not exist.
pub async fn delete(pool: &SqlitePool, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM conversations WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn messages(pool: &SqlitePool, conversation_id: i64) -> Result<Vec<Message>> {
    let rows = sqlx::query(
        r#"
        SELECT id, role, content, created_at
        FROM messages
        WHERE conversation_id = ?
        ORDER BY created_at ASC, id ASC
        "#,
    )
    .bind(conversation_id)
    .fetch_all(pool)
    .await?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let role: String = row.get("role");
        let role = Role::parse(&role)
            .ok_or_else(|| anyhow::anyhow!("unknown message role in database: {}", role))?;
        out.push(Message {
            id: row.get("id"),
            role,
            content: row.get("content"),
            created_at: format_ts(row.get("created_at")),
        });
    }
    Ok(out)
}

/// Prior messages in prompt form.
pub async fn history(pool: &SqlitePool, conversation_id: i64) -> Result<Vec<HistoryMessage>> {
    Ok(messages(pool, conversation_id)
        .await?
        .into_iter()
        .map(|m| HistoryMessage::new(m.role, m.content))
        .collect())
}

/// Persist one exchange atomically: the user message, the assistant reply,
/// and the conversation's new `updated_at`.
pub async fn record_turn(
    pool: &SqlitePool,
    conversation_id: i64,
    user_message: &str,
    assistant_message: &str,
) -> Result<()> {
    let now = now_ts();
    let mut tx = pool.begin().await?;

    for (role, content) in [(Role::User, user_message), (Role::Assistant, assistant_message)] {
        sqlx::query(
            "INSERT INTO messages (conversation_id, role, content, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(conversation_id)
        .bind(role.as_str())
        .bind(content)
        .bind(now)
        .execute(&mut *tx)
        .await?;
    }

    sqlx::query("UPDATE conversations SET updated_at = ? WHERE id = ?")
        .bind(now)
        .bind(conversation_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}
