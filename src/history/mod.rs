//! SQLite-backed chat history.
//!
//! An append-only log of chat turns keyed by client identifier. Turns are
//! never updated or deleted; concurrent writers are safe because every
//! operation is a single insert or a single read.

use anyhow::Context;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::path::Path;

/// Who produced a chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

/// One immutable chat turn as read back from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub client_id: String,
    pub role: ChatRole,
    pub content: String,
    pub created_at: String,
}

/// Append-only message store over a SQLite pool.
pub struct HistoryStore {
    pool: SqlitePool,
}

impl HistoryStore {
    /// Open (or create) the database at `path` and ensure the schema exists.
    pub async fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .context("create history directory")?;
        }

        let url = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePool::connect(&url)
            .await
            .context("open SQLite database")?;

        init_schema(&pool).await?;
        Ok(Self { pool })
    }

    /// Open an in-memory database (used by tests).
    pub async fn in_memory() -> anyhow::Result<Self> {
        let pool = SqlitePool::connect("sqlite::memory:")
            .await
            .context("open in-memory SQLite")?;
        init_schema(&pool).await?;
        Ok(Self { pool })
    }

    /// Insert one turn. Duplicates are permitted; ordering comes from the
    /// autoincrement id, not the timestamp.
    pub async fn append(
        &self,
        client_id: &str,
        role: ChatRole,
        content: &str,
    ) -> anyhow::Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO messages (client_id, role, content, created_at)
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(client_id)
        .bind(role.as_str())
        .bind(content)
        .bind(&now)
        .execute(&self.pool)
        .await
        .context("insert chat turn")?;
        Ok(())
    }

    /// Return up to `limit` turns for `client_id`, oldest-first.
    ///
    /// Storage retrieval is newest-first (`ORDER BY id DESC LIMIT`), so the
    /// rows are reversed before returning.
    pub async fn recent(&self, client_id: &str, limit: usize) -> anyhow::Result<Vec<ChatTurn>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut rows: Vec<(String, String, String)> = sqlx::query_as(
            "SELECT role, content, created_at FROM messages
             WHERE client_id = ?1
             ORDER BY id DESC
             LIMIT ?2",
        )
        .bind(client_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("query recent chat turns")?;

        rows.reverse();

        rows.into_iter()
            .map(|(role, content, created_at)| {
                let role = ChatRole::parse(&role)
                    .ok_or_else(|| anyhow::anyhow!("unknown chat role in store: {role}"))?;
                Ok(ChatTurn {
                    client_id: client_id.to_string(),
                    role,
                    content,
                    created_at,
                })
            })
            .collect()
    }

    /// Health check: execute a trivial query.
    pub async fn health_check(&self) -> bool {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .is_ok()
    }
}

async fn init_schema(pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::raw_sql(
        "CREATE TABLE IF NOT EXISTS messages (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            client_id  TEXT NOT NULL,
            role       TEXT NOT NULL,
            content    TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_messages_client ON messages(client_id, id DESC);",
    )
    .execute(pool)
    .await
    .context("init messages schema")?;
    Ok(())
}
