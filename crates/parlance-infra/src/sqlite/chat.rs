//! SQLite chat store implementation.
//!
//! Implements `ChatStore` from `parlance-core` using sqlx with split
//! read/write pools: raw queries, private Row structs, reads on the reader
//! pool and mutations on the single-connection writer.

use chrono::{DateTime, Utc};
use sqlx::Row;

use parlance_core::chat::repository::ChatStore;
use parlance_types::chat::{ChatMessage, ChatSession, MessageRole, SessionId};
use parlance_types::error::RepositoryError;
use parlance_types::identity::Identity;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `ChatStore`.
#[derive(Clone)]
pub struct SqliteChatStore {
    pool: DatabasePool,
}

impl SqliteChatStore {
    /// Create a new store backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Private Row types for SQLite-to-domain mapping
// ---------------------------------------------------------------------------

/// Internal row type for mapping SQLite rows to domain ChatSession.
struct ChatSessionRow {
    session_id: String,
    owner: String,
    display_name: String,
    created_at: String,
    updated_at: String,
}

impl ChatSessionRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            session_id: row.try_get("session_id")?,
            owner: row.try_get("owner")?,
            display_name: row.try_get("display_name")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_session(self) -> Result<ChatSession, RepositoryError> {
        let session_id = SessionId::new(self.session_id)
            .map_err(|e| RepositoryError::Query(format!("invalid session id: {e}")))?;
        let owner = Identity::new(self.owner)
            .map_err(|e| RepositoryError::Query(format!("invalid owner: {e}")))?;
        let created_at = parse_datetime(&self.created_at)?;
        let updated_at = parse_datetime(&self.updated_at)?;

        Ok(ChatSession {
            session_id,
            owner,
            display_name: self.display_name,
            created_at,
            updated_at,
        })
    }
}

/// Internal row type for mapping SQLite rows to domain ChatMessage.
struct ChatMessageRow {
    session_id: String,
    owner: String,
    message_index: i64,
    role: String,
    content: String,
    created_at: String,
}

impl ChatMessageRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            session_id: row.try_get("session_id")?,
            owner: row.try_get("owner")?,
            message_index: row.try_get("message_index")?,
            role: row.try_get("role")?,
            content: row.try_get("content")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_message(self) -> Result<ChatMessage, RepositoryError> {
        let session_id = SessionId::new(self.session_id)
            .map_err(|e| RepositoryError::Query(format!("invalid session id: {e}")))?;
        let owner = Identity::new(self.owner)
            .map_err(|e| RepositoryError::Query(format!("invalid owner: {e}")))?;
        let role: MessageRole = self
            .role
            .parse()
            .map_err(|e: String| RepositoryError::Query(e))?;
        let timestamp = parse_datetime(&self.created_at)?;

        Ok(ChatMessage {
            session_id,
            owner,
            index: self.message_index as u32,
            role,
            content: self.content,
            timestamp,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn map_write_error(err: sqlx::Error) -> RepositoryError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            RepositoryError::Conflict(err.to_string())
        }
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => RepositoryError::NotFound,
        _ => RepositoryError::Query(err.to_string()),
    }
}

// ---------------------------------------------------------------------------
// ChatStore implementation
// ---------------------------------------------------------------------------

impl ChatStore for SqliteChatStore {
    async fn create_session(&self, session: &ChatSession) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO chat_sessions (session_id, owner, display_name, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(session.session_id.as_str())
        .bind(session.owner.as_str())
        .bind(&session.display_name)
        .bind(format_datetime(&session.created_at))
        .bind(format_datetime(&session.updated_at))
        .execute(&self.pool.writer)
        .await
        .map_err(map_write_error)?;

        Ok(())
    }

    async fn get_session(
        &self,
        session_id: &SessionId,
        owner: &Identity,
    ) -> Result<Option<ChatSession>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM chat_sessions WHERE session_id = ? AND owner = ?")
            .bind(session_id.as_str())
            .bind(owner.as_str())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let session_row = ChatSessionRow::from_row(&row)
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(session_row.into_session()?))
            }
            None => Ok(None),
        }
    }

    async fn touch_session(
        &self,
        session_id: &SessionId,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE chat_sessions SET updated_at = ? WHERE session_id = ?")
            .bind(format_datetime(&at))
            .bind(session_id.as_str())
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    async fn insert_message(
        &self,
        session_id: &SessionId,
        owner: &Identity,
        role: MessageRole,
        content: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<u32, RepositoryError> {
        // Index assignment happens inside the INSERT itself, so concurrent
        // writers to one session can never read a stale MAX and collide.
        // The composite primary key backstops the invariant.
        let row = sqlx::query(
            r#"INSERT INTO chat_messages (session_id, owner, message_index, role, content, created_at)
               SELECT ?1, ?2, COALESCE(MAX(message_index) + 1, 0), ?3, ?4, ?5
               FROM chat_messages WHERE session_id = ?1
               RETURNING message_index"#,
        )
        .bind(session_id.as_str())
        .bind(owner.as_str())
        .bind(role.to_string())
        .bind(content)
        .bind(format_datetime(&timestamp))
        .fetch_one(&self.pool.writer)
        .await
        .map_err(map_write_error)?;

        let index: i64 = row
            .try_get("message_index")
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(index as u32)
    }

    async fn list_messages(
        &self,
        session_id: &SessionId,
        owner: &Identity,
        limit: Option<i64>,
    ) -> Result<Vec<ChatMessage>, RepositoryError> {
        let mut sql = String::from(
            "SELECT * FROM chat_messages WHERE session_id = ? AND owner = ? ORDER BY message_index ASC",
        );
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let rows = sqlx::query(&sql)
            .bind(session_id.as_str())
            .bind(owner.as_str())
            .fetch_all(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in &rows {
            let msg_row =
                ChatMessageRow::from_row(row).map_err(|e| RepositoryError::Query(e.to_string()))?;
            messages.push(msg_row.into_message()?);
        }

        Ok(messages)
    }

    async fn list_sessions(&self, owner: &Identity) -> Result<Vec<ChatSession>, RepositoryError> {
        let rows =
            sqlx::query("SELECT * FROM chat_sessions WHERE owner = ? ORDER BY updated_at DESC")
                .bind(owner.as_str())
                .fetch_all(&self.pool.reader)
                .await
                .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut sessions = Vec::with_capacity(rows.len());
        for row in &rows {
            let session_row =
                ChatSessionRow::from_row(row).map_err(|e| RepositoryError::Query(e.to_string()))?;
            sessions.push(session_row.into_session()?);
        }

        Ok(sessions)
    }

    async fn rename_session(
        &self,
        session_id: &SessionId,
        owner: &Identity,
        new_name: &str,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE chat_sessions SET display_name = ?, updated_at = ? WHERE session_id = ? AND owner = ?",
        )
        .bind(new_name)
        .bind(format_datetime(&at))
        .bind(session_id.as_str())
        .bind(owner.as_str())
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }

    async fn delete_session(
        &self,
        session_id: &SessionId,
        owner: &Identity,
    ) -> Result<bool, RepositoryError> {
        // Messages go with the session via ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM chat_sessions WHERE session_id = ? AND owner = ?")
            .bind(session_id.as_str())
            .bind(owner.as_str())
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_all_for_owner(&self, owner: &Identity) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM chat_sessions WHERE owner = ?")
            .bind(owner.as_str())
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        sqlx::query("DELETE FROM search_stats WHERE owner = ?")
            .bind(owner.as_str())
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(result.rows_affected())
    }

    async fn record_search(&self, owner: &Identity) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO search_stats (owner, searches, last_searched_at)
               VALUES (?1, 1, ?2)
               ON CONFLICT(owner) DO UPDATE SET
                   searches = searches + 1,
                   last_searched_at = excluded.last_searched_at"#,
        )
        .bind(owner.as_str())
        .bind(format_datetime(&Utc::now()))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    async fn search_count(&self, owner: &Identity) -> Result<u64, RepositoryError> {
        let row = sqlx::query("SELECT searches FROM search_stats WHERE owner = ?")
            .bind(owner.as_str())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let count: i64 = row
                    .try_get("searches")
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(count as u64)
            }
            None => Ok(0),
        }
    }
}
