//! ChatStore trait definition.
//!
//! CRUD-style operations over sessions and messages, executed as single
//! statements or short transactions. Implementations live in
//! parlance-infra (e.g., `SqliteChatStore`).

use chrono::{DateTime, Utc};

use parlance_types::chat::{ChatMessage, ChatSession, MessageRole, SessionId};
use parlance_types::error::RepositoryError;
use parlance_types::identity::Identity;

/// Repository trait for chat session and message persistence.
///
/// Uses native async fn in traits (RPITIT, Rust 2024 edition). All lookups
/// are scoped to an owner: a session is visible to exactly one identity.
pub trait ChatStore: Send + Sync {
    /// Create a new chat session row.
    fn create_session(
        &self,
        session: &ChatSession,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get a session by id, scoped to its owner.
    fn get_session(
        &self,
        session_id: &SessionId,
        owner: &Identity,
    ) -> impl std::future::Future<Output = Result<Option<ChatSession>, RepositoryError>> + Send;

    /// Bump a session's `updated_at`.
    fn touch_session(
        &self,
        session_id: &SessionId,
        at: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Append a message, assigning the next per-session index inside the
    /// same atomic statement as the insert. Concurrent writers to one
    /// session never observe or assign a duplicate index.
    ///
    /// Returns the assigned index.
    fn insert_message(
        &self,
        session_id: &SessionId,
        owner: &Identity,
        role: MessageRole,
        content: &str,
        timestamp: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<u32, RepositoryError>> + Send;

    /// Messages for a session ordered by index ASC, up to `limit`.
    fn list_messages(
        &self,
        session_id: &SessionId,
        owner: &Identity,
        limit: Option<i64>,
    ) -> impl std::future::Future<Output = Result<Vec<ChatMessage>, RepositoryError>> + Send;

    /// Sessions for an owner, most recently updated first.
    fn list_sessions(
        &self,
        owner: &Identity,
    ) -> impl std::future::Future<Output = Result<Vec<ChatSession>, RepositoryError>> + Send;

    /// Rename a session. `NotFound` when no row matched.
    fn rename_session(
        &self,
        session_id: &SessionId,
        owner: &Identity,
        new_name: &str,
        at: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Delete a session and its messages. Returns whether a session row
    /// existed.
    fn delete_session(
        &self,
        session_id: &SessionId,
        owner: &Identity,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// Delete every session and message belonging to an owner. Returns the
    /// number of sessions removed.
    fn delete_all_for_owner(
        &self,
        owner: &Identity,
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;

    /// Bump the per-owner search counter. Callers treat failures as
    /// non-fatal.
    fn record_search(
        &self,
        owner: &Identity,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Number of searches recorded for an owner.
    fn search_count(
        &self,
        owner: &Identity,
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;
}
