//! In-memory [`ChatStore`] double for component tests.
//!
//! Mirrors the durable store's contract closely enough for cache, search,
//! and service tests: owner-scoped lookups, index assignment under the
//! store's own lock, sessions listed most recently updated first.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};

use parlance_types::chat::{ChatMessage, ChatSession, MessageRole, SessionId};
use parlance_types::error::RepositoryError;
use parlance_types::identity::Identity;

use crate::chat::repository::ChatStore;

#[derive(Default)]
struct Inner {
    sessions: Vec<ChatSession>,
    messages: Vec<ChatMessage>,
    searches: HashMap<String, u64>,
}

/// Test double backed by vectors under a mutex.
#[derive(Default)]
pub struct MemoryChatStore {
    inner: Mutex<Inner>,
    fail_writes: AtomicBool,
    fail_record_search: AtomicBool,
}

impl MemoryChatStore {
    /// Make subsequent write operations fail with a query error.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent `record_search` calls fail with a query error.
    pub fn fail_record_search(&self, fail: bool) {
        self.fail_record_search.store(fail, Ordering::SeqCst);
    }

    fn write_guard(&self) -> Result<(), RepositoryError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RepositoryError::Query("injected write failure".to_string()));
        }
        Ok(())
    }
}

impl ChatStore for MemoryChatStore {
    async fn create_session(&self, session: &ChatSession) -> Result<(), RepositoryError> {
        self.write_guard()?;
        let mut inner = self.inner.lock().unwrap();
        if inner
            .sessions
            .iter()
            .any(|s| s.session_id == session.session_id)
        {
            return Err(RepositoryError::Conflict(format!(
                "session '{}' already exists",
                session.session_id
            )));
        }
        inner.sessions.push(session.clone());
        Ok(())
    }

    async fn get_session(
        &self,
        session_id: &SessionId,
        owner: &Identity,
    ) -> Result<Option<ChatSession>, RepositoryError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .sessions
            .iter()
            .find(|s| s.session_id == *session_id && s.owner == *owner)
            .cloned())
    }

    async fn touch_session(
        &self,
        session_id: &SessionId,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        self.write_guard()?;
        let mut inner = self.inner.lock().unwrap();
        if let Some(session) = inner
            .sessions
            .iter_mut()
            .find(|s| s.session_id == *session_id)
        {
            session.updated_at = at;
        }
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
        self.write_guard()?;
        let mut inner = self.inner.lock().unwrap();
        let index = inner
            .messages
            .iter()
            .filter(|m| m.session_id == *session_id)
            .map(|m| m.index + 1)
            .max()
            .unwrap_or(0);
        inner.messages.push(ChatMessage {
            session_id: session_id.clone(),
            owner: owner.clone(),
            index,
            role,
            content: content.to_string(),
            timestamp,
        });
        Ok(index)
    }

    async fn list_messages(
        &self,
        session_id: &SessionId,
        owner: &Identity,
        limit: Option<i64>,
    ) -> Result<Vec<ChatMessage>, RepositoryError> {
        let inner = self.inner.lock().unwrap();
        let mut messages: Vec<ChatMessage> = inner
            .messages
            .iter()
            .filter(|m| m.session_id == *session_id && m.owner == *owner)
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.index);
        if let Some(limit) = limit {
            messages.truncate(limit as usize);
        }
        Ok(messages)
    }

    async fn list_sessions(&self, owner: &Identity) -> Result<Vec<ChatSession>, RepositoryError> {
        let inner = self.inner.lock().unwrap();
        let mut sessions: Vec<ChatSession> = inner
            .sessions
            .iter()
            .filter(|s| s.owner == *owner)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(sessions)
    }

    async fn rename_session(
        &self,
        session_id: &SessionId,
        owner: &Identity,
        new_name: &str,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        self.write_guard()?;
        let mut inner = self.inner.lock().unwrap();
        let Some(session) = inner
            .sessions
            .iter_mut()
            .find(|s| s.session_id == *session_id && s.owner == *owner)
        else {
            return Err(RepositoryError::NotFound);
        };
        session.display_name = new_name.to_string();
        session.updated_at = at;
        Ok(())
    }

    async fn delete_session(
        &self,
        session_id: &SessionId,
        owner: &Identity,
    ) -> Result<bool, RepositoryError> {
        self.write_guard()?;
        let mut inner = self.inner.lock().unwrap();
        let before = inner.sessions.len();
        inner
            .sessions
            .retain(|s| !(s.session_id == *session_id && s.owner == *owner));
        let deleted = inner.sessions.len() < before;
        if deleted {
            inner.messages.retain(|m| m.session_id != *session_id);
        }
        Ok(deleted)
    }

    async fn delete_all_for_owner(&self, owner: &Identity) -> Result<u64, RepositoryError> {
        self.write_guard()?;
        let mut inner = self.inner.lock().unwrap();
        let before = inner.sessions.len();
        inner.sessions.retain(|s| s.owner != *owner);
        let removed = (before - inner.sessions.len()) as u64;
        inner.messages.retain(|m| m.owner != *owner);
        Ok(removed)
    }

    async fn record_search(&self, owner: &Identity) -> Result<(), RepositoryError> {
        if self.fail_record_search.load(Ordering::SeqCst) {
            return Err(RepositoryError::Query(
                "injected search stat failure".to_string(),
            ));
        }
        let mut inner = self.inner.lock().unwrap();
        *inner.searches.entry(owner.as_str().to_string()).or_insert(0) += 1;
        Ok(())
    }

    async fn search_count(&self, owner: &Identity) -> Result<u64, RepositoryError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.searches.get(owner.as_str()).copied().unwrap_or(0))
    }
}
