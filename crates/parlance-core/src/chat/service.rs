//! Chat session service.
//!
//! Public entry points composing admission control, the session cache, the
//! durable store, and history search. All mutation of the shared cache and
//! limiter state funnels through here; writes to a single session are
//! serialized by a per-session lock while unrelated sessions proceed
//! independently.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{error, info, warn};

use parlance_types::chat::{ChatSession, HistoryPair, MessageRole, SessionId};
use parlance_types::config::GlobalConfig;
use parlance_types::error::{ChatError, RepositoryError};
use parlance_types::identity::Identity;
use parlance_types::limit::{OperationClass, RateLimit};
use parlance_types::search::SearchMatch;

use crate::chat::cache::{CachedMessage, SessionCache};
use crate::chat::repository::ChatStore;
use crate::limiter::SlidingWindowLimiter;
use crate::search::SearchEngine;

/// Characters of the first user message used to auto-name a session.
const AUTO_NAME_LEN: usize = 50;

/// Default history page size.
pub const DEFAULT_HISTORY_LIMIT: u32 = 50;

/// Outcome of the LLM-orchestration collaborator for one exchange.
///
/// `NotReady` is a value, not an error: the user message stays persisted
/// and the missing reply is a visible degradation, not a corruption.
#[derive(Debug, Clone)]
pub enum ReplyOutcome {
    Ready(String),
    NotReady(String),
}

/// The session store's public surface.
///
/// Generic over [`ChatStore`] to keep this crate free of infrastructure
/// dependencies; `parlance-infra` supplies the SQLite implementation.
pub struct ChatSessionService<S> {
    store: Arc<S>,
    cache: SessionCache<S>,
    limiter: SlidingWindowLimiter,
    search: SearchEngine<S>,
    write_locks: DashMap<SessionId, Arc<Mutex<()>>>,
    store_timeout: Duration,
}

impl<S: ChatStore> ChatSessionService<S> {
    /// Build the service from a store and configuration.
    pub fn new(store: Arc<S>, config: &GlobalConfig) -> Self {
        Self {
            cache: SessionCache::new(Arc::clone(&store), config.cache.max_cached_sessions),
            search: SearchEngine::new(Arc::clone(&store), config.search.clone()),
            limiter: SlidingWindowLimiter::new(config.limits.clone()),
            write_locks: DashMap::new(),
            store_timeout: Duration::from_millis(config.store_timeout_ms),
            store,
        }
    }

    /// Create a session with a generated id.
    ///
    /// Without an explicit name the session gets a short tag derived from
    /// its id.
    pub async fn create_session(
        &self,
        owner: &Identity,
        name: Option<String>,
    ) -> Result<SessionId, ChatError> {
        self.check_admission(OperationClass::Chat, owner)?;

        let session_id = SessionId::generate();
        let display_name = match name {
            Some(raw) => {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    return Err(ChatError::Validation(
                        "session name cannot be empty".to_string(),
                    ));
                }
                trimmed.to_string()
            }
            None => fallback_display_name(&session_id),
        };

        let now = Utc::now();
        let session = ChatSession {
            session_id: session_id.clone(),
            owner: owner.clone(),
            display_name,
            created_at: now,
            updated_at: now,
        };
        self.deadline(self.store.create_session(&session))
            .await
            .map_err(|err| self.storage_error("create_session", &session_id, owner, err))?;
        self.cache.note_created(&session);
        info!(session_id = %session_id, owner = %owner, "session created");
        Ok(session_id)
    }

    /// Append one message, creating the session on its first write.
    ///
    /// An implicitly created session is auto-named from the first 50
    /// characters of the first user message.
    pub async fn append_message(
        &self,
        session_id: &SessionId,
        owner: &Identity,
        role: MessageRole,
        content: &str,
    ) -> Result<(), ChatError> {
        if content.trim().is_empty() {
            return Err(ChatError::Validation(
                "message content cannot be empty".to_string(),
            ));
        }
        self.check_admission(OperationClass::Chat, owner)?;

        let lock = self.write_lock(session_id);
        let _guard = lock.lock().await;

        let now = Utc::now();
        let session = match self
            .deadline(self.store.get_session(session_id, owner))
            .await
            .map_err(|err| self.storage_error("append_message", session_id, owner, err))?
        {
            Some(session) => session,
            None => {
                let session = ChatSession {
                    session_id: session_id.clone(),
                    owner: owner.clone(),
                    display_name: auto_display_name(role, content, session_id),
                    created_at: now,
                    updated_at: now,
                };
                self.deadline(self.store.create_session(&session))
                    .await
                    .map_err(|err| self.storage_error("append_message", session_id, owner, err))?;
                self.cache.note_created(&session);
                info!(session_id = %session_id, owner = %owner, "session implicitly created");
                session
            }
        };

        match self
            .deadline(self.cache.append_and_cache(&session, role, content, now))
            .await
        {
            Ok(_index) => Ok(()),
            Err(err) => {
                // Unknown or failed outcome: the entry is possibly stale.
                self.cache.invalidate(session_id);
                Err(self.storage_error("append_message", session_id, owner, err))
            }
        }
    }

    /// Append a user message and, when the collaborator produced one, the
    /// assistant reply.
    ///
    /// The two appends are sequential, not transactional: a `NotReady`
    /// reply (or a failure on the second append) leaves the user message
    /// in place unanswered.
    pub async fn append_exchange(
        &self,
        session_id: &SessionId,
        owner: &Identity,
        user_text: &str,
        reply: ReplyOutcome,
    ) -> Result<(), ChatError> {
        self.append_message(session_id, owner, MessageRole::User, user_text)
            .await?;
        match reply {
            ReplyOutcome::Ready(text) => {
                self.append_message(session_id, owner, MessageRole::Assistant, &text)
                    .await
            }
            ReplyOutcome::NotReady(reason) => {
                warn!(
                    session_id = %session_id,
                    owner = %owner,
                    reason = %reason,
                    "collaborator reply not ready; user message left unanswered"
                );
                Ok(())
            }
        }
    }

    /// Ordered (user, assistant) display pairs for a session.
    ///
    /// Unknown or deleted sessions yield an empty list. A trailing user
    /// message with no reply yet is paired with an empty assistant side.
    pub async fn get_history(
        &self,
        session_id: &SessionId,
        owner: &Identity,
        limit: Option<u32>,
    ) -> Result<Vec<HistoryPair>, ChatError> {
        self.check_admission(OperationClass::Chat, owner)?;
        let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
        let messages = self
            .deadline(self.cache.history(session_id, owner, limit))
            .await
            .map_err(|err| self.storage_error("get_history", session_id, owner, err))?;
        Ok(match messages {
            Some(list) => pair_messages(&list),
            None => Vec::new(),
        })
    }

    /// The owner's sessions, most recently updated first.
    pub async fn list_sessions(&self, owner: &Identity) -> Result<Vec<ChatSession>, ChatError> {
        self.check_admission(OperationClass::Chat, owner)?;
        let metadata = self.cache.metadata(owner).await.map_err(|err| {
            error!(owner = %owner, error = %err, "store operation failed");
            ChatError::from(err)
        })?;
        let mut sessions: Vec<ChatSession> = metadata.into_values().collect();
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(sessions)
    }

    /// Rename a session.
    ///
    /// Renaming to the current name is a no-op that leaves `updated_at`
    /// untouched. Returns the updated metadata, or `NotFound`.
    pub async fn rename_session(
        &self,
        session_id: &SessionId,
        owner: &Identity,
        new_name: &str,
    ) -> Result<ChatSession, ChatError> {
        let new_name = new_name.trim();
        if new_name.is_empty() {
            return Err(ChatError::Validation(
                "session name cannot be empty".to_string(),
            ));
        }
        self.check_admission(OperationClass::Chat, owner)?;

        let Some(mut session) = self
            .deadline(self.store.get_session(session_id, owner))
            .await
            .map_err(|err| self.storage_error("rename_session", session_id, owner, err))?
        else {
            return Err(ChatError::NotFound);
        };

        if session.display_name == new_name {
            return Ok(session);
        }

        let now = Utc::now();
        self.deadline(self.store.rename_session(session_id, owner, new_name, now))
            .await
            .map_err(|err| self.storage_error("rename_session", session_id, owner, err))?;
        session.display_name = new_name.to_string();
        session.updated_at = now;
        self.cache.invalidate_metadata(owner);
        info!(session_id = %session_id, owner = %owner, "session renamed");
        Ok(session)
    }

    /// Delete a session and its messages. Returns whether one existed.
    ///
    /// After this returns no reader observes the session; a later append
    /// to the same id creates a brand-new session.
    pub async fn delete_session(
        &self,
        session_id: &SessionId,
        owner: &Identity,
    ) -> Result<bool, ChatError> {
        self.check_admission(OperationClass::Chat, owner)?;

        let lock = self.write_lock(session_id);
        let guard = lock.lock().await;
        let deleted = self
            .deadline(self.store.delete_session(session_id, owner))
            .await
            .map_err(|err| self.storage_error("delete_session", session_id, owner, err))?;
        self.cache.invalidate(session_id);
        self.cache.invalidate_metadata(owner);
        drop(guard);
        self.write_locks.remove(session_id);

        if deleted {
            info!(session_id = %session_id, owner = %owner, "session deleted");
        }
        Ok(deleted)
    }

    /// Delete every session and message for an owner (account removal).
    /// Returns the number of sessions removed.
    pub async fn delete_all_for_owner(&self, owner: &Identity) -> Result<u64, ChatError> {
        self.check_admission(OperationClass::Chat, owner)?;
        let removed = self
            .deadline(self.store.delete_all_for_owner(owner))
            .await
            .map_err(|err| {
                error!(owner = %owner, error = %err, "store operation failed");
                ChatError::from(err)
            })?;
        self.cache.invalidate_owner(owner);
        info!(owner = %owner, sessions = removed, "deleted all sessions for owner");
        Ok(removed)
    }

    /// Search the owner's history for `query`.
    pub async fn search_history(
        &self,
        owner: &Identity,
        query: &str,
    ) -> Result<Vec<SearchMatch>, ChatError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ChatError::Validation(
                "search query cannot be empty".to_string(),
            ));
        }
        self.check_admission(OperationClass::Chat, owner)?;
        self.search.search(owner, query).await.map_err(|err| {
            error!(owner = %owner, error = %err, "history search failed");
            ChatError::from(err)
        })
    }

    /// The configured budget for an operation class.
    pub fn limit_info(&self, class: OperationClass) -> RateLimit {
        self.limiter.limit_info(class)
    }

    /// Shared admission check for sibling subsystems (file upload, audio,
    /// auth) that gate on the same limiter without going through chat
    /// entry points.
    pub fn admit(&self, class: OperationClass, identity: &Identity) -> bool {
        self.limiter.admit(class, identity)
    }

    fn check_admission(&self, class: OperationClass, owner: &Identity) -> Result<(), ChatError> {
        if self.limiter.admit(class, owner) {
            return Ok(());
        }
        let RateLimit {
            max_requests,
            window_seconds,
        } = self.limiter.limit_info(class);
        Err(ChatError::RateLimited {
            class,
            max_requests,
            window_seconds,
        })
    }

    fn write_lock(&self, session_id: &SessionId) -> Arc<Mutex<()>> {
        self.write_locks
            .entry(session_id.clone())
            .or_default()
            .clone()
    }

    async fn deadline<T>(
        &self,
        op: impl Future<Output = Result<T, RepositoryError>>,
    ) -> Result<T, RepositoryError> {
        match timeout(self.store_timeout, op).await {
            Ok(result) => result,
            Err(_) => Err(RepositoryError::Timeout),
        }
    }

    fn storage_error(
        &self,
        operation: &'static str,
        session_id: &SessionId,
        owner: &Identity,
        err: RepositoryError,
    ) -> ChatError {
        error!(
            operation,
            session_id = %session_id,
            owner = %owner,
            error = %err,
            "store operation failed"
        );
        ChatError::from(err)
    }
}

/// Convert an ordered message list into (user, assistant) display pairs.
///
/// A user message answered by the next assistant message forms one pair; a
/// user message followed by another user message, or trailing with no
/// reply, pairs with an empty assistant side. An assistant message with no
/// preceding user message pairs with an empty user side.
pub fn pair_messages(messages: &[CachedMessage]) -> Vec<HistoryPair> {
    let mut pairs = Vec::new();
    let mut pending_user: Option<&CachedMessage> = None;

    for message in messages {
        match message.role {
            MessageRole::User => {
                if let Some(unanswered) = pending_user.take() {
                    pairs.push(HistoryPair {
                        user: unanswered.content.clone(),
                        assistant: String::new(),
                    });
                }
                pending_user = Some(message);
            }
            MessageRole::Assistant => match pending_user.take() {
                Some(user) => pairs.push(HistoryPair {
                    user: user.content.clone(),
                    assistant: message.content.clone(),
                }),
                None => pairs.push(HistoryPair {
                    user: String::new(),
                    assistant: message.content.clone(),
                }),
            },
        }
    }

    if let Some(unanswered) = pending_user {
        pairs.push(HistoryPair {
            user: unanswered.content.clone(),
            assistant: String::new(),
        });
    }

    pairs
}

/// Display name for an implicitly created session: the first 50 characters
/// of the first user message, or a short tag from the session id when the
/// first write is not a user message.
fn auto_display_name(role: MessageRole, content: &str, session_id: &SessionId) -> String {
    match role {
        MessageRole::User => {
            let name: String = content.trim().chars().take(AUTO_NAME_LEN).collect();
            if name.is_empty() {
                fallback_display_name(session_id)
            } else {
                name
            }
        }
        MessageRole::Assistant => fallback_display_name(session_id),
    }
}

fn fallback_display_name(session_id: &SessionId) -> String {
    let tag: String = session_id.as_str().chars().take(8).collect();
    format!("Chat {tag}")
}
