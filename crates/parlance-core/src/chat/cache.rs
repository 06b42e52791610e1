//! Two-tier session cache with write-through persistence.
//!
//! The history tier holds per-session ordered message lists, bounded
//! process-wide and evicted FIFO by an explicit insertion-order queue. The
//! metadata tier holds per-owner session projections, unbounded and
//! invalidated wholesale on rename/delete. The durable store is always
//! written first; the cache is never the source of truth.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;

use parlance_types::chat::{ChatSession, MessageRole, SessionId};
use parlance_types::error::RepositoryError;
use parlance_types::identity::Identity;

use crate::chat::repository::ChatStore;

/// The projection kept in history entries: one cached message.
#[derive(Debug, Clone)]
pub struct CachedMessage {
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Cached history for one session, tagged with its owner.
#[derive(Debug)]
struct HistoryEntry {
    owner: Identity,
    messages: Vec<CachedMessage>,
}

/// History tier: the entry map plus the explicit FIFO eviction queue.
///
/// Eviction order is a first-class data structure here, not an incidental
/// property of map iteration: the queue records insertion order and the
/// earliest-inserted entry goes first when the map is at capacity.
#[derive(Default)]
struct HistoryTier {
    entries: HashMap<SessionId, HistoryEntry>,
    insertion_order: VecDeque<SessionId>,
}

/// Write-through cache over a [`ChatStore`].
///
/// Lock discipline: the history mutex guards short, synchronous sections
/// only and is never held across an await. Store I/O happens outside it.
pub struct SessionCache<S> {
    store: Arc<S>,
    capacity: usize,
    history: Mutex<HistoryTier>,
    metadata: DashMap<Identity, HashMap<SessionId, ChatSession>>,
}

impl<S: ChatStore> SessionCache<S> {
    /// Create a cache holding at most `capacity` session histories.
    pub fn new(store: Arc<S>, capacity: usize) -> Self {
        Self {
            store,
            capacity: capacity.max(1),
            history: Mutex::new(HistoryTier::default()),
            metadata: DashMap::new(),
        }
    }

    /// Get-or-load the ordered history for a session.
    ///
    /// A hit returns the cached list directly. A hit owned by a different
    /// identity is reported as absent rather than served. A miss loads up
    /// to `limit` messages from the store and caches them; a load that
    /// finds nothing is not cached, so a deleted session cannot park a
    /// resurrectable entry here.
    pub async fn history(
        &self,
        session_id: &SessionId,
        owner: &Identity,
        limit: u32,
    ) -> Result<Option<Vec<CachedMessage>>, RepositoryError> {
        {
            let tier = self.history.lock().expect("history cache lock poisoned");
            if let Some(entry) = tier.entries.get(session_id) {
                if entry.owner == *owner {
                    return Ok(Some(entry.messages.clone()));
                }
                return Ok(None);
            }
        }

        let messages = self
            .store
            .list_messages(session_id, owner, Some(i64::from(limit)))
            .await?;
        if messages.is_empty() {
            return Ok(None);
        }

        let cached: Vec<CachedMessage> = messages
            .into_iter()
            .map(|m| CachedMessage {
                role: m.role,
                content: m.content,
                timestamp: m.timestamp,
            })
            .collect();
        self.insert_history(session_id.clone(), owner.clone(), cached.clone());
        Ok(Some(cached))
    }

    /// Write-through append: durable write first, then the in-memory list
    /// and the owner's metadata projection.
    ///
    /// After this returns, [`Self::history`] on the same session observes
    /// the appended message. On any store error the session's cache entry
    /// is dropped rather than trusted. Returns the assigned index.
    pub async fn append_and_cache(
        &self,
        session: &ChatSession,
        role: MessageRole,
        content: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<u32, RepositoryError> {
        let index = match self
            .store
            .insert_message(&session.session_id, &session.owner, role, content, timestamp)
            .await
        {
            Ok(index) => index,
            Err(err) => {
                self.invalidate(&session.session_id);
                return Err(err);
            }
        };

        if let Err(err) = self.store.touch_session(&session.session_id, timestamp).await {
            self.invalidate(&session.session_id);
            return Err(err);
        }

        {
            let mut tier = self.history.lock().expect("history cache lock poisoned");
            if let Some(entry) = tier.entries.get_mut(&session.session_id) {
                entry.messages.push(CachedMessage {
                    role,
                    content: content.to_string(),
                    timestamp,
                });
            }
            // Absent entry: the next read loads the full list, row included.
        }

        if let Some(mut sessions) = self.metadata.get_mut(&session.owner) {
            match sessions.get_mut(&session.session_id) {
                Some(meta) => meta.updated_at = timestamp,
                None => {
                    let mut meta = session.clone();
                    meta.updated_at = timestamp;
                    sessions.insert(session.session_id.clone(), meta);
                }
            }
        }

        Ok(index)
    }

    /// Get-or-load the owner's session metadata projection.
    pub async fn metadata(
        &self,
        owner: &Identity,
    ) -> Result<HashMap<SessionId, ChatSession>, RepositoryError> {
        if let Some(sessions) = self.metadata.get(owner) {
            return Ok(sessions.clone());
        }

        let listed = self.store.list_sessions(owner).await?;
        let map: HashMap<SessionId, ChatSession> = listed
            .into_iter()
            .map(|s| (s.session_id.clone(), s))
            .collect();
        self.metadata.insert(owner.clone(), map.clone());
        Ok(map)
    }

    /// Record a newly created session in the owner's projection, if loaded.
    pub fn note_created(&self, session: &ChatSession) {
        if let Some(mut sessions) = self.metadata.get_mut(&session.owner) {
            sessions.insert(session.session_id.clone(), session.clone());
        }
    }

    /// Drop one session's history entry.
    pub fn invalidate(&self, session_id: &SessionId) {
        let mut tier = self.history.lock().expect("history cache lock poisoned");
        if tier.entries.remove(session_id).is_some() {
            tier.insertion_order.retain(|id| id != session_id);
        }
    }

    /// Drop the owner's metadata projection.
    pub fn invalidate_metadata(&self, owner: &Identity) {
        self.metadata.remove(owner);
    }

    /// Drop everything cached for an owner: the metadata projection plus
    /// any history entries it owns.
    pub fn invalidate_owner(&self, owner: &Identity) {
        self.metadata.remove(owner);
        let mut tier = self.history.lock().expect("history cache lock poisoned");
        let HistoryTier {
            entries,
            insertion_order,
        } = &mut *tier;
        entries.retain(|_, entry| entry.owner != *owner);
        insertion_order.retain(|id| entries.contains_key(id));
    }

    /// Number of cached history entries.
    pub fn cached_sessions(&self) -> usize {
        self.history
            .lock()
            .expect("history cache lock poisoned")
            .entries
            .len()
    }

    /// Whether a session currently has a history entry.
    pub fn contains(&self, session_id: &SessionId) -> bool {
        self.history
            .lock()
            .expect("history cache lock poisoned")
            .entries
            .contains_key(session_id)
    }

    fn insert_history(&self, session_id: SessionId, owner: Identity, messages: Vec<CachedMessage>) {
        let mut tier = self.history.lock().expect("history cache lock poisoned");

        if let Some(entry) = tier.entries.get_mut(&session_id) {
            // A refreshed load keeps the entry's original queue position.
            entry.owner = owner;
            entry.messages = messages;
            return;
        }

        while tier.entries.len() >= self.capacity {
            let Some(evicted) = tier.insertion_order.pop_front() else {
                break;
            };
            tier.entries.remove(&evicted);
            debug!(session_id = %evicted, "evicted history cache entry");
        }

        tier.insertion_order.push_back(session_id.clone());
        tier.entries.insert(session_id, HistoryEntry { owner, messages });
    }
}
