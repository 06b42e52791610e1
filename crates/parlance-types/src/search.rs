//! History search result records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chat::{MessageRole, SessionId};

/// Marker wrapped around case-insensitive query occurrences in highlighted
/// lines.
pub const HIGHLIGHT_MARKER: &str = "**";

/// Maximum match score, assigned to session-name matches and exact
/// substring hits.
pub const MAX_SCORE: f64 = 1.0;

/// One search hit, from either of the two match sources.
///
/// Session-name matches are always emitted before message matches; message
/// matches preserve scan order (most recently updated session first).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SearchMatch {
    /// Case-insensitive substring hit on a session's display name.
    SessionName {
        session_id: SessionId,
        session_name: String,
        score: f64,
    },
    /// A matching line inside a stored message.
    Message {
        session_id: SessionId,
        session_name: String,
        role: MessageRole,
        timestamp: DateTime<Utc>,
        /// 1-based line number within the message.
        line_number: u32,
        line: String,
        /// Copy of the line with query occurrences wrapped in
        /// [`HIGHLIGHT_MARKER`]; fuzzy-only matches carry no markers.
        highlighted: String,
        score: f64,
    },
}

impl SearchMatch {
    /// The match score in `[0, 1]`.
    pub fn score(&self) -> f64 {
        match self {
            SearchMatch::SessionName { score, .. } => *score,
            SearchMatch::Message { score, .. } => *score,
        }
    }

    /// The session this match belongs to.
    pub fn session_id(&self) -> &SessionId {
        match self {
            SearchMatch::SessionName { session_id, .. } => session_id,
            SearchMatch::Message { session_id, .. } => session_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_match_serde_tagged() {
        let m = SearchMatch::SessionName {
            session_id: SessionId::generate(),
            session_name: "Weekend plans".to_string(),
            score: MAX_SCORE,
        };
        let json = serde_json::to_string(&m).unwrap();
        assert!(json.contains("\"kind\":\"session_name\""));
    }

    #[test]
    fn test_search_match_accessors() {
        let id = SessionId::generate();
        let m = SearchMatch::Message {
            session_id: id.clone(),
            session_name: "n".to_string(),
            role: MessageRole::User,
            timestamp: Utc::now(),
            line_number: 1,
            line: "hello".to_string(),
            highlighted: "**hello**".to_string(),
            score: 0.5,
        };
        assert_eq!(m.score(), 0.5);
        assert_eq!(m.session_id(), &id);
    }
}
