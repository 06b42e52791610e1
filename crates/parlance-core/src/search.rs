//! Fuzzy history search.
//!
//! Two match sources, concatenated rather than interleaved: session-name
//! substring hits first (always max score), then per-line message matches
//! in most-recently-updated session order, bounded by the configured scan
//! limits. A line matches on a case-insensitive substring hit or a
//! normalized edit-distance similarity at or above the threshold. Search
//! scans the durable store directly for completeness; it never consults
//! the history cache.

use std::sync::Arc;

use tracing::warn;

use parlance_types::config::SearchConfig;
use parlance_types::error::RepositoryError;
use parlance_types::identity::Identity;
use parlance_types::search::{HIGHLIGHT_MARKER, MAX_SCORE, SearchMatch};

use crate::chat::repository::ChatStore;

/// Read-only search over an owner's sessions and messages.
pub struct SearchEngine<S> {
    store: Arc<S>,
    config: SearchConfig,
}

impl<S: ChatStore> SearchEngine<S> {
    pub fn new(store: Arc<S>, config: SearchConfig) -> Self {
        Self { store, config }
    }

    /// Scan the owner's history for `query`.
    ///
    /// Side-effect free apart from a best-effort per-owner search counter:
    /// a failure to record the statistic is logged and swallowed.
    pub async fn search(
        &self,
        owner: &Identity,
        query: &str,
    ) -> Result<Vec<SearchMatch>, RepositoryError> {
        let needle = query.to_lowercase();
        let sessions = self.store.list_sessions(owner).await?;

        let mut matches = Vec::new();
        for session in &sessions {
            if session.display_name.to_lowercase().contains(&needle) {
                matches.push(SearchMatch::SessionName {
                    session_id: session.session_id.clone(),
                    session_name: session.display_name.clone(),
                    score: MAX_SCORE,
                });
            }
        }

        let mut scanned = 0usize;
        'sessions: for session in sessions.iter().take(self.config.max_scan_sessions) {
            let messages = self
                .store
                .list_messages(&session.session_id, owner, None)
                .await?;
            for message in &messages {
                if scanned >= self.config.max_scan_messages {
                    break 'sessions;
                }
                scanned += 1;
                for (line_idx, line) in message.content.lines().enumerate() {
                    if let Some(hit) = self.match_line(&needle, line) {
                        matches.push(SearchMatch::Message {
                            session_id: session.session_id.clone(),
                            session_name: session.display_name.clone(),
                            role: message.role,
                            timestamp: message.timestamp,
                            line_number: (line_idx + 1) as u32,
                            line: line.to_string(),
                            highlighted: hit.highlighted,
                            score: hit.score,
                        });
                    }
                }
            }
        }

        if let Err(err) = self.store.record_search(owner).await {
            warn!(owner = %owner, error = %err, "failed to record search statistic");
        }

        Ok(matches)
    }

    fn match_line(&self, needle: &str, line: &str) -> Option<LineHit> {
        let lowered = line.to_lowercase();
        if lowered.contains(needle) {
            return Some(LineHit {
                highlighted: highlight(line, &lowered, needle),
                score: MAX_SCORE,
            });
        }
        let ratio = strsim::normalized_levenshtein(&lowered, needle);
        if ratio >= self.config.similarity_threshold {
            // Fuzzy hits have no exact span to mark.
            return Some(LineHit {
                highlighted: line.to_string(),
                score: ratio,
            });
        }
        None
    }
}

struct LineHit {
    highlighted: String,
    score: f64,
}

/// Wrap each occurrence of `needle` (already lowercased) found in the
/// lowercased line with [`HIGHLIGHT_MARKER`].
///
/// Byte offsets into `line` only line up with `lowered` when lowercasing
/// preserved lengths; in the rare case it did not, the line is returned
/// unmarked rather than sliced at a wrong boundary.
fn highlight(line: &str, lowered: &str, needle: &str) -> String {
    if line.len() != lowered.len() {
        return line.to_string();
    }
    let mut out = String::with_capacity(line.len() + 4 * HIGHLIGHT_MARKER.len());
    let mut cursor = 0;
    while let Some(found) = lowered[cursor..].find(needle) {
        let start = cursor + found;
        let end = start + needle.len();
        if !line.is_char_boundary(start) || !line.is_char_boundary(end) {
            return line.to_string();
        }
        out.push_str(&line[cursor..start]);
        out.push_str(HIGHLIGHT_MARKER);
        out.push_str(&line[start..end]);
        out.push_str(HIGHLIGHT_MARKER);
        cursor = end;
    }
    out.push_str(&line[cursor..]);
    out
}
