//! Global configuration types for the session store.
//!
//! `GlobalConfig` represents the top-level `config.toml` that controls
//! cache sizing, per-class admission budgets, search behavior, and the
//! store deadline. Loaded by `parlance-infra`; all fields have sensible
//! defaults.

use serde::{Deserialize, Serialize};

use crate::limit::{OperationClass, RateLimit};

/// History cache sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Process-wide bound on cached session histories (FIFO-evicted).
    #[serde(default = "default_max_cached_sessions")]
    pub max_cached_sessions: usize,
}

fn default_max_cached_sessions() -> usize {
    100
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_cached_sessions: default_max_cached_sessions(),
        }
    }
}

/// Per-class admission budgets.
///
/// Each class owns an independent budget; exhausting one never affects
/// another.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitConfig {
    pub chat: RateLimit,
    pub file_upload: RateLimit,
    pub audio: RateLimit,
    pub auth: RateLimit,
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            chat: RateLimit {
                max_requests: 30,
                window_seconds: 60,
            },
            file_upload: RateLimit {
                max_requests: 10,
                window_seconds: 300,
            },
            audio: RateLimit {
                max_requests: 20,
                window_seconds: 60,
            },
            auth: RateLimit {
                max_requests: 5,
                window_seconds: 60,
            },
        }
    }
}

impl LimitConfig {
    /// The budget configured for a class.
    pub fn for_class(&self, class: OperationClass) -> RateLimit {
        match class {
            OperationClass::Chat => self.chat,
            OperationClass::FileUpload => self.file_upload,
            OperationClass::Audio => self.audio,
            OperationClass::Auth => self.auth,
        }
    }
}

/// Search scan bounds and the fuzzy acceptance threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Minimum similarity ratio for a non-substring line match.
    ///
    /// Deliberately low: history search favors recall over precision.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    /// At most this many sessions are scanned per search.
    #[serde(default = "default_max_scan_sessions")]
    pub max_scan_sessions: usize,
    /// At most this many messages are scanned per search.
    #[serde(default = "default_max_scan_messages")]
    pub max_scan_messages: usize,
}

fn default_similarity_threshold() -> f64 {
    0.2
}

fn default_max_scan_sessions() -> usize {
    50
}

fn default_max_scan_messages() -> usize {
    1000
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            max_scan_sessions: default_max_scan_sessions(),
            max_scan_messages: default_max_scan_messages(),
        }
    }
}

/// Top-level configuration for the session store.
///
/// Loaded from `{data_dir}/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Override for the SQLite database URL (derived from the data dir
    /// when absent).
    pub database_url: Option<String>,

    /// Deadline in milliseconds for individual store statements on the
    /// write path. A statement that exceeds it has an unknown outcome.
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,

    pub cache: CacheConfig,
    pub limits: LimitConfig,
    pub search: SearchConfig,
}

fn default_store_timeout_ms() -> u64 {
    5000
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            store_timeout_ms: default_store_timeout_ms(),
            cache: CacheConfig::default(),
            limits: LimitConfig::default(),
            search: SearchConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_config_default_values() {
        let config = GlobalConfig::default();
        assert_eq!(config.cache.max_cached_sessions, 100);
        assert_eq!(config.search.similarity_threshold, 0.2);
        assert_eq!(config.search.max_scan_sessions, 50);
        assert_eq!(config.search.max_scan_messages, 1000);
        assert_eq!(config.limits.chat.max_requests, 30);
        assert_eq!(config.store_timeout_ms, 5000);
        assert!(config.database_url.is_none());
    }

    #[test]
    fn test_global_config_partial_toml() {
        let config: GlobalConfig = toml::from_str(
            r#"
[cache]
max_cached_sessions = 8

[limits.chat]
max_requests = 3
window_seconds = 60
"#,
        )
        .unwrap();
        assert_eq!(config.cache.max_cached_sessions, 8);
        assert_eq!(config.limits.chat.max_requests, 3);
        // Untouched sections keep their defaults.
        assert_eq!(config.limits.auth.max_requests, 5);
        assert_eq!(config.search.similarity_threshold, 0.2);
    }

    #[test]
    fn test_limit_config_for_class() {
        let limits = LimitConfig::default();
        assert_eq!(limits.for_class(OperationClass::Auth).max_requests, 5);
        assert_eq!(
            limits.for_class(OperationClass::FileUpload).window_seconds,
            300
        );
    }
}
