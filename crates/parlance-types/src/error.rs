use thiserror::Error;

use crate::limit::OperationClass;

/// Errors from store operations (used by trait definitions in
/// parlance-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    /// A statement exceeded its deadline. The write may or may not have
    /// committed; callers must re-read current state before retrying.
    #[error("statement deadline exceeded; outcome unknown")]
    Timeout,
}

/// Errors surfaced by the chat session service.
///
/// `RateLimited` and `NotFound` are expected outcomes on hot paths and are
/// returned as values, never panics. `Storage` keeps the engine error as a
/// source for logging while displaying a generic message to callers.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("rate limited: {max_requests} {class} requests per {window_seconds}s")]
    RateLimited {
        class: OperationClass,
        max_requests: u32,
        window_seconds: u64,
    },

    #[error("session not found")]
    NotFound,

    #[error("storage failure")]
    Storage(#[source] RepositoryError),

    #[error("invalid input: {0}")]
    Validation(String),
}

impl From<RepositoryError> for ChatError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound => ChatError::NotFound,
            other => ChatError::Storage(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_error_display() {
        let err = RepositoryError::Query("syntax error".to_string());
        assert_eq!(err.to_string(), "query error: syntax error");
    }

    #[test]
    fn test_rate_limited_display_names_the_window() {
        let err = ChatError::RateLimited {
            class: OperationClass::Chat,
            max_requests: 30,
            window_seconds: 60,
        };
        assert_eq!(err.to_string(), "rate limited: 30 chat requests per 60s");
    }

    #[test]
    fn test_storage_display_is_generic() {
        let err = ChatError::Storage(RepositoryError::Query("disk I/O error".to_string()));
        // Engine internals stay out of the caller-facing message.
        assert_eq!(err.to_string(), "storage failure");
    }

    #[test]
    fn test_repository_not_found_maps_to_chat_not_found() {
        let err: ChatError = RepositoryError::NotFound.into();
        assert!(matches!(err, ChatError::NotFound));
    }
}
