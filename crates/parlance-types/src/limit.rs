//! Rate-limit operation classes and window configuration.

use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Named category of request with its own rate-limit configuration.
///
/// Classes never share counters: exhausting the `chat` budget leaves
/// `file_upload` untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationClass {
    Chat,
    FileUpload,
    Audio,
    Auth,
}

impl fmt::Display for OperationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationClass::Chat => write!(f, "chat"),
            OperationClass::FileUpload => write!(f, "file_upload"),
            OperationClass::Audio => write!(f, "audio"),
            OperationClass::Auth => write!(f, "auth"),
        }
    }
}

impl FromStr for OperationClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "chat" => Ok(OperationClass::Chat),
            "file_upload" => Ok(OperationClass::FileUpload),
            "audio" => Ok(OperationClass::Audio),
            "auth" => Ok(OperationClass::Auth),
            other => Err(format!("invalid operation class: '{other}'")),
        }
    }
}

/// A sliding-window admission budget: `max_requests` within the trailing
/// `window_seconds` interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    pub max_requests: u32,
    pub window_seconds: u64,
}

impl RateLimit {
    /// The window as a [`Duration`].
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_class_roundtrip() {
        for class in [
            OperationClass::Chat,
            OperationClass::FileUpload,
            OperationClass::Audio,
            OperationClass::Auth,
        ] {
            let s = class.to_string();
            let parsed: OperationClass = s.parse().unwrap();
            assert_eq!(class, parsed);
        }
    }

    #[test]
    fn test_operation_class_serde() {
        let json = serde_json::to_string(&OperationClass::FileUpload).unwrap();
        assert_eq!(json, "\"file_upload\"");
    }

    #[test]
    fn test_rate_limit_window() {
        let limit = RateLimit {
            max_requests: 3,
            window_seconds: 60,
        };
        assert_eq!(limit.window(), Duration::from_secs(60));
    }
}
