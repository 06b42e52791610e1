//! Sliding-window admission control.
//!
//! Counts admissions per (operation class, identity) within a trailing
//! window on the monotonic clock. State is in-memory only and resets on
//! restart: admission control here is soft backpressure, not an audit log.

use std::collections::VecDeque;
use std::time::Instant;

use dashmap::DashMap;

use parlance_types::config::LimitConfig;
use parlance_types::identity::Identity;
use parlance_types::limit::{OperationClass, RateLimit};

/// Sliding-window rate limiter keyed by (operation class, identity).
///
/// Each class owns an independently configured budget and an independent
/// timestamp table; classes never share counters. Admission checks for a
/// given key are linearizable: the per-entry lock covers the prune, the
/// count, and the append.
pub struct SlidingWindowLimiter {
    limits: LimitConfig,
    admissions: DashMap<(OperationClass, String), VecDeque<Instant>>,
}

impl SlidingWindowLimiter {
    /// Create a limiter with the given per-class budgets.
    pub fn new(limits: LimitConfig) -> Self {
        Self {
            limits,
            admissions: DashMap::new(),
        }
    }

    /// Whether `identity` may perform one more `class` operation now.
    ///
    /// Rejection records nothing, so a rejected caller does not consume
    /// budget. Never fails: absence of admission is the `false` return.
    pub fn admit(&self, class: OperationClass, identity: &Identity) -> bool {
        self.admit_at(Instant::now(), class, identity)
    }

    /// Deterministic-clock variant of [`Self::admit`].
    ///
    /// `now` must be monotone non-decreasing per key for the window
    /// arithmetic to hold.
    pub fn admit_at(&self, now: Instant, class: OperationClass, identity: &Identity) -> bool {
        let limit = self.limits.for_class(class);
        let window = limit.window();

        let mut timestamps = self
            .admissions
            .entry((class, identity.as_str().to_string()))
            .or_default();

        while let Some(&oldest) = timestamps.front() {
            if now.duration_since(oldest) >= window {
                timestamps.pop_front();
            } else {
                break;
            }
        }

        if timestamps.len() >= limit.max_requests as usize {
            return false;
        }
        timestamps.push_back(now);
        true
    }

    /// The configured budget for a class.
    pub fn limit_info(&self, class: OperationClass) -> RateLimit {
        self.limits.for_class(class)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn limiter(max_requests: u32, window_seconds: u64) -> SlidingWindowLimiter {
        let limit = RateLimit {
            max_requests,
            window_seconds,
        };
        SlidingWindowLimiter::new(LimitConfig {
            chat: limit,
            file_upload: limit,
            audio: limit,
            auth: limit,
        })
    }

    fn ident(name: &str) -> Identity {
        Identity::new(name).unwrap()
    }

    #[test]
    fn test_window_admits_then_rejects_then_recovers() {
        let limiter = limiter(3, 60);
        let alice = ident("alice");
        let t0 = Instant::now();

        for _ in 0..3 {
            assert!(limiter.admit_at(t0, OperationClass::Chat, &alice));
        }
        assert!(!limiter.admit_at(t0, OperationClass::Chat, &alice));

        // The window has slid past the first three admissions.
        let t61 = t0 + Duration::from_secs(61);
        assert!(limiter.admit_at(t61, OperationClass::Chat, &alice));
    }

    #[test]
    fn test_rejection_consumes_no_budget() {
        let limiter = limiter(2, 60);
        let alice = ident("alice");
        let t0 = Instant::now();

        assert!(limiter.admit_at(t0, OperationClass::Chat, &alice));
        assert!(limiter.admit_at(t0, OperationClass::Chat, &alice));
        // Rejected calls must not extend the window or grow the table.
        for i in 1..10 {
            let t = t0 + Duration::from_secs(i);
            assert!(!limiter.admit_at(t, OperationClass::Chat, &alice));
        }
        let t61 = t0 + Duration::from_secs(61);
        assert!(limiter.admit_at(t61, OperationClass::Chat, &alice));
    }

    #[test]
    fn test_classes_do_not_share_counters() {
        let limiter = limiter(1, 60);
        let alice = ident("alice");
        let t0 = Instant::now();

        assert!(limiter.admit_at(t0, OperationClass::Chat, &alice));
        assert!(!limiter.admit_at(t0, OperationClass::Chat, &alice));
        assert!(limiter.admit_at(t0, OperationClass::FileUpload, &alice));
        assert!(limiter.admit_at(t0, OperationClass::Auth, &alice));
    }

    #[test]
    fn test_identities_do_not_share_counters() {
        let limiter = limiter(1, 60);
        let t0 = Instant::now();

        assert!(limiter.admit_at(t0, OperationClass::Chat, &ident("alice")));
        assert!(!limiter.admit_at(t0, OperationClass::Chat, &ident("alice")));
        assert!(limiter.admit_at(t0, OperationClass::Chat, &ident("bob")));
    }

    #[test]
    fn test_limit_info_exposes_configuration() {
        let limiter = limiter(3, 60);
        let info = limiter.limit_info(OperationClass::Audio);
        assert_eq!(info.max_requests, 3);
        assert_eq!(info.window_seconds, 60);
    }

    #[tokio::test]
    async fn test_concurrent_admissions_never_overshoot() {
        let limiter = std::sync::Arc::new(limiter(10, 60));
        let alice = ident("alice");

        let mut handles = Vec::new();
        for _ in 0..50 {
            let limiter = std::sync::Arc::clone(&limiter);
            let alice = alice.clone();
            handles.push(tokio::spawn(async move {
                limiter.admit(OperationClass::Chat, &alice)
            }));
        }

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 10);
    }
}
