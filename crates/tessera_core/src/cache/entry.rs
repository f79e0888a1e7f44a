//! Cached values with their expiry.

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};

/// One cached value.
///
/// Entries are immutable; a write replaces the whole entry. Expiry is
/// checked lazily against a caller-supplied `now`, so tests can drive it
/// with a simulated clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    /// Cache key.
    pub key: String,
    /// The cached value.
    pub value: T,
    /// When the entry was written.
    pub created_at: SystemTime,
    /// When the entry stops being served.
    pub expires_at: SystemTime,
}

impl<T> CacheEntry<T> {
    /// Creates an entry written at `now` that lives for `ttl`.
    pub fn new(key: impl Into<String>, value: T, now: SystemTime, ttl: Duration) -> Self {
        Self {
            key: key.into(),
            value,
            created_at: now,
            expires_at: now.checked_add(ttl).unwrap_or(now),
        }
    }

    /// Returns true once `now` has reached the expiry time.
    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        now >= self.expires_at
    }

    /// Remaining lifetime at `now`; zero once expired.
    pub fn time_to_live_at(&self, now: SystemTime) -> Duration {
        self.expires_at.duration_since(now).unwrap_or(Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_boundaries() {
        let start = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        let entry = CacheEntry::new("k", 1, start, Duration::from_secs(10));

        assert!(!entry.is_expired_at(start));
        assert_eq!(entry.time_to_live_at(start), Duration::from_secs(10));

        let almost = start + Duration::from_secs(9);
        assert!(!entry.is_expired_at(almost));
        assert_eq!(entry.time_to_live_at(almost), Duration::from_secs(1));

        let at = start + Duration::from_secs(10);
        assert!(entry.is_expired_at(at));
        assert_eq!(entry.time_to_live_at(at), Duration::ZERO);
        assert_eq!(entry.time_to_live_at(at + Duration::from_secs(5)), Duration::ZERO);
    }

    #[test]
    fn zero_ttl_is_expired_immediately() {
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(42);
        let entry = CacheEntry::new("k", "v", now, Duration::ZERO);
        assert!(entry.is_expired_at(now));
    }
}
