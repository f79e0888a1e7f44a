//! Cache configuration and environment profiles.

use crate::error::{CoreResult, Failure};
use serde::Deserialize;
use std::time::Duration;
use tessera_storage::EncryptionKey;

/// Which entries go first when the cache is over capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    /// Oldest write first. Reads don't affect order.
    #[default]
    LeastRecentlyWritten,
    /// Oldest access first. Reads refresh an entry.
    LeastRecentlyUsed,
}

/// Named configuration presets.
///
/// Hosts usually pick one from their own config file:
///
/// ```rust
/// use tessera_core::cache::CacheProfile;
///
/// let profile: CacheProfile = serde_json::from_str("\"production\"").unwrap();
/// assert_eq!(profile, CacheProfile::Production);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheProfile {
    /// Short-lived, small, unencrypted.
    Development,
    /// Long-lived, larger, sensitive keyspaces encrypted at rest.
    Production,
}

/// Encryption at rest for persisted entries.
#[derive(Debug, Clone)]
pub struct CacheEncryption {
    /// Data key.
    pub key: EncryptionKey,
    /// Cache key prefixes whose entries are encrypted.
    pub keyspaces: Vec<String>,
}

/// Configuration for a [`Cache`](super::Cache).
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// TTL used when a write doesn't give one.
    pub default_ttl: Duration,
    /// Most entries held in memory.
    pub max_entries: usize,
    /// Eviction order.
    pub eviction: EvictionPolicy,
    /// Encryption for persisted entries, if any.
    pub encryption: Option<CacheEncryption>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::development()
    }
}

impl CacheConfig {
    /// Keyspaces encrypted by the production profile.
    pub const SENSITIVE_KEYSPACES: [&'static str; 3] = ["auth/", "session/", "user/"];

    /// 5-minute TTL, 256 entries, no encryption.
    pub fn development() -> Self {
        Self {
            default_ttl: Duration::from_secs(5 * 60),
            max_entries: 256,
            eviction: EvictionPolicy::LeastRecentlyWritten,
            encryption: None,
        }
    }

    /// 24-hour TTL, 2048 entries, sensitive keyspaces encrypted with `key`.
    pub fn production(key: EncryptionKey) -> Self {
        Self {
            default_ttl: Duration::from_secs(24 * 60 * 60),
            max_entries: 2048,
            eviction: EvictionPolicy::LeastRecentlyWritten,
            encryption: Some(CacheEncryption {
                key,
                keyspaces: Self::SENSITIVE_KEYSPACES
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            }),
        }
    }

    /// Builds the configuration for `profile`.
    ///
    /// # Errors
    ///
    /// Returns a cache failure if the production profile is asked for
    /// without a key.
    pub fn from_profile(profile: CacheProfile, key: Option<EncryptionKey>) -> CoreResult<Self> {
        match (profile, key) {
            (CacheProfile::Development, _) => Ok(Self::development()),
            (CacheProfile::Production, Some(key)) => Ok(Self::production(key)),
            (CacheProfile::Production, None) => Err(Failure::cache(
                "production cache profile requires an encryption key",
            )),
        }
    }

    /// Sets the default TTL.
    #[must_use]
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Sets the capacity. Raised to at least 1.
    #[must_use]
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries.max(1);
        self
    }

    /// Sets the eviction policy.
    #[must_use]
    pub fn with_eviction(mut self, eviction: EvictionPolicy) -> Self {
        self.eviction = eviction;
        self
    }

    /// Encrypts persisted entries under `keyspaces` with `key`.
    #[must_use]
    pub fn with_encryption<I, S>(mut self, key: EncryptionKey, keyspaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.encryption = Some(CacheEncryption {
            key,
            keyspaces: keyspaces.into_iter().map(Into::into).collect(),
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profiles() {
        let dev = CacheConfig::development();
        assert_eq!(dev.default_ttl, Duration::from_secs(300));
        assert_eq!(dev.max_entries, 256);
        assert!(dev.encryption.is_none());

        let prod = CacheConfig::production(EncryptionKey::generate());
        assert_eq!(prod.default_ttl, Duration::from_secs(86_400));
        assert_eq!(prod.max_entries, 2048);
        let keyspaces = prod.encryption.map(|e| e.keyspaces).unwrap();
        assert_eq!(keyspaces, ["auth/", "session/", "user/"]);
    }

    #[test]
    fn production_profile_needs_a_key() {
        assert!(CacheConfig::from_profile(CacheProfile::Production, None).is_err());
        assert!(CacheConfig::from_profile(CacheProfile::Development, None).is_ok());
    }

    #[test]
    fn eviction_policy_from_config() {
        let policy: EvictionPolicy = serde_json::from_str("\"least_recently_used\"").unwrap();
        assert_eq!(policy, EvictionPolicy::LeastRecentlyUsed);
    }
}
