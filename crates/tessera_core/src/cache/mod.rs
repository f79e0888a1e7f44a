//! TTL/size-bounded cache tier with optional encrypted persistence.
//!
//! ```rust
//! use tessera_core::cache::{Cache, CacheConfig};
//! use std::time::Duration;
//!
//! let cache: Cache<String> = Cache::new(CacheConfig::development());
//! cache.set("feed/1", "hello".to_string(), Some(Duration::from_secs(30))).unwrap();
//! assert_eq!(cache.get("feed/1").unwrap().as_deref(), Some("hello"));
//! ```

mod clock;
mod config;
mod entry;
mod tier;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CacheConfig, CacheEncryption, CacheProfile, EvictionPolicy};
pub use entry::CacheEntry;
pub use tier::{Cache, CacheStats};
