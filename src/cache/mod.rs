//! Response stores used by the proxy.
//!
//! A store maps a cache key to an [`OriginResponse`]. Lookups report a
//! missing entry as [`Lookup::NotFound`]; [`CacheError`] is reserved for a
//! store that is actually failing, so callers never confuse the two.
//!
//! Entries never expire. They live until [`Cache::clear_all`] wipes the
//! whole store.

pub mod memory;
pub mod record;
pub mod redis_cache;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryCache;
pub use record::OriginResponse;
pub use redis_cache::RedisCache;

/// Outcome of a successful lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Found(OriginResponse),
    NotFound,
}

/// Store faults (never a plain miss)
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Failed to encode or decode cached response: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to connect to cache store: {0}")]
    Connection(String),
}

pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Capability set the proxy needs from a response store
#[async_trait]
pub trait Cache: Send + Sync {
    /// Look up the record stored under `key`
    async fn get(&self, key: &str) -> CacheResult<Lookup>;

    /// Store `record` under `key`, replacing whatever was there
    async fn set(&self, key: &str, record: &OriginResponse) -> CacheResult<()>;

    /// Erase every entry in the backing store.
    ///
    /// This is not scoped to keys written by this proxy. For a shared
    /// store it wipes the whole database, including data other clients
    /// keep there.
    async fn clear_all(&self) -> CacheResult<()>;
}
