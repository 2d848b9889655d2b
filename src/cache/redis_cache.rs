use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tracing::{debug, info, warn};

use super::{Cache, CacheError, CacheResult, Lookup, OriginResponse};

/// JSON path addressing the whole document
const ROOT_PATH: &str = ".";

/// Shared store backed by a RedisJSON-enabled server.
///
/// Each entry is one JSON document at the cache key. Several proxy
/// processes pointed at the same database share their cache.
#[derive(Clone)]
pub struct RedisCache {
    connection: ConnectionManager,
}

impl RedisCache {
    /// Open a managed connection and check it with `PING`.
    pub async fn connect(url: &str) -> CacheResult<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| CacheError::Connection(format!("error parsing redis url: {}", e)))?;

        let mut connection = client
            .get_connection_manager()
            .await
            .map_err(|e| CacheError::Connection(format!("error connecting to redis: {}", e)))?;

        let _: String = redis::cmd("PING")
            .query_async(&mut connection)
            .await
            .map_err(|e| CacheError::Connection(format!("error connecting to redis: {}", e)))?;

        info!("Connected to redis cache store");
        Ok(Self { connection })
    }
}

fn encode_document(record: &OriginResponse) -> CacheResult<String> {
    Ok(serde_json::to_string(record)?)
}

fn decode_document(document: Option<String>) -> CacheResult<Lookup> {
    match document {
        Some(json) => Ok(Lookup::Found(serde_json::from_str(&json)?)),
        None => Ok(Lookup::NotFound),
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> CacheResult<Lookup> {
        let mut connection = self.connection.clone();
        let document: Option<String> = redis::cmd("JSON.GET")
            .arg(key)
            .arg(ROOT_PATH)
            .query_async(&mut connection)
            .await?;

        decode_document(document)
    }

    async fn set(&self, key: &str, record: &OriginResponse) -> CacheResult<()> {
        let document = encode_document(record)?;
        let mut connection = self.connection.clone();
        let _: () = redis::cmd("JSON.SET")
            .arg(key)
            .arg(ROOT_PATH)
            .arg(document)
            .query_async(&mut connection)
            .await?;

        debug!("Cached response for key: {} (redis)", key);
        Ok(())
    }

    async fn clear_all(&self) -> CacheResult<()> {
        let mut connection = self.connection.clone();
        let _: () = redis::cmd("FLUSHDB").query_async(&mut connection).await?;
        warn!("Flushed the entire redis database backing the cache");
        Ok(())
    }
}
