use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{Cache, CacheResult, Lookup, OriginResponse};

/// In-process store, lives as long as the process
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, OriginResponse>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

#[cfg(test)]
impl MemoryCache {
    pub(crate) async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> CacheResult<Lookup> {
        let entries = self.entries.read().await;
        Ok(match entries.get(key) {
            Some(record) => Lookup::Found(record.clone()),
            None => Lookup::NotFound,
        })
    }

    async fn set(&self, key: &str, record: &OriginResponse) -> CacheResult<()> {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), record.clone());
        debug!("Cached response for key: {} (in-memory)", key);
        Ok(())
    }

    async fn clear_all(&self) -> CacheResult<()> {
        let mut entries = self.entries.write().await;
        let removed = entries.len();
        *entries = HashMap::new();
        info!("Cleared {} in-memory cache entries", removed);
        Ok(())
    }
}
