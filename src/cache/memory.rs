//! In-memory cache storage

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{CacheError, CacheStorage, CacheStore};
use crate::network::{Request, Response};

/// Cache storage that lives for the lifetime of the process
///
/// Clones share the same underlying caches.
#[derive(Debug, Clone, Default)]
pub struct MemoryCacheStorage {
    caches: Arc<RwLock<BTreeMap<String, MemoryCacheStore>>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A named in-memory cache; entries are kept sorted by URL
#[derive(Debug, Clone, Default)]
pub struct MemoryCacheStore {
    entries: Arc<RwLock<BTreeMap<String, (Request, Response)>>>,
}

impl MemoryCacheStore {
    /// Number of stored entries
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the cache holds no entries
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn match_request(&self, request: &Request) -> Result<Option<Response>, CacheError> {
        let entries = self.entries.read().await;
        Ok(entries.get(request.key()).map(|(_, response)| response.clone()))
    }

    async fn put(&self, request: &Request, response: Response) -> Result<(), CacheError> {
        let mut entries = self.entries.write().await;
        entries.insert(request.key().to_string(), (request.clone(), response));
        Ok(())
    }

    async fn delete(&self, request: &Request) -> Result<bool, CacheError> {
        let mut entries = self.entries.write().await;
        Ok(entries.remove(request.key()).is_some())
    }

    async fn keys(&self) -> Result<Vec<Request>, CacheError> {
        let entries = self.entries.read().await;
        Ok(entries.values().map(|(request, _)| request.clone()).collect())
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    type Store = MemoryCacheStore;

    async fn open(&self, name: &str) -> Result<Self::Store, CacheError> {
        let mut caches = self.caches.write().await;
        Ok(caches.entry(name.to_string()).or_default().clone())
    }

    async fn keys(&self) -> Result<Vec<String>, CacheError> {
        Ok(self.caches.read().await.keys().cloned().collect())
    }

    async fn delete(&self, name: &str) -> Result<bool, CacheError> {
        Ok(self.caches.write().await.remove(name).is_some())
    }
}
