//! Cache storage for intercepted responses
//!
//! Mirrors the host's cache-storage API: a [`CacheStorage`] holds named
//! caches, each a [`CacheStore`] mapping request URLs to responses. Two
//! backends are provided, an in-memory one and a disk one that persists
//! entries under an XDG-compliant cache directory.

mod disk;
mod memory;

pub use disk::{DiskCacheStorage, DiskCacheStore};
pub use memory::{MemoryCacheStorage, MemoryCacheStore};

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

use crate::network::{Request, Response};

/// Errors that can occur in cache storage operations
#[derive(Debug, Error)]
pub enum CacheError {
    /// Reading or writing the backing store failed
    #[error("cache I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// An entry's metadata could not be parsed
    #[error("corrupt cache entry {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A single named cache
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Returns the stored response for the request, if any
    async fn match_request(&self, request: &Request) -> Result<Option<Response>, CacheError>;

    /// Stores the response under the request, replacing any previous entry
    async fn put(&self, request: &Request, response: Response) -> Result<(), CacheError>;

    /// Removes the entry for the request, returning whether one existed
    async fn delete(&self, request: &Request) -> Result<bool, CacheError>;

    /// Requests of all stored entries
    async fn keys(&self) -> Result<Vec<Request>, CacheError>;
}

/// The collection of named caches
#[async_trait]
pub trait CacheStorage: Send + Sync {
    type Store: CacheStore;

    /// Opens the named cache, creating it if absent
    async fn open(&self, name: &str) -> Result<Self::Store, CacheError>;

    /// Names of all existing caches
    async fn keys(&self) -> Result<Vec<String>, CacheError>;

    /// Deletes the named cache, returning whether it existed
    async fn delete(&self, name: &str) -> Result<bool, CacheError>;
}
