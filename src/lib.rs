//! Offline asset caching worker
//!
//! Pre-caches a versioned asset list, removes caches from older versions and
//! serves fetches network-first for volatile data and cache-first for static
//! assets. The host platform (cache storage, network, clients, clock) is
//! reached through async traits so the worker runs against disk and HTTP in
//! the `swcache` binary and against in-memory stubs in tests.

pub mod cache;
pub mod cli;
pub mod clients;
pub mod config;
pub mod freshness;
pub mod network;
pub mod routing;
pub mod worker;

pub use cache::{CacheError, CacheStorage, CacheStore, DiskCacheStorage, MemoryCacheStorage};
pub use clients::{ClientRegistry, LocalClients};
pub use config::{ConfigError, Preset, WorkerConfig};
pub use freshness::{should_invalidate, Clock, DayTracker, SystemClock};
pub use network::{HttpNetwork, Network, NetworkError, Request, Response};
pub use routing::{classify, ResourceKind, Strategy, VolatileRule};
pub use worker::{
    ActivateReport, FetchOutcome, LifecyclePhase, ServedFrom, ServiceWorker, WorkerError,
};
