//! The caching worker
//!
//! Handles the three lifecycle events a host fires at an offline-caching
//! worker:
//!
//! - [`ServiceWorker::install`] pre-caches the configured assets, all or
//!   nothing.
//! - [`ServiceWorker::activate`] deletes caches left behind by previous
//!   versions and claims open clients.
//! - [`ServiceWorker::fetch`] serves a request network-first when it is
//!   volatile and cache-first otherwise. When daily invalidation is on, the
//!   first fetch of a new UTC day drops volatile entries before routing.

use futures::future::try_join_all;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cache::{CacheError, CacheStorage, CacheStore};
use crate::clients::{ClientRegistry, LocalClients};
use crate::config::{ConfigError, WorkerConfig};
use crate::freshness::{Clock, DayTracker, SystemClock};
use crate::network::{Network, NetworkError, Request, Response};
use crate::routing::{classify, ResourceKind, Strategy};

/// Errors surfaced by lifecycle events
#[derive(Debug, Error)]
pub enum WorkerError {
    /// An install-time asset could not be fetched
    #[error("install failed: could not fetch {url}: {source}")]
    InstallFetch {
        url: String,
        #[source]
        source: NetworkError,
    },

    /// An install-time asset answered with a non-2xx status
    #[error("install failed: {url} returned status {status}")]
    InstallStatus { url: String, status: u16 },

    /// Network-first request failed and nothing was cached for it
    #[error("offline and no cached response for {url}: {source}")]
    Offline {
        url: String,
        #[source]
        source: NetworkError,
    },

    /// Cache-first miss followed by a network failure
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// Cache storage operation failed
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Asset list could not be resolved
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Lifecycle phase of a worker instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    /// Created, no event handled yet
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
    /// Install failed; the worker must not be activated
    Redundant,
}

/// Where a fetch response came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServedFrom {
    Network,
    Cache,
}

impl std::fmt::Display for ServedFrom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServedFrom::Network => write!(f, "network"),
            ServedFrom::Cache => write!(f, "cache"),
        }
    }
}

/// Result of a handled fetch
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOutcome {
    /// Response handed back to the page
    pub response: Response,
    /// Origin of the response
    pub served_from: ServedFrom,
    /// Strategy the request was routed through
    pub strategy: Strategy,
}

/// Result of a completed activation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivateReport {
    /// Names of the caches that were deleted
    pub deleted: Vec<String>,
    /// Number of clients claimed
    pub claimed: usize,
}

/// An offline-caching worker bound to one cache version
pub struct ServiceWorker<S, N> {
    config: WorkerConfig,
    storage: S,
    network: N,
    clients: Arc<dyn ClientRegistry>,
    clock: Arc<dyn Clock>,
    day: DayTracker,
    phase: Mutex<LifecyclePhase>,
}

impl<S, N> ServiceWorker<S, N>
where
    S: CacheStorage,
    N: Network,
{
    /// Creates a worker using the system clock and no open clients
    pub fn new(config: WorkerConfig, storage: S, network: N) -> Self {
        Self {
            config,
            storage,
            network,
            clients: Arc::new(LocalClients::default()),
            clock: Arc::new(SystemClock),
            day: DayTracker::new(),
            phase: Mutex::new(LifecyclePhase::Parsed),
        }
    }

    /// Replaces the clock used for day-boundary invalidation
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the client registry claimed on activation
    pub fn with_clients(mut self, clients: Arc<dyn ClientRegistry>) -> Self {
        self.clients = clients;
        self
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> LifecyclePhase {
        match self.phase.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn set_phase(&self, phase: LifecyclePhase) {
        let mut guard = match self.phase.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        debug!(from = ?*guard, to = ?phase, "lifecycle transition");
        *guard = phase;
    }

    /// Opens the cache named by the current version
    async fn active_cache(&self) -> Result<S::Store, CacheError> {
        self.storage.open(&self.config.cache_name).await
    }

    /// Install event: fetches every configured asset and stores them
    ///
    /// All assets are fetched before anything is stored, so a failure leaves
    /// the cache untouched. Returns the number of stored entries.
    pub async fn install(&self) -> Result<usize, WorkerError> {
        self.set_phase(LifecyclePhase::Installing);

        match self.precache().await {
            Ok(count) => {
                self.set_phase(LifecyclePhase::Installed);
                info!(cache = %self.config.cache_name, assets = count, "installed");
                Ok(count)
            }
            Err(e) => {
                self.set_phase(LifecyclePhase::Redundant);
                warn!(cache = %self.config.cache_name, error = %e, "install failed");
                Err(e)
            }
        }
    }

    async fn precache(&self) -> Result<usize, WorkerError> {
        let urls = self.config.asset_urls()?;
        let cache = self.active_cache().await?;

        let fetches = urls.into_iter().map(|url| async move {
            let request = Request::get(url);
            let response =
                self.network
                    .fetch(&request)
                    .await
                    .map_err(|source| WorkerError::InstallFetch {
                        url: request.key().to_string(),
                        source,
                    })?;
            if !response.is_ok() {
                return Err(WorkerError::InstallStatus {
                    url: request.key().to_string(),
                    status: response.status,
                });
            }
            Ok((request, response))
        });
        let fetched = try_join_all(fetches).await?;

        let count = fetched.len();
        for (request, response) in fetched {
            cache.put(&request, response).await?;
        }
        Ok(count)
    }

    /// Activate event: deletes every cache not named by the current version,
    /// then claims open clients
    pub async fn activate(&self) -> Result<ActivateReport, WorkerError> {
        self.set_phase(LifecyclePhase::Activating);

        let stale: Vec<String> = self
            .storage
            .keys()
            .await?
            .into_iter()
            .filter(|name| *name != self.config.cache_name)
            .collect();

        try_join_all(stale.iter().map(|name| self.storage.delete(name))).await?;
        for name in &stale {
            info!(cache = %name, "deleted stale cache");
        }

        let claimed = self.clients.claim().await;
        self.set_phase(LifecyclePhase::Activated);
        info!(cache = %self.config.cache_name, claimed, "activated");

        Ok(ActivateReport {
            deleted: stale,
            claimed,
        })
    }

    /// Fetch event: routes the request and returns the response to serve
    pub async fn fetch(&self, request: &Request) -> Result<FetchOutcome, WorkerError> {
        if self.config.daily_invalidation && self.day.observe(self.clock.today()) {
            let removed = self.invalidate_volatile().await?;
            info!(removed, "new day, dropped volatile entries");
        }

        let kind = self.classify(request);
        let strategy = kind.strategy();
        debug!(url = %request.url, %strategy, "routing fetch");

        match strategy {
            Strategy::NetworkFirst => self.network_first(request).await,
            Strategy::CacheFirst => self.cache_first(request).await,
        }
    }

    /// Classifies a request against the configured volatile rules
    pub fn classify(&self, request: &Request) -> ResourceKind {
        classify(&request.url, &self.config.scope, &self.config.volatile)
    }

    /// Removes every volatile entry from the active cache
    pub async fn invalidate_volatile(&self) -> Result<usize, WorkerError> {
        let cache = self.active_cache().await?;
        let mut removed = 0;
        for request in cache.keys().await? {
            if self.classify(&request) == ResourceKind::Volatile && cache.delete(&request).await? {
                debug!(url = %request.url, "invalidated");
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn network_first(&self, request: &Request) -> Result<FetchOutcome, WorkerError> {
        match self.network.fetch(request).await {
            Ok(response) => {
                // Write-back is not part of the response path
                match self.active_cache().await {
                    Ok(cache) => {
                        if let Err(e) = cache.put(request, response.clone()).await {
                            warn!(url = %request.url, error = %e, "failed to cache response");
                        }
                    }
                    Err(e) => warn!(url = %request.url, error = %e, "failed to open cache"),
                }
                Ok(FetchOutcome {
                    response,
                    served_from: ServedFrom::Network,
                    strategy: Strategy::NetworkFirst,
                })
            }
            Err(network_error) => {
                warn!(url = %request.url, error = %network_error, "network failed, trying cache");
                let cache = self.active_cache().await?;
                match cache.match_request(request).await? {
                    Some(response) => Ok(FetchOutcome {
                        response,
                        served_from: ServedFrom::Cache,
                        strategy: Strategy::NetworkFirst,
                    }),
                    None => Err(WorkerError::Offline {
                        url: request.key().to_string(),
                        source: network_error,
                    }),
                }
            }
        }
    }

    async fn cache_first(&self, request: &Request) -> Result<FetchOutcome, WorkerError> {
        let cache = self.active_cache().await?;
        if let Some(response) = cache.match_request(request).await? {
            return Ok(FetchOutcome {
                response,
                served_from: ServedFrom::Cache,
                strategy: Strategy::CacheFirst,
            });
        }

        let response = self.network.fetch(request).await?;
        Ok(FetchOutcome {
            response,
            served_from: ServedFrom::Network,
            strategy: Strategy::CacheFirst,
        })
    }
}
