//! Client list and claim primitive

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Pages the worker can control
#[async_trait]
pub trait ClientRegistry: Send + Sync {
    /// Takes control of every open client, returning how many were claimed
    async fn claim(&self) -> usize;
}

/// Client registry for a host running in a single process
#[derive(Debug, Default)]
pub struct LocalClients {
    open: AtomicUsize,
    controlled: AtomicBool,
}

impl LocalClients {
    /// Registry with `open` clients, none of them controlled yet
    pub fn new(open: usize) -> Self {
        Self {
            open: AtomicUsize::new(open),
            controlled: AtomicBool::new(false),
        }
    }

    /// Whether the worker has claimed the open clients
    pub fn is_controlled(&self) -> bool {
        self.controlled.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClientRegistry for LocalClients {
    async fn claim(&self) -> usize {
        self.controlled.store(true, Ordering::SeqCst);
        self.open.load(Ordering::SeqCst)
    }
}
