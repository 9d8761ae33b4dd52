//! Per-instance connection pool.
//!
//! Wraps `reqwest::Client` (which keeps its own keep-alive pool) with
//! explicit concurrency bounds: a global semaphore for total in-flight
//! requests and one semaphore per host. A host's semaphore is dropped once
//! nothing holds or awaits it. Clients are built lazily, one for
//! verified TLS and one for unverified, and rebuilt on demand after
//! [`ConnectionPool::close`].

use crate::config::PoolSettings;
use dashmap::DashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

const USER_AGENT: &str = concat!("http-agent/", env!("CARGO_PKG_VERSION"));

#[derive(Default)]
struct Clients {
    verified: Option<reqwest::Client>,
    insecure: Option<reqwest::Client>,
}

impl Clients {
    fn is_empty(&self) -> bool {
        self.verified.is_none() && self.insecure.is_none()
    }
}

/// Permits held for the lifetime of one request.
pub struct PoolPermit {
    _total: OwnedSemaphorePermit,
    _host: Option<OwnedSemaphorePermit>,
}

/// Connection pool owned by one configured instance.
pub struct ConnectionPool {
    settings: PoolSettings,
    clients: Mutex<Clients>,
    total: Arc<Semaphore>,
    per_host: DashMap<String, Arc<Semaphore>>,
}

impl ConnectionPool {
    pub fn new(settings: PoolSettings) -> Self {
        Self {
            settings,
            clients: Mutex::new(Clients::default()),
            total: Arc::new(Semaphore::new(settings.max_connections.max(1))),
            per_host: DashMap::new(),
        }
    }

    pub fn settings(&self) -> PoolSettings {
        self.settings
    }

    /// Client for the given TLS mode, building it if needed.
    pub fn client(&self, verify_tls: bool) -> Result<reqwest::Client, reqwest::Error> {
        let mut clients = match self.clients.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let slot = if verify_tls {
            &mut clients.verified
        } else {
            &mut clients.insecure
        };
        if let Some(client) = slot {
            return Ok(client.clone());
        }

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .pool_max_idle_per_host(self.settings.max_per_host)
            .pool_idle_timeout(self.settings.idle_timeout)
            .danger_accept_invalid_certs(!verify_tls)
            .build()?;
        tracing::debug!("built HTTP client (verify_tls={verify_tls})");
        *slot = Some(client.clone());
        Ok(client)
    }

    /// Wait for a request slot, bounded globally and per host.
    pub async fn acquire(&self, host: Option<&str>) -> PoolPermit {
        let total = acquire_owned(&self.total).await;
        let host_permit = match host {
            Some(host) => {
                if !self.per_host.contains_key(host) {
                    self.prune_idle_hosts();
                }
                let semaphore = Arc::clone(
                    &*self
                        .per_host
                        .entry(host.to_string())
                        .or_insert_with(|| Arc::new(Semaphore::new(self.settings.max_per_host.max(1)))),
                );
                Some(acquire_owned(&semaphore).await)
            }
            None => None,
        };
        PoolPermit {
            _total: total,
            _host: host_permit,
        }
    }

    /// Hosts with a semaphore currently tracked.
    pub fn tracked_hosts(&self) -> usize {
        self.per_host.len()
    }

    // An entry only the map references has no permit out and no waiter.
    fn prune_idle_hosts(&self) {
        self.per_host.retain(|_, semaphore| Arc::strong_count(semaphore) > 1);
    }

    /// Whether any client is currently built.
    pub fn is_open(&self) -> bool {
        match self.clients.lock() {
            Ok(guard) => !guard.is_empty(),
            Err(poisoned) => !poisoned.into_inner().is_empty(),
        }
    }

    /// Drop the clients and their idle connections.
    ///
    /// Returns `true` if anything was released. Requests already holding a
    /// client finish on their own clone.
    pub fn close(&self) -> bool {
        let mut clients = match self.clients.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let released = !clients.is_empty();
        *clients = Clients::default();
        self.prune_idle_hosts();
        if released {
            tracing::debug!("connection pool closed");
        }
        released
    }
}

async fn acquire_owned(semaphore: &Arc<Semaphore>) -> OwnedSemaphorePermit {
    // The semaphores are never closed, so acquisition only waits.
    match Arc::clone(semaphore).acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => unreachable!("pool semaphore closed"),
    }
}
