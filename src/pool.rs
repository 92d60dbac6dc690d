//! Core proxy pool implementation.

use crate::error::{FailureReason, PoolError};
use crate::proxy::{ProxyEndpoint, UsageStats};
use crate::transport::{OutboundRequest, ProxiedResponse, RequestOptions, ReqwestTransport, Transport};

use futures::stream::{self, StreamExt};
use http::{Method, StatusCode};
use log::{debug, info, warn};
use parking_lot::Mutex;
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Default number of probes a validation sweep keeps in flight.
pub const DEFAULT_PROBE_CONCURRENCY: usize = 16;

/// Health predicate that only accepts `200 OK`.
pub fn status_is_ok(response: &ProxiedResponse) -> bool {
    response.status == StatusCode::OK
}

/// Ordered endpoints plus the round-robin cursor.
///
/// While `endpoints` is non-empty `cursor < endpoints.len()`; while empty the
/// cursor is 0.
#[derive(Debug, Default)]
struct Rotation {
    endpoints: Vec<ProxyEndpoint>,
    cursor: usize,
}

impl Rotation {
    fn new(endpoints: Vec<ProxyEndpoint>) -> Self {
        Self {
            endpoints,
            cursor: 0,
        }
    }

    fn push(&mut self, endpoint: ProxyEndpoint) {
        self.endpoints.push(endpoint);
    }

    fn remove(&mut self, endpoint: &ProxyEndpoint) -> bool {
        let Some(idx) = self.endpoints.iter().position(|e| e == endpoint) else {
            return false;
        };
        self.endpoints.remove(idx);

        if self.endpoints.is_empty() {
            self.cursor = 0;
        } else if idx < self.cursor {
            self.cursor -= 1;
        } else if self.cursor >= self.endpoints.len() {
            // The removed member was the last one and was up next.
            self.cursor = 0;
        }
        true
    }

    fn next(&mut self) -> Option<ProxyEndpoint> {
        let endpoint = self.endpoints.get(self.cursor)?.clone();
        self.cursor = (self.cursor + 1) % self.endpoints.len();
        Some(endpoint)
    }

    fn random(&self) -> Option<ProxyEndpoint> {
        if self.endpoints.is_empty() {
            return None;
        }
        let idx = rand::rng().random_range(0..self.endpoints.len());
        Some(self.endpoints[idx].clone())
    }

    fn contains(&self, endpoint: &ProxyEndpoint) -> bool {
        self.endpoints.contains(endpoint)
    }

    /// Drop up to `quota[e]` occurrences of each endpoint `e`, first matches
    /// first, returning how many entries were dropped.
    ///
    /// Occurrences beyond the quota (appended after the quota was taken) stay.
    fn prune(&mut self, mut quota: HashMap<ProxyEndpoint, usize>) -> usize {
        let before = self.endpoints.len();
        self.endpoints.retain(|e| match quota.get_mut(e) {
            Some(left) if *left > 0 => {
                *left -= 1;
                false
            }
            _ => true,
        });
        let removed = before - self.endpoints.len();
        if removed > 0 {
            self.cursor = 0;
        }
        removed
    }
}

/// Why a single member failed its health probe.
#[derive(Debug, Error)]
enum CheckFailed {
    #[error("health check timed out")]
    TimedOut,
    #[error("{0}")]
    Transport(FailureReason),
    #[error("unhealthy response {0}")]
    Unhealthy(StatusCode),
}

/// Summary of one validation sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    /// Number of distinct endpoints probed.
    pub checked: usize,
    /// Pool size after the sweep.
    pub retained: usize,
    /// Endpoints that failed their probe, in pool order.
    pub removed: Vec<ProxyEndpoint>,
}

/// A rotating pool of proxy endpoints.
///
/// Insertion order is rotation order. All rotation state sits behind one lock,
/// so concurrent callers of [`ProxyPool::next_proxy`] each get their own
/// cursor position.
pub struct ProxyPool {
    rotation: Mutex<Rotation>,
    stats: Mutex<HashMap<ProxyEndpoint, UsageStats>>,
    /// Held for the whole of a validation sweep.
    sweep: tokio::sync::Mutex<()>,
    transport: Arc<dyn Transport>,
    probe_concurrency: usize,
}

impl ProxyPool {
    /// Create a pool that probes through a default [`ReqwestTransport`].
    pub fn new(endpoints: Vec<ProxyEndpoint>) -> Self {
        Self::with_transport(endpoints, Arc::new(ReqwestTransport::default()))
    }

    /// Create a pool that probes through the given transport.
    pub fn with_transport(endpoints: Vec<ProxyEndpoint>, transport: Arc<dyn Transport>) -> Self {
        info!("Proxy pool created with {} proxies", endpoints.len());
        Self {
            rotation: Mutex::new(Rotation::new(endpoints)),
            stats: Mutex::new(HashMap::new()),
            sweep: tokio::sync::Mutex::new(()),
            transport,
            probe_concurrency: DEFAULT_PROBE_CONCURRENCY,
        }
    }

    /// Set how many probes a validation sweep runs at once.
    pub fn probe_concurrency(mut self, concurrency: usize) -> Self {
        self.probe_concurrency = concurrency.max(1);
        self
    }

    /// The transport used for probes.
    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }

    /// Append an endpoint to the end of the rotation.
    pub fn add(&self, endpoint: ProxyEndpoint) {
        info!("Proxy added: {}", endpoint);
        self.rotation.lock().push(endpoint);
    }

    /// Remove the first occurrence of `endpoint`.
    ///
    /// The member that would have been handed out next is still handed out
    /// next, unless it is the one being removed, in which case its successor is.
    pub fn remove(&self, endpoint: &ProxyEndpoint) -> Result<(), PoolError> {
        let mut rotation = self.rotation.lock();
        if rotation.remove(endpoint) {
            if !rotation.contains(endpoint) {
                self.stats.lock().remove(endpoint);
            }
            info!("Proxy removed: {}", endpoint);
            Ok(())
        } else {
            warn!("Proxy not found: {}", endpoint);
            Err(PoolError::NotFound(endpoint.clone()))
        }
    }

    /// Round-robin draw: return the endpoint at the cursor and advance it.
    pub fn next_proxy(&self) -> Result<ProxyEndpoint, PoolError> {
        self.rotation.lock().next().ok_or(PoolError::EmptyPool)
    }

    /// Uniform random draw; the cursor is not touched.
    pub fn random_proxy(&self) -> Result<ProxyEndpoint, PoolError> {
        self.rotation.lock().random().ok_or(PoolError::EmptyPool)
    }

    /// Snapshot of the rotation order.
    pub fn endpoints(&self) -> Vec<ProxyEndpoint> {
        self.rotation.lock().endpoints.clone()
    }

    /// Index the next round-robin draw will return.
    pub fn cursor(&self) -> usize {
        self.rotation.lock().cursor
    }

    pub fn len(&self) -> usize {
        self.rotation.lock().endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rotation.lock().endpoints.is_empty()
    }

    /// Report a successful request through a proxy.
    pub fn report_success(&self, endpoint: &ProxyEndpoint) {
        self.stats.lock().entry(endpoint.clone()).or_default().success_count += 1;
    }

    /// Report a failed request through a proxy.
    pub fn report_failure(&self, endpoint: &ProxyEndpoint) {
        self.stats.lock().entry(endpoint.clone()).or_default().failure_count += 1;
    }

    /// Whether `endpoint` currently has at least one occurrence in the pool.
    pub fn contains(&self, endpoint: &ProxyEndpoint) -> bool {
        self.rotation.lock().contains(endpoint)
    }

    /// Request counters recorded for `endpoint`.
    ///
    /// Counters are discarded once the endpoint's last occurrence leaves the pool.
    pub fn usage(&self, endpoint: &ProxyEndpoint) -> UsageStats {
        self.stats.lock().get(endpoint).copied().unwrap_or_default()
    }

    /// Probe every member and keep only those that answer healthy within `timeout`.
    ///
    /// Each distinct endpoint is probed once with a `GET test_url` routed
    /// through it. Survivors keep their relative order, and the cursor goes
    /// back to 0 if anything was dropped. Endpoints added while the sweep is
    /// running were never probed and are kept, even when they equal a member
    /// that failed.
    pub async fn validate<F>(&self, test_url: &str, timeout: Duration, is_healthy: F) -> ValidationReport
    where
        F: Fn(&ProxiedResponse) -> bool,
    {
        let _sweep = self.sweep.lock().await;

        let snapshot = self.endpoints();
        let candidates: Vec<ProxyEndpoint> = {
            let mut seen = HashSet::new();
            let mut distinct = snapshot.clone();
            distinct.retain(|e| seen.insert(e.clone()));
            distinct
        };
        info!("Validating {} proxies against {}", candidates.len(), test_url);

        let results: Vec<(ProxyEndpoint, Result<ProxiedResponse, CheckFailed>)> =
            stream::iter(candidates.clone())
                .map(|endpoint| {
                    let transport = Arc::clone(&self.transport);
                    let test_url = test_url.to_string();
                    async move {
                        let result = probe(transport.as_ref(), &endpoint, test_url, timeout).await;
                        (endpoint, result)
                    }
                })
                .buffered(self.probe_concurrency)
                .collect()
                .await;

        let mut unhealthy = HashSet::new();
        for (endpoint, result) in results {
            let verdict = match result {
                Ok(response) if is_healthy(&response) => Ok(()),
                Ok(response) => Err(CheckFailed::Unhealthy(response.status)),
                Err(failure) => Err(failure),
            };
            match verdict {
                Ok(()) => debug!("Proxy working: {}", endpoint),
                Err(failure) => {
                    warn!("Proxy failed validation: {} ({})", endpoint, failure);
                    unhealthy.insert(endpoint);
                }
            }
        }

        let mut quota: HashMap<ProxyEndpoint, usize> = HashMap::new();
        for endpoint in snapshot.iter().filter(|e| unhealthy.contains(*e)) {
            *quota.entry(endpoint.clone()).or_default() += 1;
        }

        let retained = {
            let mut rotation = self.rotation.lock();
            let dropped = rotation.prune(quota);
            debug!("Dropped {} pool entries after validation", dropped);

            let mut stats = self.stats.lock();
            for endpoint in unhealthy.iter().filter(|e| !rotation.contains(e)) {
                stats.remove(endpoint);
            }
            rotation.endpoints.len()
        };
        info!("Validated proxies: {} remaining", retained);

        ValidationReport {
            checked: candidates.len(),
            retained,
            removed: candidates
                .into_iter()
                .filter(|e| unhealthy.contains(e))
                .collect(),
        }
    }
}

async fn probe(
    transport: &dyn Transport,
    endpoint: &ProxyEndpoint,
    test_url: String,
    timeout: Duration,
) -> Result<ProxiedResponse, CheckFailed> {
    let request = OutboundRequest {
        method: Method::GET,
        url: test_url,
        options: RequestOptions::new().timeout(timeout),
    };

    match tokio::time::timeout(timeout, transport.send(endpoint, request)).await {
        Ok(Ok(response)) => Ok(response),
        Ok(Err(FailureReason::Timeout)) | Err(_) => Err(CheckFailed::TimedOut),
        Ok(Err(reason)) => Err(CheckFailed::Transport(reason)),
    }
}
