//! Request dispatch through the rotating pool.

use crate::config::{ProxyPoolConfig, ProxySelectionStrategy};
use crate::error::{FailureReason, PoolError, RequestFailed};
use crate::pool::{ProxyPool, ValidationReport};
use crate::proxy::ProxyEndpoint;
use crate::transport::{OutboundRequest, ProxiedResponse, RequestOptions, Transport};

use governor::{
    clock::DefaultClock,
    middleware::NoOpMiddleware,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use http::Method;
use log::{debug, warn};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::num::NonZeroU32;
use std::sync::Arc;

type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>;

/// Result of one `request()` call.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestOutcome {
    /// The upstream answered with a 2xx or 3xx status.
    Response {
        endpoint: ProxyEndpoint,
        response: ProxiedResponse,
    },
    /// No usable response could be obtained.
    Failed(RequestFailed),
}

impl RequestOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RequestOutcome::Response { .. })
    }

    /// The proxy the (last) attempt went through.
    pub fn endpoint(&self) -> &ProxyEndpoint {
        match self {
            RequestOutcome::Response { endpoint, .. } => endpoint,
            RequestOutcome::Failed(failed) => &failed.endpoint,
        }
    }

    pub fn response(&self) -> Option<&ProxiedResponse> {
        match self {
            RequestOutcome::Response { response, .. } => Some(response),
            RequestOutcome::Failed(_) => None,
        }
    }

    pub fn into_result(self) -> Result<ProxiedResponse, RequestFailed> {
        match self {
            RequestOutcome::Response { response, .. } => Ok(response),
            RequestOutcome::Failed(failed) => Err(failed),
        }
    }
}

/// Routes outbound requests through proxies drawn from the pool it owns.
///
/// By default every `request()` makes exactly one attempt through one proxy.
/// Setting `retry_count` allows further attempts, each through a freshly
/// drawn proxy.
pub struct RequestRouter {
    pool: ProxyPool,
    transport: Arc<dyn Transport>,
    config: ProxyPoolConfig,
    limiters: Mutex<HashMap<ProxyEndpoint, Arc<Limiter>>>,
}

impl RequestRouter {
    /// Create a router that dispatches through the pool's own transport.
    pub fn new(pool: ProxyPool, config: ProxyPoolConfig) -> Self {
        let pool = pool.probe_concurrency(config.probe_concurrency);
        let transport = pool.transport();
        Self {
            pool,
            transport,
            config,
            limiters: Mutex::new(HashMap::new()),
        }
    }

    /// Build the pool from endpoints and route through the given transport.
    pub fn with_transport(
        endpoints: Vec<ProxyEndpoint>,
        transport: Arc<dyn Transport>,
        config: ProxyPoolConfig,
    ) -> Self {
        Self::new(ProxyPool::with_transport(endpoints, transport), config)
    }

    pub fn pool(&self) -> &ProxyPool {
        &self.pool
    }

    pub fn config(&self) -> &ProxyPoolConfig {
        &self.config
    }

    /// Draw a proxy according to the configured selection strategy.
    pub fn select_proxy(&self) -> Result<ProxyEndpoint, PoolError> {
        match self.config.selection_strategy {
            ProxySelectionStrategy::RoundRobin => self.pool.next_proxy(),
            ProxySelectionStrategy::Random => self.pool.random_proxy(),
        }
    }

    /// Send `method url` through the next proxy in the rotation.
    ///
    /// Fails only when the pool is empty. Transport errors and statuses outside
    /// 2xx/3xx come back as [`RequestOutcome::Failed`].
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        options: RequestOptions,
    ) -> Result<RequestOutcome, PoolError> {
        let max_attempts = self.config.retry_count + 1;
        let mut endpoint = self.select_proxy()?;
        let mut attempt = 1;

        loop {
            debug!("Using proxy: {} (attempt {})", endpoint, attempt);
            self.throttle(&endpoint).await;

            let request = OutboundRequest {
                method: method.clone(),
                url: url.to_string(),
                options: self.with_default_timeout(options.clone()),
            };

            let reason = match self.transport.send(&endpoint, request).await {
                Ok(response) if response.status.is_success() || response.status.is_redirection() => {
                    self.pool.report_success(&endpoint);
                    return Ok(RequestOutcome::Response { endpoint, response });
                }
                Ok(response) => FailureReason::Status(response.status),
                Err(reason) => reason,
            };

            warn!(
                "Request failed with proxy {} (attempt {}): {}",
                endpoint, attempt, reason
            );
            self.pool.report_failure(&endpoint);

            if attempt >= max_attempts {
                return Ok(self.failed(endpoint, reason, attempt));
            }
            endpoint = match self.select_proxy() {
                Ok(next) => next,
                Err(_) => return Ok(self.failed(endpoint, reason, attempt)),
            };
            attempt += 1;
        }
    }

    /// Shorthand for a `GET` with default options.
    pub async fn get(&self, url: &str) -> Result<RequestOutcome, PoolError> {
        self.request(Method::GET, url, RequestOptions::default()).await
    }

    /// Validate the pool against the configured health check.
    pub async fn validate_pool(&self) -> ValidationReport {
        let predicate = Arc::clone(&self.config.health_predicate);
        self.pool
            .validate(
                &self.config.health_check_url,
                self.config.health_check_timeout,
                move |response: &ProxiedResponse| predicate(response),
            )
            .await
    }

    fn failed(&self, endpoint: ProxyEndpoint, reason: FailureReason, attempts: usize) -> RequestOutcome {
        RequestOutcome::Failed(RequestFailed {
            endpoint,
            reason,
            attempts,
        })
    }

    fn with_default_timeout(&self, mut options: RequestOptions) -> RequestOptions {
        options.timeout.get_or_insert(self.config.request_timeout);
        options
    }

    pub(crate) async fn throttle(&self, endpoint: &ProxyEndpoint) {
        let Some(rps) = self.config.max_requests_per_second else {
            return;
        };
        let pool_len = self.pool.len();
        let limiter = {
            let mut limiters = self.limiters.lock();
            if limiters.len() > pool_len {
                // Forget limiters of endpoints that have left the pool.
                let live: HashSet<ProxyEndpoint> = self.pool.endpoints().into_iter().collect();
                limiters.retain(|e, _| live.contains(e));
            }
            let limiter = limiters.entry(endpoint.clone()).or_insert_with(|| {
                let per_second = NonZeroU32::new(rps.ceil() as u32).unwrap_or(NonZeroU32::MIN);
                Arc::new(RateLimiter::direct(Quota::per_second(per_second)))
            });
            Arc::clone(limiter)
        };
        limiter.until_ready().await;
    }
}
