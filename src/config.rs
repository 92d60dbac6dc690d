//! Configuration for the proxy pool and request router.

use crate::pool::{status_is_ok, DEFAULT_PROBE_CONCURRENCY};
use crate::transport::ProxiedResponse;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Classifies a probe response as healthy.
pub type HealthPredicate = Arc<dyn Fn(&ProxiedResponse) -> bool + Send + Sync>;

/// Strategy for drawing a proxy from the pool for each request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProxySelectionStrategy {
    /// Select proxies in round-robin fashion.
    #[default]
    RoundRobin,
    /// Select a random proxy.
    Random,
}

/// Configuration for the proxy pool and request router.
#[derive(Clone)]
pub struct ProxyPoolConfig {
    /// URL probed through every proxy during validation.
    pub health_check_url: String,
    /// Timeout for a single probe.
    pub health_check_timeout: Duration,
    /// Interval between scheduled validations.
    pub health_check_interval: Duration,
    /// Decides whether a probe response counts as healthy.
    pub health_predicate: HealthPredicate,
    /// Default timeout for routed requests.
    pub request_timeout: Duration,
    /// Number of extra attempts, each through the next proxy, after a failed request.
    pub retry_count: usize,
    /// Strategy for selecting proxies.
    pub selection_strategy: ProxySelectionStrategy,
    /// Maximum requests per second per proxy, unlimited when `None`.
    pub max_requests_per_second: Option<f64>,
    /// Number of probes run at once during validation.
    pub probe_concurrency: usize,
}

impl ProxyPoolConfig {
    /// Create a new configuration builder.
    pub fn builder() -> ProxyPoolConfigBuilder {
        ProxyPoolConfigBuilder::new()
    }
}

impl Default for ProxyPoolConfig {
    fn default() -> Self {
        ProxyPoolConfigBuilder::new().build()
    }
}

impl fmt::Debug for ProxyPoolConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyPoolConfig")
            .field("health_check_url", &self.health_check_url)
            .field("health_check_timeout", &self.health_check_timeout)
            .field("health_check_interval", &self.health_check_interval)
            .field("request_timeout", &self.request_timeout)
            .field("retry_count", &self.retry_count)
            .field("selection_strategy", &self.selection_strategy)
            .field("max_requests_per_second", &self.max_requests_per_second)
            .field("probe_concurrency", &self.probe_concurrency)
            .finish_non_exhaustive()
    }
}

/// Builder for `ProxyPoolConfig`.
#[derive(Default)]
pub struct ProxyPoolConfigBuilder {
    health_check_url: Option<String>,
    health_check_timeout: Option<Duration>,
    health_check_interval: Option<Duration>,
    health_predicate: Option<HealthPredicate>,
    request_timeout: Option<Duration>,
    retry_count: Option<usize>,
    selection_strategy: Option<ProxySelectionStrategy>,
    max_requests_per_second: Option<f64>,
    probe_concurrency: Option<usize>,
}

impl ProxyPoolConfigBuilder {
    /// Create a new builder with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the URL used for health checks.
    pub fn health_check_url(mut self, url: impl Into<String>) -> Self {
        self.health_check_url = Some(url.into());
        self
    }

    /// Set the timeout for health checks.
    pub fn health_check_timeout(mut self, timeout: Duration) -> Self {
        self.health_check_timeout = Some(timeout);
        self
    }

    /// Set the interval between health checks.
    pub fn health_check_interval(mut self, interval: Duration) -> Self {
        self.health_check_interval = Some(interval);
        self
    }

    /// Replace the default `200 OK` health predicate.
    pub fn health_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&ProxiedResponse) -> bool + Send + Sync + 'static,
    {
        self.health_predicate = Some(Arc::new(predicate));
        self
    }

    /// Set the default timeout for routed requests.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Set the number of times to retry a request with different proxies.
    pub fn retry_count(mut self, count: usize) -> Self {
        self.retry_count = Some(count);
        self
    }

    /// Set the strategy for selecting proxies.
    pub fn selection_strategy(mut self, strategy: ProxySelectionStrategy) -> Self {
        self.selection_strategy = Some(strategy);
        self
    }

    /// Set the maximum requests per second per proxy.
    pub fn max_requests_per_second(mut self, rps: f64) -> Self {
        self.max_requests_per_second = Some(rps);
        self
    }

    /// Set how many probes run at once during validation.
    pub fn probe_concurrency(mut self, concurrency: usize) -> Self {
        self.probe_concurrency = Some(concurrency);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> ProxyPoolConfig {
        ProxyPoolConfig {
            health_check_url: self
                .health_check_url
                .unwrap_or_else(|| "https://www.google.com".to_string()),
            health_check_timeout: self.health_check_timeout.unwrap_or(Duration::from_secs(10)),
            health_check_interval: self.health_check_interval.unwrap_or(Duration::from_secs(300)),
            health_predicate: self
                .health_predicate
                .unwrap_or_else(|| Arc::new(status_is_ok)),
            request_timeout: self.request_timeout.unwrap_or(Duration::from_secs(30)),
            retry_count: self.retry_count.unwrap_or(0),
            selection_strategy: self.selection_strategy.unwrap_or_default(),
            max_requests_per_second: self.max_requests_per_second.filter(|rps| *rps > 0.0),
            probe_concurrency: self
                .probe_concurrency
                .unwrap_or(DEFAULT_PROBE_CONCURRENCY)
                .max(1),
        }
    }
}
