//! Middleware implementation for reqwest.

use crate::router::RequestRouter;
use crate::transport::client_for;

use anyhow::anyhow;
use async_trait::async_trait;
use log::{info, warn};
use reqwest_middleware::{Error, Middleware, Next, Result};
use std::sync::Arc;

/// Middleware that sends every request through a proxy drawn from a [`RequestRouter`].
///
/// The selection strategy, request timeout, rate limit and retry count all
/// come from the router's configuration. Any HTTP response is returned as-is,
/// though only 2xx/3xx count as a success in the pool's usage stats; only
/// transport errors move on to the next proxy.
#[derive(Clone)]
pub struct ProxyPoolMiddleware {
    router: Arc<RequestRouter>,
}

impl ProxyPoolMiddleware {
    pub fn new(router: Arc<RequestRouter>) -> Self {
        let pool = router.pool();
        if pool.is_empty() {
            warn!("Proxy pool middleware created with an empty pool");
        } else {
            info!("Proxy pool middleware using {} proxies", pool.len());
        }
        Self { router }
    }

    pub fn router(&self) -> &Arc<RequestRouter> {
        &self.router
    }
}

#[async_trait]
impl Middleware for ProxyPoolMiddleware {
    async fn handle(
        &self,
        req: reqwest::Request,
        _extensions: &mut http::Extensions,
        _next: Next<'_>,
    ) -> Result<reqwest::Response> {
        let max_retries = self.router.config().retry_count;
        let timeout = self.router.config().request_timeout;
        let mut retry_count = 0;

        loop {
            let endpoint = match self.router.select_proxy() {
                Ok(endpoint) => endpoint,
                Err(e) => {
                    warn!("No proxy available for {} {}", req.method(), req.url());
                    return Err(Error::Middleware(anyhow!(e)));
                }
            };

            let proxied_request = req.try_clone().ok_or_else(|| {
                Error::Middleware(anyhow!(
                    "Request object is not cloneable. Are you passing a streaming body?"
                ))
            })?;

            info!("Using proxy: {} (attempt {})", endpoint, retry_count + 1);
            self.router.throttle(&endpoint).await;

            let client = match client_for(&endpoint, timeout) {
                Ok(c) => c,
                Err(e) => {
                    warn!("Failed to build client with proxy {}: {}", endpoint, e);
                    self.router.pool().report_failure(&endpoint);
                    retry_count += 1;
                    if retry_count > max_retries {
                        return Err(Error::Reqwest(e));
                    }
                    continue;
                }
            };

            match client.execute(proxied_request).await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() || status.is_redirection() {
                        self.router.pool().report_success(&endpoint);
                    } else {
                        warn!("Proxy {} returned status {}", endpoint, status);
                        self.router.pool().report_failure(&endpoint);
                    }
                    return Ok(response);
                }
                Err(err) => {
                    warn!(
                        "Request failed with proxy {} (attempt {}): {}",
                        endpoint,
                        retry_count + 1,
                        err
                    );
                    self.router.pool().report_failure(&endpoint);

                    retry_count += 1;
                    if retry_count > max_retries {
                        return Err(Error::Reqwest(err));
                    }
                }
            }
        }
    }
}
