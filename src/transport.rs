//! Outbound HTTP through a single proxy endpoint.

use crate::error::FailureReason;
use crate::proxy::ProxyEndpoint;

use async_trait::async_trait;
use http::{HeaderMap, Method, StatusCode};
use std::time::Duration;

/// Per-request options passed through to the transport untouched.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub headers: HeaderMap,
    pub query: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    /// Overrides the router's default request timeout.
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(mut self, name: http::header::HeaderName, value: http::HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// One request as handed to a [`Transport`].
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: String,
    pub options: RequestOptions,
}

/// A fully read response received through a proxy.
#[derive(Debug, Clone, PartialEq)]
pub struct ProxiedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl ProxiedResponse {
    /// The body decoded as UTF-8, with invalid sequences replaced.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Sends a request through exactly one proxy endpoint.
///
/// Implementations report any HTTP response they receive as `Ok`, whatever the
/// status; classifying the status is up to the caller.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        endpoint: &ProxyEndpoint,
        request: OutboundRequest,
    ) -> Result<ProxiedResponse, FailureReason>;
}

/// [`Transport`] backed by a single-use `reqwest::Client` per call.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    default_timeout: Duration,
}

impl ReqwestTransport {
    pub fn new(default_timeout: Duration) -> Self {
        Self { default_timeout }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

/// Build a client that sends both `http` and `https` traffic through `endpoint`.
pub(crate) fn client_for(
    endpoint: &ProxyEndpoint,
    timeout: Duration,
) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .proxy(endpoint.to_reqwest_proxy()?)
        .timeout(timeout)
        .build()
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(
        &self,
        endpoint: &ProxyEndpoint,
        request: OutboundRequest,
    ) -> Result<ProxiedResponse, FailureReason> {
        let OutboundRequest {
            method,
            url,
            options,
        } = request;

        let timeout = options.timeout.unwrap_or(self.default_timeout);
        let client = client_for(endpoint, timeout)
            .map_err(|e| FailureReason::Proxy(e.to_string()))?;

        let mut builder = client.request(method, &url).headers(options.headers);
        if !options.query.is_empty() {
            builder = builder.query(&options.query);
        }
        if let Some(body) = options.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        Ok(ProxiedResponse {
            status,
            headers,
            body,
        })
    }
}
