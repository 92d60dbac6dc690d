//! Error types for the reqwest-proxy-rotator crate.

use crate::proxy::ProxyEndpoint;
use http::StatusCode;
use thiserror::Error;

/// Structural errors raised by pool operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    /// The pool has no endpoints to hand out.
    #[error("No proxy available in pool")]
    EmptyPool,
    /// `remove` targeted an endpoint that is not in the pool.
    #[error("Proxy not found in pool: {0}")]
    NotFound(ProxyEndpoint),
}

/// Error returned when a string cannot be turned into a [`ProxyEndpoint`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid proxy endpoint `{input}`: {reason}")]
pub struct InvalidEndpoint {
    pub input: String,
    pub reason: String,
}

impl InvalidEndpoint {
    pub(crate) fn new(input: &str, reason: impl Into<String>) -> Self {
        Self {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}

/// Error returned when a scheme is not one of `http`, `https` or `socks5`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported proxy scheme `{0}`")]
pub struct UnsupportedScheme(pub String);

/// Why a single dispatch or probe through a proxy did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureReason {
    /// The upstream answered with a status outside 2xx/3xx.
    #[error("unexpected status {0}")]
    Status(StatusCode),
    /// The call did not complete within its timeout.
    #[error("timed out")]
    Timeout,
    /// The proxy (or the target through it) refused or dropped the connection.
    #[error("connection failed: {0}")]
    Connect(String),
    /// The endpoint could not be turned into a usable proxy configuration.
    #[error("invalid proxy configuration: {0}")]
    Proxy(String),
    /// Any other transport level failure (DNS, TLS, body read, ...).
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for FailureReason {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FailureReason::Timeout
        } else if err.is_connect() {
            FailureReason::Connect(err.to_string())
        } else if err.is_builder() {
            FailureReason::Proxy(err.to_string())
        } else {
            FailureReason::Transport(err.to_string())
        }
    }
}

/// A request that could not be completed through the proxy it was routed to.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("request through {endpoint} failed after {attempts} attempt(s): {reason}")]
pub struct RequestFailed {
    /// The proxy used by the last attempt.
    pub endpoint: ProxyEndpoint,
    pub reason: FailureReason,
    pub attempts: usize,
}
