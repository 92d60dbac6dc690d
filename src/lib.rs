//! # reqwest-proxy-rotator
//!
//! A rotating proxy pool and request router for reqwest.
//!
//! [`ProxyPool`] keeps an ordered set of upstream HTTP, HTTPS and SOCKS5
//! proxies and hands them out round-robin or at random, pruning the ones that
//! fail a health probe. [`RequestRouter`] owns a pool and sends each request
//! through the next proxy, returning a [`RequestOutcome`] instead of raising
//! transport errors. [`ProxyPoolMiddleware`] plugs the same rotation into a
//! `reqwest_middleware` client, and [`schedule`] runs health checks on a timer.

pub mod config;
pub mod error;
pub mod middleware;
pub mod pool;
pub mod proxy;
pub mod router;
pub mod schedule;
pub mod transport;
mod utils;

pub use config::{HealthPredicate, ProxyPoolConfig, ProxyPoolConfigBuilder, ProxySelectionStrategy};
pub use error::{FailureReason, InvalidEndpoint, PoolError, RequestFailed, UnsupportedScheme};
pub use middleware::ProxyPoolMiddleware;
pub use pool::{status_is_ok, ProxyPool, ValidationReport};
pub use proxy::{Credentials, ProxyEndpoint, Scheme, UsageStats};
pub use router::{RequestOutcome, RequestRouter};
pub use transport::{OutboundRequest, ProxiedResponse, RequestOptions, ReqwestTransport, Transport};
pub use utils::{load_proxies_from_file, parse_proxy_list};
