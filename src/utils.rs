//! Helpers for turning proxy list files into endpoints.

use crate::proxy::{ProxyEndpoint, Scheme};
use log::{info, warn};
use std::path::Path;

/// Read a proxy list file, one endpoint per line.
///
/// Bare `host:port` lines are read as `default_scheme` proxies.
pub async fn load_proxies_from_file(
    path: impl AsRef<Path>,
    default_scheme: Scheme,
) -> std::io::Result<Vec<ProxyEndpoint>> {
    let path = path.as_ref();
    let content = tokio::fs::read_to_string(path).await?;
    let proxies = parse_proxy_list(&content, default_scheme);
    info!("Loaded {} proxies from {}", proxies.len(), path.display());
    Ok(proxies)
}

/// Parse the text content of a proxy list.
///
/// Blank lines and `#` comments are skipped, and lines that do not form a
/// valid endpoint are dropped with a warning. Order is preserved.
pub fn parse_proxy_list(content: &str, default_scheme: Scheme) -> Vec<ProxyEndpoint> {
    content
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                return None;
            }

            let candidate = if line.contains("://") {
                line.to_string()
            } else {
                format!("{}://{}", default_scheme, line)
            };

            match candidate.parse::<ProxyEndpoint>() {
                Ok(endpoint) => Some(endpoint),
                Err(e) => {
                    warn!("Skipping proxy list entry: {}", e);
                    None
                }
            }
        })
        .collect()
}
