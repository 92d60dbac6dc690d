//! Simple example of using reqwest-proxy-rotator.
//!
//! Usage: `cargo run --example simple -- proxies.txt`

use reqwest_middleware::ClientBuilder;
use reqwest_proxy_rotator::{
    load_proxies_from_file, schedule, ProxyPool, ProxyPoolConfig, ProxyPoolMiddleware,
    RequestOutcome, RequestRouter, Scheme,
};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let path = std::env::args().nth(1).unwrap_or_else(|| "proxies.txt".to_string());
    let proxies = load_proxies_from_file(&path, Scheme::Http).await?;
    println!("Loaded {} proxies from {}", proxies.len(), path);

    let config = ProxyPoolConfig::builder()
        .health_check_url("https://httpbin.org/ip")
        .health_check_timeout(Duration::from_secs(5))
        .health_check_interval(Duration::from_secs(60))
        .request_timeout(Duration::from_secs(15))
        // rate limit for each proxy, lower throughput but less likely to get banned
        .max_requests_per_second(3.0)
        .build();

    let router = Arc::new(RequestRouter::new(ProxyPool::new(proxies), config));

    let report = router.validate_pool().await;
    println!("{}/{} proxies passed validation", report.retained, report.checked);

    let _health_checks = schedule::spawn_health_checks(Arc::clone(&router));

    println!("Sending request through the router...");
    match router.get("https://httpbin.org/ip").await? {
        RequestOutcome::Response { endpoint, response } => {
            println!("Status via {}: {}", endpoint, response.status);
            println!("Response: {}", response.text());
        }
        RequestOutcome::Failed(failed) => println!("{}", failed),
    }

    println!("Sending request through the middleware...");
    let client = ClientBuilder::new(reqwest::Client::new())
        .with(ProxyPoolMiddleware::new(Arc::clone(&router)))
        .build();
    let response = client.get("https://httpbin.org/ip").send().await?;
    println!("Status: {}", response.status());
    println!("Response: {}", response.text().await?);

    Ok(())
}
