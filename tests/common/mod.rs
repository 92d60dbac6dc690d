//! Scripted transport shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use http::{HeaderMap, StatusCode};
use parking_lot::Mutex;
use reqwest_proxy_rotator::{FailureReason, OutboundRequest, ProxiedResponse, ProxyEndpoint, Transport};
use std::collections::HashMap;
use std::time::Duration;

/// What the scripted transport does for one endpoint.
#[derive(Clone)]
pub enum Behavior {
    Status(StatusCode),
    Fail(FailureReason),
    Hang(Duration),
}

/// Transport that answers from a per-endpoint script and records every call.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<HashMap<ProxyEndpoint, Behavior>>,
    calls: Mutex<Vec<(ProxyEndpoint, OutboundRequest)>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, endpoint: &ProxyEndpoint, behavior: Behavior) -> Self {
        self.script.lock().insert(endpoint.clone(), behavior);
        self
    }

    pub fn calls(&self) -> Vec<(ProxyEndpoint, OutboundRequest)> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(
        &self,
        endpoint: &ProxyEndpoint,
        request: OutboundRequest,
    ) -> Result<ProxiedResponse, FailureReason> {
        self.calls.lock().push((endpoint.clone(), request));
        let behavior = self
            .script
            .lock()
            .get(endpoint)
            .cloned()
            .unwrap_or(Behavior::Fail(FailureReason::Connect("unscripted".to_string())));

        match behavior {
            Behavior::Status(status) => Ok(ProxiedResponse {
                status,
                headers: HeaderMap::new(),
                body: format!("via {}", endpoint.as_str()).into_bytes(),
            }),
            Behavior::Fail(reason) => Err(reason),
            Behavior::Hang(delay) => {
                tokio::time::sleep(delay).await;
                Ok(ProxiedResponse {
                    status: StatusCode::OK,
                    headers: HeaderMap::new(),
                    body: Vec::new(),
                })
            }
        }
    }
}

pub fn ep(name: &str) -> ProxyEndpoint {
    format!("http://{}.proxy.test:8080", name).parse().unwrap()
}
