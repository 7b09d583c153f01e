//! In-memory supervisor shared by the timing tests

use async_trait::async_trait;
use kvmwatch::api::{ApiError, ApiRequest, Exchange, RawResponse, ResourceClient, RetryPolicy, Transport};
use kvmwatch::store::SyncStore;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Let spawned fetch tasks run to completion at the current instant
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

/// Answers `/vms`, `/vm/alpha` and `/vm/alpha/metrics`, recording every path
pub struct FakeSupervisor {
    calls: Mutex<Vec<String>>,
    latency: Duration,
}

impl FakeSupervisor {
    pub fn new(latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            latency,
        })
    }

    pub fn count(&self, path: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|p| *p == path).count()
    }

    pub fn store(self: &Arc<Self>) -> SyncStore {
        let transport = Transport::new(self.clone(), RetryPolicy::default());
        SyncStore::new(ResourceClient::new(transport))
    }
}

#[async_trait]
impl Exchange for FakeSupervisor {
    async fn send(&self, request: &ApiRequest, _bearer: Option<&str>) -> Result<RawResponse, ApiError> {
        let served = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(request.path.clone());
            calls.iter().filter(|p| **p == request.path).count()
        };

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let response = match request.path.as_str() {
            "/vms" => RawResponse::json(
                200,
                &json!({
                    "count": 2,
                    "vms": [
                        {"name": "alpha", "state": "running", "vcpus": 2, "memory_mb": 2048},
                        {"name": "beta", "state": "stopped", "vcpus": 1, "memory_mb": 1024}
                    ]
                }),
            ),
            "/vm/alpha" => RawResponse::json(
                200,
                &json!({"name": "alpha", "state": "running", "vcpus": 2, "memory_mb": 2048}),
            ),
            // cpu_percent counts the polls so tests can tell samples apart
            "/vm/alpha/metrics" => RawResponse::json(
                200,
                &json!({"name": "alpha", "state": "running", "cpu_percent": served as f64}),
            ),
            _ => RawResponse::json(404, &json!({"message": "not found"})),
        };
        Ok(response)
    }
}
