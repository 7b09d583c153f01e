//! Supervisor client
//!
//! One method per remote capability. Each performs a single transport call and
//! decodes the payload into the resource model.

use super::error::ApiError;
use super::http::{ApiRequest, HttpExchange};
use super::transport::{RetryPolicy, Transport};
use crate::resource::{ActionOutcome, HealthStatus, HostStats, Snapshot, Vm, VmMetrics};
use anyhow::Result;
use serde_json::json;
use std::sync::Arc;

/// Path of a VM-scoped endpoint; the name is encoded as one path segment
fn vm_path(name: &str, suffix: &str) -> String {
    format!("/vm/{}{}", urlencoding::encode(name), suffix)
}

fn snapshot_path(vm: &str, snapshot: &str, suffix: &str) -> String {
    vm_path(
        vm,
        &format!("/snapshots/{}{}", urlencoding::encode(snapshot), suffix),
    )
}

/// Main supervisor client
#[derive(Clone)]
pub struct ResourceClient {
    transport: Transport,
}

impl ResourceClient {
    pub fn new(transport: Transport) -> Self {
        Self { transport }
    }

    /// Client talking HTTP to `base_url`
    pub fn connect(base_url: &str, policy: RetryPolicy) -> Result<Self> {
        let exchange = HttpExchange::new(base_url)?;
        Ok(Self::new(Transport::new(Arc::new(exchange), policy)))
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    // =========================================================================
    // Authentication
    // =========================================================================

    /// Exchange credentials for a bearer token and install it.
    ///
    /// Sent once: retrying a rejected password only delays the answer and can
    /// trip account lockouts.
    pub async fn login(&self, username: &str, password: &str) -> Result<(), ApiError> {
        let request = ApiRequest::post("login", "/login")
            .with_body(json!({"username": username, "password": password}));

        let response = self.transport.request_once(&request).await?;
        let token = response
            .get("access_token")
            .and_then(|v| v.as_str())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                ApiError::MalformedResponse("login response carried no access_token".into())
            })?;

        self.transport.set_token(Some(token.to_string())).await;
        tracing::info!("Authenticated as {}", username);
        Ok(())
    }

    pub async fn logout(&self) {
        self.transport.set_token(None).await;
        tracing::info!("Credential cleared");
    }

    /// Check the supervisor. A degraded supervisor answers 503 with the same
    /// payload, which decodes to a non-healthy status rather than an error.
    pub async fn health(&self) -> Result<HealthStatus, ApiError> {
        let response = self
            .transport
            .request(&ApiRequest::get("health", "/health").accepting(&[503]))
            .await?;
        Ok(HealthStatus::from_json(&response))
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn list_vms(&self) -> Result<Vec<Vm>, ApiError> {
        let response = self
            .transport
            .request(&ApiRequest::get("list_vms", "/vms"))
            .await?;
        Ok(Vm::list_from_json(&response))
    }

    pub async fn get_vm(&self, name: &str) -> Result<Vm, ApiError> {
        let response = self
            .transport
            .request(&ApiRequest::get("vm_details", vm_path(name, "")))
            .await?;
        Ok(Vm::from_json(&response))
    }

    pub async fn get_metrics(&self, name: &str) -> Result<VmMetrics, ApiError> {
        let response = self
            .transport
            .request(&ApiRequest::get("vm_metrics", vm_path(name, "/metrics")))
            .await?;
        Ok(VmMetrics::from_json(&response))
    }

    pub async fn host_stats(&self) -> Result<HostStats, ApiError> {
        let response = self
            .transport
            .request(&ApiRequest::get("stats_summary", "/stats/summary"))
            .await?;
        Ok(HostStats::from_json(&response))
    }

    // =========================================================================
    // Power actions
    // =========================================================================

    pub async fn start_vm(&self, name: &str) -> Result<ActionOutcome, ApiError> {
        self.action(ApiRequest::post("start_vm", vm_path(name, "/start")))
            .await
    }

    /// Graceful ACPI shutdown, or a hard power-off when `force` is set
    pub async fn stop_vm(&self, name: &str, force: bool) -> Result<ActionOutcome, ApiError> {
        self.action(
            ApiRequest::post("stop_vm", vm_path(name, "/stop")).with_body(json!({"force": force})),
        )
        .await
    }

    pub async fn restart_vm(&self, name: &str) -> Result<ActionOutcome, ApiError> {
        self.action(ApiRequest::post("restart_vm", vm_path(name, "/restart")))
            .await
    }

    /// Change vCPU count and memory; the server applies it to the persistent config
    pub async fn update_resources(
        &self,
        name: &str,
        vcpus: u32,
        memory_mb: u64,
    ) -> Result<ActionOutcome, ApiError> {
        self.action(
            ApiRequest::post("update_resources", vm_path(name, "/resources"))
                .with_body(json!({"vcpus": vcpus, "memory_mb": memory_mb})),
        )
        .await
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    pub async fn list_snapshots(&self, name: &str) -> Result<Vec<Snapshot>, ApiError> {
        let response = self
            .transport
            .request(&ApiRequest::get("list_snapshots", vm_path(name, "/snapshots")).expect_array())
            .await?;
        Ok(Snapshot::list_from_json(&response))
    }

    pub async fn create_snapshot(
        &self,
        name: &str,
        snapshot: &str,
        description: &str,
    ) -> Result<ActionOutcome, ApiError> {
        self.action(
            ApiRequest::post("create_snapshot", vm_path(name, "/snapshots"))
                .with_body(json!({"name": snapshot, "description": description})),
        )
        .await
    }

    pub async fn revert_snapshot(
        &self,
        name: &str,
        snapshot: &str,
    ) -> Result<ActionOutcome, ApiError> {
        self.action(ApiRequest::post(
            "revert_snapshot",
            snapshot_path(name, snapshot, "/revert"),
        ))
        .await
    }

    pub async fn delete_snapshot(
        &self,
        name: &str,
        snapshot: &str,
    ) -> Result<ActionOutcome, ApiError> {
        self.action(ApiRequest::delete(
            "delete_snapshot",
            snapshot_path(name, snapshot, ""),
        ))
        .await
    }

    async fn action(&self, request: ApiRequest) -> Result<ActionOutcome, ApiError> {
        tracing::info!("{} {}", request.label, request.path);
        let response = self.transport.request(&request).await?;
        Ok(ActionOutcome::from_json(&response))
    }
}
