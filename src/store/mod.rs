//! Synchronization store
//!
//! Owns every slice of fetched state and publishes it to subscribers through a
//! `tokio::sync::watch` channel. Fetch methods never fail: errors land in the
//! slice's error field. Only the user-facing actions (power, resize,
//! snapshots, login) hand their error back, so it can be shown directly.
//!
//! State-changing actions never predict their effect; they re-fetch from the
//! server once the action is acknowledged.

pub mod scheduler;
pub mod slice;

pub use scheduler::RefreshScheduler;
pub use slice::{FetchTicket, LoadStatus, Slice};

use crate::api::{ApiError, ResourceClient};
use crate::resource::{project, ActionOutcome, Filter, HostStats, Snapshot, Vm, VmMetrics};
use std::sync::Arc;
use tokio::sync::watch;

/// Snapshot list together with the VM it belongs to
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VmSnapshots {
    pub vm: String,
    pub items: Vec<Snapshot>,
}

/// Everything the store knows, as published to subscribers
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StoreState {
    pub resources: Slice<Vec<Vm>>,
    pub detail: Slice<Vm>,
    /// Latest metrics of the selected VM
    pub metrics: Option<VmMetrics>,
    pub selected: Option<String>,
    pub stats: Slice<HostStats>,
    pub snapshots: Slice<VmSnapshots>,
    pub authenticated: bool,
}

/// Detail and metrics of the selected VM, paired for display
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetailView<'a> {
    pub vm: &'a Vm,
    pub metrics: Option<&'a VmMetrics>,
}

impl StoreState {
    /// Last fetched VM list (empty before the first success)
    pub fn resources(&self) -> &[Vm] {
        self.resources.data().map(Vec::as_slice).unwrap_or(&[])
    }

    /// Filtered view of the VM list, computed from the current list
    pub fn project(&self, filter: &Filter) -> Vec<Vm> {
        project(self.resources(), &filter.query, filter.state)
    }

    /// Detail of the selected VM, if it has been loaded
    pub fn detail_view(&self) -> Option<DetailView<'_>> {
        let selected = self.selected.as_deref()?;
        let vm = self.detail.data().filter(|vm| vm.name == selected)?;
        let metrics = self.metrics.as_ref().filter(|m| m.name == selected);
        Some(DetailView { vm, metrics })
    }

    /// Back to the logged-out state, keeping fetch numbering
    pub fn reset(&mut self) {
        self.resources.reset();
        self.detail.reset();
        self.stats.reset();
        self.snapshots.reset();
        self.metrics = None;
        self.selected = None;
        self.authenticated = false;
    }

    /// Snapshots of `vm`, if the last applied snapshot fetch was for it
    pub fn snapshots_of(&self, vm: &str) -> Option<&[Snapshot]> {
        self.snapshots
            .data()
            .filter(|s| s.vm == vm)
            .map(|s| s.items.as_slice())
    }
}

/// The synchronization store. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SyncStore {
    client: ResourceClient,
    state: Arc<watch::Sender<StoreState>>,
}

impl SyncStore {
    pub fn new(client: ResourceClient) -> Self {
        let (state, _) = watch::channel(StoreState::default());
        Self {
            client,
            state: Arc::new(state),
        }
    }

    pub fn client(&self) -> &ResourceClient {
        &self.client
    }

    /// Receiver notified after every visible state change
    pub fn subscribe(&self) -> watch::Receiver<StoreState> {
        self.state.subscribe()
    }

    /// Copy of the current state
    pub fn state(&self) -> StoreState {
        self.state.borrow().clone()
    }

    /// Read the current state without cloning it
    pub fn read<R>(&self, f: impl FnOnce(&StoreState) -> R) -> R {
        f(&self.state.borrow())
    }

    pub fn is_selected(&self, name: &str) -> bool {
        self.read(|s| s.selected.as_deref() == Some(name))
    }

    /// Start a fetch on one slice. Only a non-silent start notifies.
    fn begin<T>(
        &self,
        silent: bool,
        slice: impl FnOnce(&mut StoreState) -> &mut Slice<T>,
    ) -> FetchTicket {
        let mut ticket = FetchTicket::default();
        self.state.send_if_modified(|state| {
            ticket = slice(state).begin(silent);
            !silent
        });
        ticket
    }

    // =========================================================================
    // Authentication
    // =========================================================================

    pub async fn login(&self, username: &str, password: &str) -> Result<(), ApiError> {
        self.client.login(username, password).await?;
        self.state.send_modify(|s| s.authenticated = true);
        Ok(())
    }

    /// Drop the credential and every fetched slice. Fetches still in flight
    /// from the old session are discarded when they land.
    pub async fn logout(&self) {
        self.client.logout().await;
        self.state.send_modify(StoreState::reset);
    }

    // =========================================================================
    // Fetches
    // =========================================================================

    /// Re-fetch the VM list; a silent fetch leaves the loading status alone
    pub async fn fetch_resources(&self, silent: bool) {
        let ticket = self.begin(silent, |s| &mut s.resources);

        let outcome = self.client.list_vms().await.map_err(|e| {
            if silent {
                tracing::debug!("Background VM list refresh failed: {}", e);
            } else {
                tracing::warn!("Failed to list VMs: {}", e);
            }
            e.to_string()
        });

        if let Ok(vms) = &outcome {
            tracing::debug!("Fetched {} VMs", vms.len());
        }

        self.state.send_modify(|s| {
            if !s.resources.finish(ticket, outcome) {
                tracing::debug!("Discarded stale VM list response");
            }
        });
    }

    /// Select `name` and load its detail and live metrics concurrently.
    ///
    /// Metrics failures fall back to zeroed metrics; a detail failure fails
    /// the whole fetch and keeps the previous detail.
    pub async fn fetch_detail(&self, name: &str) {
        let ticket = self.begin(false, |s| {
            s.selected = Some(name.to_string());
            &mut s.detail
        });

        let (detail, metrics) =
            futures::join!(self.client.get_vm(name), self.client.get_metrics(name));

        let metrics = metrics.unwrap_or_else(|e| {
            tracing::debug!("Metrics unavailable for {}: {}", name, e);
            VmMetrics::placeholder(name)
        });
        let outcome = detail.map_err(|e| {
            tracing::warn!("Failed to load VM {}: {}", name, e);
            e.to_string()
        });
        let succeeded = outcome.is_ok();

        self.state.send_modify(|s| {
            if s.detail.finish(ticket, outcome) && succeeded {
                s.metrics = Some(metrics);
            }
        });
    }

    /// Poll live metrics of `name`; failures are dropped until the next poll
    pub async fn refresh_metrics(&self, name: &str) {
        match self.client.get_metrics(name).await {
            Ok(metrics) => {
                self.state.send_if_modified(|s| {
                    if s.selected.as_deref() != Some(name) {
                        return false;
                    }
                    s.metrics = Some(metrics);
                    true
                });
            }
            Err(e) => tracing::debug!("Metrics poll for {} failed: {}", name, e),
        }
    }

    pub async fn fetch_stats(&self, silent: bool) {
        let ticket = self.begin(silent, |s| &mut s.stats);

        let outcome = self.client.host_stats().await.map_err(|e| {
            tracing::warn!("Failed to load host stats: {}", e);
            e.to_string()
        });

        self.state.send_modify(|s| {
            s.stats.finish(ticket, outcome);
        });
    }

    pub async fn fetch_snapshots(&self, name: &str, silent: bool) {
        let ticket = self.begin(silent, |s| &mut s.snapshots);

        let outcome = self
            .client
            .list_snapshots(name)
            .await
            .map(|items| VmSnapshots {
                vm: name.to_string(),
                items,
            })
            .map_err(|e| {
                tracing::warn!("Failed to list snapshots of {}: {}", name, e);
                e.to_string()
            });

        self.state.send_modify(|s| {
            s.snapshots.finish(ticket, outcome);
        });
    }

    pub fn clear_selection(&self) {
        self.state.send_if_modified(|s| {
            let changed = s.selected.is_some() || s.metrics.is_some();
            s.selected = None;
            s.metrics = None;
            changed
        });
    }

    // =========================================================================
    // Actions
    // =========================================================================

    pub async fn start(&self, name: &str) -> Result<ActionOutcome, ApiError> {
        let outcome = self.client.start_vm(name).await?;
        self.converge(name).await;
        Ok(outcome)
    }

    pub async fn stop(&self, name: &str, force: bool) -> Result<ActionOutcome, ApiError> {
        let outcome = self.client.stop_vm(name, force).await?;
        self.converge(name).await;
        Ok(outcome)
    }

    pub async fn restart(&self, name: &str) -> Result<ActionOutcome, ApiError> {
        let outcome = self.client.restart_vm(name).await?;
        self.converge(name).await;
        Ok(outcome)
    }

    pub async fn update_resources(
        &self,
        name: &str,
        vcpus: u32,
        memory_mb: u64,
    ) -> Result<ActionOutcome, ApiError> {
        let outcome = self.client.update_resources(name, vcpus, memory_mb).await?;
        self.converge(name).await;
        Ok(outcome)
    }

    pub async fn create_snapshot(
        &self,
        name: &str,
        snapshot: &str,
        description: &str,
    ) -> Result<ActionOutcome, ApiError> {
        let outcome = self
            .client
            .create_snapshot(name, snapshot, description)
            .await?;
        self.fetch_snapshots(name, false).await;
        Ok(outcome)
    }

    /// Reverting can change the VM's own state, so the VM converges too
    pub async fn revert_snapshot(
        &self,
        name: &str,
        snapshot: &str,
    ) -> Result<ActionOutcome, ApiError> {
        let outcome = self.client.revert_snapshot(name, snapshot).await?;
        futures::join!(self.fetch_snapshots(name, false), self.converge(name));
        Ok(outcome)
    }

    pub async fn delete_snapshot(
        &self,
        name: &str,
        snapshot: &str,
    ) -> Result<ActionOutcome, ApiError> {
        let outcome = self.client.delete_snapshot(name, snapshot).await?;
        self.fetch_snapshots(name, false).await;
        Ok(outcome)
    }

    /// Pull the authoritative state after an action on `name`
    async fn converge(&self, name: &str) {
        if self.is_selected(name) {
            futures::join!(self.fetch_resources(true), self.fetch_detail(name));
        } else {
            self.fetch_resources(true).await;
        }
    }
}
