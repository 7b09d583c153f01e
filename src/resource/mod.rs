//! Resource model
//!
//! Typed views of what the supervisor API returns, and the projection used to
//! filter the VM list.
//!
//! # Architecture
//!
//! - [`model`] - VMs, metrics, host stats, snapshots; tolerant JSON decoding
//! - [`filter`] - Pure search/state projection over the VM list
//!
//! Detail and metrics stay two separate values ([`Vm`] and [`VmMetrics`]);
//! they are only shown side by side, never merged.

pub mod filter;
pub mod model;

pub use filter::{project, Filter};
pub use model::{
    ActionOutcome, DiskIo, HealthStatus, HostInfo, HostStats, NetworkIo, Snapshot, Vm, VmMetrics,
    VmState,
};
