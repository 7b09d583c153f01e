//! kvmwatch - keeps a local, observable copy of a KVM supervisor's state
//!
//! - [`api`] talks to the supervisor over a resilient transport
//! - [`store`] holds what was fetched and publishes every change
//! - [`resource`] decodes payloads and filters the VM list
//! - [`config`] persists user preferences

pub mod api;
pub mod config;
pub mod resource;
pub mod store;

pub use api::{ApiError, ResourceClient, RetryPolicy};
pub use config::Config;
pub use resource::{project, Filter, Vm, VmMetrics, VmState};
pub use store::{RefreshScheduler, StoreState, SyncStore};

/// Version injected at compile time via KVMWATCH_VERSION, or "dev" for local builds.
pub const VERSION: &str = match option_env!("KVMWATCH_VERSION") {
    Some(v) => v,
    None => "dev",
};
