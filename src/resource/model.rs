//! Domain types
//!
//! Every type decodes from a `serde_json::Value` tolerantly: absent or
//! mistyped fields take a default (0, empty, `Unknown`) instead of failing.
//! Only a payload that is not structured JSON at all is rejected, and that
//! happens earlier, in the transport.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

// =========================================================================
// Field extraction
// =========================================================================

fn str_field(item: &Value, key: &str) -> String {
    opt_str(item, key).unwrap_or_default()
}

fn opt_str(item: &Value, key: &str) -> Option<String> {
    item.get(key).and_then(|v| v.as_str()).map(|s| s.to_string())
}

/// Non-negative integer; floats are rounded, negatives and junk become 0
fn u64_field(item: &Value, key: &str) -> u64 {
    opt_u64(item, key).unwrap_or(0)
}

fn opt_u64(item: &Value, key: &str) -> Option<u64> {
    let value = item.get(key)?;
    value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.is_finite() && *f >= 0.0)
            .map(|f| f.round() as u64)
    })
}

fn f64_field(item: &Value, key: &str) -> f64 {
    item.get(key).and_then(|v| v.as_f64()).unwrap_or(0.0)
}

fn opt_bool(item: &Value, key: &str) -> Option<bool> {
    item.get(key).and_then(|v| v.as_bool())
}

fn list_field<'a>(item: &'a Value, key: &str) -> &'a [Value] {
    item.get(key)
        .and_then(|v| v.as_array())
        .map(|a| a.as_slice())
        .unwrap_or(&[])
}

fn str_list(item: &Value, key: &str) -> Vec<String> {
    list_field(item, key)
        .iter()
        .filter_map(|v| v.as_str().map(|s| s.to_string()))
        .collect()
}

/// Epoch seconds or an RFC 3339 string
fn timestamp_field(item: &Value, key: &str) -> Option<DateTime<Utc>> {
    let value = item.get(key)?;
    if let Some(secs) = value.as_i64() {
        return DateTime::from_timestamp(secs, 0);
    }
    if let Some(secs) = value.as_f64() {
        return DateTime::from_timestamp(secs.trunc() as i64, 0);
    }
    value
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

// =========================================================================
// VM state
// =========================================================================

/// Lifecycle state of a VM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub enum VmState {
    Running,
    Stopped,
    Paused,
    Crashed,
    Suspended,
    #[default]
    Unknown,
}

impl VmState {
    pub const ALL: [VmState; 6] = [
        VmState::Running,
        VmState::Stopped,
        VmState::Paused,
        VmState::Crashed,
        VmState::Suspended,
        VmState::Unknown,
    ];

    /// Map a server state string; anything unrecognized is `Unknown`
    pub fn from_wire(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "running" => Self::Running,
            "stopped" | "shutoff" => Self::Stopped,
            "paused" => Self::Paused,
            "crashed" => Self::Crashed,
            "suspended" => Self::Suspended,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Paused => "paused",
            Self::Crashed => "crashed",
            Self::Suspended => "suspended",
            Self::Unknown => "unknown",
        }
    }

    fn from_field(item: &Value, key: &str) -> Self {
        item.get(key)
            .and_then(|v| v.as_str())
            .map(Self::from_wire)
            .unwrap_or_default()
    }
}

impl fmt::Display for VmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

// =========================================================================
// VM
// =========================================================================

/// A virtual machine as reported by the list or detail endpoint.
///
/// The extended attributes (`disks` onwards) are only populated by the detail
/// endpoint; list entries leave them empty.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Vm {
    pub name: String,
    pub uuid: String,
    pub state: VmState,
    pub vcpus: u32,
    pub memory_mb: u64,
    pub used_memory_mb: u64,
    pub is_active: bool,
    pub uptime_seconds: Option<u64>,
    pub disks: Vec<String>,
    pub network_interfaces: Vec<String>,
    pub os_type: Option<String>,
    pub autostart: Option<bool>,
    pub is_persistent: Option<bool>,
}

impl Vm {
    pub fn new(name: impl Into<String>, state: VmState) -> Self {
        Self {
            name: name.into(),
            state,
            is_active: state == VmState::Running,
            ..Default::default()
        }
    }

    pub fn from_json(item: &Value) -> Self {
        Self {
            name: str_field(item, "name"),
            uuid: str_field(item, "uuid"),
            state: VmState::from_field(item, "state"),
            vcpus: u32::try_from(u64_field(item, "vcpus")).unwrap_or(u32::MAX),
            memory_mb: u64_field(item, "memory_mb"),
            used_memory_mb: u64_field(item, "used_memory_mb"),
            is_active: opt_bool(item, "is_active").unwrap_or(false),
            uptime_seconds: opt_u64(item, "uptime_seconds"),
            disks: str_list(item, "disks"),
            network_interfaces: str_list(item, "network_interfaces"),
            os_type: opt_str(item, "os_type"),
            autostart: opt_bool(item, "autostart"),
            is_persistent: opt_bool(item, "is_persistent"),
        }
    }

    /// Decode the `GET /vms` envelope (`{"count": n, "vms": [...]}`)
    pub fn list_from_json(response: &Value) -> Vec<Vm> {
        list_field(response, "vms").iter().map(Vm::from_json).collect()
    }
}

// =========================================================================
// Metrics
// =========================================================================

/// Cumulative block device counters
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DiskIo {
    pub device: String,
    pub read_bytes: u64,
    pub write_bytes: u64,
    pub read_requests: u64,
    pub write_requests: u64,
    pub errors: u64,
}

impl DiskIo {
    fn from_json(item: &Value) -> Self {
        Self {
            device: str_field(item, "device"),
            read_bytes: u64_field(item, "read_bytes"),
            write_bytes: u64_field(item, "write_bytes"),
            read_requests: u64_field(item, "read_requests"),
            write_requests: u64_field(item, "write_requests"),
            errors: u64_field(item, "errors"),
        }
    }
}

/// Cumulative network interface counters
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NetworkIo {
    pub interface: String,
    pub rx_bytes: u64,
    pub rx_packets: u64,
    pub rx_errors: u64,
    pub rx_drops: u64,
    pub tx_bytes: u64,
    pub tx_packets: u64,
    pub tx_errors: u64,
    pub tx_drops: u64,
}

impl NetworkIo {
    fn from_json(item: &Value) -> Self {
        Self {
            interface: str_field(item, "interface"),
            rx_bytes: u64_field(item, "rx_bytes"),
            rx_packets: u64_field(item, "rx_packets"),
            rx_errors: u64_field(item, "rx_errors"),
            rx_drops: u64_field(item, "rx_drops"),
            tx_bytes: u64_field(item, "tx_bytes"),
            tx_packets: u64_field(item, "tx_packets"),
            tx_errors: u64_field(item, "tx_errors"),
            tx_drops: u64_field(item, "tx_drops"),
        }
    }
}

/// Point-in-time measurement of one VM; only the latest one is ever kept
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VmMetrics {
    pub name: String,
    pub state: VmState,
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub memory_used_mb: u64,
    pub memory_total_mb: u64,
    pub disk_io: Vec<DiskIo>,
    pub network_io: Vec<NetworkIo>,
    /// Server note, e.g. why metrics are empty for a stopped VM
    pub message: Option<String>,
}

impl VmMetrics {
    pub fn from_json(item: &Value) -> Self {
        Self {
            name: str_field(item, "name"),
            state: VmState::from_field(item, "state"),
            cpu_percent: f64_field(item, "cpu_percent"),
            memory_percent: f64_field(item, "memory_percent"),
            memory_used_mb: u64_field(item, "memory_used_mb"),
            memory_total_mb: u64_field(item, "memory_total_mb"),
            disk_io: list_field(item, "disk_io").iter().map(DiskIo::from_json).collect(),
            network_io: list_field(item, "network_io")
                .iter()
                .map(NetworkIo::from_json)
                .collect(),
            message: opt_str(item, "message"),
        }
    }

    /// All-zero metrics shown when live metrics are unavailable
    pub fn placeholder(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn total_disk_bytes(&self) -> (u64, u64) {
        self.disk_io.iter().fold((0, 0), |(r, w), d| {
            (r.saturating_add(d.read_bytes), w.saturating_add(d.write_bytes))
        })
    }

    pub fn total_network_bytes(&self) -> (u64, u64) {
        self.network_io.iter().fold((0, 0), |(rx, tx), n| {
            (rx.saturating_add(n.rx_bytes), tx.saturating_add(n.tx_bytes))
        })
    }
}

// =========================================================================
// Host stats
// =========================================================================

#[derive(Debug, Clone, PartialEq, Default)]
pub struct HostInfo {
    pub hostname: String,
    pub cpu_model: String,
    pub memory_total_mb: u64,
    pub cpus: u32,
    pub cpu_frequency_mhz: u64,
    pub libvirt_version: String,
    pub hypervisor_type: String,
}

impl HostInfo {
    fn from_json(item: &Value) -> Self {
        Self {
            hostname: str_field(item, "hostname"),
            cpu_model: str_field(item, "cpu_model"),
            memory_total_mb: u64_field(item, "memory_total_mb"),
            cpus: u32::try_from(u64_field(item, "cpus")).unwrap_or(u32::MAX),
            cpu_frequency_mhz: u64_field(item, "cpu_frequency_mhz"),
            libvirt_version: str_field(item, "libvirt_version"),
            hypervisor_type: str_field(item, "hypervisor_type"),
        }
    }
}

/// Hypervisor-wide summary, computed entirely by the server
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HostStats {
    pub host: HostInfo,
    pub vms_total: u64,
    pub vms_active: u64,
    pub vms_inactive: u64,
    pub state_distribution: BTreeMap<String, u64>,
    pub vms: Vec<Vm>,
}

impl HostStats {
    pub fn from_json(item: &Value) -> Self {
        let state_distribution = item
            .get("state_distribution")
            .and_then(|v| v.as_object())
            .map(|map| {
                map.iter()
                    .map(|(state, count)| (state.clone(), count.as_u64().unwrap_or(0)))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            host: item.get("host").map(HostInfo::from_json).unwrap_or_default(),
            vms_total: u64_field(item, "vms_total"),
            vms_active: u64_field(item, "vms_active"),
            vms_inactive: u64_field(item, "vms_inactive"),
            state_distribution,
            vms: list_field(item, "vms").iter().map(Vm::from_json).collect(),
        }
    }
}

// =========================================================================
// Snapshots
// =========================================================================

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot {
    pub name: String,
    pub description: String,
    pub state: VmState,
    pub created_at: Option<DateTime<Utc>>,
    /// Matches the VM's live disk state
    pub is_current: bool,
}

impl Snapshot {
    pub fn from_json(item: &Value) -> Self {
        Self {
            name: str_field(item, "name"),
            description: str_field(item, "description"),
            state: VmState::from_field(item, "state"),
            created_at: timestamp_field(item, "creation_time")
                .or_else(|| timestamp_field(item, "created_at")),
            is_current: opt_bool(item, "is_current").unwrap_or(false),
        }
    }

    pub fn list_from_json(response: &Value) -> Vec<Snapshot> {
        response
            .as_array()
            .map(|items| items.iter().map(Snapshot::from_json).collect())
            .unwrap_or_default()
    }
}

// =========================================================================
// Action results
// =========================================================================

/// Server acknowledgement of a state-changing action
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ActionOutcome {
    /// e.g. `started`, `already_running`, `stopped`, `restarted`
    pub status: String,
    pub name: String,
    pub message: String,
}

impl ActionOutcome {
    pub fn from_json(item: &Value) -> Self {
        Self {
            status: str_field(item, "status"),
            name: str_field(item, "name"),
            message: str_field(item, "message"),
        }
    }
}

/// `GET /health` payload
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HealthStatus {
    pub status: String,
    pub uptime_seconds: f64,
    pub libvirt_connected: bool,
    pub libvirt_message: String,
    pub websocket_available: bool,
}

impl HealthStatus {
    pub fn from_json(item: &Value) -> Self {
        let libvirt = item.get("libvirt").cloned().unwrap_or(Value::Null);
        Self {
            status: str_field(item, "status"),
            uptime_seconds: f64_field(item, "uptime_seconds"),
            libvirt_connected: opt_bool(&libvirt, "connected").unwrap_or(false),
            libvirt_message: str_field(&libvirt, "message"),
            websocket_available: opt_bool(item, "websocket_available").unwrap_or(false),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_state_mapping() {
        assert_eq!(VmState::from_wire("running"), VmState::Running);
        assert_eq!(VmState::from_wire("shutoff"), VmState::Stopped);
        assert_eq!(VmState::from_wire("STOPPED"), VmState::Stopped);
        assert_eq!(VmState::from_wire("blocked"), VmState::Unknown);
        assert_eq!(VmState::from_wire("no_state"), VmState::Unknown);
        assert_eq!(VmState::from_wire(""), VmState::Unknown);
    }

    #[test]
    fn test_vm_from_list_entry() {
        let vm = Vm::from_json(&json!({
            "name": "alpha",
            "uuid": "4dea22b3-1d52-d8f3-2516-782e98ab3fa0",
            "state": "running",
            "vcpus": 2,
            "memory_mb": 2048,
            "used_memory_mb": 1024,
            "uptime_seconds": 3600,
            "is_active": true
        }));

        assert_eq!(vm.name, "alpha");
        assert_eq!(vm.state, VmState::Running);
        assert_eq!(vm.vcpus, 2);
        assert_eq!(vm.memory_mb, 2048);
        assert_eq!(vm.uptime_seconds, Some(3600));
        assert!(vm.is_active);
        assert!(vm.disks.is_empty());
        assert_eq!(vm.autostart, None);
    }

    #[test]
    fn test_vm_tolerates_missing_and_mistyped_fields() {
        let vm = Vm::from_json(&json!({
            "name": "beta",
            "state": 3,
            "vcpus": "two",
            "memory_mb": -5,
            "uptime_seconds": null,
            "disks": "vda"
        }));

        assert_eq!(vm.state, VmState::Unknown);
        assert_eq!(vm.vcpus, 0);
        assert_eq!(vm.memory_mb, 0);
        assert_eq!(vm.uptime_seconds, None);
        assert!(vm.disks.is_empty());
        assert_eq!(vm.uuid, "");
    }

    #[test]
    fn test_vm_detail_fields() {
        let vm = Vm::from_json(&json!({
            "name": "alpha",
            "state": "running",
            "disks": ["vda", "vdb"],
            "network_interfaces": ["vnet0"],
            "os_type": "hvm",
            "autostart": true,
            "is_persistent": true
        }));

        assert_eq!(vm.disks, vec!["vda", "vdb"]);
        assert_eq!(vm.network_interfaces, vec!["vnet0"]);
        assert_eq!(vm.os_type.as_deref(), Some("hvm"));
        assert_eq!(vm.autostart, Some(true));
        assert_eq!(vm.is_persistent, Some(true));
    }

    #[test]
    fn test_list_envelope() {
        let vms = Vm::list_from_json(&json!({
            "count": 2,
            "vms": [{"name": "alpha"}, {"name": "beta"}]
        }));
        assert_eq!(vms.len(), 2);
        assert_eq!(vms[1].name, "beta");

        assert!(Vm::list_from_json(&json!({"count": 0})).is_empty());
    }

    #[test]
    fn test_metrics_decoding() {
        let metrics = VmMetrics::from_json(&json!({
            "name": "alpha",
            "state": "running",
            "cpu_percent": 12.5,
            "memory_percent": 50.0,
            "memory_used_mb": 1024,
            "memory_total_mb": 2048,
            "disk_io": [
                {"device": "vda", "read_bytes": 100, "write_bytes": 50},
                {"device": "vdb", "read_bytes": 1, "write_bytes": 2}
            ],
            "network_io": [
                {"interface": "vnet0", "rx_bytes": 10, "tx_bytes": 20}
            ]
        }));

        assert_eq!(metrics.cpu_percent, 12.5);
        assert_eq!(metrics.disk_io[0].device, "vda");
        assert_eq!(metrics.total_disk_bytes(), (101, 52));
        assert_eq!(metrics.total_network_bytes(), (10, 20));
        assert_eq!(metrics.network_io[0].rx_packets, 0);
    }

    #[test]
    fn test_metrics_for_stopped_vm() {
        let metrics = VmMetrics::from_json(&json!({
            "name": "beta",
            "state": "stopped",
            "message": "Les métriques ne sont disponibles que pour les VMs en cours d'exécution.",
            "cpu_percent": 0,
            "memory_percent": 0,
            "disk_io": [],
            "network_io": []
        }));

        assert_eq!(metrics.state, VmState::Stopped);
        assert_eq!(metrics.cpu_percent, 0.0);
        assert!(metrics.message.is_some());
    }

    #[test]
    fn test_placeholder_is_zeroed() {
        let metrics = VmMetrics::placeholder("alpha");
        assert_eq!(metrics.name, "alpha");
        assert_eq!(metrics.cpu_percent, 0.0);
        assert_eq!(metrics.memory_percent, 0.0);
        assert_eq!(metrics.memory_used_mb, 0);
        assert!(metrics.disk_io.is_empty());
        assert!(metrics.network_io.is_empty());
    }

    #[test]
    fn test_host_stats_decoding() {
        let stats = HostStats::from_json(&json!({
            "host": {
                "hostname": "kvm01",
                "cpu_model": "x86_64",
                "memory_total_mb": 64000,
                "cpus": 16,
                "cpu_frequency_mhz": 3200,
                "libvirt_version": "9.3.0",
                "hypervisor_type": "QEMU"
            },
            "vms_total": 3,
            "vms_active": 1,
            "vms_inactive": 2,
            "state_distribution": {"running": 1, "stopped": 2},
            "vms": [{"name": "alpha", "state": "running"}]
        }));

        assert_eq!(stats.host.hostname, "kvm01");
        assert_eq!(stats.host.cpus, 16);
        assert_eq!(stats.vms_inactive, 2);
        assert_eq!(stats.state_distribution.get("stopped"), Some(&2));
        assert_eq!(stats.vms.len(), 1);
    }

    #[test]
    fn test_snapshot_timestamps() {
        let from_epoch = Snapshot::from_json(&json!({
            "name": "before-upgrade",
            "description": "pre 24.04",
            "state": "shutoff",
            "creation_time": 1700000000,
            "is_current": true
        }));
        assert_eq!(from_epoch.state, VmState::Stopped);
        assert!(from_epoch.is_current);
        assert_eq!(
            from_epoch.created_at.map(|t| t.timestamp()),
            Some(1_700_000_000)
        );

        let from_string = Snapshot::from_json(&json!({
            "name": "s2",
            "creation_time": "2024-03-01T10:00:00Z"
        }));
        assert_eq!(
            from_string.created_at.map(|t| t.to_rfc3339()),
            Some("2024-03-01T10:00:00+00:00".to_string())
        );
        assert!(!from_string.is_current);

        let garbage = Snapshot::from_json(&json!({"name": "s3", "creation_time": "yesterday"}));
        assert_eq!(garbage.created_at, None);
    }

    #[test]
    fn test_action_outcome_and_health() {
        let outcome = ActionOutcome::from_json(&json!({
            "status": "already_running",
            "name": "alpha",
            "message": "La VM 'alpha' est déjà en cours d'exécution."
        }));
        assert_eq!(outcome.status, "already_running");

        let health = HealthStatus::from_json(&json!({
            "status": "degraded",
            "uptime_seconds": 12.5,
            "libvirt": {"connected": false, "message": "connection refused"},
            "websocket_available": false
        }));
        assert!(!health.is_healthy());
        assert!(!health.libvirt_connected);
        assert_eq!(health.libvirt_message, "connection refused");
    }
}
