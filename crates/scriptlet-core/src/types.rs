//! Records exchanged between the placement host and its scriptlets.
//!
//! Request and candidate records are converted into dynamic values before a
//! script sees them, so the serde names below are the keys scripts read.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

// ── Placement request ───────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstanceType {
    #[default]
    #[serde(rename = "container")]
    Container,
    #[serde(rename = "virtual-machine")]
    VirtualMachine,
}

/// Modifiable instance fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstancePut {
    pub architecture: String,
    pub config: HashMap<String, String>,
    pub devices: HashMap<String, HashMap<String, String>>,
    pub ephemeral: bool,
    pub profiles: Vec<String>,
    pub stateful: bool,
    pub description: String,
}

/// Where a new instance comes from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceSource {
    #[serde(rename = "type")]
    pub kind: String,
    pub alias: String,
    pub fingerprint: String,
    pub server: String,
    pub protocol: String,
}

/// An instance creation request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstancesPost {
    #[serde(flatten)]
    pub put: InstancePut,
    pub name: String,
    pub source: InstanceSource,
    /// Cloud instance type shorthand such as `"c2-m4"`.
    pub instance_type: String,
    #[serde(rename = "type")]
    pub kind: InstanceType,
    pub start: bool,
}

/// Why a placement is being requested.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlacementReason {
    #[default]
    New,
    Evacuation,
    Relocation,
}

/// The request handed to `instance_placement` as its first argument.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementRequest {
    #[serde(flatten)]
    pub instance: InstancesPost,
    pub project: String,
    pub reason: PlacementReason,
}

impl PlacementRequest {
    pub fn config(&self, key: &str) -> Option<&str> {
        self.instance
            .put
            .config
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn is_vm(&self) -> bool {
        self.instance.kind == InstanceType::VirtualMachine
    }
}

/// Resources an instance is expected to consume.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceResources {
    pub cpu_cores: u64,
    pub memory_size: u64,
    pub root_disk_size: u64,
}

// ── Cluster members ─────────────────────────────────────────────

/// Administrative state of a member as stored in the cluster database.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    #[default]
    Created,
    Pending,
    Evacuated,
}

/// A candidate member as the cluster database knows it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeInfo {
    pub id: i64,
    pub name: String,
    pub address: String,
    pub description: String,
    pub schema: i64,
    pub api_extensions: i64,
    /// Last successful heartbeat, seconds since the Unix epoch.
    pub heartbeat: u64,
    pub roles: Vec<String>,
    pub architecture: String,
    pub state: NodeState,
    pub config: HashMap<String, String>,
    pub groups: Vec<String>,
    /// Instances currently running on this member.
    pub instance_count: u64,
}

impl NodeInfo {
    /// True when the last heartbeat is older than `threshold` at `now`.
    pub fn is_offline(&self, threshold: Duration, now: u64) -> bool {
        now.saturating_sub(self.heartbeat) > threshold.as_secs()
    }

    /// Schema level and API extension count.
    pub fn version(&self) -> (i64, i64) {
        (self.schema, self.api_extensions)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RaftRole {
    #[default]
    Voter,
    Standby,
    Spare,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RaftNode {
    pub id: u64,
    pub address: String,
    pub role: RaftRole,
}

/// Cluster-wide facts needed to describe candidates to a scriptlet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataSnapshot {
    pub raft_nodes: Vec<RaftNode>,
    /// Failure domain id → name.
    pub failure_domains: HashMap<u64, String>,
    /// Member address → failure domain id.
    pub member_failure_domains: HashMap<String, u64>,
    /// Highest `(schema, api_extensions)` seen across members.
    pub max_version: (i64, i64),
    pub offline_threshold_secs: u64,
}

impl Default for MetadataSnapshot {
    fn default() -> Self {
        Self {
            raft_nodes: Vec::new(),
            failure_domains: HashMap::new(),
            member_failure_domains: HashMap::new(),
            max_version: (0, 0),
            offline_threshold_secs: 20,
        }
    }
}

impl MetadataSnapshot {
    pub fn offline_threshold(&self) -> Duration {
        Duration::from_secs(self.offline_threshold_secs)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberStatus {
    #[default]
    Online,
    Offline,
    Blocked,
    Evacuated,
}

/// A candidate member as scriptlets see it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterMember {
    pub server_name: String,
    pub url: String,
    pub database: bool,
    pub status: MemberStatus,
    pub message: String,
    pub architecture: String,
    pub roles: Vec<String>,
    pub failure_domain: String,
    pub description: String,
    pub config: HashMap<String, String>,
    pub groups: Vec<String>,
}

// ── Resources & state ───────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CpuResources {
    pub architecture: String,
    pub total: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryResources {
    pub used: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageDisk {
    pub id: String,
    pub model: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub size: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageResources {
    pub disks: Vec<StorageDisk>,
    pub total: u64,
}

/// Hardware inventory of one member.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceSnapshot {
    pub cpu: CpuResources,
    pub memory: MemoryResources,
    pub storage: StorageResources,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SysInfo {
    pub uptime: i64,
    pub load_averages: Vec<f64>,
    pub total_ram: u64,
    pub free_ram: u64,
    pub shared_ram: u64,
    pub buffered_ram: u64,
    pub total_swap: u64,
    pub free_swap: u64,
    pub processes: u16,
    pub logical_cpus: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSpace {
    pub used: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoragePoolState {
    pub space: PoolSpace,
    pub inodes: PoolSpace,
}

/// Runtime state of one member.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemberState {
    pub sysinfo: SysInfo,
    pub storage_pools: HashMap<String, StoragePoolState>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_flattens_embedded_records_in_json() {
        let json = r#"{
            "name": "c1",
            "type": "virtual-machine",
            "architecture": "x86_64",
            "config": {"limits.cpu": "2"},
            "profiles": ["default"],
            "project": "default",
            "reason": "evacuation"
        }"#;

        let req: PlacementRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.instance.name, "c1");
        assert!(req.is_vm());
        assert_eq!(req.instance.put.architecture, "x86_64");
        assert_eq!(req.config("limits.cpu"), Some("2"));
        assert_eq!(req.reason, PlacementReason::Evacuation);
    }

    #[test]
    fn empty_config_values_read_as_unset() {
        let mut req = PlacementRequest::default();
        req.instance
            .put
            .config
            .insert("limits.memory".to_string(), String::new());
        assert_eq!(req.config("limits.memory"), None);
        assert!(!req.is_vm());
    }

    #[test]
    fn offline_detection() {
        let node = NodeInfo {
            heartbeat: 1_000,
            ..Default::default()
        };
        let threshold = Duration::from_secs(20);
        assert!(!node.is_offline(threshold, 1_010));
        assert!(!node.is_offline(threshold, 1_020));
        assert!(node.is_offline(threshold, 1_021));
        // Clock skew never reads as offline.
        assert!(!node.is_offline(threshold, 900));
    }

    #[test]
    fn metadata_defaults() {
        let meta: MetadataSnapshot = serde_json::from_str("{}").unwrap();
        assert_eq!(meta.offline_threshold(), Duration::from_secs(20));
        assert!(meta.raft_nodes.is_empty());
    }

    #[test]
    fn failure_domain_ids_parse_from_json_keys() {
        let meta: MetadataSnapshot = serde_json::from_str(
            r#"{"failure_domains": {"1": "rack-a"}, "member_failure_domains": {"10.0.0.1:8443": 1}}"#,
        )
        .unwrap();
        assert_eq!(meta.failure_domains.get(&1).map(String::as_str), Some("rack-a"));
        assert_eq!(meta.member_failure_domains.get("10.0.0.1:8443"), Some(&1));
    }
}
