//! Candidate member enrichment.
//!
//! Scriptlets never see raw database rows. Each candidate is described as a
//! [`ClusterMember`]: roles, failure domain and a status derived from
//! heartbeat age, member state and version skew.

use std::time::{SystemTime, UNIX_EPOCH};

use scriptlet_core::{ClusterMember, MemberStatus, MetadataSnapshot, NodeInfo, NodeState, RaftRole};

pub const DEFAULT_FAILURE_DOMAIN: &str = "default";

/// Describe `node` the way scriptlets see it.
pub fn to_cluster_member(
    node: &NodeInfo,
    meta: &MetadataSnapshot,
    leader_address: &str,
    now: u64,
) -> ClusterMember {
    let raft_role = meta
        .raft_nodes
        .iter()
        .find(|raft| raft.address == node.address)
        .map(|raft| raft.role);

    let mut roles = node.roles.clone();
    let mut add_role = |role: &str| {
        if !roles.iter().any(|r| r == role) {
            roles.push(role.to_string());
        }
    };
    match raft_role {
        Some(RaftRole::Voter) => add_role("database"),
        Some(RaftRole::Standby) => add_role("database-standby"),
        Some(RaftRole::Spare) | None => {}
    }
    if !leader_address.is_empty() && node.address == leader_address {
        add_role("database-leader");
    }

    let failure_domain = meta
        .member_failure_domains
        .get(&node.address)
        .and_then(|id| meta.failure_domains.get(id))
        .cloned()
        .unwrap_or_else(|| DEFAULT_FAILURE_DOMAIN.to_string());

    let (status, message) = status(node, meta, now);

    ClusterMember {
        server_name: node.name.clone(),
        url: format!("https://{}", node.address),
        database: raft_role == Some(RaftRole::Voter),
        status,
        message,
        architecture: node.architecture.clone(),
        roles,
        failure_domain,
        description: node.description.clone(),
        config: node.config.clone(),
        groups: node.groups.clone(),
    }
}

fn status(node: &NodeInfo, meta: &MetadataSnapshot, now: u64) -> (MemberStatus, String) {
    if node.state == NodeState::Evacuated {
        return (
            MemberStatus::Evacuated,
            "Unavailable due to maintenance".to_string(),
        );
    }

    if node.is_offline(meta.offline_threshold(), now) {
        return (
            MemberStatus::Offline,
            format!("No heartbeat for {}s", now.saturating_sub(node.heartbeat)),
        );
    }

    if node.version() < meta.max_version {
        return (MemberStatus::Blocked, "Upgrade needed".to_string());
    }

    (MemberStatus::Online, "Fully operational".to_string())
}

/// Seconds since the Unix epoch.
pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
