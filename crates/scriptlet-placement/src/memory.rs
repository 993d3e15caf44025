//! In-memory collaborators.
//!
//! [`StaticCluster`] answers every collaborator call from a fixed
//! [`ClusterFixture`]. The CLI uses it to dry-run scriptlets against a JSON
//! description of a cluster; tests use it with failure and latency knobs.

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use scriptlet_core::{MemberState, MetadataSnapshot, NodeInfo, ResourceSnapshot};

use crate::collaborators::{
    ClusterClient, ClusterMetadata, CollabFuture, Credentials, MemberStateSource, RemoteHandle,
    ResourceProbe,
};
use crate::error::CollaboratorError;

/// A cluster described as data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterFixture {
    /// Name of the member the runner is on.
    pub local: String,
    pub leader_address: String,
    pub metadata: MetadataSnapshot,
    pub members: Vec<FixtureMember>,
}

/// One member with everything collaborators report about it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixtureMember {
    #[serde(flatten)]
    pub node: NodeInfo,
    pub resources: ResourceSnapshot,
    pub member_state: MemberState,
}

impl FixtureMember {
    pub fn new(node: NodeInfo) -> Self {
        Self {
            node,
            ..Default::default()
        }
    }
}

/// Collaborators backed by a [`ClusterFixture`].
#[derive(Debug)]
pub struct StaticCluster {
    fixture: ClusterFixture,
    unreachable: Mutex<HashSet<String>>,
    metadata_error: Mutex<Option<String>>,
    latency: Duration,
    connections: AtomicUsize,
}

impl StaticCluster {
    /// An empty cluster whose local member is `local`.
    pub fn new(local: impl Into<String>) -> Self {
        Self::from_fixture(ClusterFixture {
            local: local.into(),
            ..Default::default()
        })
    }

    pub fn from_fixture(fixture: ClusterFixture) -> Self {
        Self {
            fixture,
            unreachable: Mutex::new(HashSet::new()),
            metadata_error: Mutex::new(None),
            latency: Duration::ZERO,
            connections: AtomicUsize::new(0),
        }
    }

    pub fn with_member(mut self, member: FixtureMember) -> Self {
        self.fixture.members.push(member);
        self
    }

    pub fn with_metadata(mut self, metadata: MetadataSnapshot) -> Self {
        self.fixture.metadata = metadata;
        self
    }

    /// Delay every collaborator answer by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Refuse connections to `address` from now on.
    pub fn set_unreachable(&self, address: &str) {
        lock(&self.unreachable).insert(address.to_string());
    }

    /// Make [`ClusterMetadata::snapshot`] fail with `message`.
    pub fn fail_metadata(&self, message: &str) {
        *lock(&self.metadata_error) = Some(message.to_string());
    }

    pub fn fixture(&self) -> &ClusterFixture {
        &self.fixture
    }

    /// The database view of every member, in fixture order.
    pub fn candidates(&self) -> Vec<NodeInfo> {
        self.fixture.members.iter().map(|m| m.node.clone()).collect()
    }

    /// Number of remote connections opened so far.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    fn member_named(&self, name: &str) -> Result<&FixtureMember, CollaboratorError> {
        self.fixture
            .members
            .iter()
            .find(|m| m.node.name == name)
            .ok_or_else(|| CollaboratorError::Query(format!("Member {name:?} not found")))
    }

    async fn delay(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

impl ResourceProbe for StaticCluster {
    fn local_resources(&self) -> CollabFuture<'_, ResourceSnapshot> {
        Box::pin(async move {
            self.delay().await;
            Ok(self.member_named(&self.fixture.local)?.resources.clone())
        })
    }
}

impl MemberStateSource for StaticCluster {
    fn local_member_state<'a>(&'a self, name: &'a str) -> CollabFuture<'a, MemberState> {
        Box::pin(async move {
            self.delay().await;
            Ok(self.member_named(name)?.member_state.clone())
        })
    }
}

impl ClusterClient for StaticCluster {
    fn connect<'a>(
        &'a self,
        address: &'a str,
        _credentials: &'a Credentials,
    ) -> CollabFuture<'a, Box<dyn RemoteHandle>> {
        Box::pin(async move {
            self.delay().await;
            let refused = lock(&self.unreachable).contains(address);
            if refused {
                return Err(CollaboratorError::Unreachable {
                    address: address.to_string(),
                    message: "connection refused".to_string(),
                });
            }

            let member = self
                .fixture
                .members
                .iter()
                .find(|m| m.node.address == address)
                .cloned()
                .ok_or_else(|| CollaboratorError::Unreachable {
                    address: address.to_string(),
                    message: "no such host".to_string(),
                })?;

            self.connections.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(StaticRemote {
                member,
                latency: self.latency,
            }) as Box<dyn RemoteHandle>)
        })
    }
}

impl ClusterMetadata for StaticCluster {
    fn snapshot(&self) -> CollabFuture<'_, MetadataSnapshot> {
        Box::pin(async move {
            self.delay().await;
            let failure = lock(&self.metadata_error).clone();
            if let Some(message) = failure {
                return Err(CollaboratorError::Query(message));
            }
            Ok(self.fixture.metadata.clone())
        })
    }
}

/// A connection to one fixture member.
struct StaticRemote {
    member: FixtureMember,
    latency: Duration,
}

impl StaticRemote {
    async fn delay(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

impl RemoteHandle for StaticRemote {
    fn resources(&self) -> CollabFuture<'_, ResourceSnapshot> {
        Box::pin(async move {
            self.delay().await;
            Ok(self.member.resources.clone())
        })
    }

    fn member_state<'a>(&'a self, name: &'a str) -> CollabFuture<'a, MemberState> {
        Box::pin(async move {
            self.delay().await;
            if name != self.member.node.name {
                return Err(CollaboratorError::Query(format!(
                    "Member {name:?} is not {:?}",
                    self.member.node.name
                )));
            }
            Ok(self.member.member_state.clone())
        })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(name: &str, address: &str, cores: u64) -> FixtureMember {
        let mut member = FixtureMember::new(NodeInfo {
            name: name.to_string(),
            address: address.to_string(),
            ..Default::default()
        });
        member.resources.cpu.total = cores;
        member
    }

    fn cluster() -> StaticCluster {
        StaticCluster::new("node1")
            .with_member(member("node1", "10.0.0.1:8443", 4))
            .with_member(member("node2", "10.0.0.2:8443", 8))
    }

    #[tokio::test]
    async fn local_and_remote_resources() {
        let cluster = cluster();
        assert_eq!(cluster.local_resources().await.unwrap().cpu.total, 4);

        let remote = cluster
            .connect("10.0.0.2:8443", &Credentials::default())
            .await
            .unwrap();
        assert_eq!(remote.resources().await.unwrap().cpu.total, 8);
        assert_eq!(cluster.connections(), 1);
    }

    #[tokio::test]
    async fn unreachable_members_refuse_connections() {
        let cluster = cluster();
        cluster.set_unreachable("10.0.0.2:8443");

        let err = cluster
            .connect("10.0.0.2:8443", &Credentials::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, CollaboratorError::Unreachable { .. }));
        assert_eq!(cluster.connections(), 0);
    }

    #[tokio::test]
    async fn metadata_failure() {
        let cluster = cluster();
        assert!(cluster.snapshot().await.is_ok());

        cluster.fail_metadata("database is locked");
        assert_eq!(
            cluster.snapshot().await.unwrap_err(),
            CollaboratorError::Query("database is locked".to_string())
        );
    }

    #[test]
    fn fixture_members_flatten_node_fields() {
        let json = r#"{
            "local": "node1",
            "members": [
                {"name": "node1", "address": "10.0.0.1:8443", "instance_count": 2,
                 "resources": {"cpu": {"total": 16}}}
            ]
        }"#;
        let fixture: ClusterFixture = serde_json::from_str(json).unwrap();
        let cluster = StaticCluster::from_fixture(fixture);

        let candidates = cluster.candidates();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].instance_count, 2);
        assert_eq!(cluster.fixture().members[0].resources.cpu.total, 16);
        assert_eq!(cluster.fixture().metadata.offline_threshold_secs, 20);
    }
}
