//! External collaborator interfaces.
//!
//! Everything the runner learns about the cluster comes through these
//! traits. Implementations are async and object safe; futures are boxed so
//! the traits can live behind `Arc<dyn _>`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use scriptlet_core::{MemberState, MetadataSnapshot, ResourceSnapshot};

use crate::error::CollaboratorError;

/// Boxed future returned by collaborator calls.
pub type CollabFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, CollaboratorError>> + Send + 'a>>;

/// Hardware inventory of the local member.
pub trait ResourceProbe: Send + Sync {
    fn local_resources(&self) -> CollabFuture<'_, ResourceSnapshot>;
}

/// Runtime state of the local member.
pub trait MemberStateSource: Send + Sync {
    fn local_member_state<'a>(&'a self, name: &'a str) -> CollabFuture<'a, MemberState>;
}

/// A connection to another cluster member.
pub trait RemoteHandle: Send + Sync {
    fn resources(&self) -> CollabFuture<'_, ResourceSnapshot>;

    fn member_state<'a>(&'a self, name: &'a str) -> CollabFuture<'a, MemberState>;
}

/// Opens connections to other cluster members.
pub trait ClusterClient: Send + Sync {
    fn connect<'a>(
        &'a self,
        address: &'a str,
        credentials: &'a Credentials,
    ) -> CollabFuture<'a, Box<dyn RemoteHandle>>;
}

/// Read access to the cluster database.
pub trait ClusterMetadata: Send + Sync {
    fn snapshot(&self) -> CollabFuture<'_, MetadataSnapshot>;
}

/// Certificates presented when connecting to another member.
#[derive(Clone, Default)]
pub struct Credentials {
    pub cluster_certificate: String,
    pub server_certificate: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("cluster_certificate", &"<redacted>")
            .field("server_certificate", &"<redacted>")
            .finish()
    }
}

/// The collaborator set a runner works against.
#[derive(Clone)]
pub struct Collaborators {
    pub resources: Arc<dyn ResourceProbe>,
    pub member_state: Arc<dyn MemberStateSource>,
    pub cluster: Arc<dyn ClusterClient>,
    pub metadata: Arc<dyn ClusterMetadata>,
    pub credentials: Credentials,
}

impl Collaborators {
    /// Use one object for every collaborator role.
    pub fn from_shared<C>(shared: Arc<C>, credentials: Credentials) -> Self
    where
        C: ResourceProbe + MemberStateSource + ClusterClient + ClusterMetadata + 'static,
    {
        Self {
            resources: shared.clone(),
            member_state: shared.clone(),
            cluster: shared.clone(),
            metadata: shared,
            credentials,
        }
    }
}
