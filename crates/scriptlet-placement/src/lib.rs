//! scriptlet-placement — instance placement through user scriptlets.
//!
//! A placement request is answered by the `instance_placement` scriptlet.
//! The runner gathers everything the script may look at, binds the
//! capability functions, runs the entry point and reads back the member
//! the script chose with `set_target`.
//!
//! ```text
//!   request + candidates
//!          │
//!          ▼
//!   GatherInputs ── ClusterMetadata ──▶ ClusterMember records
//!          │                            InstanceResources
//!          ▼
//!   BuildCapabilities (log_*, set_target, get_*)
//!          │
//!          ▼
//!   AcquireProgram ── ProgramStore::get("instance_placement")
//!          │
//!          ▼
//!   Init ─▶ Invoke instance_placement(request, candidate_members)
//!          │            │
//!          │            └── capabilities ──▶ ResourceProbe / ClusterClient
//!          ▼                                  MemberStateSource
//!   Option<NodeInfo>
//! ```
//!
//! Every stage can end in a cancellation: the [`scriptlet_runtime::CancelToken`]
//! is polled by the interpreter and raced against collaborator I/O.

pub mod capability;
pub mod collaborators;
pub mod error;
pub mod members;
pub mod memory;
pub mod resources;
pub mod runner;
pub mod scriptlet;
pub mod units;

pub use capability::{CAPABILITIES, INVALID_MEMBER, Lookup, Missing};
pub use collaborators::{
    ClusterClient, ClusterMetadata, CollabFuture, Collaborators, Credentials, MemberStateSource,
    RemoteHandle, ResourceProbe,
};
pub use error::{CollaboratorError, PlacementError, PlacementResult};
pub use memory::{ClusterFixture, FixtureMember, StaticCluster};
pub use runner::{PlacementRunner, RunnerSettings, least_loaded};
