//! The capability surface of the instance placement scriptlet.
//!
//! | Capability | Returns |
//! |---|---|
//! | `log_info/log_warn/log_error(text, ...)` (1 to 16 arguments) | unit |
//! | `set_target(member_name)` | unit, or the invalid member sentinel |
//! | `get_cluster_member_resources(member_name)` | resources map, or sentinel |
//! | `get_cluster_member_state(member_name)` | state map, or sentinel |
//! | `get_instance_resources()` | derived instance resources |
//!
//! Collaborator lookups produce a [`Lookup`]. The dispatcher decides per
//! call site, through [`Missing`], whether an unknown member is reported to
//! the script or fails the run. Hard failures are recorded so the runner
//! can return the typed error instead of the interpreter's message.

use std::any::TypeId;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rhai::{Dynamic, Engine, EvalAltResult, ImmutableString, Position};
use serde::Serialize;
use tokio::runtime::Handle;
use tracing::{error, info, warn};

use scriptlet_core::{InstanceResources, MemberState, NodeInfo, ResourceSnapshot};
use scriptlet_runtime::{Capability, CancelToken, ExecutionContext, to_script_value};

use crate::collaborators::Collaborators;
use crate::error::{CollaboratorError, PlacementError};

pub const LOG_INFO: &str = "log_info";
pub const LOG_WARN: &str = "log_warn";
pub const LOG_ERROR: &str = "log_error";
pub const SET_TARGET: &str = "set_target";
pub const GET_CLUSTER_MEMBER_RESOURCES: &str = "get_cluster_member_resources";
pub const GET_CLUSTER_MEMBER_STATE: &str = "get_cluster_member_state";
pub const GET_INSTANCE_RESOURCES: &str = "get_instance_resources";

/// Most arguments a `log_*` call takes. rhai matches `Dynamic` parameters
/// on at most this many positions.
pub const MAX_LOG_ARGS: usize = 16;

/// Compile-time allow-list and runtime binding list.
pub const CAPABILITIES: &[Capability] = &[
    Capability::variadic(LOG_INFO, 1, MAX_LOG_ARGS),
    Capability::variadic(LOG_WARN, 1, MAX_LOG_ARGS),
    Capability::variadic(LOG_ERROR, 1, MAX_LOG_ARGS),
    Capability::new(SET_TARGET, 1),
    Capability::new(GET_CLUSTER_MEMBER_RESOURCES, 1),
    Capability::new(GET_CLUSTER_MEMBER_STATE, 1),
    Capability::new(GET_INSTANCE_RESOURCES, 0),
];

/// Returned to the script when a member name matches no candidate.
pub const INVALID_MEMBER: &str = "Invalid member name";

const LOG_PREFIX: &str = "Instance placement scriptlet: ";

/// Outcome of a collaborator lookup.
#[derive(Debug)]
pub enum Lookup<T> {
    Found(T),
    NotFound,
    Failed(PlacementError),
}

/// What an unknown member means at a given call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Missing {
    /// Hand [`INVALID_MEMBER`] back to the script and keep going.
    Sentinel,
    /// Fail the run.
    Fail,
}

#[derive(Debug, Clone, Copy)]
enum LogLevel {
    Info,
    Warn,
    Error,
}

/// Request-scoped state shared by every capability of one run.
#[derive(Clone)]
pub(crate) struct Env {
    candidates: Arc<Vec<NodeInfo>>,
    server_name: Arc<str>,
    resources: InstanceResources,
    collaborators: Collaborators,
    handle: Handle,
    cancel: CancelToken,
    target: Arc<Mutex<Option<usize>>>,
    failure: Arc<Mutex<Option<PlacementError>>>,
}

impl Env {
    pub(crate) fn new(
        candidates: Arc<Vec<NodeInfo>>,
        server_name: &str,
        resources: InstanceResources,
        collaborators: Collaborators,
        handle: Handle,
        cancel: CancelToken,
    ) -> Self {
        Self {
            candidates,
            server_name: Arc::from(server_name),
            resources,
            collaborators,
            handle,
            cancel,
            target: Arc::new(Mutex::new(None)),
            failure: Arc::new(Mutex::new(None)),
        }
    }

    /// Register every capability on `ctx`.
    pub(crate) fn bind(&self, ctx: &mut ExecutionContext) {
        ctx.bind(LOG_INFO, |engine, name| register_log(engine, name, LogLevel::Info));
        ctx.bind(LOG_WARN, |engine, name| register_log(engine, name, LogLevel::Warn));
        ctx.bind(LOG_ERROR, |engine, name| register_log(engine, name, LogLevel::Error));

        let env = self.clone();
        ctx.bind(SET_TARGET, move |engine, name| {
            engine.register_fn(name, move |member: ImmutableString| env.set_target(member.as_str()));
        });

        let env = self.clone();
        ctx.bind(GET_CLUSTER_MEMBER_RESOURCES, move |engine, name| {
            engine.register_fn(name, move |member: ImmutableString| {
                let lookup = env.member_resources(member.as_str());
                env.dispatch(GET_CLUSTER_MEMBER_RESOURCES, member.as_str(), lookup, Missing::Sentinel)
            });
        });

        let env = self.clone();
        ctx.bind(GET_CLUSTER_MEMBER_STATE, move |engine, name| {
            engine.register_fn(name, move |member: ImmutableString| {
                let lookup = env.member_state(member.as_str());
                env.dispatch(GET_CLUSTER_MEMBER_STATE, member.as_str(), lookup, Missing::Sentinel)
            });
        });

        let env = self.clone();
        ctx.bind(GET_INSTANCE_RESOURCES, move |engine, name| {
            engine.register_fn(name, move || {
                env.dispatch(
                    GET_INSTANCE_RESOURCES,
                    "",
                    Lookup::Found(env.resources),
                    Missing::Fail,
                )
            });
        });
    }

    /// The candidate recorded by `set_target`, if any.
    pub(crate) fn target(&self) -> Option<NodeInfo> {
        let index = *lock(&self.target);
        index.and_then(|i| self.candidates.get(i).cloned())
    }

    /// The first hard failure raised by a capability.
    pub(crate) fn take_failure(&self) -> Option<PlacementError> {
        lock(&self.failure).take()
    }

    fn candidate(&self, name: &str) -> Option<(usize, &NodeInfo)> {
        self.candidates
            .iter()
            .enumerate()
            .find(|(_, node)| node.name == name)
    }

    fn set_target(&self, member: &str) -> Dynamic {
        match self.candidate(member) {
            Some((index, node)) => {
                *lock(&self.target) = Some(index);
                info!(member = %node.name, "Instance placement scriptlet set member target");
                Dynamic::UNIT
            }
            None => {
                warn!(member, "Instance placement scriptlet set invalid member target");
                Dynamic::from(INVALID_MEMBER.to_string())
            }
        }
    }

    fn member_resources(&self, member: &str) -> Lookup<ResourceSnapshot> {
        let operation = "Getting member resources";

        if member == &*self.server_name {
            let result = self.block_on(self.collaborators.resources.local_resources());
            return self.found_or_failed(operation, member, result);
        }

        let Some((_, node)) = self.candidate(member) else {
            return Lookup::NotFound;
        };

        let cluster = &self.collaborators.cluster;
        let credentials = &self.collaborators.credentials;
        let result = self.block_on(async {
            let remote = cluster.connect(&node.address, credentials).await?;
            remote.resources().await
        });
        self.found_or_failed(operation, member, result)
    }

    fn member_state(&self, member: &str) -> Lookup<MemberState> {
        let operation = "Getting member state";

        if member == &*self.server_name {
            let result = self.block_on(self.collaborators.member_state.local_member_state(member));
            return self.found_or_failed(operation, member, result);
        }

        let Some((_, node)) = self.candidate(member) else {
            return Lookup::NotFound;
        };

        let cluster = &self.collaborators.cluster;
        let credentials = &self.collaborators.credentials;
        let result = self.block_on(async {
            let remote = cluster.connect(&node.address, credentials).await?;
            remote.member_state(member).await
        });
        self.found_or_failed(operation, member, result)
    }

    fn found_or_failed<T>(
        &self,
        operation: &'static str,
        member: &str,
        result: Result<T, CollaboratorError>,
    ) -> Lookup<T> {
        match result {
            Ok(value) => Lookup::Found(value),
            Err(source) => Lookup::Failed(PlacementError::Collaborator {
                operation,
                member: member.to_string(),
                source,
            }),
        }
    }

    /// Drive collaborator I/O from the interpreter thread, racing the
    /// cancel token.
    fn block_on<T>(
        &self,
        fut: impl Future<Output = Result<T, CollaboratorError>>,
    ) -> Result<T, CollaboratorError> {
        let cancel = &self.cancel;
        self.handle.block_on(async {
            tokio::select! {
                result = fut => result,
                _ = cancel.cancelled() => Err(CollaboratorError::Cancelled),
            }
        })
    }

    fn dispatch<T: Serialize>(
        &self,
        capability: &'static str,
        member: &str,
        lookup: Lookup<T>,
        missing: Missing,
    ) -> Result<Dynamic, Box<EvalAltResult>> {
        match lookup {
            Lookup::Found(value) => to_script_value(&value).map_err(|source| {
                self.fail(PlacementError::Convert {
                    what: format!("{capability} result"),
                    source,
                })
            }),
            Lookup::NotFound => match missing {
                Missing::Sentinel => {
                    warn!(member, capability, "Instance placement scriptlet asked for unknown member");
                    Ok(Dynamic::from(INVALID_MEMBER.to_string()))
                }
                Missing::Fail => Err(self.fail(PlacementError::Collaborator {
                    operation: capability,
                    member: member.to_string(),
                    source: CollaboratorError::Query(INVALID_MEMBER.to_string()),
                })),
            },
            Lookup::Failed(err) => Err(self.fail(err)),
        }
    }

    /// Record a hard failure and turn it into an interpreter error. The
    /// first failure of a run is kept.
    fn fail(&self, err: PlacementError) -> Box<EvalAltResult> {
        let message = err.to_string();
        lock(&self.failure).get_or_insert(err);
        EvalAltResult::ErrorRuntime(Dynamic::from(message), Position::NONE).into()
    }
}

fn register_log(engine: &mut Engine, name: &str, level: LogLevel) {
    for arity in 1..=MAX_LOG_ARGS {
        engine.register_raw_fn(
            name.to_string(),
            vec![TypeId::of::<Dynamic>(); arity],
            move |_, args| {
                emit(level, args.iter().map(|arg| &**arg));
                Ok(())
            },
        );
    }
}

fn emit<'a>(level: LogLevel, args: impl Iterator<Item = &'a Dynamic>) {
    let text = concat(args);
    match level {
        LogLevel::Info => info!("{LOG_PREFIX}{text}"),
        LogLevel::Warn => warn!("{LOG_PREFIX}{text}"),
        LogLevel::Error => error!("{LOG_PREFIX}{text}"),
    }
}

fn concat<'a>(args: impl Iterator<Item = &'a Dynamic>) -> String {
    args.map(Dynamic::to_string).collect()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_names_are_unique() {
        let mut names: Vec<&str> = CAPABILITIES.iter().map(|cap| cap.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), CAPABILITIES.len());
    }

    #[test]
    fn log_arguments_are_concatenated() {
        let args = [
            Dynamic::from("cores: ".to_string()),
            Dynamic::from_int(4),
            Dynamic::from(", ok: ".to_string()),
            Dynamic::from_bool(true),
        ];
        assert_eq!(concat(args.iter()), "cores: 4, ok: true");
    }

    #[test]
    fn log_accepts_every_declared_arity() {
        let mut engine = Engine::new();
        register_log(&mut engine, LOG_INFO, LogLevel::Info);

        let args: Vec<String> = (0..MAX_LOG_ARGS).map(|i| i.to_string()).collect();
        for arity in 1..=MAX_LOG_ARGS {
            let call = format!("{LOG_INFO}({})", args[..arity].join(", "));
            assert!(engine.run(&call).is_ok(), "{call}");
        }
        assert!(engine.run(r#"log_info("a", 1, 2.5, true, [], #{})"#).is_ok());
    }
}
