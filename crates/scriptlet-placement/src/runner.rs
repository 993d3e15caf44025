//! Placement runs.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use scriptlet_core::config::{PlacementConfig, VmDefaults, parse_duration};
use scriptlet_core::{ClusterMember, NodeInfo, PlacementRequest};
use scriptlet_runtime::{CancelToken, ProgramStore, ScriptError, to_rhai};
use scriptlet_value::to_dynamic;

use crate::capability::Env;
use crate::collaborators::Collaborators;
use crate::error::{CollaboratorError, PlacementError, PlacementResult};
use crate::members::{epoch_secs, to_cluster_member};
use crate::resources::instance_resources;
use crate::scriptlet::{ENTRY_POINT, INSTANCE_PLACEMENT};

/// Per-deployment runner settings.
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    /// Name of the local member. Queries for it skip the network.
    pub server_name: String,
    /// Upper bound on one [`PlacementRunner::select_target`] call.
    pub timeout: Duration,
    pub vm_defaults: VmDefaults,
}

impl RunnerSettings {
    pub fn from_config(config: &PlacementConfig) -> PlacementResult<Self> {
        let timeout = parse_duration(&config.timeout).ok_or_else(|| PlacementError::Parse {
            field: "placement.timeout",
            message: format!("invalid duration {:?}", config.timeout),
        })?;

        Ok(Self {
            server_name: config.server_name.clone(),
            timeout,
            vm_defaults: config.vm_defaults.clone(),
        })
    }
}

/// Runs the instance placement scriptlet against a set of collaborators.
pub struct PlacementRunner {
    store: ProgramStore,
    collaborators: Collaborators,
    settings: RunnerSettings,
}

impl PlacementRunner {
    pub fn new(store: ProgramStore, collaborators: Collaborators, settings: RunnerSettings) -> Self {
        Self {
            store,
            collaborators,
            settings,
        }
    }

    pub fn store(&self) -> &ProgramStore {
        &self.store
    }

    pub fn settings(&self) -> &RunnerSettings {
        &self.settings
    }

    /// Run the loaded scriptlet once and return the member it chose.
    ///
    /// `Ok(None)` means the script completed without a valid `set_target`.
    pub async fn run(
        &self,
        request: &PlacementRequest,
        candidates: &[NodeInfo],
        leader_address: &str,
        cancel: &CancelToken,
    ) -> PlacementResult<Option<NodeInfo>> {
        if cancel.is_cancelled() {
            return Err(cancelled());
        }

        // GatherInputs
        let metadata = tokio::select! {
            result = self.collaborators.metadata.snapshot() => result,
            _ = cancel.cancelled() => Err(CollaboratorError::Cancelled),
        }
        .map_err(PlacementError::Metadata)?;

        let now = epoch_secs();
        let members: Vec<ClusterMember> = candidates
            .iter()
            .map(|node| to_cluster_member(node, &metadata, leader_address, now))
            .collect();
        let resources = instance_resources(request, &self.settings.vm_defaults)?;

        let request_value = to_dynamic(request).map_err(|source| PlacementError::Convert {
            what: "request".to_string(),
            source,
        })?;
        let members_value = to_dynamic(&members).map_err(|source| PlacementError::Convert {
            what: "candidate members".to_string(),
            source,
        })?;
        debug!(candidates = members.len(), ?resources, "placement inputs gathered");

        // BuildCapabilities
        let env = Env::new(
            Arc::new(candidates.to_vec()),
            &self.settings.server_name,
            resources,
            self.collaborators.clone(),
            tokio::runtime::Handle::current(),
            cancel.clone(),
        );

        // AcquireProgram
        let (program, mut context) = self.store.get(INSTANCE_PLACEMENT).await?;

        // Init + Invoke, on a thread of their own.
        let dispatch = tracing::dispatcher::get_default(|current| current.clone());
        let token = cancel.clone();
        let binder = env.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            tracing::dispatcher::with_default(&dispatch, || {
                binder.bind(&mut context);
                context.init(&token)?;
                context.call(
                    ENTRY_POINT,
                    (to_rhai(request_value), to_rhai(members_value)),
                    &token,
                )
            })
        })
        .await
        .map_err(|e| ScriptError::Runtime(format!("Failed to run: {e}")))?;

        if let Err(err) = outcome {
            if cancel.is_cancelled() || matches!(err, ScriptError::Cancelled(_)) {
                warn!(program = %program.name(), "placement scriptlet cancelled");
                return Err(cancelled());
            }
            return Err(env.take_failure().unwrap_or(PlacementError::Script(err)));
        }

        // A script may catch a capability error; the run still fails.
        if let Some(failure) = env.take_failure() {
            return Err(failure);
        }

        let target = env.target();
        match &target {
            Some(node) => info!(member = %node.name, "placement scriptlet selected target"),
            None => debug!("placement scriptlet selected no target"),
        }
        Ok(target)
    }

    /// Pick a member for `request`.
    ///
    /// Runs the scriptlet when one is loaded, bounded by the configured
    /// timeout and `signal`. Falls back to the candidate with the fewest
    /// instances when no scriptlet is loaded or it sets no target.
    pub async fn select_target(
        &self,
        request: &PlacementRequest,
        candidates: &[NodeInfo],
        leader_address: &str,
        signal: Option<watch::Receiver<bool>>,
    ) -> PlacementResult<Option<NodeInfo>> {
        let cancel = signal
            .map(CancelToken::from_signal)
            .unwrap_or_default()
            .with_timeout(self.settings.timeout);

        let chosen = match self.run(request, candidates, leader_address, &cancel).await {
            Ok(chosen) => chosen,
            Err(PlacementError::Script(ScriptError::NotLoaded(_))) => {
                debug!("no placement scriptlet loaded");
                None
            }
            Err(err) => return Err(err),
        };

        Ok(chosen.or_else(|| {
            let fallback = least_loaded(candidates);
            if let Some(node) = &fallback {
                info!(member = %node.name, instances = node.instance_count, "falling back to least loaded member");
            }
            fallback
        }))
    }
}

/// The candidate running the fewest instances. Ties go to the earliest.
pub fn least_loaded(candidates: &[NodeInfo]) -> Option<NodeInfo> {
    candidates
        .iter()
        .min_by_key(|node| node.instance_count)
        .cloned()
}

fn cancelled() -> PlacementError {
    PlacementError::Script(ScriptError::Cancelled("Request finished".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str, instances: u64) -> NodeInfo {
        NodeInfo {
            name: name.to_string(),
            instance_count: instances,
            ..Default::default()
        }
    }

    #[test]
    fn least_loaded_prefers_first_on_ties() {
        let nodes = vec![node("a", 3), node("b", 1), node("c", 1)];
        assert_eq!(least_loaded(&nodes).map(|n| n.name), Some("b".to_string()));
        assert!(least_loaded(&[]).is_none());
    }

    #[test]
    fn settings_from_config() {
        let settings = RunnerSettings::from_config(&PlacementConfig::default()).unwrap();
        assert_eq!(settings.timeout, Duration::from_secs(5));

        let bad = PlacementConfig {
            timeout: "whenever".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            RunnerSettings::from_config(&bad),
            Err(PlacementError::Parse { field: "placement.timeout", .. })
        ));
    }

    #[test]
    fn overflowing_timeout_is_a_parse_error() {
        let huge = PlacementConfig {
            timeout: "999999999999999999m".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            RunnerSettings::from_config(&huge),
            Err(PlacementError::Parse { field: "placement.timeout", .. })
        ));
    }
}
