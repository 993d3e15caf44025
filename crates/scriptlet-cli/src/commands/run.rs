use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use serde::Deserialize;
use tokio::sync::watch;
use tracing::{info, warn};

use scriptlet_core::PlacementRequest;
use scriptlet_placement::members::epoch_secs;
use scriptlet_placement::{
    ClusterFixture, Collaborators, Credentials, PlacementRunner, RunnerSettings, StaticCluster,
    scriptlet,
};
use scriptlet_runtime::ProgramStore;

/// A cluster fixture plus the request to place.
#[derive(Debug, Deserialize)]
struct RunFixture {
    cluster: ClusterFixture,
    #[serde(default)]
    request: PlacementRequest,
}

pub async fn run(
    script: &Path,
    fixture: &Path,
    config: Option<&Path>,
    timeout: Option<&str>,
) -> anyhow::Result<()> {
    let mut config = super::load_config(config)?;
    if let Some(timeout) = timeout {
        config.placement.timeout = timeout.to_string();
    }

    let source = super::read_script(script)?;
    let RunFixture {
        mut cluster,
        request,
    } = serde_json::from_str(
        &std::fs::read_to_string(fixture)
            .with_context(|| format!("reading fixture {}", fixture.display()))?,
    )
    .with_context(|| format!("parsing fixture {}", fixture.display()))?;

    // Fixtures usually leave heartbeats out; treat those members as alive.
    let now = epoch_secs();
    for member in &mut cluster.members {
        if member.node.heartbeat == 0 {
            member.node.heartbeat = now;
        }
    }

    let mut settings = RunnerSettings::from_config(&config.placement)?;
    if !cluster.local.is_empty() {
        settings.server_name = cluster.local.clone();
    }
    let leader_address = cluster.leader_address.clone();

    let store = ProgramStore::new(config.engine.clone());
    scriptlet::set(&store, &source)
        .await
        .with_context(|| format!("loading {}", script.display()))?;

    let cluster = Arc::new(StaticCluster::from_fixture(cluster));
    let candidates = cluster.candidates();
    let collaborators = Collaborators::from_shared(cluster, Credentials::default());
    let runner = PlacementRunner::new(store, collaborators, settings);

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling placement");
            let _ = cancel_tx.send(true);
        }
    });

    info!(
        instance = %request.instance.name,
        candidates = candidates.len(),
        timeout = ?runner.settings().timeout,
        "running placement scriptlet"
    );
    let chosen = runner
        .select_target(&request, &candidates, &leader_address, Some(cancel_rx))
        .await?;

    println!("{}", serde_json::to_string_pretty(&chosen)?);
    Ok(())
}
