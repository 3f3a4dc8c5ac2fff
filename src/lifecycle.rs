//! Bootstrap readiness phases and the shutdown drain.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::docker::Engine;
use crate::model::MonitorStatus;
use crate::registry::MonitorStore;
use crate::transition::{Action, TransitionEngine};

const READINESS_POLL: Duration = Duration::from_secs(1);
const BACKOFF_START: Duration = Duration::from_secs(1);
const BACKOFF_CAP: Duration = Duration::from_secs(60);

/// Block until the registry answers queries.
pub async fn wait_for_registry(store: &Arc<dyn MonitorStore>) {
    loop {
        match store.ready().await {
            Ok(true) => {
                info!("registry ready");
                return;
            }
            Ok(false) => warn!("registry not ready yet"),
            Err(e) => warn!(error = %e, "registry not reachable yet"),
        }
        sleep(READINESS_POLL).await;
    }
}

/// Block until the engine answers a list call.
pub async fn wait_for_engine(engine: &Arc<dyn Engine>) {
    loop {
        match engine.list().await {
            Ok(_) => {
                info!("engine ready");
                return;
            }
            Err(e) => warn!(error = %e, "engine not reachable yet"),
        }
        sleep(READINESS_POLL).await;
    }
}

/// Pull the monitor image, retrying indefinitely with exponential back-off.
pub async fn pull_with_backoff(engine: &Arc<dyn Engine>, image: &str) {
    let mut backoff = BACKOFF_START;

    loop {
        match engine.pull(image).await {
            Ok(()) => {
                info!(image = %image, "monitor image present");
                return;
            }
            Err(e) => {
                warn!(image = %image, error = %e, retry_in = ?backoff, "image pull failed");
                sleep(backoff).await;
                backoff = (backoff * 2).min(BACKOFF_CAP);
            }
        }
    }
}

/// Tear down every running monitor and wait for the queues to drain.
///
/// Records whose logged container no longer resolves are dropped directly;
/// everything else goes through the transition engine so in-flight actions
/// on the same container stay ordered.
pub async fn drain_monitors(
    store: &Arc<dyn MonitorStore>,
    transitions: &TransitionEngine,
) -> anyhow::Result<()> {
    let monitors = store
        .find_all(Some(MonitorStatus::Running))
        .await
        .context("listing running monitors")?;

    info!(count = monitors.len(), "removing running monitors");

    let mut container_ids = Vec::new();
    for monitor in monitors {
        match store
            .get_logged_container(&monitor)
            .await
            .context("resolving logged container")?
        {
            Some(container) => {
                container_ids.push(container.id.clone());
                transitions.enqueue(Action::Remove, container, Some(monitor));
            }
            None => {
                warn!(monitor = %monitor.uri, "logged container vanished, dropping record");
                store
                    .remove(&monitor)
                    .await
                    .context("dropping orphaned record")?;
            }
        }
    }

    for id in container_ids {
        transitions.wait(&id).await;
    }

    Ok(())
}
