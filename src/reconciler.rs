//! Periodic sweep converging monitors onto the set of eligible containers.
//!
//! Each pass diffs the persisted running monitors against the live eligible
//! containers and enqueues whatever corrective actions the diff implies. The
//! pass never waits for the actions to finish; snapshots are not isolated
//! from concurrent changes, and the next pass corrects any drift.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::error::RegistryError;
use crate::model::MonitorStatus;
use crate::registry::MonitorStore;
use crate::transition::{Action, TransitionEngine};

pub struct Reconciler {
    store: Arc<dyn MonitorStore>,
    transitions: TransitionEngine,
}

impl Reconciler {
    pub fn new(store: Arc<dyn MonitorStore>, transitions: TransitionEngine) -> Self {
        Reconciler { store, transitions }
    }

    /// One sweep. Returns as soon as every intent is enqueued.
    pub async fn run_once(&self) -> Result<(), RegistryError> {
        let mut monitors = self.store.find_all(Some(MonitorStatus::Running)).await?;
        let containers = self.store.logged_containers().await?;

        debug!(
            monitors = monitors.len(),
            containers = containers.len(),
            "reconciling"
        );

        for container in containers {
            let position = monitors
                .iter()
                .position(|m| m.logged_container == container.uri);

            match position {
                Some(position) => {
                    let monitor = monitors.swap_remove(position);
                    let status = self.store.container_status(&monitor).await?;
                    if !status.is_active() {
                        // The companion died or was killed externally.
                        info!(
                            container = %container.name,
                            companion = %monitor.id,
                            status = %status,
                            "companion not running, restarting monitor"
                        );
                        self.transitions
                            .enqueue(Action::Restart, container, Some(monitor));
                    }
                }
                None => {
                    self.transitions.enqueue(Action::Create, container, None);
                }
            }
        }

        // Whatever is left has no eligible container anymore.
        for monitor in monitors {
            match self.store.get_logged_container(&monitor).await? {
                Some(container) => {
                    self.transitions
                        .enqueue(Action::Remove, container, Some(monitor));
                }
                None => {
                    // Nothing to tear down in the engine that we can still
                    // address; drop the orphaned record directly.
                    warn!(monitor = %monitor.uri, "logged container vanished, dropping record");
                    self.store.remove(&monitor).await?;
                }
            }
        }

        Ok(())
    }

    /// Sweep on a fixed period until the stop channel closes.
    pub async fn run(self, period: Duration, mut stop: mpsc::Receiver<()>) {
        let mut ticker = interval(period);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once().await {
                        error!(error = %e, "reconciler pass failed");
                    }
                }
                _ = stop.recv() => {
                    info!("reconciler stopping");
                    break;
                }
            }
        }
    }
}
