//! Registry persistence for monitor records and container projections.
//!
//! The registry is a triple-pattern store partitioned by a process-wide
//! application graph. Each call is strongly consistent on its own, but there
//! are no transactions across calls; the transition engine's per-container
//! serialization is what provides effective atomicity.

mod sparql;
mod store;

pub use sparql::SparqlClient;
pub use store::SparqlMonitorStore;

use async_trait::async_trait;

use crate::error::RegistryError;
use crate::model::{Container, ContainerStatus, Monitor, MonitorStatus};

/// Persistence operations for monitor records plus the read-only container
/// queries the reconciler and delta handler need.
#[async_trait]
pub trait MonitorStore: Send + Sync {
    /// Whether the registry answers queries at all.
    async fn ready(&self) -> Result<bool, RegistryError>;

    /// All monitor records, optionally filtered by status.
    async fn find_all(
        &self,
        status: Option<MonitorStatus>,
    ) -> Result<Vec<Monitor>, RegistryError>;

    /// The unique running monitor for a logged container URI, if any.
    async fn find_by_logged_container(
        &self,
        uri: &str,
    ) -> Result<Option<Monitor>, RegistryError>;

    /// The monitor whose id equals the given container id; used when a state
    /// change concerns the companion itself.
    async fn find_by_monitor_host(
        &self,
        container_id: &str,
    ) -> Result<Option<Monitor>, RegistryError>;

    /// Dereference a monitor's logged container to its projection.
    async fn get_logged_container(
        &self,
        monitor: &Monitor,
    ) -> Result<Option<Container>, RegistryError>;

    /// Currently persisted status of the monitor's companion container.
    async fn container_status(
        &self,
        monitor: &Monitor,
    ) -> Result<ContainerStatus, RegistryError>;

    /// Insert or fully overwrite the record keyed by its URI.
    async fn save(&self, monitor: &mut Monitor) -> Result<(), RegistryError>;

    /// Delete the record. Tolerant of the record already being gone.
    async fn remove(&self, monitor: &Monitor) -> Result<(), RegistryError>;

    /// Eligible application containers: running, matching the configured
    /// filter, and not themselves monitors.
    async fn logged_containers(&self) -> Result<Vec<Container>, RegistryError>;

    /// Resolve a container through the state node a delta event names.
    async fn find_by_state(&self, state_uri: &str) -> Result<Option<Container>, RegistryError>;

    /// Eligibility predicate without the running-status clause; delta events
    /// carry the new status themselves.
    async fn is_logged(&self, container_uri: &str) -> Result<bool, RegistryError>;

    /// Value of a label on the container with the given engine id.
    async fn label_value(
        &self,
        container_id: &str,
        key: &str,
    ) -> Result<Option<String>, RegistryError>;
}
