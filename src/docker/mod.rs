//! Container engine driver.
//!
//! A narrow adapter over the engine API: the transition engine and the
//! bootstrap phases talk to the [`Engine`] trait, and [`DockerDriver`] backs
//! it with the engine's HTTP API. The driver normalizes "not found" into a
//! distinguishable error kind; everything else surfaces as-is.

mod driver;

pub use driver::DockerDriver;

use async_trait::async_trait;

use crate::error::EngineError;
use crate::model::MONITOR_LABEL;

/// Create request for a monitor companion container.
///
/// The companion shares the logged container's network namespace and needs
/// raw capture capabilities; the label ties it back to the logged container
/// for the registry's eligibility filter.
#[derive(Debug, Clone)]
pub struct MonitorSpec {
    pub image: String,
    pub name: String,
    /// URI of the logged container, stored under the monitor label.
    pub logged_uri: String,
    /// Engine id of the logged container whose namespace is shared.
    pub logged_id: String,
    pub env: Vec<String>,
}

impl MonitorSpec {
    pub fn label(&self) -> (&'static str, &str) {
        (MONITOR_LABEL, &self.logged_uri)
    }

    pub fn network_mode(&self) -> String {
        format!("container:{}", self.logged_id)
    }
}

/// Contract with the container engine.
///
/// Every call is fallible; handles are engine-assigned id strings.
#[async_trait]
pub trait Engine: Send + Sync {
    /// List live container ids. Used only for readiness probing.
    async fn list(&self) -> Result<Vec<String>, EngineError>;

    /// Pull an image, returning once the progress stream has completed.
    async fn pull(&self, image: &str) -> Result<(), EngineError>;

    /// Create a companion container; the returned id is its handle.
    async fn create(&self, spec: &MonitorSpec) -> Result<String, EngineError>;

    async fn start(&self, id: &str) -> Result<(), EngineError>;

    /// Stop with a deadline in seconds. May fail if already stopped.
    async fn stop(&self, id: &str, deadline_secs: i64) -> Result<(), EngineError>;

    /// Remove a container. `NotFound` means it is already gone.
    async fn remove(&self, id: &str, force: bool) -> Result<(), EngineError>;

    /// Attach a container to a network. A `403` means already attached.
    async fn attach_network(&self, container_id: &str, network: &str) -> Result<(), EngineError>;

    async fn detach_network(&self, container_id: &str, network: &str) -> Result<(), EngineError>;
}
