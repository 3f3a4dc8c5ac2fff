//! Domain records shared between the registry, the transition engine and the
//! reconciler.

use std::fmt;

/// Label key marking a container as a monitor sidecar. Containers carrying it
/// are excluded from the eligibility query, and its value points back at the
/// logged container's URI.
pub const MONITOR_LABEL: &str = "mu.semte.ch.networkMonitor";

/// URI namespace under which monitor records are persisted.
pub const MONITOR_URI_PREFIX: &str = "http://mu.semte.ch/network-monitors/";

/// Compose label keys resolved into the companion's environment.
pub const COMPOSE_SERVICE_LABEL: &str = "com.docker.compose.service";
pub const COMPOSE_PROJECT_LABEL: &str = "com.docker.compose.project";

/// Engine-reported container status as mirrored in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerStatus {
    Created,
    Running,
    Paused,
    Restarting,
    Exited,
    Dead,
    Removing,
    /// The registry holds no status for the container.
    Unknown,
}

impl ContainerStatus {
    /// Parse a registry literal. Anything unrecognized maps to `Unknown`.
    pub fn from_literal(s: &str) -> Self {
        match s {
            "created" => ContainerStatus::Created,
            "running" => ContainerStatus::Running,
            "paused" => ContainerStatus::Paused,
            "restarting" => ContainerStatus::Restarting,
            "exited" => ContainerStatus::Exited,
            "dead" => ContainerStatus::Dead,
            "removing" => ContainerStatus::Removing,
            _ => ContainerStatus::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerStatus::Created => "created",
            ContainerStatus::Running => "running",
            ContainerStatus::Paused => "paused",
            ContainerStatus::Restarting => "restarting",
            ContainerStatus::Exited => "exited",
            ContainerStatus::Dead => "dead",
            ContainerStatus::Removing => "removing",
            ContainerStatus::Unknown => "none",
        }
    }

    /// A container in this status is expected to have a live monitor.
    pub fn is_active(&self) -> bool {
        matches!(self, ContainerStatus::Running | ContainerStatus::Created)
    }
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only projection of an application container from the registry.
#[derive(Debug, Clone)]
pub struct Container {
    /// Stable identity in the registry.
    pub uri: String,
    /// Engine-assigned identifier.
    pub id: String,
    pub name: String,
    pub image: String,
    /// Compose project label, when the container carries one.
    pub project: Option<String>,
    pub status: ContainerStatus,
}

/// Lifecycle state of a persisted monitor record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorStatus {
    Creating,
    Running,
    Removed,
}

impl MonitorStatus {
    pub fn from_literal(s: &str) -> Option<Self> {
        match s {
            "creating" => Some(MonitorStatus::Creating),
            "running" => Some(MonitorStatus::Running),
            "removed" => Some(MonitorStatus::Removed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorStatus::Creating => "creating",
            MonitorStatus::Running => "running",
            MonitorStatus::Removed => "removed",
        }
    }
}

impl fmt::Display for MonitorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted record of a monitor sidecar.
///
/// `id` equals the engine identifier of the companion container once it is
/// running, and `uri` is derived from it. The transition engine is the sole
/// mutator of these records.
#[derive(Debug, Clone)]
pub struct Monitor {
    pub id: String,
    pub uri: String,
    pub status: MonitorStatus,
    /// URI of the logged container this monitor watches.
    pub logged_container: String,
    /// Whether the record has been written to the registry yet.
    pub persisted: bool,
}

impl Monitor {
    /// A fresh, unpersisted record for a companion container.
    pub fn new(companion_id: impl Into<String>, logged_container: impl Into<String>) -> Self {
        let id = companion_id.into();
        Monitor {
            uri: format!("{MONITOR_URI_PREFIX}{id}"),
            id,
            status: MonitorStatus::Creating,
            logged_container: logged_container.into(),
            persisted: false,
        }
    }
}
