//! Transition engine: per-container serialized lifecycle actions.
//!
//! The reconciler and the delta handler only submit intents; this module is
//! the sole mutator of monitor records and of the companion containers it
//! spawns. Actions on the same logged container run strictly in enqueue
//! order; actions on different containers run in parallel.

mod engine;
mod worker;

pub use engine::TransitionEngine;

use crate::config::Config;

/// Lifecycle intents a caller can submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    Remove,
    /// Remove followed by create, inside the same serialized slot.
    Restart,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create-monitor",
            Action::Remove => "remove-monitor",
            Action::Restart => "restart-monitor",
        }
    }
}

/// Companion container knobs the actions need.
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub image: String,
    pub logstash_network: String,
    pub logstash_url: String,
    pub packetbeat_max_message_size: Option<String>,
    pub packetbeat_listen_ports: Option<String>,
}

impl MonitorSettings {
    pub fn from_config(config: &Config) -> Self {
        MonitorSettings {
            image: config.monitor_image.clone(),
            logstash_network: config.logstash_network.clone(),
            logstash_url: config.logstash_url.clone(),
            packetbeat_max_message_size: config.packetbeat_max_message_size.clone(),
            packetbeat_listen_ports: config.packetbeat_listen_ports.clone(),
        }
    }
}
