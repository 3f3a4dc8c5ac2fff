//! network-capture - keeps monitor sidecars in lockstep with application
//! containers.
//!
//! For every eligible application container the service runs exactly one
//! companion container that shares the application's network namespace,
//! captures its traffic and forwards it to the log shipper. Application
//! containers come and go; this daemon converges on them from three sources
//! of truth: the engine's live state, the registry's monitor records, and a
//! delta feed of registry changes.
//!
//! ## Architecture
//!
//! - **Engine driver**: thin adapter over the container engine API
//! - **Registry**: monitor persistence and container projections (SPARQL)
//! - **Transition engine**: per-container serialized lifecycle actions
//! - **Reconciler**: periodic desired-vs-actual sweep
//! - **Delta handler**: low-latency reaction to registry change events

pub mod config;
pub mod docker;
pub mod error;
pub mod lifecycle;
pub mod model;
pub mod reconciler;
pub mod registry;
pub mod rest;
pub mod transition;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::Context;

use crate::config::Config;
use crate::docker::{DockerDriver, Engine};
use crate::registry::{MonitorStore, SparqlClient, SparqlMonitorStore};
use crate::transition::{MonitorSettings, TransitionEngine};

/// Handles to the wired-up services.
pub struct Services {
    pub engine: Arc<dyn Engine>,
    pub store: Arc<dyn MonitorStore>,
    pub transitions: TransitionEngine,
    pub exiting: Arc<AtomicBool>,
}

/// Wire drivers, store and transition engine from the configuration.
pub fn build_services(config: &Config) -> anyhow::Result<Services> {
    let engine: Arc<dyn Engine> = Arc::new(
        DockerDriver::new(&config.docker_socket).context("connecting to the container engine")?,
    );

    let store: Arc<dyn MonitorStore> = Arc::new(SparqlMonitorStore::new(
        SparqlClient::new(config.sparql_endpoint.clone()),
        config.application_graph.clone(),
        config.container_filter.clone(),
    ));

    let transitions = TransitionEngine::new(
        Arc::clone(&engine),
        Arc::clone(&store),
        MonitorSettings::from_config(config),
    );

    Ok(Services {
        engine,
        store,
        transitions,
        exiting: Arc::new(AtomicBool::new(false)),
    })
}
