//! In-memory fakes of the engine and the registry, shared by the
//! integration tests.
//!
//! The fakes are linked the way the deployment is: the registry mirrors the
//! engine's container state, so `start`/`stop`/`remove` on the fake engine
//! update the fake store's mirrored statuses.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use network_capture::docker::{Engine, MonitorSpec};
use network_capture::error::{EngineError, RegistryError};
use network_capture::model::{Container, ContainerStatus, Monitor, MonitorStatus};
use network_capture::registry::MonitorStore;
use network_capture::transition::{MonitorSettings, TransitionEngine};

// === Fake registry ===

#[derive(Default)]
struct StoreState {
    monitors: HashMap<String, Monitor>,
    containers: HashMap<String, Container>,
    eligible: HashSet<String>,
    /// Mirrored engine status per companion container id.
    statuses: HashMap<String, ContainerStatus>,
    /// State node URI to container URI.
    states: HashMap<String, String>,
    labels: HashMap<(String, String), String>,
    fail_save: bool,
}

#[derive(Default)]
pub struct FakeStore {
    state: Mutex<StoreState>,
}

impl FakeStore {
    pub fn add_logged_container(&self, container: Container, state_uri: &str) {
        let mut state = self.state.lock().unwrap();
        state.eligible.insert(container.uri.clone());
        state
            .states
            .insert(state_uri.to_string(), container.uri.clone());
        state.containers.insert(container.uri.clone(), container);
    }

    /// A container projection that does not pass the eligibility filter
    /// (e.g. a companion container).
    pub fn add_plain_container(&self, container: Container, state_uri: &str) {
        let mut state = self.state.lock().unwrap();
        state
            .states
            .insert(state_uri.to_string(), container.uri.clone());
        state.containers.insert(container.uri.clone(), container);
    }

    pub fn forget_container(&self, uri: &str) {
        let mut state = self.state.lock().unwrap();
        state.containers.remove(uri);
        state.eligible.remove(uri);
    }

    pub fn make_ineligible(&self, uri: &str) {
        self.state.lock().unwrap().eligible.remove(uri);
    }

    pub fn insert_monitor(&self, monitor: Monitor) {
        let mut state = self.state.lock().unwrap();
        state.monitors.insert(monitor.uri.clone(), monitor);
    }

    pub fn set_status(&self, companion_id: &str, status: ContainerStatus) {
        self.state
            .lock()
            .unwrap()
            .statuses
            .insert(companion_id.to_string(), status);
    }

    pub fn clear_status(&self, companion_id: &str) {
        self.state.lock().unwrap().statuses.remove(companion_id);
    }

    pub fn set_label(&self, container_id: &str, key: &str, value: &str) {
        self.state
            .lock()
            .unwrap()
            .labels
            .insert((container_id.to_string(), key.to_string()), value.to_string());
    }

    pub fn set_fail_save(&self, fail: bool) {
        self.state.lock().unwrap().fail_save = fail;
    }

    pub fn monitors(&self) -> Vec<Monitor> {
        self.state.lock().unwrap().monitors.values().cloned().collect()
    }

    pub fn monitor_for(&self, container_uri: &str) -> Option<Monitor> {
        self.state
            .lock()
            .unwrap()
            .monitors
            .values()
            .find(|m| m.logged_container == container_uri)
            .cloned()
    }
}

#[async_trait]
impl MonitorStore for FakeStore {
    async fn ready(&self) -> Result<bool, RegistryError> {
        Ok(true)
    }

    async fn find_all(
        &self,
        status: Option<MonitorStatus>,
    ) -> Result<Vec<Monitor>, RegistryError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .monitors
            .values()
            .filter(|m| status.map_or(true, |s| m.status == s))
            .cloned()
            .collect())
    }

    async fn find_by_logged_container(
        &self,
        uri: &str,
    ) -> Result<Option<Monitor>, RegistryError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .monitors
            .values()
            .find(|m| m.logged_container == uri && m.status == MonitorStatus::Running)
            .cloned())
    }

    async fn find_by_monitor_host(
        &self,
        container_id: &str,
    ) -> Result<Option<Monitor>, RegistryError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .monitors
            .values()
            .find(|m| m.id == container_id)
            .cloned())
    }

    async fn get_logged_container(
        &self,
        monitor: &Monitor,
    ) -> Result<Option<Container>, RegistryError> {
        let state = self.state.lock().unwrap();
        Ok(state.containers.get(&monitor.logged_container).cloned())
    }

    async fn container_status(
        &self,
        monitor: &Monitor,
    ) -> Result<ContainerStatus, RegistryError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .statuses
            .get(&monitor.id)
            .copied()
            .unwrap_or(ContainerStatus::Unknown))
    }

    async fn save(&self, monitor: &mut Monitor) -> Result<(), RegistryError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_save {
            return Err(RegistryError::Malformed("save disabled".to_string()));
        }
        monitor.persisted = true;
        state.monitors.insert(monitor.uri.clone(), monitor.clone());
        Ok(())
    }

    async fn remove(&self, monitor: &Monitor) -> Result<(), RegistryError> {
        self.state.lock().unwrap().monitors.remove(&monitor.uri);
        Ok(())
    }

    async fn logged_containers(&self) -> Result<Vec<Container>, RegistryError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .containers
            .values()
            .filter(|c| state.eligible.contains(&c.uri) && c.status == ContainerStatus::Running)
            .cloned()
            .collect())
    }

    async fn find_by_state(&self, state_uri: &str) -> Result<Option<Container>, RegistryError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .states
            .get(state_uri)
            .and_then(|uri| state.containers.get(uri))
            .cloned())
    }

    async fn is_logged(&self, container_uri: &str) -> Result<bool, RegistryError> {
        Ok(self.state.lock().unwrap().eligible.contains(container_uri))
    }

    async fn label_value(
        &self,
        container_id: &str,
        key: &str,
    ) -> Result<Option<String>, RegistryError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .labels
            .get(&(container_id.to_string(), key.to_string()))
            .cloned())
    }
}

// === Fake engine ===

#[derive(Debug, Clone)]
pub struct FakeCompanion {
    pub id: String,
    pub name: String,
    pub image: String,
    pub network_mode: String,
    pub env: Vec<String>,
    pub labels: HashMap<String, String>,
    pub running: bool,
}

#[derive(Default)]
struct EngineState {
    companions: HashMap<String, FakeCompanion>,
    /// Network name to attached container ids.
    networks: HashMap<String, HashSet<String>>,
    calls: Vec<String>,
    next_id: u64,
    fail_start: bool,
    remove_not_found: bool,
    create_delay: Option<Duration>,
}

pub struct FakeEngine {
    store: Arc<FakeStore>,
    state: Mutex<EngineState>,
    active_creates: AtomicUsize,
    max_concurrent_creates: AtomicUsize,
}

impl FakeEngine {
    pub fn new(store: Arc<FakeStore>) -> Self {
        FakeEngine {
            store,
            state: Mutex::new(EngineState::default()),
            active_creates: AtomicUsize::new(0),
            max_concurrent_creates: AtomicUsize::new(0),
        }
    }

    pub fn set_fail_start(&self, fail: bool) {
        self.state.lock().unwrap().fail_start = fail;
    }

    pub fn set_remove_not_found(&self, yes: bool) {
        self.state.lock().unwrap().remove_not_found = yes;
    }

    pub fn set_create_delay(&self, delay: Duration) {
        self.state.lock().unwrap().create_delay = Some(delay);
    }

    pub fn companions(&self) -> Vec<FakeCompanion> {
        self.state
            .lock()
            .unwrap()
            .companions
            .values()
            .cloned()
            .collect()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn attached(&self, network: &str, container_id: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .networks
            .get(network)
            .is_some_and(|set| set.contains(container_id))
    }

    pub fn attach(&self, network: &str, container_id: &str) {
        self.state
            .lock()
            .unwrap()
            .networks
            .entry(network.to_string())
            .or_default()
            .insert(container_id.to_string());
    }

    /// Simulate an external kill of a companion.
    pub fn kill_companion(&self, id: &str) {
        if let Some(companion) = self.state.lock().unwrap().companions.get_mut(id) {
            companion.running = false;
        }
        self.store.set_status(id, ContainerStatus::Exited);
    }

    pub fn max_concurrent_creates(&self) -> usize {
        self.max_concurrent_creates.load(Ordering::SeqCst)
    }

    fn log(&self, entry: String) {
        self.state.lock().unwrap().calls.push(entry);
    }
}

#[async_trait]
impl Engine for FakeEngine {
    async fn list(&self) -> Result<Vec<String>, EngineError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .companions
            .keys()
            .cloned()
            .collect())
    }

    async fn pull(&self, image: &str) -> Result<(), EngineError> {
        self.log(format!("pull:{image}"));
        Ok(())
    }

    async fn create(&self, spec: &MonitorSpec) -> Result<String, EngineError> {
        let active = self.active_creates.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent_creates
            .fetch_max(active, Ordering::SeqCst);
        self.log(format!("create:begin:{}", spec.name));

        let delay = self.state.lock().unwrap().create_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let id = {
            let mut state = self.state.lock().unwrap();
            state.next_id += 1;
            let id = format!("companion-{}", state.next_id);
            let (label_key, label_value) = spec.label();
            state.companions.insert(
                id.clone(),
                FakeCompanion {
                    id: id.clone(),
                    name: spec.name.clone(),
                    image: spec.image.clone(),
                    network_mode: spec.network_mode(),
                    env: spec.env.clone(),
                    labels: HashMap::from([(label_key.to_string(), label_value.to_string())]),
                    running: false,
                },
            );
            state.calls.push(format!("create:end:{}", spec.name));
            id
        };

        self.active_creates.fetch_sub(1, Ordering::SeqCst);
        Ok(id)
    }

    async fn start(&self, id: &str) -> Result<(), EngineError> {
        {
            let mut state = self.state.lock().unwrap();
            state.calls.push(format!("start:{id}"));
            if state.fail_start {
                return Err(EngineError::Api {
                    status: 500,
                    message: "start disabled".to_string(),
                });
            }
            match state.companions.get_mut(id) {
                Some(companion) => companion.running = true,
                None => return Err(EngineError::NotFound(format!("no container {id}"))),
            }
        }

        self.store.set_status(id, ContainerStatus::Running);
        Ok(())
    }

    async fn stop(&self, id: &str, _deadline_secs: i64) -> Result<(), EngineError> {
        {
            let mut state = self.state.lock().unwrap();
            state.calls.push(format!("stop:{id}"));
            match state.companions.get_mut(id) {
                Some(companion) => companion.running = false,
                None => return Err(EngineError::NotFound(format!("no container {id}"))),
            }
        }

        self.store.set_status(id, ContainerStatus::Exited);
        Ok(())
    }

    async fn remove(&self, id: &str, _force: bool) -> Result<(), EngineError> {
        let removed = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(format!("remove:{id}"));
            if state.remove_not_found {
                state.companions.remove(id);
                return Err(EngineError::NotFound(format!("no container {id}")));
            }
            state.companions.remove(id)
        };

        match removed {
            Some(_) => {
                self.store.clear_status(id);
                Ok(())
            }
            None => Err(EngineError::NotFound(format!("no container {id}"))),
        }
    }

    async fn attach_network(&self, container_id: &str, network: &str) -> Result<(), EngineError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("attach:{container_id}"));
        let fresh = state
            .networks
            .entry(network.to_string())
            .or_default()
            .insert(container_id.to_string());

        if fresh {
            Ok(())
        } else {
            Err(EngineError::Api {
                status: 403,
                message: "endpoint already exists".to_string(),
            })
        }
    }

    async fn detach_network(&self, container_id: &str, network: &str) -> Result<(), EngineError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("detach:{container_id}"));
        if let Some(set) = state.networks.get_mut(network) {
            set.remove(container_id);
        }
        Ok(())
    }
}

// === Harness ===

pub const LOGSTASH_NETWORK: &str = "logstash";

pub struct World {
    pub store: Arc<FakeStore>,
    pub engine: Arc<FakeEngine>,
    pub transitions: TransitionEngine,
}

pub fn settings() -> MonitorSettings {
    MonitorSettings {
        image: "capture/monitor:latest".to_string(),
        logstash_network: LOGSTASH_NETWORK.to_string(),
        logstash_url: "logstash:5044".to_string(),
        packetbeat_max_message_size: None,
        packetbeat_listen_ports: None,
    }
}

pub fn world() -> World {
    let store = Arc::new(FakeStore::default());
    let engine = Arc::new(FakeEngine::new(Arc::clone(&store)));

    let engine_dyn: Arc<dyn Engine> = Arc::clone(&engine) as Arc<dyn Engine>;
    let store_dyn: Arc<dyn MonitorStore> = Arc::clone(&store) as Arc<dyn MonitorStore>;
    let transitions = TransitionEngine::new(engine_dyn, store_dyn, settings());

    World {
        store,
        engine,
        transitions,
    }
}

pub fn container(uri: &str, id: &str, name: &str) -> Container {
    Container {
        uri: uri.to_string(),
        id: id.to_string(),
        name: name.to_string(),
        image: "app:latest".to_string(),
        project: None,
        status: ContainerStatus::Running,
    }
}
