//! Per-container work queues and the drain loop.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tracing::{debug, error};

use super::worker;
use super::{Action, MonitorSettings};
use crate::docker::Engine;
use crate::model::{Container, Monitor};
use crate::registry::MonitorStore;

struct WorkItem {
    action: Action,
    container: Container,
    monitor: Option<Monitor>,
}

struct ContainerQueue {
    items: VecDeque<WorkItem>,
    /// True while a drain task owns this queue.
    processing: bool,
    done: broadcast::Sender<()>,
}

impl ContainerQueue {
    fn new() -> Self {
        let (done, _) = broadcast::channel(4);
        ContainerQueue {
            items: VecDeque::new(),
            processing: false,
            done,
        }
    }
}

pub(super) struct TransitionCtx {
    pub engine: Arc<dyn Engine>,
    pub store: Arc<dyn MonitorStore>,
    pub settings: MonitorSettings,
}

struct Inner {
    ctx: TransitionCtx,
    queues: Mutex<HashMap<String, ContainerQueue>>,
}

/// Executor of lifecycle actions, serialized per logged container.
///
/// `enqueue` never blocks; a dedicated drain task per active container id
/// pops items in FIFO order and runs each action to completion. Action
/// errors are logged and swallowed, leaving the next reconciler pass to
/// correct whatever state remains.
#[derive(Clone)]
pub struct TransitionEngine {
    inner: Arc<Inner>,
}

impl TransitionEngine {
    pub fn new(
        engine: Arc<dyn Engine>,
        store: Arc<dyn MonitorStore>,
        settings: MonitorSettings,
    ) -> Self {
        TransitionEngine {
            inner: Arc::new(Inner {
                ctx: TransitionCtx {
                    engine,
                    store,
                    settings,
                },
                queues: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Append an action to the container's queue. Spawns a drain task when
    /// the queue is idle; otherwise the in-flight task picks the item up.
    pub fn enqueue(&self, action: Action, container: Container, monitor: Option<Monitor>) {
        let key = container.id.clone();
        let mut queues = self
            .inner
            .queues
            .lock()
            .expect("transition queue lock poisoned");

        let queue = queues.entry(key.clone()).or_insert_with(ContainerQueue::new);
        queue.items.push_back(WorkItem {
            action,
            container,
            monitor,
        });

        if !queue.processing {
            queue.processing = true;
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                drain(inner, key).await;
            });
        }
    }

    /// Whether the container currently has queued or in-flight work.
    pub fn is_busy(&self, container_id: &str) -> bool {
        self.inner
            .queues
            .lock()
            .expect("transition queue lock poisoned")
            .contains_key(container_id)
    }

    /// Resolve once the container's queue has drained. Resolves immediately
    /// for idle containers.
    pub async fn wait(&self, container_id: &str) {
        let mut rx = {
            let queues = self
                .inner
                .queues
                .lock()
                .expect("transition queue lock poisoned");
            match queues.get(container_id) {
                Some(queue) => queue.done.subscribe(),
                None => return,
            }
        };

        // Any outcome of the subscription means the drain finished: a unit
        // message on completion, or channel closure when the queue entry was
        // retired.
        let _ = rx.recv().await;
    }
}

async fn drain(inner: Arc<Inner>, key: String) {
    loop {
        let item = {
            let mut queues = inner
                .queues
                .lock()
                .expect("transition queue lock poisoned");
            let queue = queues
                .get_mut(&key)
                .expect("drain task without queue entry");

            match queue.items.pop_front() {
                Some(item) => item,
                None => {
                    let _ = queue.done.send(());
                    queues.remove(&key);
                    return;
                }
            }
        };

        let action = item.action;
        let name = item.container.name.clone();
        debug!(container = %name, action = action.as_str(), "running transition");

        if let Err(e) = run(&inner.ctx, item).await {
            error!(
                container = %name,
                action = action.as_str(),
                error = %format!("{e:#}"),
                "transition failed"
            );
        }
    }
}

async fn run(ctx: &TransitionCtx, item: WorkItem) -> anyhow::Result<()> {
    match item.action {
        Action::Create => worker::create_monitor(ctx, &item.container).await,
        Action::Remove => {
            worker::remove_monitor(ctx, &item.container, item.monitor.as_ref()).await
        }
        Action::Restart => {
            // Remove and create share the serialized slot, so the restart is
            // atomic from every other caller's perspective.
            worker::remove_monitor(ctx, &item.container, item.monitor.as_ref()).await?;
            worker::create_monitor(ctx, &item.container).await
        }
    }
}
