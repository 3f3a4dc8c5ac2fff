//! The lifecycle actions themselves.

use anyhow::{bail, Context};
use tracing::{debug, info, warn};

use super::engine::TransitionCtx;
use crate::docker::MonitorSpec;
use crate::model::{Container, Monitor, MonitorStatus, COMPOSE_SERVICE_LABEL};

/// Engine deadline handed to stop calls, in seconds.
const STOP_DEADLINE_SECS: i64 = 3;

fn monitor_env(ctx: &TransitionCtx, container: &Container, service: Option<String>) -> Vec<String> {
    let settings = &ctx.settings;
    let mut env = vec![
        format!("LOGSTASH_URL={}", settings.logstash_url),
        format!("DOCKER_ID={}", container.id),
        format!("DOCKER_NAME={}", container.name),
        format!("DOCKER_IMAGE={}", container.image),
    ];

    if let Some(service) = service {
        env.push(format!("COMPOSE_SERVICE={service}"));
    }
    if let Some(project) = &container.project {
        env.push(format!("COMPOSE_PROJECT={project}"));
    }
    if let Some(size) = &settings.packetbeat_max_message_size {
        env.push(format!("PACKETBEAT_MAX_MESSAGE_SIZE={size}"));
    }
    if let Some(ports) = &settings.packetbeat_listen_ports {
        env.push(format!("PACKETBEAT_LISTEN_PORTS={ports}"));
    }

    env
}

/// Best-effort teardown of a half-created companion.
async fn compensate(ctx: &TransitionCtx, companion_id: &str, container: &Container, detach: bool) {
    if let Err(e) = ctx.engine.remove(companion_id, true).await {
        if !e.is_not_found() {
            warn!(container = %container.name, error = %e, "failed to clean up companion");
        }
    }

    if detach {
        if let Err(e) = ctx
            .engine
            .detach_network(&container.id, &ctx.settings.logstash_network)
            .await
        {
            warn!(container = %container.name, error = %e, "failed to detach network during cleanup");
        }
    }
}

/// Create a companion for the container and persist the monitor record.
///
/// The precondition is re-checked here rather than at enqueue time: a
/// concurrent sweep and delta may both have asked for a monitor, and the
/// second request must become a no-op.
pub(super) async fn create_monitor(ctx: &TransitionCtx, container: &Container) -> anyhow::Result<()> {
    if ctx
        .store
        .find_by_logged_container(&container.uri)
        .await
        .context("checking for an existing monitor")?
        .is_some()
    {
        bail!("a running monitor already exists for {}", container.uri);
    }

    let service = ctx
        .store
        .label_value(&container.id, COMPOSE_SERVICE_LABEL)
        .await
        .context("resolving compose service label")?;

    let spec = MonitorSpec {
        image: ctx.settings.image.clone(),
        name: format!("{}-monitor", container.name),
        logged_uri: container.uri.clone(),
        logged_id: container.id.clone(),
        env: monitor_env(ctx, container, service),
    };

    let companion_id = ctx
        .engine
        .create(&spec)
        .await
        .context("creating companion container")?;

    if let Err(e) = ctx.engine.start(&companion_id).await {
        compensate(ctx, &companion_id, container, false).await;
        return Err(anyhow::Error::new(e).context("starting companion container"));
    }

    // The companion shares the logged container's namespace, so the shipper
    // network is attached to the logged container itself.
    if let Err(e) = ctx
        .engine
        .attach_network(&container.id, &ctx.settings.logstash_network)
        .await
    {
        if !e.is_already_attached() {
            compensate(ctx, &companion_id, container, false).await;
            return Err(anyhow::Error::new(e).context("attaching shipper network"));
        }
    }

    let mut monitor = Monitor::new(companion_id, container.uri.clone());
    monitor.status = MonitorStatus::Running;
    if let Err(e) = ctx.store.save(&mut monitor).await {
        compensate(ctx, &monitor.id, container, true).await;
        return Err(anyhow::Error::new(e).context("persisting monitor record"));
    }

    info!(container = %container.name, companion = %monitor.id, "monitor created");
    Ok(())
}

/// Tear down the container's companion and delete the monitor record.
///
/// `expected` is the record the caller saw when it enqueued the action; when
/// the registry no longer holds it (or holds a different one) the removal
/// already happened and this is a no-op. A companion the engine no longer
/// knows counts as removed.
pub(super) async fn remove_monitor(
    ctx: &TransitionCtx,
    container: &Container,
    expected: Option<&Monitor>,
) -> anyhow::Result<()> {
    let record = match ctx
        .store
        .find_by_logged_container(&container.uri)
        .await
        .context("looking up monitor record")?
    {
        Some(record) => record,
        None => {
            debug!(container = %container.name, "monitor already removed");
            return Ok(());
        }
    };

    if let Some(expected) = expected {
        if expected.id != record.id {
            debug!(
                container = %container.name,
                expected = %expected.id,
                actual = %record.id,
                "monitor was already replaced, skipping removal"
            );
            return Ok(());
        }
    }

    if let Err(e) = ctx.engine.stop(&record.id, STOP_DEADLINE_SECS).await {
        debug!(companion = %record.id, error = %e, "stop failed, proceeding to remove");
    }

    match ctx.engine.remove(&record.id, true).await {
        Ok(()) => {}
        Err(e) if e.is_not_found() => {
            debug!(companion = %record.id, "companion already gone");
        }
        Err(e) => {
            return Err(anyhow::Error::new(e).context("removing companion container"));
        }
    }

    ctx.store
        .remove(&record)
        .await
        .context("deleting monitor record")?;

    if let Err(e) = ctx
        .engine
        .detach_network(&container.id, &ctx.settings.logstash_network)
        .await
    {
        warn!(container = %container.name, error = %e, "failed to detach shipper network");
    }

    info!(container = %container.name, companion = %record.id, "monitor removed");
    Ok(())
}
