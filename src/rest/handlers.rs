//! Delta webhook handler.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use axum::extract::State;
use axum::http::StatusCode;
use tracing::{debug, error, warn};

use super::delta::{parse_status_changes, StatusChange};
use crate::registry::MonitorStore;
use crate::transition::{Action, TransitionEngine};

/// Shared application state.
pub struct AppState {
    pub store: Arc<dyn MonitorStore>,
    pub transitions: TransitionEngine,
    /// Set on shutdown; the handler drops events once raised.
    pub exiting: Arc<AtomicBool>,
}

/// `POST /.mu/delta`.
///
/// Always answers 200: the feed retries on failure responses, and a retry
/// storm of unparseable payloads helps nobody. Intents are enqueued before
/// responding but never awaited.
pub async fn delta(State(state): State<Arc<AppState>>, body: String) -> StatusCode {
    if state.exiting.load(Ordering::SeqCst) {
        debug!("exiting, delta dropped");
        return StatusCode::OK;
    }

    process_delta(&state, &body).await;
    StatusCode::OK
}

/// Decode a delta body and enqueue the intent each event implies.
pub async fn process_delta(state: &AppState, body: &str) {
    let changes = match parse_status_changes(body) {
        Ok(changes) => changes,
        Err(e) => {
            warn!(error = %e, "dropping delta payload");
            debug!(body = %body, "raw delta body");
            return;
        }
    };

    for change in changes {
        if let Err(e) = apply_status_change(state, &change).await {
            error!(
                state_uri = %change.state_uri,
                status = %change.status,
                error = %format!("{e:#}"),
                "failed to apply delta event"
            );
        }
    }
}

async fn apply_status_change(state: &AppState, change: &StatusChange) -> anyhow::Result<()> {
    let container = match state
        .store
        .find_by_state(&change.state_uri)
        .await
        .context("resolving container from state node")?
    {
        Some(container) => container,
        None => {
            debug!(state_uri = %change.state_uri, "no container behind state node");
            return Ok(());
        }
    };

    if state
        .store
        .is_logged(&container.uri)
        .await
        .context("checking eligibility")?
    {
        let monitor = state
            .store
            .find_by_logged_container(&container.uri)
            .await
            .context("looking up monitor")?;

        match (change.status.is_active(), monitor) {
            (true, None) => {
                state.transitions.enqueue(Action::Create, container, None);
            }
            (false, Some(monitor)) => {
                state
                    .transitions
                    .enqueue(Action::Remove, container, Some(monitor));
            }
            (false, None) if state.transitions.is_busy(&container.id) => {
                // A create for this container may still be in flight; queue
                // the removal behind it and let the action resolve the
                // record once it is its turn.
                state.transitions.enqueue(Action::Remove, container, None);
            }
            _ => {}
        }

        return Ok(());
    }

    // Not eligible; the event may concern a companion container itself.
    let monitor = match state
        .store
        .find_by_monitor_host(&container.id)
        .await
        .context("looking up monitor by host container")?
    {
        Some(monitor) => monitor,
        None => return Ok(()),
    };

    if !change.status.is_active() {
        let logged = state
            .store
            .get_logged_container(&monitor)
            .await
            .context("resolving logged container of crashed companion")?;

        if let Some(logged) = logged {
            state
                .transitions
                .enqueue(Action::Restart, logged, Some(monitor));
        }
    }

    Ok(())
}
