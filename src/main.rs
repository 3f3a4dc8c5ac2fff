//! network-capture daemon entry point.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use network_capture::config::Config;
use network_capture::reconciler::Reconciler;
use network_capture::rest::{create_router, AppState};
use network_capture::{build_services, lifecycle};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// How long the shutdown drain may take before the process gives up.
const DRAIN_DEADLINE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "network_capture=info,bollard=warn,hyper=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::parse();
    info!("network-capture v{} starting", VERSION);

    // Phase 1: Wire drivers and services
    info!("Phase 1: Wiring services");
    let services = build_services(&config)?;

    // Phase 2: Wait for dependencies
    info!("Phase 2: Waiting for registry and engine");
    lifecycle::wait_for_registry(&services.store).await;
    lifecycle::wait_for_engine(&services.engine).await;

    // Phase 3: Make sure the monitor image is present
    info!("Phase 3: Pulling monitor image");
    lifecycle::pull_with_backoff(&services.engine, &config.monitor_image).await;

    // Phase 4: Start the reconciler
    info!(
        "Phase 4: Starting reconciler with {}ms period",
        config.sync_interval_ms
    );
    let (reconciler_stop, stop_rx) = mpsc::channel::<()>(1);
    let reconciler = Reconciler::new(
        Arc::clone(&services.store),
        services.transitions.clone(),
    );
    tokio::spawn(reconciler.run(config.sync_interval(), stop_rx));

    // Phase 5: Serve the delta endpoint
    info!("Phase 5: Serving delta endpoint");
    let app_state = Arc::new(AppState {
        store: Arc::clone(&services.store),
        transitions: services.transitions.clone(),
        exiting: Arc::clone(&services.exiting),
    });
    let router = create_router(app_state);

    let listener = TcpListener::bind(config.listen_addr).await?;
    info!("delta endpoint listening on {}", config.listen_addr);

    let exiting = Arc::clone(&services.exiting);
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let which = wait_for_signal().await;
            info!("received {}, shutting down", which);
            exiting.store(true, Ordering::SeqCst);
        })
        .await?;

    // Shutdown: stop the sweep, then tear down every running monitor.
    drop(reconciler_stop);
    info!("draining monitors");

    let drain = lifecycle::drain_monitors(&services.store, &services.transitions);
    tokio::select! {
        result = tokio::time::timeout(DRAIN_DEADLINE, drain) => match result {
            Ok(Ok(())) => {
                info!("shutdown complete");
                Ok(())
            }
            Ok(Err(e)) => {
                error!(error = %format!("{e:#}"), "cleanup failed");
                std::process::exit(1);
            }
            Err(_) => {
                error!("cleanup did not finish within {:?}", DRAIN_DEADLINE);
                std::process::exit(1);
            }
        },
        which = wait_for_signal() => {
            error!("received second {} during cleanup, aborting", which);
            std::process::exit(1);
        }
    }
}

async fn wait_for_signal() -> &'static str {
    let ctrl_c = signal::ctrl_c();
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
        .expect("failed to install SIGTERM handler");

    tokio::select! {
        _ = ctrl_c => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
    }
}
