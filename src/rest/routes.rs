//! Router construction.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::post;
use axum::Router;

use super::handlers::{self, AppState};

/// Delta batches mirror whole registry transactions and can be large.
const MAX_DELTA_BODY_BYTES: usize = 100 * 1024 * 1024;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/.mu/delta", post(handlers::delta))
        .layer(DefaultBodyLimit::max(MAX_DELTA_BODY_BYTES))
        .with_state(state)
}
