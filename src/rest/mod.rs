//! HTTP surface: the delta webhook.

mod delta;
mod handlers;
mod routes;

pub use delta::{parse_status_changes, StatusChange};
pub use handlers::{process_delta, AppState};
pub use routes::create_router;
