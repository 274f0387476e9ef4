//! Control plane: route registration on the internal listener.
//!
//! ```text
//! POST /register    {endpoint, data: {host, path, method?}}  → 201
//! POST /unregister  same body                                → 204 | 404
//! GET  /routes      registered routes
//! GET  /status      {version, status, routes}
//! ```

pub mod handlers;

use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use self::handlers::*;
use crate::http::server::AppState;

#[allow(deprecated)]
pub fn router(state: AppState) -> Router {
    let timeout = Duration::from_secs(state.config.timeouts.control_secs);
    Router::new()
        .route("/register", post(register))
        .route("/unregister", post(unregister))
        .route("/routes", get(list_routes))
        .route("/status", get(get_status))
        .with_state(state)
        .layer(TimeoutLayer::new(timeout))
        .layer(TraceLayer::new_for_http())
}
