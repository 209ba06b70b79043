use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers::{self, AppState};

/// Create the webhook router.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Mutating admission endpoint, registered in the MutatingWebhookConfiguration
        .route("/pods", post(handlers::serve_pods))
        // Probes and diagnostics
        .route("/healthz", get(handlers::healthz))
        .route("/version", get(handlers::get_version))
        .route("/mirrors", get(handlers::get_mirrors))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
