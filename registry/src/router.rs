use std::future::ready;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use health::HealthRegistry;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::handlers;
use crate::prometheus::{setup_metrics_recorder, track_metrics};
use crate::registry::Registry;

#[derive(Clone)]
pub struct State {
    pub registry: Arc<Registry>,
}

async fn index() -> &'static str {
    "indicator registry"
}

pub fn router(registry: Arc<Registry>, liveness: HealthRegistry, metrics: bool) -> Router {
    let state = State { registry };

    let router = Router::new()
        .route("/", get(index))
        .route("/_readiness", get(index))
        .route("/_liveness", get(move || ready(liveness.get_status())))
        .route(
            "/v1/register",
            post(handlers::register).put(handlers::register),
        )
        .route("/v1/indicator-documents", get(handlers::indicator_documents))
        .route(
            "/v1/patches",
            get(handlers::patches)
                .post(handlers::upsert_patches)
                .put(handlers::upsert_patches),
        )
        .route("/v1/resolved-documents", get(handlers::resolved_documents))
        .route("/v1/alert-rules", get(handlers::alert_rules))
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(track_metrics))
        .with_state(state);

    // Installing a global recorder when the registry is used as a library
    // (during tests etc) does not work well.
    if !metrics {
        return router;
    }

    match setup_metrics_recorder() {
        Ok(recorder_handle) => {
            router.route("/metrics", get(move || ready(recorder_handle.render())))
        }
        Err(e) => {
            error!("failed to install metrics recorder: {}", e);
            router
        }
    }
}
