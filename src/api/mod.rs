pub(crate) mod articles;
pub(crate) mod clusters;
pub(crate) mod health;
pub(crate) mod metrics;
pub(crate) mod pipeline;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::app::AppState;

/// The pipeline's own HTTP control plane (§6, §4.12): article ingestion,
/// a manual pipeline trigger, cluster reads, and the health/metrics probes.
/// RSS fetching, the CORS proxy, auth, and static hosting are out of scope
/// and have no routes here.
pub(crate) fn router(state: AppState) -> Router {
    Router::new()
        .route("/articles", post(articles::upsert))
        .route("/pipeline/run", post(pipeline::run))
        .route("/clusters", get(clusters::list))
        .route("/clusters/{id}/articles", get(clusters::articles))
        .route("/health/ready", get(health::ready))
        .route("/health/live", get(health::live))
        .route("/metrics", get(metrics::exporter))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
