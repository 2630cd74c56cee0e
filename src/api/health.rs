use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;
use tracing::error;

use crate::app::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) struct HealthReport {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

impl HealthReport {
    fn ready() -> Self {
        Self { status: "ready", detail: None }
    }

    fn degraded(detail: impl Into<String>) -> Self {
        Self { status: "degraded", detail: Some(detail.into()) }
    }
}

/// Readiness check: the store is the pipeline's only hard dependency (the
/// labeler is soft-dependent, with a deterministic fallback per §4.6), so
/// readiness degrades only when the store itself can't be reached.
pub(crate) async fn ready(
    State(state): State<AppState>,
) -> Result<Json<HealthReport>, (StatusCode, Json<HealthReport>)> {
    state.telemetry().record_ready_probe();

    if let Err(error) = state.store().list_clusters(1).await {
        error!(%error, "store readiness check failed");
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthReport::degraded(format!("store: {error}"))),
        ));
    }

    Ok(Json(HealthReport::ready()))
}

pub(crate) async fn live(State(state): State<AppState>) -> Json<HealthReport> {
    state.telemetry().record_live_probe();
    Json(HealthReport { status: "live", detail: None })
}
