use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use tracing::error;

use crate::app::AppState;
use crate::pipeline::coordinator::RunOutcome;

#[derive(Debug, Serialize)]
struct RunResponse {
    success: bool,
    clusters_generated: usize,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
}

/// POST /pipeline/run: manually triggers one pipeline pass (§4.8). The
/// coordinator's own lock serializes this against any concurrently
/// scheduled run, so a second caller simply waits rather than racing.
pub(crate) async fn run(State(state): State<AppState>) -> impl IntoResponse {
    match state.coordinator().run().await {
        Ok(report) => {
            let clusters_generated = match report.outcome {
                RunOutcome::SkippedInsufficientArticles => 0,
                RunOutcome::Completed => report.clusters_touched,
            };
            (StatusCode::OK, Json(RunResponse { success: true, clusters_generated })).into_response()
        }
        Err(error) => {
            error!(%error, "pipeline run failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse { success: false, error: error.to_string() }),
            )
                .into_response()
        }
    }
}
