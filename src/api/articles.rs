use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use tracing::{error, info};

use crate::app::AppState;
use crate::store::Article;

#[derive(Debug, Serialize)]
struct UpsertResponse {
    success: bool,
    upserted: usize,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
}

/// POST /articles: the external ingestion collaborator's upsert endpoint
/// (§6). Absorbs a `Store` failure into a `500` rather than panicking; the
/// ingestion caller is expected to retry the whole batch.
pub(crate) async fn upsert(
    State(state): State<AppState>,
    Json(articles): Json<Vec<Article>>,
) -> impl IntoResponse {
    let count = articles.len();
    match state.store().upsert_articles(&articles).await {
        Ok(()) => {
            info!(count, "upserted articles");
            (StatusCode::OK, Json(UpsertResponse { success: true, upserted: count })).into_response()
        }
        Err(error) => {
            error!(%error, "failed to upsert articles");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse { success: false, error: error.to_string() }),
            )
                .into_response()
        }
    }
}
