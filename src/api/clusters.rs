use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Serialize;
use tracing::error;
use uuid::Uuid;

use crate::app::AppState;
use crate::store::Article;

const LIST_LIMIT: i64 = 20;

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

/// GET /clusters: the newest clusters, capped at twenty, with no time
/// window. Distinct from the clustering candidate reconstruction the
/// pipeline itself uses internally.
pub(crate) async fn list(State(state): State<AppState>) -> impl IntoResponse {
    match state.store().list_clusters(LIST_LIMIT).await {
        Ok(clusters) => (StatusCode::OK, Json(clusters)).into_response(),
        Err(error) => {
            error!(%error, "failed to list clusters");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse { error: error.to_string() }),
            )
                .into_response()
        }
    }
}

/// GET /clusters/{id}/articles: a cluster's member articles, newest
/// `pub_date` first.
pub(crate) async fn articles(
    State(state): State<AppState>,
    Path(cluster_id): Path<Uuid>,
) -> impl IntoResponse {
    match state.store().load_cluster_articles(cluster_id).await {
        Ok(mut articles) => {
            articles.sort_by(|a: &Article, b: &Article| b.pub_date.cmp(&a.pub_date));
            (StatusCode::OK, Json(articles)).into_response()
        }
        Err(error) => {
            error!(%error, %cluster_id, "failed to load cluster articles");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse { error: error.to_string() }),
            )
                .into_response()
        }
    }
}
