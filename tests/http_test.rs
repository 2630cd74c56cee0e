//! Exercises the HTTP control plane (§4.12, §6) through
//! `tower::ServiceExt::oneshot`, the same way the lineage's own
//! `tests/learning_test.rs` drives its router: build a real
//! `ComponentRegistry`/`Router` and send it real HTTP requests rather than
//! calling handler functions directly.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use chrono::Utc;
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use nirpaksh::app::{ComponentRegistry, build_router};
use nirpaksh::clients::LabelerClient;
use nirpaksh::config::Config;
use nirpaksh::observability::Telemetry;
use nirpaksh::pipeline::coordinator::PipelineCoordinator;
use nirpaksh::pipeline::embedding::{EMBEDDING_DIM, Embedder, EmbeddingError};
use nirpaksh::pipeline::enricher::Enricher;
use nirpaksh::pipeline::entities::NullEntityExtractor;
use nirpaksh::pipeline::labeler::Labeler;
use nirpaksh::pipeline::refiner::CoherenceRefiner;
use nirpaksh::store::{Article, BiasRating, Factuality, InMemoryStore, Store};

/// Deterministic stand-in for `MiniLmEmbedder`: every call returns the same
/// unit vector. These tests drive routing and storage, not clustering
/// quality, so the vector's content doesn't matter.
#[derive(Default)]
struct StubEmbedder;

impl Embedder for StubEmbedder {
    fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vector = vec![0.0_f32; EMBEDDING_DIM];
        vector[0] = 1.0;
        Ok(vector)
    }
}

fn test_config() -> Config {
    // SAFETY: each integration test binary is its own process; nothing else
    // reads LABELER_BASE_URL concurrently with this line.
    unsafe {
        std::env::set_var("LABELER_BASE_URL", "http://127.0.0.1:1/");
    }
    Config::from_env().expect("config loads")
}

/// Builds a `ComponentRegistry` around `store` and test doubles for the
/// embedder, entity extractor, and labeler backend, bypassing the model
/// download and live network calls `ComponentRegistry::build` would need.
async fn test_registry(store: Arc<dyn Store>) -> ComponentRegistry {
    let config = Arc::new(test_config());
    let telemetry = Telemetry::new().expect("telemetry initializes");
    let metrics = telemetry.metrics_arc();

    let enricher = Arc::new(Enricher::new(
        Arc::new(StubEmbedder),
        Arc::new(NullEntityExtractor),
        Arc::clone(&metrics),
    ));
    let labeler_client = Arc::new(LabelerClient::new(
        config.labeler_base_url().to_string(),
        None,
        Duration::from_millis(50),
        0,
        1,
        1,
    ));
    let labeler = Arc::new(Labeler::new(labeler_client, Arc::clone(&metrics)));
    let refiner = Arc::new(CoherenceRefiner::new(
        Arc::clone(&store),
        Arc::clone(&labeler),
        Arc::clone(&metrics),
    ));
    let coordinator = Arc::new(PipelineCoordinator::new(
        Arc::clone(&store),
        enricher,
        labeler,
        refiner,
        Arc::clone(&metrics),
        config.pipeline_max_age_hours(),
        config.pipeline_batch_limit(),
    ));

    ComponentRegistry::for_testing(config, telemetry, store, coordinator)
}

fn sample_article() -> Article {
    let now = Utc::now();
    Article {
        id: Uuid::new_v4(),
        source_id: "src-1".to_string(),
        source_name: "Example Times".to_string(),
        bias_rating: BiasRating::Center,
        factuality: Factuality::High,
        headline: "Parliament passes new bill".to_string(),
        summary: "Lawmakers approved the measure after debate.".to_string(),
        url: "https://example.com/a".to_string(),
        image_url: None,
        pub_date: now,
        fetched_at: now,
        cluster_id: None,
        embedding: None,
        entities: None,
    }
}

async fn body_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body reads");
    serde_json::from_slice(&body).expect("valid json")
}

#[tokio::test]
async fn live_probe_always_reports_live() {
    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    let router = build_router(test_registry(store).await);

    let request = Request::get("/health/live").body(Body::empty()).expect("request builds");
    let response = router.oneshot(request).await.expect("request dispatches");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "live");
}

#[tokio::test]
async fn ready_probe_reports_ready_when_store_is_reachable() {
    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    let router = build_router(test_registry(store).await);

    let request = Request::get("/health/ready").body(Body::empty()).expect("request builds");
    let response = router.oneshot(request).await.expect("request dispatches");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ready");
}

#[tokio::test]
async fn clusters_list_is_empty_on_a_freshly_seeded_store() {
    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    let router = build_router(test_registry(store).await);

    let request = Request::get("/clusters").body(Body::empty()).expect("request builds");
    let response = router.oneshot(request).await.expect("request dispatches");

    assert_eq!(response.status(), StatusCode::OK);
    let clusters = body_json(response).await;
    assert!(clusters.as_array().expect("clusters is an array").is_empty());
}

/// POSTing an article through `/articles` persists it to the same store the
/// router was built around, so a direct store read after the request sees it.
#[tokio::test]
async fn articles_upsert_persists_to_the_store_behind_the_router() {
    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    let router = build_router(test_registry(Arc::clone(&store)).await);

    let article = sample_article();
    let payload = serde_json::to_string(&vec![article.clone()]).expect("article serializes");

    let request = Request::post("/articles")
        .header("content-type", "application/json")
        .body(Body::from(payload))
        .expect("request builds");
    let response = router.oneshot(request).await.expect("request dispatches");

    assert_eq!(response.status(), StatusCode::OK);
    let upserted = body_json(response).await;
    assert_eq!(upserted["upserted"], 1);

    let candidates = store
        .select_unclustered(72, 10)
        .await
        .expect("select unclustered ok");
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].headline, article.headline);
}
