use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tracing::warn;

use crate::{
    api,
    clients::LabelerClient,
    config::{Config, DbPath},
    observability::Telemetry,
    pipeline::coordinator::PipelineCoordinator,
    pipeline::embedding::{Embedder, MiniLmEmbedder},
    pipeline::enricher::Enricher,
    pipeline::entities::{EntityExtractor, HeuristicEntityExtractor, NullEntityExtractor},
    pipeline::labeler::Labeler,
    pipeline::refiner::CoherenceRefiner,
    store::{InMemoryStore, SqliteStore, Store},
};

#[derive(Clone)]
pub struct AppState {
    registry: Arc<ComponentRegistry>,
}

/// Owns every long-lived collaborator the pipeline needs, built once at
/// startup, mirroring the lineage's `ComponentRegistry`/`RecapDao` wiring.
pub struct ComponentRegistry {
    config: Arc<Config>,
    telemetry: Telemetry,
    store: Arc<dyn Store>,
    coordinator: Arc<PipelineCoordinator>,
}

impl AppState {
    #[must_use]
    pub fn new(registry: ComponentRegistry) -> Self {
        Self { registry: Arc::new(registry) }
    }

    #[must_use]
    pub fn telemetry(&self) -> &Telemetry {
        &self.registry.telemetry
    }

    #[must_use]
    pub fn store(&self) -> Arc<dyn Store> {
        Arc::clone(&self.registry.store)
    }

    #[must_use]
    pub fn coordinator(&self) -> Arc<PipelineCoordinator> {
        Arc::clone(&self.registry.coordinator)
    }

    #[must_use]
    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.registry.config)
    }
}

impl ComponentRegistry {
    /// Builds every collaborator the pipeline needs from `config`.
    ///
    /// # Errors
    /// Fails if telemetry can't be initialized, if the embedder model can't
    /// be loaded (§4.2, fatal per the component's own failure policy), or if
    /// the store can't be opened on disk and no in-memory fallback applies.
    pub async fn build(config: Config) -> Result<Self> {
        let config = Arc::new(config);
        let telemetry = Telemetry::new().context("failed to initialize telemetry")?;
        let metrics = telemetry.metrics_arc();

        let store: Arc<dyn Store> = open_store(&config).await?;

        let embedder: Arc<dyn Embedder> =
            Arc::new(MiniLmEmbedder::new().context("failed to load sentence embedding model")?);

        let entity_extractor: Arc<dyn EntityExtractor> =
            match HeuristicEntityExtractor::new(config.ner_tokenizer_path()) {
                Ok(extractor) => Arc::new(extractor),
                Err(error) => {
                    warn!(%error, "entity extractor disabled at startup, falling back to null extractor");
                    metrics.ner_disabled.set(1.0);
                    Arc::new(NullEntityExtractor)
                }
            };

        let enricher = Arc::new(Enricher::new(
            Arc::clone(&embedder),
            Arc::clone(&entity_extractor),
            Arc::clone(&metrics),
        ));

        let labeler_client = Arc::new(LabelerClient::new(
            config.labeler_base_url().to_string(),
            config.labeler_api_key().map(str::to_string),
            config.labeler_timeout(),
            config.labeler_max_retries(),
            config.labeler_backoff_base_ms(),
            config.labeler_backoff_cap_ms(),
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

        Ok(Self { config, telemetry, store, coordinator })
    }

    #[must_use]
    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    #[must_use]
    pub fn coordinator(&self) -> Arc<PipelineCoordinator> {
        Arc::clone(&self.coordinator)
    }

    /// Assembles a registry from already-built collaborators, bypassing the
    /// network/model loading `build` does from a live `Config`. For driving
    /// the HTTP surface in tests against store/embedder/labeler doubles.
    #[must_use]
    pub fn for_testing(
        config: Arc<Config>,
        telemetry: Telemetry,
        store: Arc<dyn Store>,
        coordinator: Arc<PipelineCoordinator>,
    ) -> Self {
        Self { config, telemetry, store, coordinator }
    }
}

/// Opens the configured SQLite store, falling back to an in-memory store on
/// a permissions-class open failure per §4.10. Any other open failure is
/// fatal.
async fn open_store(config: &Config) -> Result<Arc<dyn Store>> {
    let DbPath::File(path) = config.db_path() else {
        return Ok(Arc::new(InMemoryStore::new()));
    };

    match SqliteStore::connect(path).await {
        Ok(store) => Ok(Arc::new(store)),
        Err(error) if is_permission_denied(&error) => {
            warn!(%error, path, "sqlite store unavailable, falling back to in-memory store");
            Ok(Arc::new(InMemoryStore::new()))
        }
        Err(error) => Err(error).context("failed to open sqlite store"),
    }
}

fn is_permission_denied(error: &crate::store::StoreError) -> bool {
    matches!(
        error,
        crate::store::StoreError::Database(sqlx_error)
            if sqlx_error
                .as_database_error()
                .map(|database_error| database_error.message().contains("permission denied")
                    || database_error.message().contains("readonly"))
                .unwrap_or_else(|| sqlx_error.to_string().contains("permission denied")
                    || sqlx_error.to_string().contains("unable to open database file"))
    )
}

pub fn build_router(registry: ComponentRegistry) -> Router {
    let state = AppState::new(registry);
    api::router(state)
}
