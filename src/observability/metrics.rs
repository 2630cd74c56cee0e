//! Prometheus metric definitions for the pipeline and its external calls.
use std::sync::Arc;

use prometheus::{
    Counter, Gauge, Histogram, Registry, register_counter_with_registry,
    register_gauge_with_registry, register_histogram_with_registry,
};

#[derive(Debug, Clone)]
pub struct Metrics {
    pub pipeline_runs_total: Counter,
    pub pipeline_runs_skipped_total: Counter,
    pub pipeline_run_failures_total: Counter,

    pub articles_enriched_total: Counter,
    pub articles_skipped_total: Counter,

    pub clusters_created_total: Counter,
    pub clusters_split_total: Counter,

    pub labeler_calls_total: Counter,
    pub labeler_fallbacks_total: Counter,
    pub labeler_latency_seconds: Histogram,

    pub refiner_checks_total: Counter,

    pub ner_disabled: Gauge,
}

impl Metrics {
    pub fn new(registry: Arc<Registry>) -> Result<Self, prometheus::Error> {
        Ok(Self {
            pipeline_runs_total: register_counter_with_registry!(
                "nirpaksh_pipeline_runs_total",
                "Total number of pipeline runs started",
                registry
            )?,
            pipeline_runs_skipped_total: register_counter_with_registry!(
                "nirpaksh_pipeline_runs_skipped_total",
                "Pipeline runs skipped because fewer than two articles were available",
                registry
            )?,
            pipeline_run_failures_total: register_counter_with_registry!(
                "nirpaksh_pipeline_run_failures_total",
                "Pipeline runs that rolled back due to a store error",
                registry
            )?,
            articles_enriched_total: register_counter_with_registry!(
                "nirpaksh_articles_enriched_total",
                "Articles successfully embedded and entity-extracted",
                registry
            )?,
            articles_skipped_total: register_counter_with_registry!(
                "nirpaksh_articles_skipped_total",
                "Articles dropped from a run because enrichment failed",
                registry
            )?,
            clusters_created_total: register_counter_with_registry!(
                "nirpaksh_clusters_created_total",
                "New clusters committed by the clusterer",
                registry
            )?,
            clusters_split_total: register_counter_with_registry!(
                "nirpaksh_clusters_split_total",
                "Clusters divided into subclusters by the coherence refiner",
                registry
            )?,
            labeler_calls_total: register_counter_with_registry!(
                "nirpaksh_labeler_calls_total",
                "Calls made to the external labeling model",
                registry
            )?,
            labeler_fallbacks_total: register_counter_with_registry!(
                "nirpaksh_labeler_fallbacks_total",
                "Labeler calls that fell back to heuristic labeling",
                registry
            )?,
            labeler_latency_seconds: register_histogram_with_registry!(
                "nirpaksh_labeler_latency_seconds",
                "Latency of external labeling calls",
                registry
            )?,
            refiner_checks_total: register_counter_with_registry!(
                "nirpaksh_refiner_checks_total",
                "Clusters evaluated for coherence by the refiner",
                registry
            )?,
            ner_disabled: register_gauge_with_registry!(
                "nirpaksh_ner_disabled",
                "1 if the entity extractor failed to initialize and is disabled for the process lifetime, else 0",
                registry
            )?,
        })
    }
}
