pub(crate) mod metrics;
pub(crate) mod tracing;

use std::sync::Arc;

use anyhow::Result;
use prometheus::{Encoder, Registry, TextEncoder};

use self::metrics::Metrics;

/// Process-wide tracing and metrics handle, built once at startup.
#[derive(Debug, Clone)]
pub struct Telemetry {
    registry: Arc<Registry>,
    metrics: Arc<Metrics>,
}

impl Telemetry {
    pub fn new() -> Result<Self> {
        tracing::init()?;
        let registry = Arc::new(Registry::new());
        let metrics = Arc::new(Metrics::new(Arc::clone(&registry))?);
        Ok(Self { registry, metrics })
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn metrics_arc(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    pub fn record_ready_probe(&self) {
        ::tracing::info!("service ready probe recorded");
    }

    pub fn record_live_probe(&self) {
        ::tracing::debug!("service live probe");
    }

    /// Renders all metrics registered on this `Telemetry`'s own registry in
    /// the Prometheus text exposition format. Gathers from `self.registry`
    /// rather than the process-global default registry, since the metrics
    /// above are registered into a fresh `Registry` built in `new`.
    pub fn render_prometheus(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).ok();
        String::from_utf8(buffer).unwrap_or_default()
    }
}
