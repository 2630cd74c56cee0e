use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::time::sleep;
use tracing::{error, info};

use nirpaksh::{
    app::{ComponentRegistry, build_router},
    config::Config,
};

/// Periodically runs the coherence refiner on its own schedule, independent
/// of the main pipeline run triggered via `POST /pipeline/run`, mirroring
/// the lineage's interval-loop batch daemon idiom.
fn spawn_refiner_daemon(
    refiner_interval: Duration,
    coordinator: std::sync::Arc<nirpaksh::pipeline::coordinator::PipelineCoordinator>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            sleep(refiner_interval).await;
            match coordinator.run().await {
                Ok(report) => info!(outcome = ?report.outcome, "scheduled pipeline run completed"),
                Err(error) => error!(%error, "scheduled pipeline run failed"),
            }
        }
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    std::panic::set_hook(Box::new(|panic_info| {
        let thread = std::thread::current();
        let thread_name = thread.name().unwrap_or("unnamed");
        let message = panic_info
            .payload()
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| panic_info.payload().downcast_ref::<String>().map(String::as_str))
            .unwrap_or("unknown panic payload");

        if let Some(location) = panic_info.location() {
            error!(
                thread = thread_name,
                file = location.file(),
                line = location.line(),
                column = location.column(),
                message,
                "panic occurred"
            );
        } else {
            error!(thread = thread_name, message, "panic occurred without location information");
        }
    }));

    let config = Config::from_env().context("failed to load configuration")?;
    let bind_addr = config.http_bind();
    let refiner_interval_secs = config.refiner_interval_secs();

    let registry = ComponentRegistry::build(config)
        .await
        .context("failed to build component registry")?;
    let coordinator = registry.coordinator();

    let _refiner_daemon = refiner_interval_secs
        .map(|secs| spawn_refiner_daemon(Duration::from_secs(secs), coordinator));

    let router = build_router(registry);

    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind listener on {bind_addr}"))?;

    info!(%bind_addr, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server exited with error")?;

    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(error) => error!(%error, "failed to install ctrl_c handler"),
    }
}
