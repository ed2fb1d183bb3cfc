use std::sync::Arc;

use anyhow::Context;

use catalog_infra::{PipelineConfig, ServerConfig, StorageConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    catalog_observability::init();

    let pipeline = PipelineConfig::from_env().context("invalid pipeline configuration")?;
    let storage = StorageConfig::from_env().context("invalid storage configuration")?;
    let server = ServerConfig::from_env().context("invalid server configuration")?;

    let (services, executor) = catalog_api::app::services::build_services(&pipeline, &storage)
        .await
        .context("failed to initialize services")?;
    let app = catalog_api::app::build_app(Arc::new(services), server.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(server.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", server.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("draining job workers");
    executor.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
