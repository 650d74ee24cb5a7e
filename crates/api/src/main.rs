use std::sync::Arc;

use anyhow::Context;

use kinship_infra::{PipelineConfig, StorageConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    kinship_observability::init();

    let pipeline = PipelineConfig::from_env().context("invalid pipeline configuration")?;
    let storage = StorageConfig::from_env().context("invalid storage configuration")?;

    let service = kinship_api::app::services::build_service(storage, pipeline)
        .await
        .context("failed to initialize family storage")?;
    let app = kinship_api::app::build_app(Arc::new(service));

    let addr = std::env::var("KINSHIP_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
