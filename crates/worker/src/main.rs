use anyhow::Context;

use taskboard_infra::config::WorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    taskboard_observability::init();

    let config = WorkerConfig::from_env().context("invalid worker configuration")?;
    let store = taskboard_worker::app::connect_store(&config).await?;
    let worker = taskboard_worker::app::start(&config, store);

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    tracing::info!("shutdown signal received; waiting for in-flight runs");
    worker.shutdown().await;
    Ok(())
}
