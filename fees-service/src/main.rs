use fees_service::config::Config;
use fees_service::services::metrics;
use fees_service::Application;
use service_core::observability::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    init_tracing("info,fees_service=debug", config.log_json);
    metrics::init_metrics();

    tracing::info!(
        service = %config.service_name,
        host = %config.server.host,
        port = config.server.port,
        "Starting fees service"
    );

    let application = Application::build(config).await?;
    application.run_until_stopped().await?;

    Ok(())
}
