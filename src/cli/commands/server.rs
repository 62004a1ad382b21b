use crate::cli::utils::output_success;
use crate::cli::OutputFormat;
use crate::config::config;
use crate::database::DatabaseManager;
use crate::routes;

/// Run the API in the foreground
pub async fn serve(port: Option<u16>) -> anyhow::Result<()> {
    let port = port.unwrap_or(config().api.port);
    routes::serve(port).await
}

pub async fn migrate(output_format: OutputFormat) -> anyhow::Result<()> {
    DatabaseManager::migrate().await?;
    DatabaseManager::close().await;
    output_success(output_format, "Database migrations applied", None)
}
