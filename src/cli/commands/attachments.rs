use clap::Args;
use serde_json::json;

use crate::cli::utils::output_success;
use crate::cli::OutputFormat;
use crate::config::config;
use crate::services::attachment::AttachmentService;
use crate::storage::storage;

#[derive(Args)]
pub struct CleanupArgs {
    #[arg(long, help = "Age in hours after which unlinked uploads expire (defaults to storage.temporary_ttl_hours)")]
    pub ttl_hours: Option<u64>,
}

pub async fn handle(args: CleanupArgs, output_format: OutputFormat) -> anyhow::Result<()> {
    let ttl = args.ttl_hours.unwrap_or(config().storage.temporary_ttl_hours);
    let removed = AttachmentService::cleanup_temporaries(storage(), ttl).await?;
    output_success(
        output_format,
        &format!("Removed {} temporary attachment(s) older than {}h", removed, ttl),
        Some(json!({ "removed": removed, "ttl_hours": ttl })),
    )
}
