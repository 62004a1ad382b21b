use clap::Args;
use serde_json::json;
use uuid::Uuid;

use crate::cli::utils::output_success;
use crate::cli::OutputFormat;
use crate::services::ledger::LedgerService;
use crate::services::tenant::TenantService;

#[derive(Args)]
pub struct RecalcArgs {
    #[arg(long, help = "Only this tenant (defaults to every active tenant)")]
    pub tenant: Option<Uuid>,
}

pub async fn handle(args: RecalcArgs, output_format: OutputFormat) -> anyhow::Result<()> {
    let tenants: Vec<Uuid> = match args.tenant {
        Some(id) => match TenantService::find(id).await? {
            Some(tenant) => vec![tenant.id],
            None => anyhow::bail!("Tenant {} not found", id),
        },
        None => TenantService::list_active().await?.into_iter().map(|t| t.id).collect(),
    };

    let mut updated = 0u64;
    for tenant_id in &tenants {
        let count = LedgerService::recalculate_tenant(*tenant_id).await?;
        tracing::info!(tenant = %tenant_id, updated = count, "Ledger recalculated");
        updated += count;
    }

    output_success(
        output_format,
        &format!("Recalculated {} balance(s) across {} tenant(s)", updated, tenants.len()),
        Some(json!({ "tenants": tenants.len(), "updated": updated })),
    )
}
