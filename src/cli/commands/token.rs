use clap::Args;
use serde_json::json;
use uuid::Uuid;

use crate::auth::validator::JwtValidator;
use crate::cli::OutputFormat;

#[derive(Args)]
pub struct IssueTokenArgs {
    #[arg(long, help = "Tenant the token is scoped to")]
    pub tenant: Uuid,

    #[arg(long, help = "Subject (user id)")]
    pub sub: String,

    #[arg(long, help = "Role name, repeatable")]
    pub role: Vec<String>,

    #[arg(long, help = "Extra permission, repeatable")]
    pub permission: Vec<String>,

    #[arg(long)]
    pub email: Option<String>,
}

pub fn handle(args: IssueTokenArgs, output_format: OutputFormat) -> anyhow::Result<()> {
    let validator = JwtValidator::global();
    if !validator.dev_tokens_enabled() {
        anyhow::bail!("Development tokens are disabled; set DEV_JWT_SECRET outside production");
    }

    let token = validator.issue_dev_token(args.tenant, &args.sub, &args.role, &args.permission, args.email.as_deref())?;

    match output_format {
        OutputFormat::Json => {
            let out = json!({ "token": token, "tenant_id": args.tenant, "sub": args.sub });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Text => println!("{}", token),
    }
    Ok(())
}
