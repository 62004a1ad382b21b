pub mod commands;
pub mod utils;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

#[derive(Parser)]
#[command(name = "legalops")]
#[command(about = "LegalOps CLI - server, database and maintenance commands")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run the HTTP API server")]
    Serve {
        #[arg(long, help = "Port to listen on (defaults to api.port)")]
        port: Option<u16>,
    },

    #[command(about = "Apply embedded database migrations")]
    Migrate,

    #[command(name = "recalc-balances", about = "Recompute running balances of the expense ledger")]
    RecalcBalances(commands::ledger::RecalcArgs),

    #[command(name = "cleanup-attachments", about = "Delete temporary attachments past their TTL")]
    CleanupAttachments(commands::attachments::CleanupArgs),

    #[command(name = "issue-token", about = "Mint a development token (requires DEV_JWT_SECRET)")]
    IssueToken(commands::token::IssueTokenArgs),

    #[command(name = "property-types", about = "List the flexible-table property type catalog")]
    PropertyTypes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);

    match cli.command {
        Commands::Serve { port } => commands::server::serve(port).await,
        Commands::Migrate => commands::server::migrate(output_format).await,
        Commands::RecalcBalances(args) => commands::ledger::handle(args, output_format).await,
        Commands::CleanupAttachments(args) => commands::attachments::handle(args, output_format).await,
        Commands::IssueToken(args) => commands::token::handle(args, output_format),
        Commands::PropertyTypes => commands::catalog::handle(output_format),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_issue_token_with_repeated_roles() {
        let cli = Cli::try_parse_from([
            "legalops",
            "--json",
            "issue-token",
            "--tenant",
            "6f1c1f7e-4d8b-4c1a-9a51-0f3b1e0c2d11",
            "--sub",
            "auth0|42",
            "--role",
            "lawyer",
            "--role",
            "staff",
        ])
        .unwrap();
        assert_eq!(OutputFormat::from_cli(&cli), OutputFormat::Json);
        match cli.command {
            Commands::IssueToken(args) => {
                assert_eq!(args.sub, "auth0|42");
                assert_eq!(args.role, vec!["lawyer".to_string(), "staff".to_string()]);
                assert!(args.permission.is_empty());
            }
            _ => panic!("expected issue-token"),
        }
    }

    #[test]
    fn recalc_tenant_is_optional() {
        let cli = Cli::try_parse_from(["legalops", "recalc-balances"]).unwrap();
        assert!(matches!(cli.command, Commands::RecalcBalances(ref a) if a.tenant.is_none()));
        assert!(Cli::try_parse_from(["legalops", "recalc-balances", "--tenant", "not-a-uuid"]).is_err());
    }
}
