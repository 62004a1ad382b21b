#![allow(dead_code)]

use std::process::{Child, Command, Stdio};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use legalops_api::auth::JwtValidator;
use reqwest::StatusCode;
use uuid::Uuid;

pub const DEV_SECRET: &str = "integration-test-secret";

static SERVER: OnceCell<TestServer> = OnceCell::new();

pub struct TestServer {
    pub port: u16,
    pub base_url: String,
    pub storage_dir: PathBuf,
    child: Child,
}

impl TestServer {
    fn spawn() -> Result<Self> {
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);
        let storage_dir = std::env::temp_dir().join(format!("legalops-it-{}", port));

        // Inherits DATABASE_URL so the DB-backed tests hit the same database
        let child = Command::new(env!("CARGO_BIN_EXE_legalops-api"))
            .env("APP_ENV", "development")
            .env("LEGALOPS_API_PORT", port.to_string())
            .env("DEV_JWT_SECRET", DEV_SECRET)
            .env("STORAGE_ROOT_DIR", &storage_dir)
            .env("RUST_LOG", "legalops_api=warn")
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .context("failed to spawn server binary")?;

        Ok(Self { port, base_url, storage_dir, child })
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let client = reqwest::Client::new();
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if let Ok(resp) = client.get(format!("{}/health", self.base_url)).send().await {
                if resp.status() == StatusCode::OK || resp.status() == StatusCode::SERVICE_UNAVAILABLE {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(150)).await;
        }
        anyhow::bail!("server did not become ready on {} within {:?}", self.base_url, timeout)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Where the server's local storage keeps `key`
    pub fn stored_file(&self, key: &str) -> PathBuf {
        self.storage_dir.join(key)
    }
}

pub async fn ensure_server() -> Result<&'static TestServer> {
    let server = SERVER.get_or_init(|| TestServer::spawn().expect("failed to spawn server binary"));
    server.wait_ready(Duration::from_secs(10)).await?;
    Ok(server)
}

/// Token the spawned server accepts, signed with the shared development secret
pub fn dev_token(tenant_id: Uuid, sub: &str, roles: &[&str]) -> Result<String> {
    let mut security = legalops_api::config::config().security.clone();
    security.auth0_domain = None;
    security.dev_jwt_secret = Some(DEV_SECRET.to_string());
    let roles: Vec<String> = roles.iter().map(|r| r.to_string()).collect();
    let token = JwtValidator::from_config(&security).issue_dev_token(tenant_id, sub, &roles, &[], None)?;
    Ok(token)
}

/// Connection for seeding; `None` when DATABASE_URL is unset
pub async fn database() -> Result<Option<sqlx::PgPool>> {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set; skipping database-backed test");
        return Ok(None);
    };
    let pool = sqlx::PgPool::connect(&url).await.context("failed to connect to DATABASE_URL")?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(Some(pool))
}

/// Register a fresh active tenant
pub async fn seed_tenant(pool: &sqlx::PgPool) -> Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO tenants (id, slug, name) VALUES ($1, $2, $3)")
        .bind(id)
        .bind(format!("firm-{}", id.simple()))
        .bind("Integration Test Firm")
        .execute(pool)
        .await?;
    Ok(id)
}

/// Text column read inside the tenant's RLS scope
pub async fn tenant_text(pool: &sqlx::PgPool, tenant_id: Uuid, sql: &str, id: Uuid) -> Result<String> {
    let mut tx = pool.begin().await?;
    sqlx::query("SELECT set_config('app.tenant_id', $1, true)")
        .bind(tenant_id.to_string())
        .execute(&mut *tx)
        .await?;
    let value = sqlx::query_scalar::<_, String>(sql).bind(id).fetch_one(&mut *tx).await?;
    tx.commit().await?;
    Ok(value)
}
