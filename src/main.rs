#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so DATABASE_URL and friends are picked up
    let _ = dotenvy::dotenv();
    legalops_api::init_tracing();

    let port = legalops_api::config::config().api.port;
    legalops_api::routes::serve(port).await
}
