mod common;

use anyhow::Result;
use reqwest::StatusCode;
use uuid::Uuid;

#[tokio::test]
async fn protected_routes_require_a_token() -> Result<()> {
    let server = common::ensure_server().await?;
    let res = reqwest::get(server.url("/api/v1/expenses")).await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let body: serde_json::Value = res.json().await?;
    assert_eq!(body["error"], true);
    assert_eq!(body["code"], "UNAUTHORIZED");
    Ok(())
}

#[tokio::test]
async fn token_signed_with_another_secret_is_rejected() -> Result<()> {
    let server = common::ensure_server().await?;
    let mut security = legalops_api::config::config().security.clone();
    security.auth0_domain = None;
    security.dev_jwt_secret = Some("some-other-secret".to_string());
    let forged = legalops_api::auth::JwtValidator::from_config(&security)
        .issue_dev_token(Uuid::new_v4(), "intruder", &["owner".to_string()], &[], None)?;

    let res = reqwest::Client::new()
        .get(server.url("/api/v1/me"))
        .bearer_auth(forged)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn unknown_tenant_is_forbidden() -> Result<()> {
    let Some(_pool) = common::database().await? else { return Ok(()) };
    let server = common::ensure_server().await?;
    let token = common::dev_token(Uuid::new_v4(), "auth0|ghost", &["owner"])?;

    let res = reqwest::Client::new()
        .get(server.url("/api/v1/me"))
        .bearer_auth(token)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn viewer_cannot_write_expenses() -> Result<()> {
    let Some(pool) = common::database().await? else { return Ok(()) };
    let tenant = common::seed_tenant(&pool).await?;
    let server = common::ensure_server().await?;
    let token = common::dev_token(tenant, "auth0|viewer", &["viewer"])?;
    let client = reqwest::Client::new();

    let me: serde_json::Value = client.get(server.url("/api/v1/me")).bearer_auth(&token).send().await?.json().await?;
    assert_eq!(me["data"]["subject"], "auth0|viewer");

    let res = client
        .post(server.url("/api/v1/expenses"))
        .bearer_auth(&token)
        .json(&serde_json::json!({
            "date": "2024-02-01",
            "category": "Filing fees",
            "description": "Court filing",
            "expense_amount": "120.00"
        }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    Ok(())
}
