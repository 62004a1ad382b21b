mod common;

use std::str::FromStr;

use anyhow::Result;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde_json::{json, Value};

fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => Decimal::from_str(s).unwrap(),
        other => Decimal::from_str(&other.to_string()).unwrap(),
    }
}

#[tokio::test]
async fn ledger_keeps_a_running_balance() -> Result<()> {
    let Some(pool) = common::database().await? else { return Ok(()) };
    let tenant = common::seed_tenant(&pool).await?;
    let server = common::ensure_server().await?;
    let token = common::dev_token(tenant, "auth0|lawyer", &["owner"])?;
    let client = reqwest::Client::new();

    let tag: Value = client
        .post(server.url("/api/v1/tags"))
        .bearer_auth(&token)
        .json(&json!({ "name": "Smith v. Jones", "color": "#3366ff" }))
        .send()
        .await?
        .json()
        .await?;
    let tag_id = tag["data"]["id"].as_str().unwrap().to_string();

    let retainer = client
        .post(server.url("/api/v1/expenses"))
        .bearer_auth(&token)
        .json(&json!({
            "date": "2024-01-05",
            "category": "Retainer",
            "description": "Initial retainer",
            "income_amount": "1000.00",
            "tag_ids": [tag_id]
        }))
        .send()
        .await?;
    assert_eq!(retainer.status(), StatusCode::CREATED);
    let retainer: Value = retainer.json().await?;
    assert_eq!(decimal(&retainer["data"]["balance"]), Decimal::new(1000, 0));

    let filing: Value = client
        .post(server.url("/api/v1/expenses"))
        .bearer_auth(&token)
        .json(&json!({
            "date": "2024-01-10",
            "category": "Filing fees",
            "description": "Court filing",
            "expense_amount": "250.00"
        }))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(decimal(&filing["data"]["balance"]), Decimal::new(750, 0));

    // Back-dated entry shifts every later balance
    let backdated: Value = client
        .post(server.url("/api/v1/expenses"))
        .bearer_auth(&token)
        .json(&json!({
            "date": "2024-01-07",
            "category": "Courier",
            "description": "Document delivery",
            "expense_amount": "50.00"
        }))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(decimal(&backdated["data"]["balance"]), Decimal::new(950, 0));

    let filing_id = filing["data"]["id"].as_str().unwrap();
    let refreshed: Value = client
        .get(server.url(&format!("/api/v1/expenses/{}", filing_id)))
        .bearer_auth(&token)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(decimal(&refreshed["data"]["balance"]), Decimal::new(700, 0));

    let page: Value = client
        .get(server.url(&format!("/api/v1/expenses?tag_id={}", tag_id)))
        .bearer_auth(&token)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(page["data"]["total_elements"], 1);

    let summary: Value = client
        .get(server.url("/api/v1/reports/summary?from=2024-01-06&to=2024-01-31"))
        .bearer_auth(&token)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(decimal(&summary["data"]["opening_balance"]), Decimal::new(1000, 0));
    assert_eq!(decimal(&summary["data"]["closing_balance"]), Decimal::new(700, 0));
    Ok(())
}

#[tokio::test]
async fn stale_update_conflicts_and_delete_hides() -> Result<()> {
    let Some(pool) = common::database().await? else { return Ok(()) };
    let tenant = common::seed_tenant(&pool).await?;
    let server = common::ensure_server().await?;
    let token = common::dev_token(tenant, "auth0|owner", &["owner"])?;
    let client = reqwest::Client::new();

    let body = json!({
        "date": "2024-03-01",
        "category": "Travel",
        "description": "Train to hearing",
        "expense_amount": "42.10"
    });
    let created: Value = client
        .post(server.url("/api/v1/expenses"))
        .bearer_auth(&token)
        .json(&body)
        .send()
        .await?
        .json()
        .await?;
    let id = created["data"]["id"].as_str().unwrap().to_string();
    let version = created["data"]["version"].as_i64().unwrap();

    let mut update = body.clone();
    update["description"] = json!("Train to hearing (return)");
    update["version"] = json!(version);
    let res = client
        .put(server.url(&format!("/api/v1/expenses/{}", id)))
        .bearer_auth(&token)
        .json(&update)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);

    // Same version again is now stale
    let res = client
        .put(server.url(&format!("/api/v1/expenses/{}", id)))
        .bearer_auth(&token)
        .json(&update)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let res = client
        .delete(server.url(&format!("/api/v1/expenses/{}", id)))
        .bearer_auth(&token)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = client
        .get(server.url(&format!("/api/v1/expenses/{}", id)))
        .bearer_auth(&token)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn tenants_do_not_see_each_other() -> Result<()> {
    let Some(pool) = common::database().await? else { return Ok(()) };
    let firm_a = common::seed_tenant(&pool).await?;
    let firm_b = common::seed_tenant(&pool).await?;
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();

    let token_a = common::dev_token(firm_a, "auth0|a", &["owner"])?;
    let created: Value = client
        .post(server.url("/api/v1/expenses"))
        .bearer_auth(&token_a)
        .json(&json!({
            "date": "2024-04-02",
            "category": "Experts",
            "description": "Expert witness",
            "expense_amount": "900.00"
        }))
        .send()
        .await?
        .json()
        .await?;
    let id = created["data"]["id"].as_str().unwrap().to_string();

    let token_b = common::dev_token(firm_b, "auth0|b", &["owner"])?;
    let res = client
        .get(server.url(&format!("/api/v1/expenses/{}", id)))
        .bearer_auth(&token_b)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn export_is_csv() -> Result<()> {
    let Some(pool) = common::database().await? else { return Ok(()) };
    let tenant = common::seed_tenant(&pool).await?;
    let server = common::ensure_server().await?;
    let token = common::dev_token(tenant, "auth0|owner", &["owner"])?;

    let res = reqwest::Client::new()
        .get(server.url("/api/v1/expenses/export"))
        .bearer_auth(&token)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let content_type = res.headers()[reqwest::header::CONTENT_TYPE].to_str()?.to_string();
    assert!(content_type.starts_with("text/csv"));
    let text = res.text().await?;
    assert!(text.lines().next().is_some());
    Ok(())
}

#[tokio::test]
async fn retagging_bumps_the_version() -> Result<()> {
    let Some(pool) = common::database().await? else { return Ok(()) };
    let tenant = common::seed_tenant(&pool).await?;
    let server = common::ensure_server().await?;
    let token = common::dev_token(tenant, "auth0|owner", &["owner"])?;
    let client = reqwest::Client::new();

    let tag: Value = client
        .post(server.url("/api/v1/tags"))
        .bearer_auth(&token)
        .json(&json!({ "name": "Estate of Brown" }))
        .send()
        .await?
        .json()
        .await?;
    let body = json!({
        "date": "2024-04-02",
        "category": "Postage",
        "description": "Registered mail",
        "expense_amount": "8.40"
    });
    let created: Value = client
        .post(server.url("/api/v1/expenses"))
        .bearer_auth(&token)
        .json(&body)
        .send()
        .await?
        .json()
        .await?;
    let id = created["data"]["id"].as_str().unwrap().to_string();
    let version = created["data"]["version"].as_i64().unwrap();

    let tagged: Value = client
        .put(server.url(&format!("/api/v1/expenses/{}/tags", id)))
        .bearer_auth(&token)
        .json(&json!({ "tag_ids": [tag["data"]["id"]] }))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(tagged["data"]["version"].as_i64(), Some(version + 1));

    let mut update = body.clone();
    update["version"] = json!(version);
    let res = client
        .put(server.url(&format!("/api/v1/expenses/{}", id)))
        .bearer_auth(&token)
        .json(&update)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::CONFLICT);
    Ok(())
}
