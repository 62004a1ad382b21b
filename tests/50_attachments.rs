mod common;

use anyhow::Result;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde_json::{json, Value};
use uuid::Uuid;

const RECEIPT: &[u8] = b"%PDF-1.4 taxi receipt";

fn receipt_form() -> Result<Form> {
    let part = Part::bytes(RECEIPT.to_vec()).file_name("taxi.pdf").mime_str("application/pdf")?;
    Ok(Form::new().part("file", part))
}

#[tokio::test]
async fn upload_link_download_and_delete() -> Result<()> {
    let Some(pool) = common::database().await? else { return Ok(()) };
    let tenant = common::seed_tenant(&pool).await?;
    let server = common::ensure_server().await?;
    let token = common::dev_token(tenant, "auth0|clerk", &["staff"])?;
    let client = reqwest::Client::new();

    let res = client
        .post(server.url("/api/v1/attachments"))
        .bearer_auth(&token)
        .multipart(receipt_form()?)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::CREATED);
    let uploaded: Value = res.json().await?;
    let id = uploaded["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(uploaded["data"]["status"], "temporary");
    assert_eq!(uploaded["data"]["size_bytes"], RECEIPT.len());
    assert!(uploaded["data"].get("storage_key").is_none());

    let key = common::tenant_text(&pool, tenant, "SELECT storage_key FROM attachments WHERE id = $1", Uuid::parse_str(&id)?).await?;
    assert!(server.stored_file(&key).exists());

    // Unlinked uploads of the caller
    let pending: Value = client
        .get(server.url("/api/v1/attachments"))
        .bearer_auth(&token)
        .send()
        .await?
        .json()
        .await?;
    assert!(pending["data"].as_array().unwrap().iter().any(|a| a["id"] == id.as_str()));

    let res = client
        .get(server.url(&format!("/api/v1/attachments/{}/content", id)))
        .bearer_auth(&token)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["content-type"], "application/pdf");
    assert!(res.headers()["content-disposition"].to_str()?.contains("taxi.pdf"));
    assert_eq!(res.bytes().await?.as_ref(), RECEIPT);

    let expense: Value = client
        .post(server.url("/api/v1/expenses"))
        .bearer_auth(&token)
        .json(&json!({
            "date": "2024-05-14",
            "category": "Travel",
            "description": "Taxi to court",
            "expense_amount": "31.50"
        }))
        .send()
        .await?
        .json()
        .await?;
    let expense_id = expense["data"]["id"].as_str().unwrap().to_string();

    let linked: Value = client
        .put(server.url(&format!("/api/v1/attachments/{}/link", id)))
        .bearer_auth(&token)
        .json(&json!({ "expense_id": expense_id }))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(linked["data"]["status"], "linked");
    assert_eq!(linked["data"]["expense_id"], expense_id.as_str());

    let by_expense: Value = client
        .get(server.url(&format!("/api/v1/attachments?expense_id={}", expense_id)))
        .bearer_auth(&token)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(by_expense["data"].as_array().unwrap().len(), 1);

    let res = client
        .delete(server.url(&format!("/api/v1/attachments/{}", id)))
        .bearer_auth(&token)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert!(!server.stored_file(&key).exists());

    for path in [format!("/api/v1/attachments/{}", id), format!("/api/v1/attachments/{}/content", id)] {
        let res = client.get(server.url(&path)).bearer_auth(&token).send().await?;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }
    Ok(())
}

#[tokio::test]
async fn upload_without_file_part_is_rejected() -> Result<()> {
    let Some(pool) = common::database().await? else { return Ok(()) };
    let tenant = common::seed_tenant(&pool).await?;
    let server = common::ensure_server().await?;
    let token = common::dev_token(tenant, "auth0|clerk", &["staff"])?;

    let res = reqwest::Client::new()
        .post(server.url("/api/v1/attachments"))
        .bearer_auth(&token)
        .multipart(Form::new().text("expense_id", ""))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await?;
    assert!(body["field_errors"].get("file").is_some());
    Ok(())
}

#[tokio::test]
async fn viewer_cannot_upload() -> Result<()> {
    let Some(pool) = common::database().await? else { return Ok(()) };
    let tenant = common::seed_tenant(&pool).await?;
    let server = common::ensure_server().await?;
    let token = common::dev_token(tenant, "auth0|reader", &["viewer"])?;

    let res = reqwest::Client::new()
        .post(server.url("/api/v1/attachments"))
        .bearer_auth(&token)
        .multipart(receipt_form()?)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    Ok(())
}
