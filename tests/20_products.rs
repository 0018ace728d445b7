mod common;

use anyhow::Result;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

use common::{TestServer, TENANT_HEADER};

async fn create(client: &Client, server: &TestServer, tenant: i32, body: Value) -> Result<reqwest::Response> {
    Ok(client
        .post(server.url("/api/products"))
        .header(TENANT_HEADER, tenant.to_string())
        .json(&body)
        .send()
        .await?)
}

async fn list(client: &Client, server: &TestServer, tenant: i32) -> Result<Vec<Value>> {
    let res = client
        .get(server.url("/api/products"))
        .header(TENANT_HEADER, tenant.to_string())
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body = res.json::<Value>().await?;
    Ok(body["products"].as_array().cloned().unwrap_or_default())
}

#[tokio::test]
async fn seeded_tenant_one_sees_exactly_its_three_products() -> Result<()> {
    let Some(server) = common::ensure_server().await? else {
        return Ok(());
    };
    let client = Client::new();

    let products = list(&client, server, 1).await?;
    assert_eq!(products.len(), 3, "unexpected products: {:?}", products);
    assert!(products.iter().all(|p| p["tenantId"] == 1));

    let ids: Vec<i64> = products.iter().filter_map(|p| p["id"].as_i64()).collect();
    let mut sorted = ids.clone();
    sorted.sort_unstable();
    assert_eq!(ids, sorted, "list must be ordered by id");

    assert_eq!(list(&client, server, 2).await?.len(), 2);
    Ok(())
}

#[tokio::test]
async fn created_product_belongs_to_caller_and_is_hidden_from_others() -> Result<()> {
    let Some(server) = common::ensure_server().await? else {
        return Ok(());
    };
    let client = Client::new();

    let res = create(&client, server, 3, json!({ "name": "X", "price": 10 })).await?;
    assert_eq!(res.status(), StatusCode::CREATED);
    let location = res
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let created = res.json::<Value>().await?;
    let id = created["id"].as_i64().expect("id");

    assert_eq!(created["tenantId"], 3);
    assert_eq!(created["name"], "X");
    assert_eq!(created["price"].as_f64(), Some(10.0));
    assert_eq!(location.as_deref(), Some(format!("/api/products/{}", id).as_str()));

    let other = client
        .get(server.url(&format!("/api/products/{}", id)))
        .header(TENANT_HEADER, "1")
        .send()
        .await?;
    assert_eq!(other.status(), StatusCode::NOT_FOUND);

    let own = client
        .get(server.url(&format!("/api/products/{}", id)))
        .header(TENANT_HEADER, "3")
        .send()
        .await?;
    assert_eq!(own.status(), StatusCode::OK);

    // Leave the seeded tenant as it was
    let deleted = client
        .delete(server.url(&format!("/api/products/{}", id)))
        .header(TENANT_HEADER, "3")
        .send()
        .await?;
    assert_eq!(deleted.status(), StatusCode::NO_CONTENT);
    Ok(())
}

#[tokio::test]
async fn tenant_id_in_body_is_ignored() -> Result<()> {
    let Some(server) = common::ensure_server().await? else {
        return Ok(());
    };
    let client = Client::new();
    let tenant = common::fresh_tenant();

    let res = create(&client, server, tenant, json!({ "name": "Spoofed", "price": 5, "tenantId": 2 })).await?;
    assert_eq!(res.status(), StatusCode::CREATED);
    let created = res.json::<Value>().await?;
    assert_eq!(created["tenantId"], tenant);

    let tenant_two = list(&client, server, 2).await?;
    assert!(tenant_two.iter().all(|p| p["name"] != "Spoofed"));
    Ok(())
}

#[tokio::test]
async fn update_keeps_owner_and_cannot_reach_other_tenants() -> Result<()> {
    let Some(server) = common::ensure_server().await? else {
        return Ok(());
    };
    let client = Client::new();
    let owner = common::fresh_tenant();
    let intruder = common::fresh_tenant();

    let created = create(&client, server, owner, json!({ "name": "Original", "price": 12.5 }))
        .await?
        .json::<Value>()
        .await?;
    let url = server.url(&format!("/api/products/{}", created["id"]));

    let res = client
        .put(&url)
        .header(TENANT_HEADER, intruder.to_string())
        .json(&json!({ "name": "Hijacked", "price": 1 }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client
        .put(&url)
        .header(TENANT_HEADER, owner.to_string())
        .json(&json!({ "name": "Renamed", "price": 20, "tenantId": intruder }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let updated = res.json::<Value>().await?;
    assert_eq!(updated["name"], "Renamed");
    assert_eq!(updated["tenantId"], owner);

    let res = client
        .delete(&url)
        .header(TENANT_HEADER, intruder.to_string())
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(list(&client, server, owner).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn invalid_payloads_are_rejected() -> Result<()> {
    let Some(server) = common::ensure_server().await? else {
        return Ok(());
    };
    let client = Client::new();
    let tenant = common::fresh_tenant();

    let res = create(&client, server, tenant, json!({ "name": " ", "price": -1 })).await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body = res.json::<Value>().await?;
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert!(body["field_errors"]["name"].is_string());
    assert!(body["field_errors"]["price"].is_string());

    let res = client
        .post(server.url("/api/products"))
        .header(TENANT_HEADER, tenant.to_string())
        .header("content-type", "application/json")
        .body("{\"name\": ")
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(res.json::<Value>().await?["code"], "INVALID_JSON");

    assert!(list(&client, server, tenant).await?.is_empty());
    Ok(())
}
