//! Per-company device allow lists.

#[macro_use]
extern crate time_test;

use rocket::http::{Header, Status};
use rocket::local::asynchronous::Client;
use rocket::tokio;
use serde_json::{Value, json};

use erp_api::orm::testing::{TEST_PASSWORD, test_rocket};

async fn try_login(client: &Client, username: &str, device_id: &str) -> (Status, Value) {
    let response = client
        .post("/api/v1/auth/login")
        .json(&json!({
            "username": username,
            "password": TEST_PASSWORD,
            "device_id": device_id
        }))
        .dispatch()
        .await;
    let status = response.status();
    (status, response.into_json().await.unwrap_or(Value::Null))
}

fn bearer(login: &Value) -> Header<'static> {
    Header::new(
        "Authorization",
        format!("Bearer {}", login["access_token"].as_str().unwrap()),
    )
}

#[tokio::test]
async fn test_restricted_devices() {
    let client = Client::tracked(test_rocket()).await.unwrap();
    time_test!("test_restricted_devices");

    let (_, admin) = try_login(&client, "acme_admin", "desk").await;
    let response = client
        .put("/api/v1/settings/device-control")
        .header(bearer(&admin))
        .json(&json!({
            "restrict_devices": true,
            "allowed_device_ids": [" till-2 ", "till-1", "till-1", ""]
        }))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let stored: Value = response.into_json().await.unwrap();
    assert_eq!(stored["allowed_device_ids"], json!(["till-1", "till-2"]));

    let (status, body) = try_login(&client, "acme_cashier", "home-laptop").await;
    assert_eq!(status, Status::Forbidden);
    assert_eq!(body["code"], "forbidden");

    let (status, _) = try_login(&client, "acme_cashier", "till-2").await;
    assert_eq!(status, Status::Ok);

    // The admin's own live session on an unlisted device survives.
    let response = client
        .get("/api/v1/settings/device-control")
        .header(bearer(&admin))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let fetched: Value = response.into_json().await.unwrap();
    assert_eq!(fetched, stored);

    // Globex has no allow list.
    let (status, _) = try_login(&client, "globex_admin", "home-laptop").await;
    assert_eq!(status, Status::Ok);
}

#[tokio::test]
async fn test_unrestricted_by_default() {
    let client = Client::tracked(test_rocket()).await.unwrap();
    time_test!("test_unrestricted_by_default");

    let (status, manager) = try_login(&client, "acme_manager", "anything").await;
    assert_eq!(status, Status::Ok);

    let response = client
        .get("/api/v1/settings/device-control")
        .header(bearer(&manager))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let control: Value = response.into_json().await.unwrap();
    assert_eq!(control["restrict_devices"], false);

    let response = client
        .put("/api/v1/settings/device-control")
        .header(bearer(&manager))
        .json(&json!({ "restrict_devices": true, "allowed_device_ids": [] }))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Forbidden);
}
