//! Per-company session limits.

#[macro_use]
extern crate time_test;

use rocket::http::{Header, Status};
use rocket::local::asynchronous::Client;
use rocket::tokio;
use serde_json::{Value, json};

use erp_api::orm::testing::{TEST_PASSWORD, test_rocket};

fn login_body(username: &str, device_id: &str) -> Value {
    json!({
        "username": username,
        "password": TEST_PASSWORD,
        "device_id": device_id
    })
}

async fn login(client: &Client, username: &str, device_id: &str) -> Value {
    let response = client
        .post("/api/v1/auth/login")
        .json(&login_body(username, device_id))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok, "login of {}", username);
    response.into_json().await.expect("login body")
}

fn bearer(login: &Value) -> Header<'static> {
    Header::new(
        "Authorization",
        format!("Bearer {}", login["access_token"].as_str().unwrap()),
    )
}

async fn set_limit(client: &Client, admin: &Value, max_sessions: i64) -> Status {
    client
        .put("/api/v1/settings/session-limit")
        .header(bearer(admin))
        .json(&json!({ "max_sessions": max_sessions }))
        .dispatch()
        .await
        .status()
}

#[tokio::test]
async fn test_limit_rejects_new_devices() {
    let client = Client::tracked(test_rocket()).await.unwrap();
    time_test!("test_limit_rejects_new_devices");

    let admin = login(&client, "acme_admin", "desk").await;
    assert_eq!(set_limit(&client, &admin, 2).await, Status::Ok);

    login(&client, "acme_cashier", "till-1").await;

    let response = client
        .post("/api/v1/auth/login")
        .json(&login_body("acme_manager", "office"))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::TooManyRequests);
    let body: Value = response.into_json().await.unwrap();
    assert_eq!(body["code"], "session_limit_exceeded");

    // Replacing a device's own session does not need a free slot.
    login(&client, "acme_cashier", "till-1").await;

    // Other companies are not affected.
    login(&client, "globex_admin", "hq").await;
}

#[tokio::test]
async fn test_logout_frees_a_slot() {
    let client = Client::tracked(test_rocket()).await.unwrap();
    time_test!("test_logout_frees_a_slot");

    let admin = login(&client, "acme_admin", "desk").await;
    assert_eq!(set_limit(&client, &admin, 1).await, Status::Ok);

    let response = client
        .post("/api/v1/auth/login")
        .json(&login_body("acme_cashier", "till-1"))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::TooManyRequests);

    let response = client
        .post("/api/v1/auth/logout")
        .header(bearer(&admin))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);

    login(&client, "acme_cashier", "till-1").await;
}

#[tokio::test]
async fn test_concurrent_logins_respect_limit() {
    let client = Client::tracked(test_rocket()).await.unwrap();
    time_test!("test_concurrent_logins_respect_limit");

    let admin = login(&client, "acme_admin", "desk").await;
    assert_eq!(set_limit(&client, &admin, 2).await, Status::Ok);

    let cashier_body = login_body("acme_cashier", "till-1");
    let manager_body = login_body("acme_manager", "office");
    let (cashier, manager) = tokio::join!(
        client.post("/api/v1/auth/login").json(&cashier_body).dispatch(),
        client.post("/api/v1/auth/login").json(&manager_body).dispatch(),
    );

    let mut statuses = vec![cashier.status(), manager.status()];
    statuses.sort_by_key(|s| s.code);
    assert_eq!(statuses, vec![Status::Ok, Status::TooManyRequests]);

    let response = client
        .get("/api/v1/settings/session-limit")
        .header(bearer(&admin))
        .dispatch()
        .await;
    let view: Value = response.into_json().await.unwrap();
    assert_eq!(view["active_sessions"], 2);
}

#[tokio::test]
async fn test_lowering_limit_keeps_live_sessions() {
    let client = Client::tracked(test_rocket()).await.unwrap();
    time_test!("test_lowering_limit_keeps_live_sessions");

    let admin = login(&client, "acme_admin", "desk").await;
    let cashier = login(&client, "acme_cashier", "till-1").await;
    assert_eq!(set_limit(&client, &admin, 1).await, Status::Ok);

    let response = client
        .get("/api/v1/auth/me")
        .header(bearer(&cashier))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);

    let response = client
        .get("/api/v1/settings/session-limit")
        .header(bearer(&admin))
        .dispatch()
        .await;
    let view: Value = response.into_json().await.unwrap();
    assert_eq!(view["max_sessions"], 1);
    assert_eq!(view["active_sessions"], 2);
}

#[tokio::test]
async fn test_removing_limit() {
    let client = Client::tracked(test_rocket()).await.unwrap();
    time_test!("test_removing_limit");

    let admin = login(&client, "acme_admin", "desk").await;
    assert_eq!(set_limit(&client, &admin, 1).await, Status::Ok);

    let response = client
        .delete("/api/v1/settings/session-limit")
        .header(bearer(&admin))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let view: Value = response.into_json().await.unwrap();
    assert!(view["max_sessions"].is_null());

    login(&client, "acme_cashier", "till-1").await;
    login(&client, "acme_manager", "office").await;
}

#[tokio::test]
async fn test_limit_validation_and_permissions() {
    let client = Client::tracked(test_rocket()).await.unwrap();
    time_test!("test_limit_validation_and_permissions");

    let admin = login(&client, "acme_admin", "desk").await;
    let manager = login(&client, "acme_manager", "office").await;
    let cashier = login(&client, "acme_cashier", "till-1").await;

    assert_eq!(set_limit(&client, &admin, 0).await, Status::BadRequest);
    assert_eq!(set_limit(&client, &manager, 5).await, Status::Forbidden);

    // POST is accepted as well as PUT.
    let response = client
        .post("/api/v1/settings/session-limit")
        .header(bearer(&admin))
        .json(&json!({ "max_sessions": 5 }))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);

    // Managers may look but not touch.
    let response = client
        .get("/api/v1/settings/session-limit")
        .header(bearer(&manager))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let view: Value = response.into_json().await.unwrap();
    assert_eq!(view["max_sessions"], 5);
    assert_eq!(view["company_id"], admin["company"]["id"]);

    let response = client
        .get("/api/v1/settings/session-limit")
        .header(bearer(&cashier))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Forbidden);
}
