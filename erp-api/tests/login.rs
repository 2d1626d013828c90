//! Login, identity and the JSON error contract.

#[macro_use]
extern crate time_test;

use rocket::http::{Header, Status};
use rocket::local::asynchronous::Client;
use rocket::tokio;
use serde_json::{Value, json};

use erp_api::orm::testing::{TEST_PASSWORD, seeded_email, test_rocket};

fn bearer(token: &Value) -> Header<'static> {
    Header::new(
        "Authorization",
        format!("Bearer {}", token.as_str().expect("token string")),
    )
}

#[tokio::test]
async fn test_login_by_username() {
    let client = Client::tracked(test_rocket()).await.unwrap();
    time_test!("test_login_by_username");

    let response = client
        .post("/api/v1/auth/login")
        .json(&json!({
            "username": "acme_cashier",
            "password": TEST_PASSWORD,
            "device_id": "till-1",
            "device_name": "Front till"
        }))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);

    let body: Value = response.into_json().await.unwrap();
    assert!(body["access_token"].is_string());
    assert!(body["refresh_token"].is_string());
    assert_ne!(body["access_token"], body["refresh_token"]);
    assert!(body["session_id"].is_string());
    assert_eq!(body["user"]["username"], "acme_cashier");
    assert!(body["user"].get("password_hash").is_none());
    assert_eq!(body["company"]["name"], "Acme Retail");
    assert_eq!(body["permissions"], json!(["CREATE_SALES"]));
    assert!(body.get("preferences").is_none());
}

#[tokio::test]
async fn test_login_by_email_ignores_case() {
    let client = Client::tracked(test_rocket()).await.unwrap();
    time_test!("test_login_by_email_ignores_case");

    let response = client
        .post("/api/v1/auth/login")
        .json(&json!({
            "email": seeded_email("acme_manager").to_uppercase(),
            "password": TEST_PASSWORD,
            "device_id": "laptop",
            "include_preferences": true
        }))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);

    let body: Value = response.into_json().await.unwrap();
    assert_eq!(body["user"]["username"], "acme_manager");
    assert!(body["preferences"].is_object());
}

#[tokio::test]
async fn test_login_failures_look_the_same() {
    let client = Client::tracked(test_rocket()).await.unwrap();
    time_test!("test_login_failures_look_the_same");

    let attempts = [
        json!({ "username": "acme_cashier", "password": "wrong-password", "device_id": "d" }),
        json!({ "username": "nobody", "password": TEST_PASSWORD, "device_id": "d" }),
        json!({ "username": "locked_user", "password": TEST_PASSWORD, "device_id": "d" }),
    ];

    let mut bodies = Vec::new();
    for attempt in attempts {
        let response = client.post("/api/v1/auth/login").json(&attempt).dispatch().await;
        assert_eq!(response.status(), Status::Unauthorized);
        bodies.push(response.into_json::<Value>().await.unwrap());
    }

    assert_eq!(bodies[0]["code"], "invalid_credentials");
    assert!(bodies.iter().all(|b| *b == bodies[0]));
}

#[tokio::test]
async fn test_login_requires_device_id() {
    let client = Client::tracked(test_rocket()).await.unwrap();
    time_test!("test_login_requires_device_id");

    let response = client
        .post("/api/v1/auth/login")
        .json(&json!({ "username": "acme_cashier", "password": TEST_PASSWORD, "device_id": "  " }))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::BadRequest);
    let body: Value = response.into_json().await.unwrap();
    assert_eq!(body["code"], "bad_request");
}

#[tokio::test]
async fn test_user_without_company_can_log_in() {
    let client = Client::tracked(test_rocket()).await.unwrap();
    time_test!("test_user_without_company_can_log_in");

    let response = client
        .post("/api/v1/auth/login")
        .json(&json!({ "username": "newbie", "password": TEST_PASSWORD, "device_id": "phone" }))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);

    let body: Value = response.into_json().await.unwrap();
    assert!(body["company"].is_null());
    assert_eq!(body["permissions"], json!([]));
}

#[tokio::test]
async fn test_me_reflects_token() {
    let client = Client::tracked(test_rocket()).await.unwrap();
    time_test!("test_me_reflects_token");

    let login: Value = client
        .post("/api/v1/auth/login")
        .json(&json!({ "username": "acme_admin", "password": TEST_PASSWORD, "device_id": "desk" }))
        .dispatch()
        .await
        .into_json()
        .await
        .unwrap();

    let response = client
        .get("/api/v1/auth/me")
        .header(bearer(&login["access_token"]))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);

    let body: Value = response.into_json().await.unwrap();
    assert_eq!(body["user"]["username"], "acme_admin");
    assert_eq!(body["session_id"], login["session_id"]);
    assert_eq!(body["company"]["name"], "Acme Retail");
    assert_eq!(body["location"]["name"], "Acme HQ");

    // Admin holds every permission through its wildcard.
    let permissions = body["permissions"].as_array().unwrap();
    assert!(permissions.iter().any(|p| p == "MANAGE_SESSIONS"));
    assert!(permissions.iter().any(|p| p == "CREATE_SALES"));
}

#[tokio::test]
async fn test_missing_and_malformed_tokens() {
    let client = Client::tracked(test_rocket()).await.unwrap();
    time_test!("test_missing_and_malformed_tokens");

    let response = client.get("/api/v1/auth/me").dispatch().await;
    assert_eq!(response.status(), Status::Unauthorized);
    let body: Value = response.into_json().await.unwrap();
    assert_eq!(body["code"], "token_expired_or_invalid");

    let response = client
        .get("/api/v1/auth/me")
        .header(Header::new("Authorization", "Bearer not.a.jwt"))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Unauthorized);

    let response = client
        .get("/api/v1/auth/me")
        .header(Header::new("Authorization", "Basic YWRtaW46YWRtaW4="))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Unauthorized);
}

#[tokio::test]
async fn test_refresh_token_is_not_an_access_token() {
    let client = Client::tracked(test_rocket()).await.unwrap();
    time_test!("test_refresh_token_is_not_an_access_token");

    let login: Value = client
        .post("/api/v1/auth/login")
        .json(&json!({ "username": "acme_cashier", "password": TEST_PASSWORD, "device_id": "d" }))
        .dispatch()
        .await
        .into_json()
        .await
        .unwrap();

    let response = client
        .get("/api/v1/auth/me")
        .header(bearer(&login["refresh_token"]))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Unauthorized);
}

#[tokio::test]
async fn test_status_needs_no_token() {
    let client = Client::tracked(test_rocket()).await.unwrap();
    time_test!("test_status_needs_no_token");

    let response = client.get("/api/v1/status").dispatch().await;
    assert_eq!(response.status(), Status::Ok);
    let body: Value = response.into_json().await.unwrap();
    assert_eq!(body["status"], "running");
}

#[tokio::test]
async fn test_unknown_route_is_json_404() {
    let client = Client::tracked(test_rocket()).await.unwrap();
    time_test!("test_unknown_route_is_json_404");

    let response = client.get("/api/v1/nothing-here").dispatch().await;
    assert_eq!(response.status(), Status::NotFound);
    let body: Value = response.into_json().await.unwrap();
    assert_eq!(body["code"], "not_found");
}

#[tokio::test]
async fn test_username_and_email_fields_do_not_cross() {
    let client = Client::tracked(test_rocket()).await.unwrap();
    time_test!("test_username_and_email_fields_do_not_cross");

    // A username in the email field, and an email in the username field.
    for body in [
        json!({ "email": "acme_manager", "password": TEST_PASSWORD, "device_id": "d" }),
        json!({
            "username": seeded_email("acme_manager"),
            "password": TEST_PASSWORD,
            "device_id": "d"
        }),
    ] {
        let response = client.post("/api/v1/auth/login").json(&body).dispatch().await;
        assert_eq!(response.status(), Status::Unauthorized);
        let body: Value = response.into_json().await.unwrap();
        assert_eq!(body["code"], "invalid_credentials");
    }
}
