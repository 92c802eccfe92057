//! Registration, login, logout and session lifetime.

use std::time::Duration;

use reqwest::StatusCode;
use serde_json::json;

use shelf_integration_tests::{PASSWORD, TestApp};
use shelf_storefront::middleware::SESSION_COOKIE_NAME;

#[tokio::test]
async fn test_register_then_login() {
    let app = TestApp::spawn().await;
    let client = TestApp::client();

    let registered = app.register(&client, "a@x.com").await;
    assert_eq!(registered["email"], "a@x.com");
    assert_eq!(registered["hasPaid"], false);
    assert!(registered.get("passwordHash").is_none());

    let fresh = TestApp::client();
    assert_eq!(app.login(&fresh, "a@x.com", PASSWORD).await, StatusCode::OK);

    let me: serde_json::Value = fresh
        .get(app.url("/user"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(me["id"], registered["id"]);

    let other = TestApp::client();
    assert_eq!(
        app.login(&other, "a@x.com", "wrong-password").await,
        StatusCode::UNAUTHORIZED
    );
    let resp = other.get(app.url("/user")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_session_cookie_attributes() {
    let app = TestApp::spawn().await;
    let resp = TestApp::client()
        .post(app.url("/register"))
        .json(&json!({ "email": "cookie@x.com", "password": PASSWORD, "firstName": "C" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    let cookie = resp.headers()["set-cookie"].to_str().unwrap().to_owned();
    assert!(cookie.starts_with(&format!("{SESSION_COOKIE_NAME}=")));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Lax"));
    assert!(cookie.contains("Path=/"));
    assert!(!cookie.contains("Secure"));
}

#[tokio::test]
async fn test_login_is_case_insensitive_on_email() {
    let app = TestApp::spawn().await;
    app.register(&TestApp::client(), "mixed@x.com").await;
    assert_eq!(
        app.login(&TestApp::client(), "  MIXED@x.com ", PASSWORD).await,
        StatusCode::OK
    );
}

#[tokio::test]
async fn test_unknown_email_and_bad_password_look_the_same() {
    let app = TestApp::spawn().await;
    app.register(&TestApp::client(), "known@x.com").await;

    let unknown = TestApp::client()
        .post(app.url("/login"))
        .json(&json!({ "email": "nobody@x.com", "password": PASSWORD }))
        .send()
        .await
        .unwrap();
    let wrong = TestApp::client()
        .post(app.url("/login"))
        .json(&json!({ "email": "known@x.com", "password": "nope123" }))
        .send()
        .await
        .unwrap();

    assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
    let unknown: serde_json::Value = unknown.json().await.unwrap();
    let wrong: serde_json::Value = wrong.json().await.unwrap();
    assert_eq!(unknown, wrong);
}

#[tokio::test]
async fn test_duplicate_registration_conflicts() {
    let app = TestApp::spawn().await;
    app.register(&TestApp::client(), "dup@x.com").await;

    let resp = TestApp::client()
        .post(app.url("/register"))
        .json(&json!({ "email": "DUP@x.com", "password": PASSWORD, "firstName": "Again" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_registration_validation() {
    let app = TestApp::spawn().await;

    let resp = TestApp::client()
        .post(app.url("/register"))
        .json(&json!({ "email": "not-an-email", "password": "123", "firstName": "" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body: serde_json::Value = resp.json().await.unwrap();
    let errors = body["errors"].as_object().unwrap();
    assert!(errors.contains_key("email"));
    assert!(errors.contains_key("password"));
    assert!(errors.contains_key("firstName"));
}

#[tokio::test]
async fn test_logout_ends_session() {
    let app = TestApp::spawn().await;
    let client = TestApp::client();
    app.register(&client, "bye@x.com").await;

    let resp = client.post(app.url("/logout")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = client.get(app.url("/user")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_session_expires_after_inactivity() {
    let app = TestApp::spawn_with(&[("STOREFRONT_SESSION_TTL_SECS", "1")]).await;
    let client = TestApp::client();
    app.register(&client, "idle@x.com").await;

    let resp = client.get(app.url("/user")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    tokio::time::sleep(Duration::from_millis(2100)).await;

    let resp = client.get(app.url("/user")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_health_endpoints() {
    let app = TestApp::spawn().await;
    let client = TestApp::client();

    let resp = client.get(app.url("/health")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().contains_key("x-request-id"));
    assert_eq!(resp.text().await.unwrap(), "ok");

    let resp = client.get(app.url("/health/ready")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}
