//! Payment confirmation: signed webhooks and the client-trusted endpoints.

use reqwest::StatusCode;
use serde_json::{Value, json};

use shelf_core::OrderStatus;
use shelf_integration_tests::TestApp;
use shelf_storefront::db::Storage;

fn succeeded(user: impl serde::Serialize, product: impl serde::Serialize, reference: &str) -> Value {
    json!({
        "type": "payment.succeeded",
        "data": {
            "user_id": user,
            "product_id": product,
            "amount": "49.00",
            "reference": reference,
        }
    })
}

#[tokio::test]
async fn test_webhook_records_order_once() {
    let app = TestApp::spawn().await;
    let product = app.product("Kit", Some(b"kit")).await;
    let (client, user_id) = app.user("hook@x.com").await;
    let event = succeeded(user_id, product.id, "pay_1");

    let resp = app.send_webhook(&event).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["received"], true);
    assert_eq!(body["result"]["outcome"], "orderRecorded");
    assert_eq!(body["result"]["unlocked"], false);
    let order_id = body["result"]["orderId"].clone();

    // Processors retry; the same reference maps to the same order.
    let replay: Value = app.send_webhook(&event).await.json().await.unwrap();
    assert_eq!(replay["result"]["orderId"], order_id);
    assert_eq!(app.storage.orders_for_user(user_id).await.unwrap().len(), 1);

    assert_eq!(app.download(&client, product.id).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_webhook_unlock_all() {
    let app = TestApp::spawn().await;
    let bought = app.product("Bought", Some(b"a")).await;
    let other = app.product("Other", Some(b"b")).await;
    let (client, user_id) = app.user("bundle@x.com").await;

    let mut event = succeeded(user_id, bought.id, "pay_bundle");
    event["data"]["unlock_all"] = json!(true);
    let body: Value = app.send_webhook(&event).await.json().await.unwrap();
    assert_eq!(body["result"]["unlocked"], true);

    assert_eq!(app.download(&client, other.id).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_webhook_refund() {
    let app = TestApp::spawn().await;
    let product = app.product("Kit", Some(b"kit")).await;
    let (client, user_id) = app.user("refund@x.com").await;
    app.send_webhook(&succeeded(user_id, product.id, "pay_r")).await;

    let body: Value = app
        .send_webhook(&json!({ "type": "payment.refunded", "data": { "reference": "pay_r" } }))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["result"]["outcome"], "orderRefunded");

    let orders = app.storage.orders_for_user(user_id).await.unwrap();
    assert_eq!(orders.first().unwrap().status, OrderStatus::Refunded);
    assert_eq!(
        app.download(&client, product.id).await.status(),
        StatusCode::FORBIDDEN
    );

    let body: Value = app
        .send_webhook(&json!({ "type": "payment.refunded", "data": { "reference": "pay_unknown" } }))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["result"]["outcome"], "unknownReference");
}

#[tokio::test]
async fn test_webhook_ignores_other_events() {
    let app = TestApp::spawn().await;
    let body: Value = app
        .send_webhook(&json!({ "type": "customer.created", "data": {} }))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["result"]["outcome"], "ignored");
}

#[tokio::test]
async fn test_webhook_rejects_bad_signatures() {
    let app = TestApp::spawn().await;
    let product = app.product("Kit", Some(b"kit")).await;
    let (_, user_id) = app.user("forger@x.com").await;
    let body = succeeded(user_id, product.id, "pay_forged").to_string();

    let unsigned = TestApp::client()
        .post(app.url("/webhooks/payment"))
        .body(body.clone())
        .send()
        .await
        .unwrap();
    assert_eq!(unsigned.status(), StatusCode::UNAUTHORIZED);

    let forged = TestApp::client()
        .post(app.url("/webhooks/payment"))
        .header("shelf-signature", format!("t=1700000000,v1={}", "0".repeat(64)))
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(forged.status(), StatusCode::UNAUTHORIZED);

    assert!(app.storage.orders_for_user(user_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_webhook_unconfigured() {
    let app = TestApp::spawn_with(&[("STOREFRONT_PAYMENT_WEBHOOK_SECRET", "")]).await;
    let resp = app
        .send_webhook(&json!({ "type": "payment.refunded", "data": { "reference": "x" } }))
        .await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_client_confirmed_payments_can_be_disabled() {
    let app = TestApp::spawn_with(&[("STOREFRONT_TRUST_CLIENT_PAYMENTS", "false")]).await;
    let product = app.product("Kit", Some(b"kit")).await;
    let (client, user_id) = app.user("cheap@x.com").await;

    let resp = client
        .post(app.url("/orders"))
        .json(&json!({ "productId": product.id, "amount": "0.00" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = client.post(app.url("/mark-paid")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    assert!(app.storage.orders_for_user(user_id).await.unwrap().is_empty());
    assert_eq!(
        app.download(&client, product.id).await.status(),
        StatusCode::FORBIDDEN
    );
}

#[tokio::test]
async fn test_create_order_validation() {
    let app = TestApp::spawn().await;
    let product = app.product("Kit", Some(b"kit")).await;
    let (client, _) = app.user("buyer@x.com").await;

    let resp = client
        .post(app.url("/orders"))
        .json(&json!({ "productId": 999_999, "amount": "1.00" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = client
        .post(app.url("/orders"))
        .json(&json!({ "productId": product.id, "amount": "-1.00" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let resp = client
        .post(app.url("/orders"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = TestApp::client()
        .post(app.url("/orders"))
        .json(&json!({ "productId": product.id, "amount": "1.00" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}
