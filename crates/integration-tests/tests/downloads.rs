//! Entitlement-checked downloads, end to end.

use reqwest::StatusCode;
use reqwest::multipart::{Form, Part};
use serde_json::{Value, json};

use shelf_core::{OrderStatus, ProductId};
use shelf_integration_tests::TestApp;
use shelf_storefront::db::Storage;

const ARCHIVE: &[u8] = b"PK\x03\x04 product one archive bytes";

#[tokio::test]
async fn test_purchase_unlocks_download() {
    let app = TestApp::spawn().await;
    let admin = app.admin("owner@x.com").await;

    // Admin uploads the archive and creates P1 around it.
    let part = Part::bytes(ARCHIVE.to_vec())
        .file_name("p1.zip")
        .mime_str("application/zip")
        .unwrap();
    let resp = admin
        .post(app.url("/admin/upload"))
        .multipart(Form::new().part("file", part))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let uploaded: Value = resp.json().await.unwrap();
    assert_eq!(uploaded["originalName"], "p1.zip");
    assert_eq!(uploaded["size"], ARCHIVE.len());

    let resp = admin
        .post(app.url("/admin/products"))
        .json(&json!({
            "name": "P1",
            "price": "49.00",
            "file": { "name": uploaded["fileName"], "size": uploaded["size"] },
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let product: Value = resp.json().await.unwrap();
    let product_id: ProductId = serde_json::from_value(product["id"].clone()).unwrap();

    // Not purchased yet.
    let (buyer, buyer_id) = app.user("buyer@x.com").await;
    let resp = app.download(&buyer, product_id).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert!(
        app.storage
            .downloads_for_user(buyer_id)
            .await
            .unwrap()
            .is_empty()
    );

    let resp = buyer
        .post(app.url("/orders"))
        .json(&json!({ "productId": product_id, "amount": "49.00" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let order: Value = resp.json().await.unwrap();
    assert_eq!(order["status"], "completed");

    let resp = app.download(&buyer, product_id).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["content-type"], "application/zip");
    assert_eq!(
        resp.headers()["content-disposition"],
        "attachment; filename=\"P1.zip\""
    );
    assert_eq!(resp.bytes().await.unwrap().as_ref(), ARCHIVE);

    let downloads = app.wait_for_downloads(buyer_id, 1).await;
    assert_eq!(downloads.len(), 1);
    assert_eq!(downloads.first().unwrap().product_id, product_id);
}

#[tokio::test]
async fn test_global_unlock_downloads_without_order() {
    let app = TestApp::spawn().await;
    let product = app.product("P2", Some(b"p2 bytes")).await;
    let (client, user_id) = app.user("paid@x.com").await;

    let resp = client.post(app.url("/mark-paid")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["user"]["hasPaid"], true);

    let resp = app.download(&client, product.id).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.bytes().await.unwrap().as_ref(), b"p2 bytes");
    assert!(
        app.storage
            .orders_for_user(user_id)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn test_refund_revokes_download() {
    let app = TestApp::spawn().await;
    let product = app.product("P3", Some(b"p3 bytes")).await;
    let (client, user_id) = app.user("refund@x.com").await;

    let resp = app
        .send_webhook(&json!({
            "type": "payment.succeeded",
            "data": {
                "user_id": user_id,
                "product_id": product.id,
                "amount": "49.00",
                "reference": "pay_p3",
            }
        }))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(app.download(&client, product.id).await.status(), StatusCode::OK);

    let order = app
        .storage
        .find_order_by_external_ref("pay_p3")
        .await
        .unwrap()
        .unwrap();
    let admin = app.admin("owner@x.com").await;
    let resp = admin
        .post(app.url(&format!("/admin/orders/{}/status", order.id)))
        .json(&json!({ "status": "refunded" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let updated: Value = resp.json().await.unwrap();
    assert_eq!(updated["status"], "refunded");

    assert_eq!(
        app.download(&client, product.id).await.status(),
        StatusCode::FORBIDDEN
    );
    assert_eq!(
        app.storage
            .find_order(order.id)
            .await
            .unwrap()
            .unwrap()
            .status,
        OrderStatus::Refunded
    );
}

#[tokio::test]
async fn test_missing_archive_is_not_found() {
    let app = TestApp::spawn().await;
    let product = app.product("P4", Some(b"soon gone")).await;
    let stored = product.file.clone().unwrap();
    app.files.remove(&stored.name).await.unwrap();

    let admin = app.admin("owner@x.com").await;
    let resp = app.download(&admin, product.id).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["message"], "Product file not found");
}

#[tokio::test]
async fn test_product_without_archive_is_not_found() {
    let app = TestApp::spawn().await;
    let product = app.product("No file", None).await;
    let admin = app.admin("owner@x.com").await;
    assert_eq!(
        app.download(&admin, product.id).await.status(),
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn test_download_requires_login() {
    let app = TestApp::spawn().await;
    let product = app.product("P5", Some(b"x")).await;
    let resp = app.download(&TestApp::client(), product.id).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_deactivated_product_is_not_downloadable() {
    let app = TestApp::spawn().await;
    let product = app.product("P6", Some(b"x")).await;
    let admin = app.admin("owner@x.com").await;
    assert_eq!(app.download(&admin, product.id).await.status(), StatusCode::OK);

    let resp = admin
        .delete(app.url(&format!("/admin/products/{}", product.id)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    assert_eq!(
        app.download(&admin, product.id).await.status(),
        StatusCode::FORBIDDEN
    );
}

#[tokio::test]
async fn test_dashboard_lists_entitlements() {
    let app = TestApp::spawn().await;
    let owned = app.product("Owned", Some(b"a")).await;
    app.product("Not owned", Some(b"b")).await;
    let (client, _) = app.user("dash@x.com").await;

    client
        .post(app.url("/orders"))
        .json(&json!({ "productId": owned.id, "amount": 10 }))
        .send()
        .await
        .unwrap();
    app.download(&client, owned.id).await.bytes().await.unwrap();

    let products: Vec<Value> = client
        .get(app.url("/my/products"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(products.len(), 1);
    assert_eq!(products.first().unwrap()["name"], "Owned");

    let orders: Vec<Value> = client
        .get(app.url("/my/orders"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(orders.len(), 1);

    let resp = TestApp::client()
        .get(app.url("/my/orders"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}
