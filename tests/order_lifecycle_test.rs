mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;

use common::{response_json, TestApp};
use storefront_api::entities::order::OrderStatus;
use storefront_api::entities::user::CustomerType;

fn shipping_address() -> serde_json::Value {
    json!({
        "name": "ada",
        "surname": "lovelace",
        "phone": "+39 333 1234567",
        "email": "ada@example.com",
        "street": "via maggiore 12",
        "city": "bologna",
        "postal_code": "40121"
    })
}

#[tokio::test]
async fn order_creation_reserves_stock_and_assigns_public_id() {
    let app = TestApp::new().await;
    app.seed_product("gentle-cleanser", 1790, 5).await;
    let (_, token) = app
        .register_user("shopper@example.com", CustomerType::Private)
        .await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/orders",
            Some(json!({
                "items": [{ "product_slug": "gentle-cleanser", "qty": 2 }],
                "shipping_address": shipping_address()
            })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let order = response_json(response).await;
    assert_eq!(order["status"], "pending_payment");
    let public_id = order["public_id"].as_str().unwrap();
    let year = chrono::Utc::now().format("%Y").to_string();
    assert_eq!(public_id, format!("#{}100", year));
    // Address snapshot is normalized on the way in.
    assert_eq!(order["shipping_address"]["name"], "Ada");
    assert_eq!(order["shipping_address"]["city"], "Bologna");
    assert_eq!(order["shipping_address"]["street_number"], "12");

    let product = app.state.products.admin_get("gentle-cleanser").await.unwrap();
    assert_eq!(product.stock_qty, 3);

    // The next order takes the next public number.
    let second = app
        .request(
            Method::POST,
            "/api/v1/orders",
            Some(json!({
                "items": [{ "product_slug": "gentle-cleanser", "qty": 1 }],
                "shipping_address": shipping_address()
            })),
            Some(&token),
        )
        .await;
    let second = response_json(second).await;
    assert_eq!(
        second["public_id"].as_str().unwrap(),
        format!("#{}101", year)
    );
}

#[tokio::test]
async fn order_creation_without_address_is_rejected() {
    let app = TestApp::new().await;
    app.seed_product("gentle-cleanser", 1790, 5).await;
    let (_, token) = app
        .register_user("shopper@example.com", CustomerType::Private)
        .await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/orders",
            Some(json!({ "items": [{ "product_slug": "gentle-cleanser", "qty": 1 }] })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Nothing was reserved.
    let product = app.state.products.admin_get("gentle-cleanser").await.unwrap();
    assert_eq!(product.stock_qty, 5);
}

#[tokio::test]
async fn insufficient_stock_reports_availability() {
    let app = TestApp::new().await;
    app.seed_product("gentle-cleanser", 1790, 1).await;
    let (_, token) = app
        .register_user("shopper@example.com", CustomerType::Private)
        .await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/orders",
            Some(json!({
                "items": [{ "product_slug": "gentle-cleanser", "qty": 3 }],
                "shipping_address": shipping_address()
            })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body = response_json(response).await;
    assert_eq!(body["details"]["availability"]["gentle-cleanser"], 1);
}

#[tokio::test]
async fn admin_cancel_restocks_once() {
    let app = TestApp::new().await;
    app.seed_product("gentle-cleanser", 1790, 5).await;
    let (_, token) = app
        .register_user("shopper@example.com", CustomerType::Private)
        .await;
    let (_, admin_token) = app.register_admin("admin@example.com").await;

    let created = response_json(
        app.request(
            Method::POST,
            "/api/v1/orders",
            Some(json!({
                "items": [{ "product_slug": "gentle-cleanser", "qty": 2 }],
                "shipping_address": shipping_address()
            })),
            Some(&token),
        )
        .await,
    )
    .await;
    let order_id = created["id"].as_str().unwrap().to_string();

    let response = app
        .request(
            Method::PATCH,
            &format!("/api/v1/orders/admin/{}/cancel", order_id),
            None,
            Some(&admin_token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let cancelled = response_json(response).await;
    assert_eq!(cancelled["status"], "cancelled");

    let product = app.state.products.admin_get("gentle-cleanser").await.unwrap();
    assert_eq!(product.stock_qty, 5);

    // Cancelling again must not restock a second time.
    let again = app
        .request(
            Method::PATCH,
            &format!("/api/v1/orders/admin/{}/cancel", order_id),
            None,
            Some(&admin_token),
        )
        .await;
    assert_eq!(again.status(), StatusCode::OK);
    let product = app.state.products.admin_get("gentle-cleanser").await.unwrap();
    assert_eq!(product.stock_qty, 5);
}

#[tokio::test]
async fn shipping_requires_tracking_details() {
    let app = TestApp::new().await;
    app.seed_product("gentle-cleanser", 1790, 5).await;
    let (_, token) = app
        .register_user("shopper@example.com", CustomerType::Private)
        .await;
    let (_, admin_token) = app.register_admin("admin@example.com").await;

    let created = response_json(
        app.request(
            Method::POST,
            "/api/v1/orders",
            Some(json!({
                "items": [{ "product_slug": "gentle-cleanser", "qty": 1 }],
                "shipping_address": shipping_address()
            })),
            Some(&token),
        )
        .await,
    )
    .await;
    let order_id = created["id"].as_str().unwrap().to_string();
    let status_uri = format!("/api/v1/orders/admin/{}/status", order_id);

    let missing_tracking = app
        .request(
            Method::PATCH,
            &status_uri,
            Some(json!({ "status": "shipped" })),
            Some(&admin_token),
        )
        .await;
    assert_eq!(missing_tracking.status(), StatusCode::BAD_REQUEST);

    let shipped = app
        .request(
            Method::PATCH,
            &status_uri,
            Some(json!({
                "status": "shipped",
                "carrier_name": "BRT",
                "tracking_code": "TRK123",
                "tracking_url": "https://track.example.com/TRK123"
            })),
            Some(&admin_token),
        )
        .await;
    assert_eq!(shipped.status(), StatusCode::OK);
    let body = response_json(shipped).await;
    assert_eq!(body["status"], "shipped");
    assert!(!body["shipped_at"].is_null());

    // Tracking already on file is enough for later transitions.
    let back_to_processing = app
        .request(
            Method::PATCH,
            &status_uri,
            Some(json!({ "status": "processing" })),
            Some(&admin_token),
        )
        .await;
    assert_eq!(back_to_processing.status(), StatusCode::OK);
    let reshipped = app
        .request(
            Method::PATCH,
            &status_uri,
            Some(json!({ "status": "shipped" })),
            Some(&admin_token),
        )
        .await;
    assert_eq!(reshipped.status(), StatusCode::OK);

    let unknown_status = app
        .request(
            Method::PATCH,
            &status_uri,
            Some(json!({ "status": "teleported" })),
            Some(&admin_token),
        )
        .await;
    assert_eq!(unknown_status.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn admin_endpoints_reject_plain_users() {
    let app = TestApp::new().await;
    let (_, token) = app
        .register_user("shopper@example.com", CustomerType::Private)
        .await;

    let response = app
        .request(Method::GET, "/api/v1/orders/admin", None, Some(&token))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let unauthenticated = app
        .request(Method::GET, "/api/v1/orders/admin", None, None)
        .await;
    assert_eq!(unauthenticated.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn concurrent_orders_cannot_oversell() {
    let app = TestApp::new().await;
    app.seed_product("limited-edition", 9900, 1).await;
    let (_, token_a) = app
        .register_user("first@example.com", CustomerType::Private)
        .await;
    let (_, token_b) = app
        .register_user("second@example.com", CustomerType::Private)
        .await;

    let body = json!({
        "items": [{ "product_slug": "limited-edition", "qty": 1 }],
        "shipping_address": shipping_address()
    });
    let (first, second) = tokio::join!(
        app.request(Method::POST, "/api/v1/orders", Some(body.clone()), Some(&token_a)),
        app.request(Method::POST, "/api/v1/orders", Some(body.clone()), Some(&token_b)),
    );

    let statuses = [first.status(), second.status()];
    assert!(statuses.contains(&StatusCode::CREATED));
    assert!(statuses.contains(&StatusCode::UNPROCESSABLE_ENTITY));

    let product = app.state.products.admin_get("limited-edition").await.unwrap();
    assert_eq!(product.stock_qty, 0);
}

#[tokio::test]
async fn concurrent_cancels_restock_once() {
    let app = TestApp::new().await;
    app.seed_product("gentle-cleanser", 1790, 5).await;
    let (_, token) = app
        .register_user("shopper@example.com", CustomerType::Private)
        .await;

    let created = response_json(
        app.request(
            Method::POST,
            "/api/v1/orders",
            Some(json!({
                "items": [{ "product_slug": "gentle-cleanser", "qty": 2 }],
                "shipping_address": shipping_address()
            })),
            Some(&token),
        )
        .await,
    )
    .await;
    let order_id: uuid::Uuid = created["id"].as_str().unwrap().parse().unwrap();
    let product = app.state.products.admin_get("gentle-cleanser").await.unwrap();
    assert_eq!(product.stock_qty, 3);

    // Two racing cancellations may both succeed, but only one of them
    // restores the reserved quantity.
    let (first, second) = tokio::join!(
        app.state.order_status.cancel_and_restock(order_id),
        app.state.order_status.cancel_and_restock(order_id),
    );
    assert_eq!(first.unwrap().status, OrderStatus::Cancelled);
    assert_eq!(second.unwrap().status, OrderStatus::Cancelled);

    let product = app.state.products.admin_get("gentle-cleanser").await.unwrap();
    assert_eq!(product.stock_qty, 5);
}
