mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;
use uuid::Uuid;

use common::{response_json, TestApp};
use storefront_api::entities::user::CustomerType;

async fn create_pending_order(app: &TestApp, token: &str) -> Uuid {
    app.seed_product("hydra-serum", 4500, 10).await;
    let response = app
        .request(
            Method::POST,
            "/api/v1/orders",
            Some(json!({
                "items": [{ "product_slug": "hydra-serum", "qty": 1 }],
                "shipping_address": {
                    "name": "ada",
                    "surname": "lovelace",
                    "phone": "+39 333 1234567",
                    "email": "ada@example.com",
                    "street": "via maggiore 12",
                    "city": "bologna",
                    "postal_code": "40121"
                }
            })),
            Some(token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let order = response_json(response).await;
    order["id"].as_str().unwrap().parse().unwrap()
}

#[tokio::test]
async fn first_send_records_and_repeat_is_a_noop() {
    let app = TestApp::new().await;
    let (_, token) = app
        .register_user("shopper@example.com", CustomerType::Private)
        .await;
    let order_id = create_pending_order(&app, &token).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/payments/bank-transfer/send-instructions",
            Some(json!({ "order_id": order_id })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["ok"], true);
    assert_eq!(body["sent"], true);
    assert!(body.get("already_sent").is_none());

    let order = app
        .state
        .orders
        .admin_get(&order_id.to_string())
        .await
        .unwrap();
    assert_eq!(order.order.payment_provider.as_deref(), Some("bank_transfer"));
    assert!(order.order.bank_email_sent_at.is_some());

    // A repeat call reports the earlier send instead of emailing again.
    let response = app
        .request(
            Method::POST,
            "/api/v1/payments/bank-transfer/send-instructions",
            Some(json!({ "order_id": order_id })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["already_sent"], true);
    assert!(body.get("sent").is_none());
}

#[tokio::test]
async fn forced_resend_bumps_the_counter() {
    let app = TestApp::new().await;
    let (_, token) = app
        .register_user("shopper@example.com", CustomerType::Private)
        .await;
    let order_id = create_pending_order(&app, &token).await;

    for _ in 0..2 {
        app.request(
            Method::POST,
            "/api/v1/payments/bank-transfer/send-instructions",
            Some(json!({ "order_id": order_id, "force": true })),
            Some(&token),
        )
        .await;
    }
    let response = app
        .request(
            Method::POST,
            "/api/v1/payments/bank-transfer/send-instructions",
            Some(json!({ "order_id": order_id, "force": true })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["sent"], true);
    assert_eq!(body["resent"], true);

    let order = app
        .state
        .orders
        .admin_get(&order_id.to_string())
        .await
        .unwrap();
    assert_eq!(order.order.bank_email_send_count, 2);
    assert!(order.order.bank_email_last_sent_at.is_some());
}

#[tokio::test]
async fn paid_orders_short_circuit() {
    let app = TestApp::new().await;
    let (_, token) = app
        .register_user("shopper@example.com", CustomerType::Private)
        .await;
    let order_id = create_pending_order(&app, &token).await;
    app.state
        .order_status
        .mark_paid(order_id, "stripe", None, None)
        .await
        .unwrap();

    let response = app
        .request(
            Method::POST,
            "/api/v1/payments/bank-transfer/send-instructions",
            Some(json!({ "order_id": order_id })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["already_paid"], true);
    assert!(body.get("sent").is_none());
}

#[tokio::test]
async fn cancelled_orders_are_not_payable() {
    let app = TestApp::new().await;
    let (_, token) = app
        .register_user("shopper@example.com", CustomerType::Private)
        .await;
    let order_id = create_pending_order(&app, &token).await;
    app.state.order_status.cancel_and_restock(order_id).await.unwrap();

    let response = app
        .request(
            Method::POST,
            "/api/v1/payments/bank-transfer/send-instructions",
            Some(json!({ "order_id": order_id })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn only_the_owner_can_request_instructions() {
    let app = TestApp::new().await;
    let (_, token) = app
        .register_user("shopper@example.com", CustomerType::Private)
        .await;
    let order_id = create_pending_order(&app, &token).await;
    let (_, other_token) = app
        .register_user("someone-else@example.com", CustomerType::Private)
        .await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/payments/bank-transfer/send-instructions",
            Some(json!({ "order_id": order_id })),
            Some(&other_token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
