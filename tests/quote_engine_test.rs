mod common;

use axum::http::{Method, StatusCode};
use chrono::{Duration, Utc};
use serde_json::json;

use common::{response_json, TestApp};
use storefront_api::entities::coupon_rule::RuleKind;
use storefront_api::entities::user::CustomerType;
use storefront_api::services::coupons::{CouponRuleInput, CreateCouponRequest};

#[tokio::test]
async fn first_order_discount_and_flat_shipping() {
    let app = TestApp::new().await;
    app.seed_product("gentle-cleanser", 1790, 10).await;
    let (_, token) = app
        .register_user("shopper@example.com", CustomerType::Private)
        .await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/orders/quote",
            Some(json!({ "items": [{ "product_slug": "gentle-cleanser", "qty": 2 }] })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let quote = response_json(response).await;
    assert_eq!(quote["subtotal_cents"], 3580);
    assert_eq!(quote["discount_cents"], 358);
    assert_eq!(quote["discount_label"], "Primo acquisto -10%");
    assert_eq!(quote["shipping_cents"], 700);
    assert_eq!(quote["total_cents"], 3922);
}

#[tokio::test]
async fn percent_coupon_applies_to_remainder_after_global_discount() {
    let app = TestApp::new().await;
    app.seed_product("gentle-cleanser", 1790, 10).await;
    app.state
        .coupons
        .create(CreateCouponRequest {
            code: "WELCOME10".to_string(),
            name: None,
            is_active: true,
            starts_at: None,
            ends_at: None,
            rules: vec![CouponRuleInput {
                product_slug: "gentle-cleanser".to_string(),
                kind: RuleKind::Percent,
                value: 10,
            }],
        })
        .await
        .expect("create coupon");

    let (_, token) = app
        .register_user("shopper@example.com", CustomerType::Private)
        .await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/orders/quote",
            Some(json!({
                "items": [{ "product_slug": "gentle-cleanser", "qty": 2 }],
                "coupon_code": "welcome10"
            })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    // Line total 3580, global 358, coupon 10% of the remaining 3222.
    let quote = response_json(response).await;
    assert_eq!(quote["discount_cents"], 358 + 322);
    assert_eq!(quote["coupon_discount_cents"], 322);
    assert_eq!(quote["discount_label"], "Primo acquisto -10% + Coupon WELCOME10");
    assert_eq!(quote["total_cents"], 3580 - 680 + 700);
}

#[tokio::test]
async fn piva_discount_applies_on_every_order() {
    let app = TestApp::new().await;
    app.seed_product("gentle-cleanser", 1790, 10).await;
    let (_, token) = app
        .register_user("studio@example.com", CustomerType::Piva)
        .await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/orders/quote",
            Some(json!({ "items": [{ "product_slug": "gentle-cleanser", "qty": 2 }] })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let quote = response_json(response).await;
    assert_eq!(quote["discount_cents"], 537); // round(3580 * 0.15)
    assert_eq!(quote["discount_label"], "Sconto P.IVA -15%");
}

#[tokio::test]
async fn free_shipping_at_threshold_only() {
    let app = TestApp::new().await;
    // Post-discount amounts land exactly at, and just below, the
    // free-shipping threshold of 12000.
    app.seed_product("deluxe-kit", 13334, 10).await;
    app.seed_product("almost-kit", 13332, 10).await;
    let (_, token) = app
        .register_user("shopper@example.com", CustomerType::Private)
        .await;

    let at_threshold = response_json(
        app.request(
            Method::POST,
            "/api/v1/orders/quote",
            Some(json!({ "items": [{ "product_slug": "deluxe-kit", "qty": 1 }] })),
            Some(&token),
        )
        .await,
    )
    .await;
    // 13334 - round(1333.4) = 12001, free shipping.
    assert_eq!(at_threshold["shipping_cents"], 0);

    let below_threshold = response_json(
        app.request(
            Method::POST,
            "/api/v1/orders/quote",
            Some(json!({ "items": [{ "product_slug": "almost-kit", "qty": 1 }] })),
            Some(&token),
        )
        .await,
    )
    .await;
    // 13332 - 1333 = 11999, flat fee applies.
    assert_eq!(below_threshold["shipping_cents"], 700);
    assert_eq!(below_threshold["total_cents"], 11999 + 700);
}

#[tokio::test]
async fn bundle_price_is_tiered_by_customer_type() {
    let app = TestApp::new().await;
    app.seed_product("SET EXPERIENCE", 9900, 10).await;
    let (_, private_token) = app
        .register_user("private@example.com", CustomerType::Private)
        .await;
    let (_, piva_token) = app
        .register_user("studio@example.com", CustomerType::Piva)
        .await;

    let private_quote = response_json(
        app.request(
            Method::POST,
            "/api/v1/orders/quote",
            Some(json!({ "items": [{ "product_slug": " set experience ", "qty": 1 }] })),
            Some(&private_token),
        )
        .await,
    )
    .await;
    assert_eq!(private_quote["lines"][0]["unit_price_cents"], 6000);
    // Bundle lines never take part in the global discount base.
    assert_eq!(private_quote["discount_cents"], 0);

    let piva_quote = response_json(
        app.request(
            Method::POST,
            "/api/v1/orders/quote",
            Some(json!({ "items": [{ "product_slug": "set experience", "qty": 1 }] })),
            Some(&piva_token),
        )
        .await,
    )
    .await;
    assert_eq!(piva_quote["lines"][0]["unit_price_cents"], 5400);
}

#[tokio::test]
async fn expired_coupon_is_rejected() {
    let app = TestApp::new().await;
    app.seed_product("gentle-cleanser", 1790, 10).await;
    app.state
        .coupons
        .create(CreateCouponRequest {
            code: "OLDNEWS".to_string(),
            name: None,
            is_active: true,
            starts_at: None,
            ends_at: Some(Utc::now() - Duration::days(1)),
            rules: vec![CouponRuleInput {
                product_slug: "gentle-cleanser".to_string(),
                kind: RuleKind::Percent,
                value: 10,
            }],
        })
        .await
        .expect("create coupon");

    let (_, token) = app
        .register_user("shopper@example.com", CustomerType::Private)
        .await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/orders/quote",
            Some(json!({
                "items": [{ "product_slug": "gentle-cleanser", "qty": 1 }],
                "coupon_code": "OLDNEWS"
            })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_product_fails_the_whole_quote() {
    let app = TestApp::new().await;
    app.seed_product("gentle-cleanser", 1790, 10).await;
    let (_, token) = app
        .register_user("shopper@example.com", CustomerType::Private)
        .await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/orders/quote",
            Some(json!({
                "items": [
                    { "product_slug": "gentle-cleanser", "qty": 1 },
                    { "product_slug": "no-such-thing", "qty": 1 }
                ]
            })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
