mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;

use common::{response_json, TestApp};
use storefront_api::entities::user::CustomerType;

#[tokio::test]
async fn register_login_and_me_round_trip() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/auth/register",
            Some(json!({
                "email": "  Ada@Example.COM ",
                "password": "correct-horse-battery",
                "first_name": "Ada",
                "last_name": "Lovelace",
                "customer_type": "private"
            })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    // Emails are normalized before storage.
    assert_eq!(body["user"]["email"], "ada@example.com");
    assert_eq!(body["user"]["role"], "user");
    assert!(body["token"].as_str().is_some());

    let response = app
        .request(
            Method::POST,
            "/api/v1/auth/login",
            Some(json!({
                "email": "ada@example.com",
                "password": "correct-horse-battery"
            })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let token = response_json(response).await["token"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .request(Method::GET, "/api/v1/auth/me", None, Some(&token))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let me = response_json(response).await;
    assert_eq!(me["email"], "ada@example.com");
    assert_eq!(me["first_name"], "Ada");
}

#[tokio::test]
async fn duplicate_email_is_a_conflict() {
    let app = TestApp::new().await;
    app.register_user("ada@example.com", CustomerType::Private)
        .await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/auth/register",
            Some(json!({
                "email": "ADA@example.com",
                "password": "another-password-1",
                "first_name": "Ada",
                "last_name": "Lovelace",
                "customer_type": "private"
            })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn wrong_password_is_unauthorized() {
    let app = TestApp::new().await;
    app.register_user("ada@example.com", CustomerType::Private)
        .await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/auth/login",
            Some(json!({
                "email": "ada@example.com",
                "password": "not-the-password"
            })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app.request(Method::GET, "/api/v1/auth/me", None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn password_reset_consumes_the_token_once() {
    let app = TestApp::new().await;
    app.register_user("ada@example.com", CustomerType::Private)
        .await;

    // The endpoint never reveals whether the email exists.
    let response = app
        .request(
            Method::POST,
            "/api/v1/auth/password-reset/request",
            Some(json!({ "email": "nobody@example.com" })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let issued = app
        .state
        .auth
        .request_password_reset("ada@example.com")
        .await
        .unwrap()
        .expect("token for a known email");

    let response = app
        .request(
            Method::POST,
            "/api/v1/auth/password-reset/confirm",
            Some(json!({ "token": issued.token, "new_password": "fresh-password-9" })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    // Old password no longer works, new one does.
    let response = app
        .request(
            Method::POST,
            "/api/v1/auth/login",
            Some(json!({ "email": "ada@example.com", "password": "correct-horse-battery" })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .request(
            Method::POST,
            "/api/v1/auth/login",
            Some(json!({ "email": "ada@example.com", "password": "fresh-password-9" })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    // The token is single use.
    let response = app
        .request(
            Method::POST,
            "/api/v1/auth/password-reset/confirm",
            Some(json!({ "token": issued.token, "new_password": "yet-another-pass" })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn profile_update_merges_fields() {
    let app = TestApp::new().await;
    let (_, token) = app
        .register_user("studio@example.com", CustomerType::Piva)
        .await;

    // Business accounts must end up with complete billing data.
    let incomplete = app
        .request(
            Method::PATCH,
            "/api/v1/auth/me",
            Some(json!({ "company_name": "Acme S.r.l." })),
            Some(&token),
        )
        .await;
    assert_eq!(incomplete.status(), StatusCode::BAD_REQUEST);

    let response = app
        .request(
            Method::PATCH,
            "/api/v1/auth/me",
            Some(json!({
                "first_name": "  Grace ",
                "phone": "+39 333 0000000",
                "company_name": "Acme S.r.l.",
                "vat_number": "IT12345678901"
            })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["first_name"], "Grace");
    assert_eq!(body["phone"], "+39 333 0000000");
    assert_eq!(body["company_name"], "Acme S.r.l.");
    assert_eq!(body["vat_number"], "IT12345678901");

    // An empty string clears the phone; untouched fields survive.
    let response = app
        .request(
            Method::PATCH,
            "/api/v1/auth/me",
            Some(json!({ "phone": "" })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert!(body["phone"].is_null());
    assert_eq!(body["first_name"], "Grace");

    // Private accounts have no billing fields to edit.
    let (_, private_token) = app
        .register_user("shopper@example.com", CustomerType::Private)
        .await;
    let rejected = app
        .request(
            Method::PATCH,
            "/api/v1/auth/me",
            Some(json!({ "vat_number": "IT12345678901" })),
            Some(&private_token),
        )
        .await;
    assert_eq!(rejected.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn password_change_verifies_the_current_one() {
    let app = TestApp::new().await;
    let (_, token) = app
        .register_user("ada@example.com", CustomerType::Private)
        .await;

    let wrong = app
        .request(
            Method::PATCH,
            "/api/v1/auth/password",
            Some(json!({
                "current_password": "not-my-password",
                "new_password": "brand-new-secret"
            })),
            Some(&token),
        )
        .await;
    assert_eq!(wrong.status(), StatusCode::BAD_REQUEST);

    let response = app
        .request(
            Method::PATCH,
            "/api/v1/auth/password",
            Some(json!({
                "current_password": "correct-horse-battery",
                "new_password": "brand-new-secret"
            })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    // Only the new password logs in.
    let response = app
        .request(
            Method::POST,
            "/api/v1/auth/login",
            Some(json!({ "email": "ada@example.com", "password": "correct-horse-battery" })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let response = app
        .request(
            Method::POST,
            "/api/v1/auth/login",
            Some(json!({ "email": "ada@example.com", "password": "brand-new-secret" })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn liveness_endpoints_live_under_the_api_prefix() {
    let app = TestApp::new().await;

    let response = app.request(Method::GET, "/api/v1/status", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["service"], "storefront-api");

    let response = app.request(Method::GET, "/api/v1/health", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
}
