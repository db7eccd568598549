//! Storefront API library.
//!
//! Catalog, server-side quoting, order fulfillment with atomic stock
//! reservation, payment reconciliation and a small back office.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod handlers;
pub mod normalize;
pub mod notifications;
pub mod openapi;
pub mod payments;
pub mod services;

use axum::{extract::State, response::Json, routing::get, Router};
use sea_orm::DatabaseConnection;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::auth::AuthService;
use crate::config::AppConfig;
use crate::notifications::{HttpEmailNotifier, NoopNotifier, Notifier};
use crate::payments::stripe::StripeClient;
use crate::payments::PaymentService;
use crate::services::addresses::AddressService;
use crate::services::coupons::CouponService;
use crate::services::order_status::OrderStatusService;
use crate::services::orders::OrderService;
use crate::services::products::ProductService;
use crate::services::stats::StatsService;

/// Shared handler state. Cloning is cheap; every service is behind an
/// `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<AppConfig>,
    pub auth: Arc<AuthService>,
    pub notifier: Arc<dyn Notifier>,
    pub products: Arc<ProductService>,
    pub coupons: Arc<CouponService>,
    pub addresses: Arc<AddressService>,
    pub orders: Arc<OrderService>,
    pub order_status: Arc<OrderStatusService>,
    pub stats: Arc<StatsService>,
    pub payments: Arc<PaymentService>,
}

impl AppState {
    pub fn new(db: DatabaseConnection, config: AppConfig) -> Self {
        let db = Arc::new(db);
        let config = Arc::new(config);

        let notifier: Arc<dyn Notifier> = if config.notifier.email_endpoint.is_empty() {
            Arc::new(NoopNotifier)
        } else {
            Arc::new(HttpEmailNotifier::new(&config.notifier))
        };

        let auth = Arc::new(AuthService::new(
            db.clone(),
            config.jwt_secret.clone(),
            config.jwt_expiration,
        ));
        let stripe = Arc::new(StripeClient::new(config.stripe.secret_key.clone()));

        Self {
            auth,
            products: Arc::new(ProductService::new(db.clone())),
            coupons: Arc::new(CouponService::new(db.clone())),
            addresses: Arc::new(AddressService::new(db.clone())),
            orders: Arc::new(OrderService::new(db.clone(), config.clone())),
            order_status: Arc::new(OrderStatusService::new(db.clone(), notifier.clone())),
            stats: Arc::new(StatsService::new(
                db.clone(),
                config.stats_utc_offset_minutes,
            )),
            payments: Arc::new(PaymentService::new(
                db.clone(),
                config.clone(),
                stripe,
                notifier.clone(),
            )),
            notifier,
            db,
            config,
        }
    }
}

/// Full v1 API surface.
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route("/status", get(status))
        .route("/health", get(health_check))
        .nest("/auth", handlers::auth::auth_routes())
        .nest("/products", handlers::products::products_routes())
        .nest("/addresses", handlers::addresses::addresses_routes())
        .nest("/orders", handlers::orders::orders_routes())
        .nest("/payments", handlers::payments::payments_routes())
        .nest("/coupons", handlers::coupons::coupons_routes())
        .nest("/webhooks", handlers::webhooks::webhooks_routes())
}

/// Root router: the nested API plus Swagger UI.
pub fn app(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", api_v1_routes())
        .merge(openapi::swagger_ui())
        .with_state(state)
}

async fn status(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "service": "storefront-api",
        "version": env!("CARGO_PKG_VERSION"),
        "environment": state.config.environment,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let db_status = match state.db.ping().await {
        Ok(_) => "healthy",
        Err(_) => "unhealthy",
    };

    Json(json!({
        "status": db_status,
        "checks": { "database": db_status },
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
