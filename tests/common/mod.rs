use axum::{
    body::Body,
    http::{Method, Request},
    Router,
};
use sea_orm::{ActiveModelTrait, ActiveValue::Set};
use serde_json::Value;
use tower::ServiceExt;

use storefront_api::{
    auth::RegisterRequest,
    config::{
        AppConfig, BankTransferConfig, NotifierConfig, StorefrontConfig, StripeConfig,
    },
    db,
    entities::user::{self, CustomerType, UserRole},
    services::products::CreateProductRequest,
    AppState,
};

pub const TEST_WEBHOOK_SECRET: &str = "whsec_test_signing_secret";

pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".to_string(),
        jwt_secret: "test-jwt-secret-0123456789abcdef0123456789abcdef0123456789abcdef0123"
            .to_string(),
        jwt_expiration: 3600,
        host: "127.0.0.1".to_string(),
        port: 0,
        environment: "test".to_string(),
        log_level: "debug".to_string(),
        log_json: false,
        auto_migrate: true,
        public_base_url: "http://localhost:3000".to_string(),
        stats_utc_offset_minutes: 60,
        storefront: StorefrontConfig::default(),
        stripe: StripeConfig {
            secret_key: String::new(),
            webhook_secret: TEST_WEBHOOK_SECRET.to_string(),
            webhook_tolerance_secs: 300,
        },
        bank_transfer: BankTransferConfig {
            iban: "IT60X0542811101000000123456".to_string(),
            ..BankTransferConfig::default()
        },
        notifier: NotifierConfig::default(),
    }
}

/// Application harness backed by an in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
}

impl TestApp {
    pub async fn new() -> Self {
        let cfg = test_config();
        let pool = db::establish_connection(&cfg.database_url)
            .await
            .expect("failed to open test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let state = AppState::new(pool, cfg);
        let router = storefront_api::app(state.clone());
        Self { router, state }
    }

    /// Registers an account and returns its row plus a bearer token.
    pub async fn register_user(
        &self,
        email: &str,
        customer_type: CustomerType,
    ) -> (user::Model, String) {
        self.state
            .auth
            .register(RegisterRequest {
                email: email.to_string(),
                password: "correct-horse-battery".to_string(),
                first_name: "Test".to_string(),
                last_name: "Shopper".to_string(),
                customer_type,
            })
            .await
            .expect("register test user")
    }

    /// Registers an account and promotes it to admin.
    pub async fn register_admin(&self, email: &str) -> (user::Model, String) {
        let (created, _) = self.register_user(email, CustomerType::Private).await;
        let mut active: user::ActiveModel = created.into();
        active.role = Set(UserRole::Admin);
        let admin = active
            .update(self.state.db.as_ref())
            .await
            .expect("promote test admin");
        let token = self.state.auth.issue_token(&admin).expect("admin token");
        (admin, token)
    }

    pub async fn seed_product(&self, slug: &str, price_cents: i64, stock_qty: i32) {
        self.state
            .products
            .create(CreateProductRequest {
                slug: slug.to_string(),
                name: slug.to_string(),
                description: None,
                price_cents,
                compare_at_price_cents: None,
                stock_qty,
                is_active: true,
                sort_order: 0,
            })
            .await
            .expect("seed product");
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("serialize request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    pub async fn request_raw(
        &self,
        method: Method,
        uri: &str,
        body: Vec<u8>,
        headers: &[(&str, &str)],
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = builder.body(Body::from(body)).expect("build raw request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }
}

pub async fn response_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    serde_json::from_slice(&bytes).expect("response body is json")
}
