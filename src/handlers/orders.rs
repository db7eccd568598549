use axum::{
    extract::{Path, Query, State},
    routing::{get, patch, post},
    Json, Router,
};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::auth::{AdminUser, AuthUser};
use crate::entities::order::{self, OrderStatus};
use crate::errors::ServiceError;
use crate::handlers::common::{created_response, current_user, validate_input};
use crate::services::orders::{CreateOrderRequest, OrderListResponse, OrderWithItems};
use crate::services::order_status::ShipmentInput;
use crate::services::quote::{CartItem, Quote};
use crate::services::stats::{DashboardStats, StatsRange};
use crate::AppState;

pub fn orders_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_order))
        .route("/quote", post(quote_cart))
        .route("/me", get(list_my_orders))
        .route("/:id", get(get_my_order))
        .route("/admin", get(admin_list_orders))
        .route("/admin/stats", get(admin_stats))
        .route("/admin/stats/years", get(admin_order_years))
        .route("/admin/:id", get(admin_get_order))
        .route("/admin/:id/status", patch(admin_set_status))
        .route("/admin/:id/cancel", patch(admin_cancel_order))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct QuoteRequest {
    #[validate(length(min = 1))]
    pub items: Vec<CartItem>,
    pub coupon_code: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetStatusRequest {
    pub status: String,
    #[serde(flatten)]
    pub shipment: ShipmentInput,
}

// Not a flattened PaginationParams: serde_urlencoded cannot flatten
// numeric fields out of a query string.
#[derive(Debug, Deserialize, IntoParams)]
pub struct AdminOrdersParams {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
    pub q: Option<String>,
    /// Optional status filter.
    pub status: Option<String>,
}

fn default_page() -> u64 {
    1
}

fn default_limit() -> u64 {
    20
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct StatsParams {
    #[serde(default)]
    pub range: StatsRange,
    /// Explicit calendar year, only honored with `range=year`.
    pub year: Option<i32>,
}

/// Price a cart without creating anything
///
/// Returns the authoritative totals the order endpoint will also use.
#[utoipa::path(
    post,
    path = "/api/v1/orders/quote",
    request_body = QuoteRequest,
    responses(
        (status = 200, description = "Quote", body = Quote),
        (status = 400, description = "Bad quantity or unusable coupon", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown product", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub(crate) async fn quote_cart(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<QuoteRequest>,
) -> Result<Json<Quote>, ServiceError> {
    validate_input(&payload)?;
    let user = current_user(&state, &auth).await?;
    let quote = state
        .orders
        .quotes()
        .compute_quote(&user, &payload.items, payload.coupon_code.as_deref())
        .await?;
    Ok(Json(quote))
}

/// Create an order from a cart
#[utoipa::path(
    post,
    path = "/api/v1/orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order created", body = crate::services::orders::CreatedOrder),
        (status = 400, description = "Invalid cart or address", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient stock", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub(crate) async fn create_order(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<axum::response::Response, ServiceError> {
    let user = current_user(&state, &auth).await?;
    let created = state.orders.create_order(&user, payload).await?;
    Ok(created_response(created))
}

/// List the caller's orders, newest first
#[utoipa::path(
    get,
    path = "/api/v1/orders/me",
    responses((status = 200, description = "Orders", body = [OrderWithItems])),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub(crate) async fn list_my_orders(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<OrderWithItems>>, ServiceError> {
    Ok(Json(state.orders.list_for_user(auth.user_id).await?))
}

/// Fetch one of the caller's orders
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order", body = OrderWithItems),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub(crate) async fn get_my_order(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderWithItems>, ServiceError> {
    Ok(Json(state.orders.get_owned(auth.user_id, id).await?))
}

/// List all orders with optional status and free-text filters
#[utoipa::path(
    get,
    path = "/api/v1/orders/admin",
    params(AdminOrdersParams),
    responses((status = 200, description = "Order page", body = OrderListResponse)),
    security(("Bearer" = [])),
    tag = "Admin"
)]
pub(crate) async fn admin_list_orders(
    _admin: AdminUser,
    State(state): State<AppState>,
    Query(params): Query<AdminOrdersParams>,
) -> Result<Json<OrderListResponse>, ServiceError> {
    let status = match params.status.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(OrderStatus::parse(raw).ok_or_else(|| {
            ServiceError::InvalidStatus(format!("Unknown order status \"{}\"", raw))
        })?),
    };
    Ok(Json(
        state
            .orders
            .admin_list(params.page, params.limit, status, params.q.as_deref())
            .await?,
    ))
}

/// Fetch any order by internal id or public code
#[utoipa::path(
    get,
    path = "/api/v1/orders/admin/{id}",
    params(("id" = String, Path, description = "Order id or public code like #2026104")),
    responses(
        (status = 200, description = "Order", body = OrderWithItems),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Admin"
)]
pub(crate) async fn admin_get_order(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<OrderWithItems>, ServiceError> {
    Ok(Json(state.orders.admin_get(&id).await?))
}

/// Move an order through its lifecycle
///
/// Shipping requires a tracking code and url, merged over whatever the
/// order already carries.
#[utoipa::path(
    patch,
    path = "/api/v1/orders/admin/{id}/status",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = SetStatusRequest,
    responses(
        (status = 200, description = "Order updated", body = order::Model),
        (status = 400, description = "Unknown status or missing tracking", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Admin"
)]
pub(crate) async fn admin_set_status(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SetStatusRequest>,
) -> Result<Json<order::Model>, ServiceError> {
    let status = OrderStatus::parse(&payload.status).ok_or_else(|| {
        ServiceError::InvalidStatus(format!("Unknown order status \"{}\"", payload.status))
    })?;
    let updated = state
        .order_status
        .set_status(id, status, Some(payload.shipment))
        .await?;
    Ok(Json(updated))
}

/// Cancel an order, restocking reserved lines when applicable
#[utoipa::path(
    patch,
    path = "/api/v1/orders/admin/{id}/cancel",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order cancelled (or already settled)", body = order::Model),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Admin"
)]
pub(crate) async fn admin_cancel_order(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<order::Model>, ServiceError> {
    Ok(Json(state.order_status.cancel_and_restock(id).await?))
}

/// Dashboard aggregates for a time window
#[utoipa::path(
    get,
    path = "/api/v1/orders/admin/stats",
    params(StatsParams),
    responses((status = 200, description = "Dashboard stats", body = DashboardStats)),
    security(("Bearer" = [])),
    tag = "Admin"
)]
pub(crate) async fn admin_stats(
    _admin: AdminUser,
    State(state): State<AppState>,
    Query(params): Query<StatsParams>,
) -> Result<Json<DashboardStats>, ServiceError> {
    Ok(Json(state.stats.dashboard(params.range, params.year).await?))
}

/// Selectable years for the dashboard year picker
#[utoipa::path(
    get,
    path = "/api/v1/orders/admin/stats/years",
    responses((status = 200, description = "Years", body = [i32])),
    security(("Bearer" = [])),
    tag = "Admin"
)]
pub(crate) async fn admin_order_years(
    _admin: AdminUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<i32>>, ServiceError> {
    Ok(Json(state.stats.order_years().await?))
}
