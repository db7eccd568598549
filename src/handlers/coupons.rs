use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use uuid::Uuid;

use crate::auth::AdminUser;
use crate::errors::ServiceError;
use crate::handlers::common::{created_response, no_content_response, PaginationParams};
use crate::services::coupons::{
    CouponListResponse, CouponWithRules, CreateCouponRequest, UpdateCouponRequest,
};
use crate::AppState;

/// Back office coupon management. Shoppers never hit these routes;
/// codes are redeemed through the quote endpoint.
pub fn coupons_routes() -> Router<AppState> {
    Router::new()
        .route("/admin", get(list_coupons).post(create_coupon))
        .route(
            "/admin/:id",
            get(get_coupon).patch(update_coupon).delete(delete_coupon),
        )
}

/// List coupons
#[utoipa::path(
    get,
    path = "/api/v1/coupons/admin",
    params(PaginationParams),
    responses((status = 200, description = "Coupon page", body = CouponListResponse)),
    security(("Bearer" = [])),
    tag = "Admin"
)]
pub(crate) async fn list_coupons(
    _admin: AdminUser,
    State(state): State<AppState>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<CouponListResponse>, ServiceError> {
    Ok(Json(
        state
            .coupons
            .list(params.page, params.limit, params.q.as_deref())
            .await?,
    ))
}

/// Fetch one coupon with its rules
#[utoipa::path(
    get,
    path = "/api/v1/coupons/admin/{id}",
    params(("id" = Uuid, Path, description = "Coupon id")),
    responses(
        (status = 200, description = "Coupon", body = CouponWithRules),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Admin"
)]
pub(crate) async fn get_coupon(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CouponWithRules>, ServiceError> {
    Ok(Json(state.coupons.get(id).await?))
}

/// Create a coupon with its rules
#[utoipa::path(
    post,
    path = "/api/v1/coupons/admin",
    request_body = CreateCouponRequest,
    responses(
        (status = 201, description = "Coupon created", body = CouponWithRules),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Admin"
)]
pub(crate) async fn create_coupon(
    _admin: AdminUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateCouponRequest>,
) -> Result<axum::response::Response, ServiceError> {
    let created = state.coupons.create(payload).await?;
    Ok(created_response(created))
}

/// Update a coupon, replacing its rules when provided
#[utoipa::path(
    patch,
    path = "/api/v1/coupons/admin/{id}",
    params(("id" = Uuid, Path, description = "Coupon id")),
    request_body = UpdateCouponRequest,
    responses(
        (status = 200, description = "Coupon updated", body = CouponWithRules),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Admin"
)]
pub(crate) async fn update_coupon(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateCouponRequest>,
) -> Result<Json<CouponWithRules>, ServiceError> {
    Ok(Json(state.coupons.update(id, payload).await?))
}

/// Delete a coupon and its rules
#[utoipa::path(
    delete,
    path = "/api/v1/coupons/admin/{id}",
    params(("id" = Uuid, Path, description = "Coupon id")),
    responses(
        (status = 204, description = "Coupon deleted"),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Admin"
)]
pub(crate) async fn delete_coupon(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<axum::response::Response, ServiceError> {
    state.coupons.delete(id).await?;
    Ok(no_content_response())
}
