use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};

use crate::auth::AdminUser;
use crate::entities::product;
use crate::errors::ServiceError;
use crate::handlers::common::{created_response, no_content_response, PaginationParams};
use crate::services::products::{CreateProductRequest, ProductListResponse, UpdateProductRequest};
use crate::AppState;

/// Catalog routes. The bare paths are the public storefront; admin CRUD
/// shares the prefix, guarded per handler by the role extractor.
pub fn products_routes() -> Router<AppState> {
    Router::new()
        .route("/admin", get(admin_list_products))
        .route("/admin/:id_or_slug", get(admin_get_product))
        .route("/", get(list_products).post(create_product))
        .route(
            "/:id_or_slug",
            get(get_product).patch(update_product).delete(delete_product),
        )
}

/// List active products
#[utoipa::path(
    get,
    path = "/api/v1/products",
    responses((status = 200, description = "Active catalog", body = [product::Model])),
    tag = "Products"
)]
pub(crate) async fn list_products(
    State(state): State<AppState>,
) -> Result<Json<Vec<product::Model>>, ServiceError> {
    Ok(Json(state.products.list_active().await?))
}

/// Fetch one active product by id or slug
#[utoipa::path(
    get,
    path = "/api/v1/products/{id_or_slug}",
    params(("id_or_slug" = String, Path, description = "Product id or slug")),
    responses(
        (status = 200, description = "Product", body = product::Model),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Products"
)]
pub(crate) async fn get_product(
    State(state): State<AppState>,
    Path(id_or_slug): Path<String>,
) -> Result<Json<product::Model>, ServiceError> {
    Ok(Json(state.products.get_active(&id_or_slug).await?))
}

/// List all products, inactive included
#[utoipa::path(
    get,
    path = "/api/v1/products/admin",
    params(PaginationParams),
    responses((status = 200, description = "Catalog page", body = ProductListResponse)),
    security(("Bearer" = [])),
    tag = "Admin"
)]
pub(crate) async fn admin_list_products(
    _admin: AdminUser,
    State(state): State<AppState>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<ProductListResponse>, ServiceError> {
    Ok(Json(
        state
            .products
            .admin_list(params.page, params.limit, params.q.as_deref())
            .await?,
    ))
}

/// Fetch one product regardless of visibility
#[utoipa::path(
    get,
    path = "/api/v1/products/admin/{id_or_slug}",
    params(("id_or_slug" = String, Path, description = "Product id or slug")),
    responses(
        (status = 200, description = "Product", body = product::Model),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Admin"
)]
pub(crate) async fn admin_get_product(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id_or_slug): Path<String>,
) -> Result<Json<product::Model>, ServiceError> {
    Ok(Json(state.products.admin_get(&id_or_slug).await?))
}

/// Create a product
#[utoipa::path(
    post,
    path = "/api/v1/products",
    request_body = CreateProductRequest,
    responses(
        (status = 201, description = "Product created", body = product::Model),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Admin"
)]
pub(crate) async fn create_product(
    _admin: AdminUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateProductRequest>,
) -> Result<axum::response::Response, ServiceError> {
    let created = state.products.create(payload).await?;
    Ok(created_response(created))
}

/// Update a product (the slug is immutable)
#[utoipa::path(
    patch,
    path = "/api/v1/products/{id_or_slug}",
    params(("id_or_slug" = String, Path, description = "Product id or slug")),
    request_body = UpdateProductRequest,
    responses(
        (status = 200, description = "Product updated", body = product::Model),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Admin"
)]
pub(crate) async fn update_product(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id_or_slug): Path<String>,
    Json(payload): Json<UpdateProductRequest>,
) -> Result<Json<product::Model>, ServiceError> {
    Ok(Json(state.products.update(&id_or_slug, payload).await?))
}

/// Delete a product permanently
#[utoipa::path(
    delete,
    path = "/api/v1/products/{id_or_slug}",
    params(("id_or_slug" = String, Path, description = "Product id or slug")),
    responses(
        (status = 204, description = "Product deleted"),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Admin"
)]
pub(crate) async fn delete_product(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id_or_slug): Path<String>,
) -> Result<axum::response::Response, ServiceError> {
    state.products.delete(&id_or_slug).await?;
    Ok(no_content_response())
}
