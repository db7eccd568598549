use axum::{
    extract::{Path, State},
    routing::{get, patch, post},
    Json, Router,
};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::entities::address;
use crate::errors::ServiceError;
use crate::handlers::common::created_response;
use crate::services::addresses::CreateAddressRequest;
use crate::AppState;

pub fn addresses_routes() -> Router<AppState> {
    Router::new()
        .route("/me", get(list_addresses))
        .route("/", post(create_address))
        .route("/:id/default", patch(set_default_address))
}

/// List the caller's saved addresses
#[utoipa::path(
    get,
    path = "/api/v1/addresses/me",
    responses((status = 200, description = "Saved addresses", body = [address::Model])),
    security(("Bearer" = [])),
    tag = "Addresses"
)]
pub(crate) async fn list_addresses(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<address::Model>>, ServiceError> {
    Ok(Json(state.addresses.list_for_user(auth.user_id).await?))
}

/// Save a shipping address
#[utoipa::path(
    post,
    path = "/api/v1/addresses",
    request_body = CreateAddressRequest,
    responses(
        (status = 201, description = "Address saved", body = address::Model),
        (status = 400, description = "Incomplete address", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Addresses"
)]
pub(crate) async fn create_address(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateAddressRequest>,
) -> Result<axum::response::Response, ServiceError> {
    let created = state.addresses.create(auth.user_id, payload).await?;
    Ok(created_response(created))
}

/// Make one saved address the default
#[utoipa::path(
    patch,
    path = "/api/v1/addresses/{id}/default",
    params(("id" = Uuid, Path, description = "Address id")),
    responses(
        (status = 200, description = "Default updated", body = address::Model),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Addresses"
)]
pub(crate) async fn set_default_address(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<address::Model>, ServiceError> {
    Ok(Json(state.addresses.set_default(auth.user_id, id).await?))
}
