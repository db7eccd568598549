use axum::{extract::State, routing::post, Json, Router};

use crate::auth::AuthUser;
use crate::errors::ServiceError;
use crate::payments::{
    BankInstructionsRequest, BankInstructionsResponse, CheckoutSessionRequest,
    CheckoutSessionResponse,
};
use crate::AppState;

pub fn payments_routes() -> Router<AppState> {
    Router::new()
        .route("/stripe/checkout-session", post(create_checkout_session))
        .route("/bank-transfer/send-instructions", post(send_bank_instructions))
}

/// Start a hosted card payment
///
/// Returns the URL the client must redirect the shopper to.
#[utoipa::path(
    post,
    path = "/api/v1/payments/stripe/checkout-session",
    request_body = CheckoutSessionRequest,
    responses(
        (status = 200, description = "Session created", body = CheckoutSessionResponse),
        (status = 400, description = "Order not payable", body = crate::errors::ErrorResponse),
        (status = 403, description = "Not the order owner", body = crate::errors::ErrorResponse),
        (status = 502, description = "Payment provider unavailable", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Payments"
)]
pub(crate) async fn create_checkout_session(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CheckoutSessionRequest>,
) -> Result<Json<CheckoutSessionResponse>, ServiceError> {
    Ok(Json(
        state
            .payments
            .create_checkout_session(&auth, payload.order_id)
            .await?,
    ))
}

/// Email bank transfer instructions for an order
#[utoipa::path(
    post,
    path = "/api/v1/payments/bank-transfer/send-instructions",
    request_body = BankInstructionsRequest,
    responses(
        (status = 200, description = "Instructions sent, or already handled", body = BankInstructionsResponse),
        (status = 400, description = "Order not payable", body = crate::errors::ErrorResponse),
        (status = 403, description = "Not the order owner", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Payments"
)]
pub(crate) async fn send_bank_instructions(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<BankInstructionsRequest>,
) -> Result<Json<BankInstructionsResponse>, ServiceError> {
    Ok(Json(
        state
            .payments
            .send_bank_instructions(&auth, payload.order_id, payload.force)
            .await?,
    ))
}
