use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use tracing::{info, warn};

use crate::errors::ServiceError;
use crate::payments::stripe::{verify_stripe_signature, StripeEvent};
use crate::AppState;

pub fn webhooks_routes() -> Router<AppState> {
    Router::new().route("/stripe", post(stripe_webhook))
}

/// Payment provider event sink
///
/// The signature check is the trust boundary; the body is otherwise
/// attacker-controlled. Events are acknowledged immediately and
/// reconciled on a detached task so a slow database never makes the
/// provider retry storm.
#[utoipa::path(
    post,
    path = "/api/v1/webhooks/stripe",
    request_body(content = String, description = "Raw event payload, verified against the stripe-signature header"),
    responses(
        (status = 200, description = "Event accepted"),
        (status = 400, description = "Bad signature or payload", body = crate::errors::ErrorResponse)
    ),
    tag = "Webhooks"
)]
pub(crate) async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    let secret = &state.config.stripe.webhook_secret;
    if secret.is_empty() {
        return Err(ServiceError::InternalError(
            "Webhook secret is not configured".into(),
        ));
    }

    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ServiceError::ValidationError("Missing stripe-signature header".into()))?;

    if !verify_stripe_signature(
        signature,
        &body,
        secret,
        state.config.stripe.webhook_tolerance_secs,
    ) {
        warn!("rejected webhook with invalid signature");
        return Err(ServiceError::ValidationError("Invalid signature".into()));
    }

    let event: StripeEvent = serde_json::from_slice(&body)
        .map_err(|e| ServiceError::ValidationError(format!("Malformed event payload: {}", e)))?;

    info!(event_id = %event.id, event_type = %event.event_type, "webhook accepted");

    let payments = state.payments.clone();
    tokio::spawn(async move {
        payments.reconcile_event(event).await;
    });

    Ok((StatusCode::OK, Json(serde_json::json!({ "received": true }))))
}
