use axum::{
    extract::State,
    routing::{get, patch, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::auth::{AuthUser, RegisterRequest, UpdateProfileRequest};
use crate::entities::user;
use crate::errors::ServiceError;
use crate::handlers::common::{current_user, success_response, validate_input};
use crate::notifications::{EmailKind, EmailMessage};
use crate::AppState;

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/me", get(me).patch(update_me))
        .route("/password", patch(change_password))
        .route("/password-reset/request", post(request_password_reset))
        .route("/password-reset/confirm", post(confirm_password_reset))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "Current password is required"))]
    pub current_password: String,
    #[validate(length(min = 8))]
    pub new_password: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct PasswordResetRequest {
    #[validate(email)]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct PasswordResetConfirm {
    #[validate(length(min = 1))]
    pub token: String,
    #[validate(length(min = 8))]
    pub new_password: String,
}

/// Account representation safe to return to clients.
#[derive(Debug, Serialize, ToSchema)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub customer_type: user::CustomerType,
    pub role: user::UserRole,
    pub phone: Option<String>,
    pub company_name: Option<String>,
    pub vat_number: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<user::Model> for UserProfile {
    fn from(u: user::Model) -> Self {
        Self {
            id: u.id,
            email: u.email,
            first_name: u.first_name,
            last_name: u.last_name,
            customer_type: u.customer_type,
            role: u.role,
            phone: u.phone,
            company_name: u.company_name,
            vat_number: u.vat_number,
            created_at: u.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserProfile,
}

/// Create a new account
#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "Account created", body = AuthResponse),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 409, description = "Email already registered", body = crate::errors::ErrorResponse)
    ),
    tag = "Auth"
)]
pub(crate) async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<AuthResponse>, ServiceError> {
    let (user, token) = state.auth.register(payload).await?;
    Ok(Json(AuthResponse {
        token,
        user: user.into(),
    }))
}

/// Exchange credentials for a bearer token
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Authenticated", body = AuthResponse),
        (status = 401, description = "Invalid credentials", body = crate::errors::ErrorResponse)
    ),
    tag = "Auth"
)]
pub(crate) async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ServiceError> {
    validate_input(&payload)?;
    let (user, token) = state.auth.login(&payload.email, &payload.password).await?;
    Ok(Json(AuthResponse {
        token,
        user: user.into(),
    }))
}

/// Current account profile
#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    responses(
        (status = 200, description = "Profile", body = UserProfile),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Auth"
)]
pub(crate) async fn me(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<UserProfile>, ServiceError> {
    let user = current_user(&state, &auth).await?;
    Ok(Json(UserProfile::from(user)))
}

/// Update the caller's profile and billing details
#[utoipa::path(
    patch,
    path = "/api/v1/auth/me",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated", body = UserProfile),
        (status = 400, description = "Invalid fields", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Auth"
)]
pub(crate) async fn update_me(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<UserProfile>, ServiceError> {
    let updated = state.auth.update_profile(auth.user_id, payload).await?;
    Ok(Json(UserProfile::from(updated)))
}

/// Change the caller's password
#[utoipa::path(
    patch,
    path = "/api/v1/auth/password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed"),
        (status = 400, description = "Wrong current password or weak new one", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Auth"
)]
pub(crate) async fn change_password(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<axum::response::Response, ServiceError> {
    validate_input(&payload)?;
    state
        .auth
        .change_password(auth.user_id, &payload.current_password, &payload.new_password)
        .await?;
    Ok(success_response(serde_json::json!({ "ok": true })))
}

/// Request a password reset email
///
/// Always answers 200 so the endpoint cannot be used to probe which
/// addresses have an account.
#[utoipa::path(
    post,
    path = "/api/v1/auth/password-reset/request",
    request_body = PasswordResetRequest,
    responses((status = 200, description = "Acknowledged")),
    tag = "Auth"
)]
pub(crate) async fn request_password_reset(
    State(state): State<AppState>,
    Json(payload): Json<PasswordResetRequest>,
) -> Result<axum::response::Response, ServiceError> {
    validate_input(&payload)?;

    if let Some(issued) = state.auth.request_password_reset(&payload.email).await? {
        let message = EmailMessage {
            kind: EmailKind::PasswordReset,
            to: issued.email.clone(),
            subject: "Reset your password".to_string(),
            body: format!(
                "Hi {},\n\nuse this code to reset your password within 10 minutes:\n\n{}\n",
                issued.first_name, issued.token
            ),
        };
        if let Err(err) = state.notifier.send(message).await {
            // The token row is already stored; the user can retry.
            warn!(email = %issued.email, "password reset email failed: {}", err);
        }
    }

    Ok(success_response(serde_json::json!({ "ok": true })))
}

/// Complete a password reset
#[utoipa::path(
    post,
    path = "/api/v1/auth/password-reset/confirm",
    request_body = PasswordResetConfirm,
    responses(
        (status = 200, description = "Password changed"),
        (status = 400, description = "Invalid or expired token", body = crate::errors::ErrorResponse)
    ),
    tag = "Auth"
)]
pub(crate) async fn confirm_password_reset(
    State(state): State<AppState>,
    Json(payload): Json<PasswordResetConfirm>,
) -> Result<axum::response::Response, ServiceError> {
    validate_input(&payload)?;
    state
        .auth
        .reset_password(&payload.token, &payload.new_password)
        .await?;
    Ok(success_response(serde_json::json!({ "ok": true })))
}
