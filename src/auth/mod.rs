//! JWT authentication, password hashing and request extractors.

use argon2::{
    password_hash::{rand_core::OsRng as HashOsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::entities::user::{self, CustomerType, UserRole};
use crate::errors::ServiceError;
use crate::normalize::normalize_email;
use crate::AppState;

const MIN_PASSWORD_LEN: usize = 8;
const RESET_TOKEN_TTL_MINUTES: i64 = 10;

/// Claim structure for JWT tokens
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id)
    pub sub: String,
    pub email: String,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
}

/// Authenticated principal extracted from a bearer token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: String,
    pub role: UserRole,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

/// Extractor that additionally requires the admin role.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthUser);

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub customer_type: CustomerType,
}

/// Partial profile update. Absent fields are left untouched; `phone`
/// accepts an empty string to clear the stored number.
#[derive(Debug, Default, Deserialize, utoipa::ToSchema)]
pub struct UpdateProfileRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub company_name: Option<String>,
    pub vat_number: Option<String>,
}

/// Outcome of a reset request for a known account. The raw token is only
/// ever handed to the notifier, never persisted.
#[derive(Debug)]
pub struct ResetIssued {
    pub email: String,
    pub first_name: String,
    pub token: String,
}

pub struct AuthService {
    db: Arc<DatabaseConnection>,
    jwt_secret: String,
    jwt_expiration_secs: usize,
}

impl AuthService {
    pub fn new(db: Arc<DatabaseConnection>, jwt_secret: String, jwt_expiration_secs: usize) -> Self {
        Self {
            db,
            jwt_secret,
            jwt_expiration_secs,
        }
    }

    #[instrument(skip(self, req), fields(email))]
    pub async fn register(&self, req: RegisterRequest) -> Result<(user::Model, String), ServiceError> {
        let email = normalize_email(&req.email);
        if email.is_empty() || !email.contains('@') {
            return Err(ServiceError::ValidationError("A valid email is required".into()));
        }
        if req.password.len() < MIN_PASSWORD_LEN {
            return Err(ServiceError::ValidationError(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }
        let first_name = req.first_name.trim();
        let last_name = req.last_name.trim();
        if first_name.is_empty() || last_name.is_empty() {
            return Err(ServiceError::ValidationError(
                "First and last name are required".into(),
            ));
        }

        let existing = user::Entity::find()
            .filter(user::Column::Email.eq(&email))
            .one(self.db.as_ref())
            .await?;
        if existing.is_some() {
            return Err(ServiceError::Conflict("Email already registered".into()));
        }

        let model = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            email: Set(email),
            password_hash: Set(hash_password(&req.password)?),
            first_name: Set(first_name.to_string()),
            last_name: Set(last_name.to_string()),
            customer_type: Set(req.customer_type),
            role: Set(UserRole::User),
            phone: Set(None),
            company_name: Set(None),
            vat_number: Set(None),
            reset_token_hash: Set(None),
            reset_expires_at: Set(None),
            reset_used_at: Set(None),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(self.db.as_ref())
        .await?;

        let token = self.issue_token(&model)?;
        Ok((model, token))
    }

    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<(user::Model, String), ServiceError> {
        let email = normalize_email(email);
        let Some(found) = user::Entity::find()
            .filter(user::Column::Email.eq(&email))
            .one(self.db.as_ref())
            .await?
        else {
            return Err(ServiceError::AuthError("Invalid credentials".into()));
        };

        if !verify_password(password, &found.password_hash)? {
            return Err(ServiceError::AuthError("Invalid credentials".into()));
        }

        let token = self.issue_token(&found)?;
        Ok((found, token))
    }

    pub fn issue_token(&self, user: &user::Model) -> Result<String, ServiceError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            role: match user.role {
                UserRole::Admin => "admin".to_string(),
                UserRole::User => "user".to_string(),
            },
            iat: now.timestamp(),
            exp: (now + Duration::seconds(self.jwt_expiration_secs as i64)).timestamp(),
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(|e| ServiceError::JwtError(e.to_string()))
    }

    pub fn validate_token(&self, token: &str) -> Result<Claims, ServiceError> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )
        .map(|data| data.claims)
        .map_err(|e| ServiceError::JwtError(e.to_string()))
    }

    /// Issues a single-use reset token. Returns `None` for unknown emails
    /// so enumeration is not possible from the response.
    #[instrument(skip(self))]
    pub async fn request_password_reset(&self, email: &str) -> Result<Option<ResetIssued>, ServiceError> {
        let email = normalize_email(email);
        if email.is_empty() {
            return Err(ServiceError::ValidationError("Email is required".into()));
        }

        let Some(found) = user::Entity::find()
            .filter(user::Column::Email.eq(&email))
            .one(self.db.as_ref())
            .await?
        else {
            return Ok(None);
        };

        let token = make_reset_token();
        let mut active: user::ActiveModel = found.clone().into();
        active.reset_token_hash = Set(Some(hash_reset_token(&token)));
        active.reset_expires_at = Set(Some(Utc::now() + Duration::minutes(RESET_TOKEN_TTL_MINUTES)));
        active.reset_used_at = Set(None);
        active.updated_at = Set(Some(Utc::now()));
        active.update(self.db.as_ref()).await?;

        Ok(Some(ResetIssued {
            email: found.email,
            first_name: found.first_name,
            token,
        }))
    }

    /// Applies a partial profile update. Billing fields are only writable
    /// (and then mandatory) for `piva` accounts.
    #[instrument(skip(self, req))]
    pub async fn update_profile(
        &self,
        user_id: Uuid,
        req: UpdateProfileRequest,
    ) -> Result<user::Model, ServiceError> {
        let found = user::Entity::find_by_id(user_id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::AuthError("Account no longer exists".into()))?;

        let customer_type = found.customer_type;
        let mut company_name = found.company_name.clone();
        let mut vat_number = found.vat_number.clone();
        let mut active: user::ActiveModel = found.into();

        if let Some(first_name) = req.first_name {
            let v = first_name.trim().to_string();
            if v.is_empty() {
                return Err(ServiceError::ValidationError("First name is required".into()));
            }
            active.first_name = Set(v);
        }
        if let Some(last_name) = req.last_name {
            let v = last_name.trim().to_string();
            if v.is_empty() {
                return Err(ServiceError::ValidationError("Last name is required".into()));
            }
            active.last_name = Set(v);
        }
        if let Some(phone) = req.phone {
            let v = phone.trim().to_string();
            active.phone = Set((!v.is_empty()).then_some(v));
        }

        if customer_type == CustomerType::Piva {
            if let Some(name) = req.company_name {
                let v = name.trim().to_string();
                if v.is_empty() {
                    return Err(ServiceError::ValidationError("Company name is required".into()));
                }
                company_name = Some(v.clone());
                active.company_name = Set(Some(v));
            }
            if let Some(vat) = req.vat_number {
                let v = vat.trim().to_string();
                if v.is_empty() {
                    return Err(ServiceError::ValidationError("VAT number is required".into()));
                }
                vat_number = Some(v.clone());
                active.vat_number = Set(Some(v));
            }
            if company_name.is_none() || vat_number.is_none() {
                return Err(ServiceError::ValidationError(
                    "Company name and VAT number are required for business accounts".into(),
                ));
            }
        } else if req.company_name.is_some() || req.vat_number.is_some() {
            return Err(ServiceError::ValidationError(
                "Billing fields are only available on business accounts".into(),
            ));
        }

        active.updated_at = Set(Some(Utc::now()));
        Ok(active.update(self.db.as_ref()).await?)
    }

    /// Rotates the password after verifying the current one.
    #[instrument(skip(self, current_password, new_password))]
    pub async fn change_password(
        &self,
        user_id: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), ServiceError> {
        if new_password.len() < MIN_PASSWORD_LEN {
            return Err(ServiceError::ValidationError(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }

        let found = user::Entity::find_by_id(user_id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::AuthError("Account no longer exists".into()))?;

        if !verify_password(current_password, &found.password_hash)? {
            return Err(ServiceError::ValidationError(
                "Current password is incorrect".into(),
            ));
        }

        let mut active: user::ActiveModel = found.into();
        active.password_hash = Set(hash_password(new_password)?);
        active.updated_at = Set(Some(Utc::now()));
        active.update(self.db.as_ref()).await?;
        Ok(())
    }

    #[instrument(skip(self, token, new_password))]
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), ServiceError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(ServiceError::ValidationError("Reset token is required".into()));
        }
        if new_password.len() < MIN_PASSWORD_LEN {
            return Err(ServiceError::ValidationError(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }

        let token_hash = hash_reset_token(token);
        let found = user::Entity::find()
            .filter(user::Column::ResetTokenHash.eq(&token_hash))
            .filter(user::Column::ResetExpiresAt.gt(Utc::now()))
            .one(self.db.as_ref())
            .await?;

        let Some(found) = found else {
            return Err(ServiceError::InvalidInput("Invalid or expired reset token".into()));
        };
        if found.reset_used_at.is_some() {
            return Err(ServiceError::InvalidInput("Invalid or expired reset token".into()));
        }

        let mut active: user::ActiveModel = found.into();
        active.password_hash = Set(hash_password(new_password)?);
        active.reset_token_hash = Set(None);
        active.reset_expires_at = Set(None);
        active.reset_used_at = Set(Some(Utc::now()));
        active.updated_at = Set(Some(Utc::now()));
        active.update(self.db.as_ref()).await?;
        Ok(())
    }
}

pub fn hash_password(password: &str) -> Result<String, ServiceError> {
    let salt = SaltString::generate(&mut HashOsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| ServiceError::HashError(e.to_string()))
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, ServiceError> {
    let parsed = PasswordHash::new(hash).map_err(|e| ServiceError::HashError(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

fn make_reset_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn hash_reset_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);
        let token = bearer_token(parts)
            .ok_or_else(|| ServiceError::Unauthorized("Missing bearer token".into()))?;
        let claims = app_state.auth.validate_token(token)?;

        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| ServiceError::Unauthorized("Malformed token subject".into()))?;
        let role = match claims.role.as_str() {
            "admin" => UserRole::Admin,
            _ => UserRole::User,
        };

        Ok(AuthUser {
            user_id,
            email: claims.email,
            role,
        })
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            return Err(ServiceError::Forbidden("Admin role required".into()));
        }
        Ok(AdminUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_round_trip_verifies() {
        let hash = hash_password("correct horse battery").unwrap();
        assert!(verify_password("correct horse battery", &hash).unwrap());
        assert!(!verify_password("wrong", &hash).unwrap());
    }

    #[test]
    fn reset_token_hashes_deterministically() {
        let token = make_reset_token();
        assert_eq!(token.len(), 64);
        assert_eq!(hash_reset_token(&token), hash_reset_token(&token));
        assert_ne!(hash_reset_token(&token), token);
    }
}
