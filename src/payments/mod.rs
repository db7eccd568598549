//! Payment flows: hosted checkout sessions, webhook reconciliation and
//! manual bank transfers. The webhook handler acknowledges the provider
//! immediately and runs everything here on a detached task.

pub mod stripe;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, DatabaseConnection, EntityTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::config::AppConfig;
use crate::entities::{order, user};
use crate::errors::ServiceError;
use crate::normalize::ShippingAddress;
use crate::notifications::{EmailKind, EmailMessage, Notifier};
use crate::services::order_status::OrderStatusService;
use stripe::{StripeClient, StripeEvent};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckoutSessionRequest {
    pub order_id: Uuid,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckoutSessionResponse {
    pub url: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct BankInstructionsRequest {
    pub order_id: Uuid,
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BankInstructionsResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub sent: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub resent: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub already_paid: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub already_sent: bool,
    pub public_id: String,
}

pub struct PaymentService {
    db: Arc<DatabaseConnection>,
    config: Arc<AppConfig>,
    stripe: Arc<StripeClient>,
    notifier: Arc<dyn Notifier>,
    status: OrderStatusService,
}

impl PaymentService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: Arc<AppConfig>,
        stripe: Arc<StripeClient>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let status = OrderStatusService::new(db.clone(), notifier.clone());
        Self {
            db,
            config,
            stripe,
            notifier,
            status,
        }
    }

    /// Creates a hosted checkout session for a payable order owned by the
    /// caller (or any order, for admins).
    #[instrument(skip(self, auth), fields(user_id = %auth.user_id))]
    pub async fn create_checkout_session(
        &self,
        auth: &AuthUser,
        order_id: Uuid,
    ) -> Result<CheckoutSessionResponse, ServiceError> {
        if !self.stripe.is_configured() {
            return Err(ServiceError::InternalError(
                "Stripe secret key is not configured".into(),
            ));
        }

        let found = self.get_order(order_id).await?;
        ensure_ownership(auth, &found)?;

        if !found.status.is_payable() {
            return Err(ServiceError::InvalidOperation(format!(
                "Order in status \"{}\" is not payable",
                found.status
            )));
        }
        if found.total_cents <= 0 {
            return Err(ServiceError::InvalidOperation(
                "Order total is not payable".into(),
            ));
        }

        let session = self
            .stripe
            .create_checkout_session(
                &found.id.to_string(),
                &found.public_id,
                found.total_cents,
                Some(auth.email.as_str()),
                &self.config.public_base_url,
            )
            .await?;

        let url = session.url.clone().ok_or_else(|| {
            ServiceError::ExternalServiceError("checkout session has no redirect URL".into())
        })?;

        let mut active: order::ActiveModel = found.into();
        active.stripe_checkout_session_id = Set(Some(session.id));
        active.updated_at = Set(Some(Utc::now()));
        active.update(self.db.as_ref()).await?;

        Ok(CheckoutSessionResponse { url })
    }

    /// Reconciliation entry point. Runs after the webhook has already been
    /// acknowledged, so failures are logged and retried by the provider's
    /// event redelivery, never surfaced to it mid-request.
    #[instrument(skip(self, event), fields(event_id = %event.id, event_type = %event.event_type))]
    pub async fn reconcile_event(&self, event: StripeEvent) {
        let result = match event.event_type.as_str() {
            "checkout.session.completed" | "checkout.session.async_payment_succeeded" => {
                self.reconcile_paid(&event).await
            }
            "checkout.session.expired" | "checkout.session.async_payment_failed" => {
                self.reconcile_cancelled(&event).await
            }
            other => {
                debug!(event_type = other, "ignoring unhandled event type");
                Ok(())
            }
        };
        if let Err(err) = result {
            error!(event_id = %event.id, "webhook reconciliation failed: {}", err);
        }
    }

    async fn reconcile_paid(&self, event: &StripeEvent) -> Result<(), ServiceError> {
        let object = &event.data.object;

        // A completed session may still be awaiting an async payment.
        if event.event_type == "checkout.session.completed" {
            let payment_status = object.payment_status.as_deref().unwrap_or("");
            if payment_status != "paid" && payment_status != "no_payment_required" {
                info!(session = ?object.id, payment_status, "session completed but not yet paid");
                return Ok(());
            }
        }

        let Some(order_id) = self.event_order_id(event) else {
            warn!(event_id = %event.id, "event carries no usable order id");
            return Ok(());
        };

        let flipped = self
            .status
            .mark_paid(
                order_id,
                "stripe",
                object.id.as_deref(),
                object.payment_intent.as_deref(),
            )
            .await?;
        if flipped.is_none() {
            return Ok(());
        }

        if let Some(paid) = order::Entity::find_by_id(order_id)
            .one(self.db.as_ref())
            .await?
        {
            self.status.send_payment_email_once(&paid).await?;
        }
        Ok(())
    }

    async fn reconcile_cancelled(&self, event: &StripeEvent) -> Result<(), ServiceError> {
        let Some(order_id) = self.event_order_id(event) else {
            warn!(event_id = %event.id, "event carries no usable order id");
            return Ok(());
        };
        let cancelled = self.status.cancel_if_unpaid(order_id).await?;
        info!(%order_id, cancelled, "session expired/failed");
        Ok(())
    }

    /// Emails static bank transfer instructions for a payable order.
    /// The first send is recorded; later calls are no-ops unless forced.
    #[instrument(skip(self, auth), fields(user_id = %auth.user_id))]
    pub async fn send_bank_instructions(
        &self,
        auth: &AuthUser,
        order_id: Uuid,
        force: bool,
    ) -> Result<BankInstructionsResponse, ServiceError> {
        let found = self.get_order(order_id).await?;
        ensure_ownership(auth, &found)?;

        if found.status == crate::entities::order::OrderStatus::Paid {
            return Ok(flags(&found.public_id, |r| r.already_paid = true));
        }
        if found.bank_email_sent_at.is_some() && !force {
            return Ok(flags(&found.public_id, |r| r.already_sent = true));
        }
        if !found.status.is_payable() {
            return Err(ServiceError::InvalidOperation(format!(
                "Order in status \"{}\" is not compatible with a bank transfer",
                found.status
            )));
        }

        let bank = &self.config.bank_transfer;
        if bank.iban.is_empty() {
            return Err(ServiceError::InternalError(
                "Bank transfer IBAN is not configured".into(),
            ));
        }

        let recipient = self.resolve_recipient(&found, auth).await?;
        let (name, _) = snapshot_identity(&found);
        let message = EmailMessage {
            kind: EmailKind::BankTransferInstructions,
            to: recipient,
            subject: format!("Payment instructions for order {}", found.public_id),
            body: format!(
                "Hi {},\n\nto complete order {} please transfer {:.2} EUR to:\n\
                 Beneficiary: {}\nIBAN: {}\nReference: {}\n\n\
                 The order is held for {} hours.\n",
                name,
                found.public_id,
                found.total_cents as f64 / 100.0,
                bank.beneficiary,
                bank.iban,
                found.public_id,
                bank.payment_deadline_hours
            ),
        };
        self.notifier
            .send(message)
            .await
            .map_err(|e| ServiceError::ExternalServiceError(e.to_string()))?;

        let resent = found.bank_email_sent_at.is_some();
        let public_id = found.public_id.clone();
        let send_count = found.bank_email_send_count;
        let mut active: order::ActiveModel = found.into();
        if resent {
            active.bank_email_last_sent_at = Set(Some(Utc::now()));
            active.bank_email_send_count = Set(send_count + 1);
        } else {
            active.bank_email_sent_at = Set(Some(Utc::now()));
        }
        active.payment_provider = Set(Some("bank_transfer".to_string()));
        active.updated_at = Set(Some(Utc::now()));
        active.update(self.db.as_ref()).await?;

        let mut response = flags(&public_id, |r| r.sent = true);
        response.resent = resent;
        Ok(response)
    }

    async fn get_order(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        order::Entity::find_by_id(order_id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }

    fn event_order_id(&self, event: &StripeEvent) -> Option<Uuid> {
        event
            .data
            .object
            .metadata
            .as_ref()
            .and_then(|m| m.order_id.as_deref())
            .and_then(|raw| Uuid::parse_str(raw).ok())
    }

    async fn resolve_recipient(
        &self,
        found: &order::Model,
        auth: &AuthUser,
    ) -> Result<String, ServiceError> {
        let (_, snapshot_email) = snapshot_identity(found);
        if !snapshot_email.is_empty() {
            return Ok(snapshot_email);
        }
        if !auth.email.is_empty() {
            return Ok(auth.email.clone());
        }
        let owner = user::Entity::find_by_id(found.user_id)
            .one(self.db.as_ref())
            .await?;
        owner
            .map(|u| u.email)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| ServiceError::InternalError("No recipient email available".into()))
    }
}

/// Owner-or-admin gate: the order's user id, or the snapshot email, must
/// match the caller. Failures are opaque.
fn ensure_ownership(auth: &AuthUser, found: &order::Model) -> Result<(), ServiceError> {
    if auth.is_admin() || found.user_id == auth.user_id {
        return Ok(());
    }
    let (_, snapshot_email) = snapshot_identity(found);
    if !snapshot_email.is_empty() && snapshot_email.eq_ignore_ascii_case(&auth.email) {
        return Ok(());
    }
    Err(ServiceError::Forbidden(
        "Not authorized for this order".into(),
    ))
}

/// Pulls (name, email) out of the denormalized shipping snapshot.
fn snapshot_identity(found: &order::Model) -> (String, String) {
    found
        .shipping_address
        .as_ref()
        .and_then(|json| serde_json::from_value::<ShippingAddress>(json.clone()).ok())
        .map(|a| (a.name, a.email))
        .unwrap_or_default()
}

fn flags(public_id: &str, f: impl FnOnce(&mut BankInstructionsResponse)) -> BankInstructionsResponse {
    let mut response = BankInstructionsResponse {
        ok: true,
        sent: false,
        resent: false,
        already_paid: false,
        already_sent: false,
        public_id: public_id.to_string(),
    };
    f(&mut response);
    response
}
