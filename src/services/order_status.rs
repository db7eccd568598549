//! Order status transitions: admin status-set calls, cancellation with
//! restock, and the conditional updates driven by payment webhooks.

use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition,
    DatabaseConnection, EntityTrait, QueryFilter,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::order::{self, OrderStatus};
use crate::entities::{order_item, product, user};
use crate::errors::ServiceError;
use crate::notifications::{EmailKind, EmailMessage, Notifier};

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ShipmentInput {
    pub carrier_name: Option<String>,
    pub tracking_code: Option<String>,
    pub tracking_url: Option<String>,
}

pub struct OrderStatusService {
    db: Arc<DatabaseConnection>,
    notifier: Arc<dyn Notifier>,
}

impl OrderStatusService {
    pub fn new(db: Arc<DatabaseConnection>, notifier: Arc<dyn Notifier>) -> Self {
        Self { db, notifier }
    }

    /// Admin-driven transition. Incoming tracking fields are merged over
    /// whatever the order already carries; entering `shipped` requires both
    /// a tracking code and a tracking URL after the merge.
    #[instrument(skip(self, shipment))]
    pub async fn set_status(
        &self,
        order_id: Uuid,
        status: OrderStatus,
        shipment: Option<ShipmentInput>,
    ) -> Result<order::Model, ServiceError> {
        let found = order::Entity::find_by_id(order_id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let incoming = shipment.unwrap_or_default();
        let in_carrier = trimmed(incoming.carrier_name.as_deref());
        let in_code = trimmed(incoming.tracking_code.as_deref());
        let in_url = trimmed(incoming.tracking_url.as_deref());

        let final_code = in_code
            .clone()
            .or_else(|| trimmed(found.tracking_code.as_deref()));
        let final_url = in_url
            .clone()
            .or_else(|| trimmed(found.tracking_url.as_deref()));

        if status == OrderStatus::Shipped && (final_code.is_none() || final_url.is_none()) {
            return Err(ServiceError::ValidationError(
                "Marking as shipped requires both a tracking code and a tracking URL".into(),
            ));
        }

        let shipped_at_already_set = found.shipped_at.is_some();
        let mut active: order::ActiveModel = found.into();
        active.status = Set(status);
        if let Some(carrier) = in_carrier {
            active.carrier_name = Set(Some(carrier));
        }
        if let Some(code) = in_code {
            active.tracking_code = Set(Some(code));
        }
        if let Some(url) = in_url {
            active.tracking_url = Set(Some(url));
        }
        if status == OrderStatus::Shipped && !shipped_at_already_set {
            active.shipped_at = Set(Some(Utc::now()));
        }
        active.updated_at = Set(Some(Utc::now()));
        let saved = active.update(self.db.as_ref()).await?;

        if saved.status == OrderStatus::Shipped {
            return self.notify_shipment_once(saved).await;
        }
        Ok(saved)
    }

    /// Cancels an order; settled orders are returned unchanged. Stock is
    /// restored only from `pending_payment`, the one state where the
    /// reservation has not been paid for.
    #[instrument(skip(self))]
    pub async fn cancel_and_restock(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        let found = order::Entity::find_by_id(order_id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if found.status.is_settled() {
            return Ok(found);
        }

        // Claim the transition before touching stock, conditional on the
        // status we read. Concurrent cancels race on this update, so only
        // the winner restocks.
        let was_pending = found.status == OrderStatus::PendingPayment;
        let claimed = order::Entity::update_many()
            .col_expr(order::Column::Status, Expr::value(OrderStatus::Cancelled))
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.eq(found.id))
            .filter(order::Column::Status.eq(found.status))
            .exec(self.db.as_ref())
            .await?;

        if claimed.rows_affected > 0 && was_pending {
            let items = order_item::Entity::find()
                .filter(order_item::Column::OrderId.eq(found.id))
                .all(self.db.as_ref())
                .await?;
            for item in &items {
                self.restock_line(item).await?;
            }
        }

        order::Entity::find_by_id(order_id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }

    /// Webhook-driven paid flip: conditional on not already being paid, so
    /// duplicate deliveries change nothing. Returns the fresh model when
    /// this call performed the flip.
    #[instrument(skip(self))]
    pub async fn mark_paid(
        &self,
        order_id: Uuid,
        provider: &str,
        session_id: Option<&str>,
        payment_intent_id: Option<&str>,
    ) -> Result<Option<order::Model>, ServiceError> {
        let mut update = order::Entity::update_many()
            .col_expr(order::Column::Status, Expr::value(OrderStatus::Paid))
            .col_expr(order::Column::PaidAt, Expr::value(Utc::now()))
            .col_expr(order::Column::PaymentProvider, Expr::value(provider))
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Status.ne(OrderStatus::Paid));
        if let Some(session_id) = session_id {
            update = update.col_expr(
                order::Column::StripeCheckoutSessionId,
                Expr::value(session_id),
            );
        }
        if let Some(intent) = payment_intent_id {
            update = update.col_expr(order::Column::StripePaymentIntentId, Expr::value(intent));
        }

        let res = update.exec(self.db.as_ref()).await?;
        if res.rows_affected == 0 {
            info!(%order_id, "payment event ignored, order already paid");
            return Ok(None);
        }

        Ok(order::Entity::find_by_id(order_id)
            .one(self.db.as_ref())
            .await?)
    }

    /// Webhook-driven cancellation, applied only while the order has not
    /// progressed past the payable states.
    #[instrument(skip(self))]
    pub async fn cancel_if_unpaid(&self, order_id: Uuid) -> Result<bool, ServiceError> {
        let res = order::Entity::update_many()
            .col_expr(order::Column::Status, Expr::value(OrderStatus::Cancelled))
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.eq(order_id))
            .filter(
                Condition::any()
                    .add(order::Column::Status.eq(OrderStatus::PendingPayment))
                    .add(order::Column::Status.eq(OrderStatus::Draft)),
            )
            .exec(self.db.as_ref())
            .await?;
        Ok(res.rows_affected > 0)
    }

    /// Sends the payment-confirmation email at most once per order. The
    /// send slot is claimed with a conditional update before the send, so
    /// concurrent webhook deliveries cannot both pass the guard.
    #[instrument(skip(self, order), fields(order_id = %order.id))]
    pub async fn send_payment_email_once(&self, order: &order::Model) -> Result<(), ServiceError> {
        let claimed = order::Entity::update_many()
            .col_expr(order::Column::PaymentEmailSentAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.eq(order.id))
            .filter(order::Column::PaymentEmailSentAt.is_null())
            .exec(self.db.as_ref())
            .await?;
        if claimed.rows_affected == 0 {
            return Ok(());
        }

        let Some(owner) = user::Entity::find_by_id(order.user_id)
            .one(self.db.as_ref())
            .await?
        else {
            warn!(order_id = %order.id, "payment email skipped, owner missing");
            return Ok(());
        };

        let message = EmailMessage {
            kind: EmailKind::PaymentConfirmation,
            to: owner.email,
            subject: format!("Payment received for order {}", order.public_id),
            body: format!(
                "Hi {},\n\nwe received the payment for order {}. Total: {:.2} EUR.\n",
                owner.first_name,
                order.public_id,
                order.total_cents as f64 / 100.0
            ),
        };
        if let Err(err) = self.notifier.send(message).await {
            error!(order_id = %order.id, "payment confirmation email failed: {}", err);
        }
        Ok(())
    }

    async fn notify_shipment_once(
        &self,
        order: order::Model,
    ) -> Result<order::Model, ServiceError> {
        if order.shipment_notified_at.is_some() {
            return Ok(order);
        }
        let (Some(code), Some(url)) = (
            trimmed(order.tracking_code.as_deref()),
            trimmed(order.tracking_url.as_deref()),
        ) else {
            return Ok(order);
        };

        let claimed = order::Entity::update_many()
            .col_expr(order::Column::ShipmentNotifiedAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.eq(order.id))
            .filter(order::Column::ShipmentNotifiedAt.is_null())
            .exec(self.db.as_ref())
            .await?;
        if claimed.rows_affected == 0 {
            return Ok(order);
        }

        if let Some(owner) = user::Entity::find_by_id(order.user_id)
            .one(self.db.as_ref())
            .await?
        {
            let carrier = trimmed(order.carrier_name.as_deref()).unwrap_or_default();
            let message = EmailMessage {
                kind: EmailKind::ShipmentUpdate,
                to: owner.email,
                subject: format!("Order {} has shipped", order.public_id),
                body: format!(
                    "Hi {},\n\nyour order {} is on its way.\nCarrier: {}\nTracking: {} ({})\n",
                    owner.first_name, order.public_id, carrier, code, url
                ),
            };
            if let Err(err) = self.notifier.send(message).await {
                error!(order_id = %order.id, "shipment email failed: {}", err);
            }
        }

        Ok(order::Entity::find_by_id(order.id)
            .one(self.db.as_ref())
            .await?
            .unwrap_or(order))
    }

    /// Returns quantity to the catalog, resolving by product reference
    /// first and falling back to the slug when the product was re-created.
    async fn restock_line(&self, item: &order_item::Model) -> Result<(), ServiceError> {
        if let Some(product_id) = item.product_id {
            let res = product::Entity::update_many()
                .col_expr(
                    product::Column::StockQty,
                    Expr::col(product::Column::StockQty).add(item.qty),
                )
                .filter(product::Column::Id.eq(product_id))
                .exec(self.db.as_ref())
                .await?;
            if res.rows_affected > 0 {
                return Ok(());
            }
        }
        product::Entity::update_many()
            .col_expr(
                product::Column::StockQty,
                Expr::col(product::Column::StockQty).add(item.qty),
            )
            .filter(product::Column::Slug.eq(&item.product_slug))
            .exec(self.db.as_ref())
            .await?;
        Ok(())
    }
}

fn trimmed(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::trimmed;

    #[test]
    fn trimmed_filters_blank_values() {
        assert_eq!(trimmed(Some("  BRT ")), Some("BRT".to_string()));
        assert_eq!(trimmed(Some("   ")), None);
        assert_eq!(trimmed(None), None);
    }
}
