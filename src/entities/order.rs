use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use std::fmt;

/// The central aggregate: a priced, stock-reserved order snapshot.
///
/// Line items live in `order_item`; monetary fields are captured at
/// creation time from the quote and never recomputed from the catalog.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[schema(as = Order)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// Human-readable code, e.g. `#2026104`.
    pub public_id: String,
    pub user_id: Uuid,
    pub status: OrderStatus,

    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub global_discount_cents: i64,
    pub coupon_discount_cents: i64,
    pub coupon_code_applied: Option<String>,
    pub discount_label: Option<String>,
    pub discount_type: DiscountType,
    pub shipping_cents: i64,
    pub total_cents: i64,

    /// Denormalized address snapshot (JSON).
    pub shipping_address: Option<Json>,
    /// Link to the saved address the snapshot was taken from, if any.
    pub shipping_address_id: Option<Uuid>,

    pub carrier_name: Option<String>,
    pub tracking_code: Option<String>,
    pub tracking_url: Option<String>,
    pub shipped_at: Option<DateTime<Utc>>,
    /// Guards duplicate shipment emails.
    pub shipment_notified_at: Option<DateTime<Utc>>,

    pub payment_provider: Option<String>,
    pub stripe_checkout_session_id: Option<String>,
    pub stripe_payment_intent_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    /// Guards duplicate payment-confirmation emails.
    pub payment_email_sent_at: Option<DateTime<Utc>>,
    pub bank_email_sent_at: Option<DateTime<Utc>>,
    pub bank_email_last_sent_at: Option<DateTime<Utc>>,
    pub bank_email_send_count: i32,

    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[sea_orm(string_value = "draft")]
    Draft,
    #[sea_orm(string_value = "pending_payment")]
    PendingPayment,
    #[sea_orm(string_value = "paid")]
    Paid,
    #[sea_orm(string_value = "processing")]
    Processing,
    #[sea_orm(string_value = "shipped")]
    Shipped,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
    #[sea_orm(string_value = "refunded")]
    Refunded,
}

impl OrderStatus {
    pub const ALL: &'static [OrderStatus] = &[
        OrderStatus::Draft,
        OrderStatus::PendingPayment,
        OrderStatus::Paid,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
        OrderStatus::Refunded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Draft => "draft",
            OrderStatus::PendingPayment => "pending_payment",
            OrderStatus::Paid => "paid",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
        }
    }

    pub fn parse(s: &str) -> Option<OrderStatus> {
        OrderStatus::ALL
            .iter()
            .copied()
            .find(|st| st.as_str() == s.trim())
    }

    /// Settled states are never touched by cancellation.
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            OrderStatus::Cancelled | OrderStatus::Refunded | OrderStatus::Completed
        )
    }

    /// States in which a payment may still be initiated.
    pub fn is_payable(&self) -> bool {
        matches!(self, OrderStatus::PendingPayment | OrderStatus::Draft)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(10))")]
#[serde(rename_all = "lowercase")]
pub enum DiscountType {
    #[sea_orm(string_value = "none")]
    None,
    #[sea_orm(string_value = "piva15")]
    Piva15,
    #[sea_orm(string_value = "first10")]
    First10,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    Items,
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Items.def()
    }
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::OrderStatus;

    #[test]
    fn parse_round_trips_every_status() {
        for st in OrderStatus::ALL {
            assert_eq!(OrderStatus::parse(st.as_str()), Some(*st));
        }
        assert_eq!(OrderStatus::parse("unknown"), None);
        assert_eq!(OrderStatus::parse(" paid "), Some(OrderStatus::Paid));
    }

    #[test]
    fn settled_states_cover_terminal_exits() {
        assert!(OrderStatus::Cancelled.is_settled());
        assert!(OrderStatus::Refunded.is_settled());
        assert!(OrderStatus::Completed.is_settled());
        assert!(!OrderStatus::PendingPayment.is_settled());
        assert!(!OrderStatus::Shipped.is_settled());
    }
}
