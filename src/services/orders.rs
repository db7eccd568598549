//! Order creation and retrieval.
//!
//! Creation turns a server-side quote into a persisted order while
//! reserving stock with per-line conditional decrements. A failed line,
//! or any failure after reservation, re-increments everything already
//! decremented so reservation stays all-or-nothing.

use chrono::{Datelike, Utc};
use sea_orm::{
    sea_query::{Expr, OnConflict},
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::entities::order::OrderStatus;
use crate::entities::{order, order_counter, order_item, product, user};
use crate::errors::ServiceError;
use crate::normalize::{normalize_shipping_address, ShippingAddress};
use crate::services::addresses::AddressService;
use crate::services::quote::{CartItem, Quote, QuoteService};

/// Public order number offset: the first order of a year renders as
/// `#<year>100`.
const ORDER_NUMBER_OFFSET: i32 = 99;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateOrderRequest {
    pub items: Vec<CartItem>,
    pub shipping_address: Option<ShippingAddress>,
    pub shipping_address_id: Option<Uuid>,
    pub coupon_code: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderWithItems {
    #[serde(flatten)]
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CreatedOrder {
    #[serde(flatten)]
    pub order: OrderWithItems,
    /// Quote breakdown, returned so the caller can render confirmation
    /// without a second fetch.
    pub quote: Quote,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderListResponse {
    pub orders: Vec<OrderWithItems>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
}

pub struct OrderService {
    db: Arc<DatabaseConnection>,
    quotes: QuoteService,
    addresses: AddressService,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>, config: Arc<AppConfig>) -> Self {
        let quotes = QuoteService::new(db.clone(), config);
        let addresses = AddressService::new(db.clone());
        Self {
            db,
            quotes,
            addresses,
        }
    }

    pub fn quotes(&self) -> &QuoteService {
        &self.quotes
    }

    #[instrument(skip(self, user, req), fields(user_id = %user.id))]
    pub async fn create_order(
        &self,
        user: &user::Model,
        req: CreateOrderRequest,
    ) -> Result<CreatedOrder, ServiceError> {
        // Re-price server-side; client totals are never trusted.
        let quote = self
            .quotes
            .compute_quote(user, &req.items, req.coupon_code.as_deref())
            .await?;

        let (address, address_ref) = self
            .resolve_address(user.id, req.shipping_address.as_ref(), req.shipping_address_id)
            .await?;

        let reserved = self.reserve_stock(&quote).await?;

        // Anything failing from here on must release the reservation.
        match self.persist_order(user, &quote, &address, address_ref).await {
            Ok(order) => {
                info!(order_id = %order.order.id, public_id = %order.order.public_id, "order created");
                Ok(CreatedOrder { order, quote })
            }
            Err(err) => {
                self.release_reservation(&reserved).await;
                Err(err)
            }
        }
    }

    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<OrderWithItems>, ServiceError> {
        let orders = order::Entity::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?;
        self.with_items(orders).await
    }

    /// Fetches an order only when it belongs to the user.
    pub async fn get_owned(
        &self,
        user_id: Uuid,
        order_id: Uuid,
    ) -> Result<OrderWithItems, ServiceError> {
        let found = order::Entity::find_by_id(order_id)
            .filter(order::Column::UserId.eq(user_id))
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;
        let mut wrapped = self.with_items(vec![found]).await?;
        Ok(wrapped.remove(0))
    }

    #[instrument(skip(self))]
    pub async fn admin_list(
        &self,
        page: u64,
        limit: u64,
        status: Option<OrderStatus>,
        q: Option<&str>,
    ) -> Result<OrderListResponse, ServiceError> {
        let page = page.max(1);
        let limit = limit.clamp(1, 100);

        let mut query = order::Entity::find().order_by_desc(order::Column::CreatedAt);
        if let Some(status) = status {
            query = query.filter(order::Column::Status.eq(status));
        }
        if let Some(q) = q.map(str::trim).filter(|q| !q.is_empty()) {
            let matching_users = user::Entity::find()
                .filter(
                    Condition::any()
                        .add(user::Column::Email.contains(q))
                        .add(user::Column::FirstName.contains(q))
                        .add(user::Column::LastName.contains(q)),
                )
                .all(self.db.as_ref())
                .await?;
            let user_ids: Vec<Uuid> = matching_users.into_iter().map(|u| u.id).collect();
            let mut cond = Condition::any().add(order::Column::PublicId.contains(q));
            if !user_ids.is_empty() {
                cond = cond.add(order::Column::UserId.is_in(user_ids));
            }
            query = query.filter(cond);
        }

        let paginator = query.paginate(self.db.as_ref(), limit);
        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page - 1).await?;

        Ok(OrderListResponse {
            orders: self.with_items(orders).await?,
            total,
            page,
            limit,
        })
    }

    /// Admin fetch by internal id or public code (`#2026104`).
    pub async fn admin_get(&self, id_or_public: &str) -> Result<OrderWithItems, ServiceError> {
        let raw = id_or_public.trim();
        if raw.is_empty() {
            return Err(ServiceError::ValidationError("Order id required".into()));
        }

        let found = if let Ok(id) = Uuid::parse_str(raw) {
            order::Entity::find_by_id(id).one(self.db.as_ref()).await?
        } else {
            order::Entity::find()
                .filter(order::Column::PublicId.eq(raw))
                .one(self.db.as_ref())
                .await?
        };
        let found =
            found.ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", raw)))?;

        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(found.id))
            .all(self.db.as_ref())
            .await?;
        Ok(OrderWithItems {
            order: found,
            items,
        })
    }

    async fn resolve_address(
        &self,
        user_id: Uuid,
        inline: Option<&ShippingAddress>,
        saved_id: Option<Uuid>,
    ) -> Result<(ShippingAddress, Option<Uuid>), ServiceError> {
        if let Some(id) = saved_id {
            let saved = self.addresses.get_owned(user_id, id).await?;
            let address = normalize_shipping_address(&ShippingAddress {
                name: saved.name,
                surname: saved.surname,
                phone: saved.phone,
                email: saved.email,
                street: saved.street,
                street_number: saved.street_number,
                city: saved.city,
                postal_code: saved.postal_code,
            });
            return Ok((address, Some(id)));
        }
        if let Some(inline) = inline {
            let address = normalize_shipping_address(inline);
            if !address.is_complete() {
                return Err(ServiceError::ValidationError(
                    "Name, surname, street, city and postal code are required".into(),
                ));
            }
            return Ok((address, None));
        }
        Err(ServiceError::AddressRequired)
    }

    /// Decrements stock line by line with guarded conditional updates.
    /// On the first failed line, every prior decrement is re-incremented
    /// and the whole reservation fails.
    async fn reserve_stock(&self, quote: &Quote) -> Result<Vec<(Uuid, i32)>, ServiceError> {
        let mut reserved: Vec<(Uuid, i32)> = Vec::with_capacity(quote.lines.len());
        for line in &quote.lines {
            let outcome = product::Entity::update_many()
                .col_expr(
                    product::Column::StockQty,
                    Expr::col(product::Column::StockQty).sub(line.qty),
                )
                .filter(product::Column::Id.eq(line.product_id))
                .filter(product::Column::IsActive.eq(true))
                .filter(product::Column::StockQty.gte(line.qty))
                .exec(self.db.as_ref())
                .await;

            match outcome {
                Ok(res) if res.rows_affected == 1 => {
                    reserved.push((line.product_id, line.qty));
                }
                Ok(_) => {
                    self.release_reservation(&reserved).await;
                    let available = product::Entity::find_by_id(line.product_id)
                        .one(self.db.as_ref())
                        .await?
                        .map(|p| p.stock_qty)
                        .unwrap_or(0);
                    return Err(ServiceError::InsufficientStock {
                        availability: BTreeMap::from([(line.product_slug.clone(), available)]),
                    });
                }
                Err(err) => {
                    self.release_reservation(&reserved).await;
                    return Err(err.into());
                }
            }
        }
        Ok(reserved)
    }

    /// Rollback path. Failures here are logged loudly, never folded into
    /// a successful response.
    async fn release_reservation(&self, reserved: &[(Uuid, i32)]) {
        for (product_id, qty) in reserved {
            let outcome = product::Entity::update_many()
                .col_expr(
                    product::Column::StockQty,
                    Expr::col(product::Column::StockQty).add(*qty),
                )
                .filter(product::Column::Id.eq(*product_id))
                .exec(self.db.as_ref())
                .await;
            if let Err(err) = outcome {
                error!(%product_id, qty, "failed to release stock reservation: {}", err);
            }
        }
        if !reserved.is_empty() {
            warn!(lines = reserved.len(), "stock reservation rolled back");
        }
    }

    /// Atomic upsert-and-increment on the per-year counter; never a
    /// read-then-write.
    async fn next_public_id(&self) -> Result<String, ServiceError> {
        let year = Utc::now().year();
        let counter = order_counter::Entity::insert(order_counter::ActiveModel {
            year: Set(year),
            seq: Set(1),
        })
        .on_conflict(
            OnConflict::column(order_counter::Column::Year)
                .value(
                    order_counter::Column::Seq,
                    Expr::col(order_counter::Column::Seq).add(1),
                )
                .to_owned(),
        )
        .exec_with_returning(self.db.as_ref())
        .await?;

        let order_number = ORDER_NUMBER_OFFSET + counter.seq;
        Ok(format!("#{}{}", year, order_number))
    }

    async fn persist_order(
        &self,
        user: &user::Model,
        quote: &Quote,
        address: &ShippingAddress,
        address_ref: Option<Uuid>,
    ) -> Result<OrderWithItems, ServiceError> {
        let public_id = self.next_public_id().await?;
        let address_json = serde_json::to_value(address)
            .map_err(|e| ServiceError::InternalError(format!("address snapshot: {}", e)))?;

        let txn = self.db.begin().await?;
        let order_id = Uuid::new_v4();
        let saved = order::ActiveModel {
            id: Set(order_id),
            public_id: Set(public_id),
            user_id: Set(user.id),
            status: Set(OrderStatus::PendingPayment),
            subtotal_cents: Set(quote.subtotal_cents),
            discount_cents: Set(quote.discount_cents),
            global_discount_cents: Set(quote.global_discount_cents),
            coupon_discount_cents: Set(quote.coupon_discount_cents),
            coupon_code_applied: Set(quote.coupon_code_applied.clone()),
            discount_label: Set(quote.discount_label.clone()),
            discount_type: Set(quote.discount_type),
            shipping_cents: Set(quote.shipping_cents),
            total_cents: Set(quote.total_cents),
            shipping_address: Set(Some(address_json)),
            shipping_address_id: Set(address_ref),
            carrier_name: Set(None),
            tracking_code: Set(None),
            tracking_url: Set(None),
            shipped_at: Set(None),
            shipment_notified_at: Set(None),
            payment_provider: Set(None),
            stripe_checkout_session_id: Set(None),
            stripe_payment_intent_id: Set(None),
            paid_at: Set(None),
            payment_email_sent_at: Set(None),
            bank_email_sent_at: Set(None),
            bank_email_last_sent_at: Set(None),
            bank_email_send_count: Set(0),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(&txn)
        .await?;

        let mut items = Vec::with_capacity(quote.lines.len());
        for line in &quote.lines {
            let item = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(Some(line.product_id)),
                product_slug: Set(line.product_slug.clone()),
                name: Set(line.name.clone()),
                unit_price_cents: Set(line.unit_price_cents),
                qty: Set(line.qty),
                line_total_cents: Set(line.line_total_cents),
                coupon_discount_cents: Set(line.coupon_discount_cents),
            }
            .insert(&txn)
            .await?;
            items.push(item);
        }
        txn.commit().await?;

        Ok(OrderWithItems {
            order: saved,
            items,
        })
    }

    async fn with_items(
        &self,
        orders: Vec<order::Model>,
    ) -> Result<Vec<OrderWithItems>, ServiceError> {
        let mut out = Vec::with_capacity(orders.len());
        for o in orders {
            let items = order_item::Entity::find()
                .filter(order_item::Column::OrderId.eq(o.id))
                .all(self.db.as_ref())
                .await?;
            out.push(OrderWithItems { order: o, items });
        }
        Ok(out)
    }
}
