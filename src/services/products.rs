//! Catalog reads and admin product CRUD. Stock mutations live in the order
//! services, behind guarded conditional updates.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::product;
use crate::errors::ServiceError;
use crate::normalize::normalize_slug;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateProductRequest {
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub price_cents: i64,
    pub compare_at_price_cents: Option<i64>,
    #[serde(default)]
    pub stock_qty: i32,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub sort_order: i32,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub price_cents: Option<i64>,
    pub compare_at_price_cents: Option<Option<i64>>,
    pub stock_qty: Option<i32>,
    pub is_active: Option<bool>,
    pub sort_order: Option<i32>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductListResponse {
    pub products: Vec<product::Model>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
}

pub struct ProductService {
    db: Arc<DatabaseConnection>,
}

impl ProductService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Public storefront listing: active products in display order.
    pub async fn list_active(&self) -> Result<Vec<product::Model>, ServiceError> {
        Ok(product::Entity::find()
            .filter(product::Column::IsActive.eq(true))
            .order_by_asc(product::Column::SortOrder)
            .order_by_asc(product::Column::Name)
            .all(self.db.as_ref())
            .await?)
    }

    /// Public fetch by id or slug, active products only.
    pub async fn get_active(&self, id_or_slug: &str) -> Result<product::Model, ServiceError> {
        self.find_by_id_or_slug(id_or_slug, true)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", id_or_slug)))
    }

    pub async fn admin_get(&self, id_or_slug: &str) -> Result<product::Model, ServiceError> {
        self.find_by_id_or_slug(id_or_slug, false)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", id_or_slug)))
    }

    #[instrument(skip(self))]
    pub async fn admin_list(
        &self,
        page: u64,
        limit: u64,
        q: Option<&str>,
    ) -> Result<ProductListResponse, ServiceError> {
        let page = page.max(1);
        let limit = limit.clamp(1, 100);

        let mut query = product::Entity::find()
            .order_by_asc(product::Column::SortOrder)
            .order_by_asc(product::Column::Name);
        if let Some(q) = q.map(str::trim).filter(|q| !q.is_empty()) {
            query = query.filter(
                Condition::any()
                    .add(product::Column::Slug.contains(q))
                    .add(product::Column::Name.contains(q)),
            );
        }

        let paginator = query.paginate(self.db.as_ref(), limit);
        let total = paginator.num_items().await?;
        let products = paginator.fetch_page(page - 1).await?;

        Ok(ProductListResponse {
            products,
            total,
            page,
            limit,
        })
    }

    #[instrument(skip(self, req), fields(slug = %req.slug))]
    pub async fn create(&self, req: CreateProductRequest) -> Result<product::Model, ServiceError> {
        let slug = normalize_slug(&req.slug);
        if slug.is_empty() {
            return Err(ServiceError::ValidationError("Slug is required".into()));
        }
        let name = req.name.trim().to_string();
        if name.is_empty() {
            return Err(ServiceError::ValidationError("Name is required".into()));
        }
        validate_pricing(req.price_cents, req.compare_at_price_cents)?;
        if req.stock_qty < 0 {
            return Err(ServiceError::ValidationError(
                "Stock quantity cannot be negative".into(),
            ));
        }
        if req.sort_order < 0 {
            return Err(ServiceError::ValidationError(
                "Sort order cannot be negative".into(),
            ));
        }

        let duplicate = product::Entity::find()
            .filter(product::Column::Slug.eq(&slug))
            .one(self.db.as_ref())
            .await?;
        if duplicate.is_some() {
            return Err(ServiceError::ValidationError(
                "Product slug already exists".into(),
            ));
        }

        Ok(product::ActiveModel {
            id: Set(Uuid::new_v4()),
            slug: Set(slug),
            name: Set(name),
            description: Set(req.description.map(|d| d.trim().to_string())),
            price_cents: Set(req.price_cents),
            compare_at_price_cents: Set(req.compare_at_price_cents),
            stock_qty: Set(req.stock_qty),
            is_active: Set(req.is_active),
            sort_order: Set(req.sort_order),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(self.db.as_ref())
        .await
        .map_err(|e| ServiceError::remap_unique_violation(e, "Product slug already exists"))?)
    }

    /// Admin edit. The slug is immutable after creation; soft-delete is an
    /// `is_active = false` update through this path.
    #[instrument(skip(self, req))]
    pub async fn update(
        &self,
        id_or_slug: &str,
        req: UpdateProductRequest,
    ) -> Result<product::Model, ServiceError> {
        let found = self.admin_get(id_or_slug).await?;

        let price_cents = req.price_cents.unwrap_or(found.price_cents);
        let compare_at = match req.compare_at_price_cents {
            Some(v) => v,
            None => found.compare_at_price_cents,
        };
        validate_pricing(price_cents, compare_at)?;

        let mut active: product::ActiveModel = found.into();
        if let Some(name) = req.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(ServiceError::ValidationError("Name cannot be empty".into()));
            }
            active.name = Set(name);
        }
        if let Some(description) = req.description {
            active.description = Set(description.map(|d| d.trim().to_string()));
        }
        active.price_cents = Set(price_cents);
        active.compare_at_price_cents = Set(compare_at);
        if let Some(stock_qty) = req.stock_qty {
            if stock_qty < 0 {
                return Err(ServiceError::ValidationError(
                    "Stock quantity cannot be negative".into(),
                ));
            }
            active.stock_qty = Set(stock_qty);
        }
        if let Some(is_active) = req.is_active {
            active.is_active = Set(is_active);
        }
        if let Some(sort_order) = req.sort_order {
            if sort_order < 0 {
                return Err(ServiceError::ValidationError(
                    "Sort order cannot be negative".into(),
                ));
            }
            active.sort_order = Set(sort_order);
        }
        active.updated_at = Set(Some(Utc::now()));

        Ok(active.update(self.db.as_ref()).await?)
    }

    /// Hard delete, for products permanently removed from the catalog.
    pub async fn delete(&self, id_or_slug: &str) -> Result<(), ServiceError> {
        let found = self.admin_get(id_or_slug).await?;
        product::Entity::delete_by_id(found.id)
            .exec(self.db.as_ref())
            .await?;
        Ok(())
    }

    async fn find_by_id_or_slug(
        &self,
        id_or_slug: &str,
        active_only: bool,
    ) -> Result<Option<product::Model>, ServiceError> {
        let mut condition = Condition::any();
        if let Ok(id) = Uuid::parse_str(id_or_slug.trim()) {
            condition = condition.add(product::Column::Id.eq(id));
        }
        condition = condition.add(product::Column::Slug.eq(normalize_slug(id_or_slug)));

        let mut query = product::Entity::find().filter(condition);
        if active_only {
            query = query.filter(product::Column::IsActive.eq(true));
        }
        Ok(query.one(self.db.as_ref()).await?)
    }
}

fn validate_pricing(price_cents: i64, compare_at: Option<i64>) -> Result<(), ServiceError> {
    if price_cents < 0 {
        return Err(ServiceError::ValidationError(
            "Price cannot be negative".into(),
        ));
    }
    if let Some(compare_at) = compare_at {
        if compare_at < price_cents {
            return Err(ServiceError::ValidationError(
                "Compare-at price must be at least the price".into(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::validate_pricing;

    #[test]
    fn compare_at_must_cover_price() {
        assert!(validate_pricing(1000, Some(999)).is_err());
        assert!(validate_pricing(1000, Some(1000)).is_ok());
        assert!(validate_pricing(1000, None).is_ok());
        assert!(validate_pricing(-1, None).is_err());
    }
}
