//! Saved shipping addresses.
//!
//! Default handling is "unset all, then set one" so the worst concurrent
//! outcome is zero defaults, never two.

use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::address;
use crate::errors::ServiceError;
use crate::normalize::{normalize_shipping_address, ShippingAddress};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateAddressRequest {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub is_default: bool,
    #[serde(flatten)]
    pub address: ShippingAddress,
}

pub struct AddressService {
    db: Arc<DatabaseConnection>,
}

impl AddressService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<address::Model>, ServiceError> {
        Ok(address::Entity::find()
            .filter(address::Column::UserId.eq(user_id))
            .order_by_desc(address::Column::IsDefault)
            .order_by_desc(address::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?)
    }

    /// Fetches an address only when it belongs to the user.
    pub async fn get_owned(
        &self,
        user_id: Uuid,
        address_id: Uuid,
    ) -> Result<address::Model, ServiceError> {
        address::Entity::find_by_id(address_id)
            .filter(address::Column::UserId.eq(user_id))
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Address {} not found", address_id)))
    }

    #[instrument(skip(self, req))]
    pub async fn create(
        &self,
        user_id: Uuid,
        req: CreateAddressRequest,
    ) -> Result<address::Model, ServiceError> {
        let normalized = normalize_shipping_address(&req.address);
        if !normalized.is_complete() {
            return Err(ServiceError::ValidationError(
                "Name, surname, street, city and postal code are required".into(),
            ));
        }

        let existing = address::Entity::find()
            .filter(address::Column::UserId.eq(user_id))
            .count(self.db.as_ref())
            .await?;
        // The first saved address becomes the default implicitly.
        let is_default = existing == 0 || req.is_default;

        if is_default {
            self.unset_all_defaults(user_id).await?;
        }

        Ok(address::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            label: Set(req.label.trim().to_string()),
            is_default: Set(is_default),
            name: Set(normalized.name),
            surname: Set(normalized.surname),
            phone: Set(normalized.phone),
            email: Set(normalized.email),
            street: Set(normalized.street),
            street_number: Set(normalized.street_number),
            city: Set(normalized.city),
            postal_code: Set(normalized.postal_code),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(self.db.as_ref())
        .await?)
    }

    #[instrument(skip(self))]
    pub async fn set_default(
        &self,
        user_id: Uuid,
        address_id: Uuid,
    ) -> Result<address::Model, ServiceError> {
        let found = self.get_owned(user_id, address_id).await?;

        self.unset_all_defaults(user_id).await?;

        let mut active: address::ActiveModel = found.into();
        active.is_default = Set(true);
        active.updated_at = Set(Some(Utc::now()));
        Ok(active.update(self.db.as_ref()).await?)
    }

    async fn unset_all_defaults(&self, user_id: Uuid) -> Result<(), ServiceError> {
        address::Entity::update_many()
            .col_expr(address::Column::IsDefault, Expr::value(false))
            .filter(address::Column::UserId.eq(user_id))
            .exec(self.db.as_ref())
            .await?;
        Ok(())
    }
}
