//! Coupon administration and lookup.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, DatabaseConnection, EntityTrait,
    ModelTrait, PaginatorTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::coupon_rule::RuleKind;
use crate::entities::{coupon, coupon_rule, product};
use crate::errors::ServiceError;
use crate::normalize::{normalize_coupon_code, normalize_slug};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CouponRuleInput {
    pub product_slug: String,
    pub kind: RuleKind,
    /// Percent (1..=100) or a per-unit amount in cents.
    pub value: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateCouponRequest {
    pub code: String,
    pub name: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub rules: Vec<CouponRuleInput>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateCouponRequest {
    pub code: Option<String>,
    pub name: Option<Option<String>>,
    pub is_active: Option<bool>,
    pub starts_at: Option<Option<DateTime<Utc>>>,
    pub ends_at: Option<Option<DateTime<Utc>>>,
    /// When present, replaces the whole rule set.
    pub rules: Option<Vec<CouponRuleInput>>,
}

fn default_true() -> bool {
    true
}

/// A coupon together with its per-product rules.
#[derive(Debug, Serialize, ToSchema)]
pub struct CouponWithRules {
    #[serde(flatten)]
    pub coupon: coupon::Model,
    pub rules: Vec<coupon_rule::Model>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CouponListResponse {
    pub coupons: Vec<CouponWithRules>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
}

pub struct CouponService {
    db: Arc<DatabaseConnection>,
}

impl CouponService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Looks up a coupon by code, returning it only when the active flag is
    /// set and the validity window contains now.
    pub async fn find_active_by_code(
        &self,
        raw_code: &str,
    ) -> Result<Option<(coupon::Model, Vec<coupon_rule::Model>)>, ServiceError> {
        let Some(code) = normalize_coupon_code(raw_code) else {
            return Ok(None);
        };
        let now = Utc::now();
        let found = coupon::Entity::find()
            .filter(coupon::Column::Code.eq(&code))
            .filter(coupon::Column::IsActive.eq(true))
            .filter(
                Condition::any()
                    .add(coupon::Column::StartsAt.is_null())
                    .add(coupon::Column::StartsAt.lte(now)),
            )
            .filter(
                Condition::any()
                    .add(coupon::Column::EndsAt.is_null())
                    .add(coupon::Column::EndsAt.gte(now)),
            )
            .one(self.db.as_ref())
            .await?;

        let Some(found) = found else {
            return Ok(None);
        };
        let rules = found
            .find_related(coupon_rule::Entity)
            .all(self.db.as_ref())
            .await?;
        Ok(Some((found, rules)))
    }

    #[instrument(skip(self, req))]
    pub async fn create(&self, req: CreateCouponRequest) -> Result<CouponWithRules, ServiceError> {
        let code = normalize_coupon_code(&req.code).ok_or_else(|| {
            ServiceError::ValidationError(
                "Invalid coupon code (3-32 chars, A-Z 0-9 _ -)".into(),
            )
        })?;
        check_window(req.starts_at, req.ends_at)?;
        let rules = self.resolve_rules(&req.rules).await?;

        let duplicate = coupon::Entity::find()
            .filter(coupon::Column::Code.eq(&code))
            .one(self.db.as_ref())
            .await?;
        if duplicate.is_some() {
            return Err(ServiceError::ValidationError(
                "Coupon code already exists".into(),
            ));
        }

        let txn = self.db.begin().await?;
        let model = coupon::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code),
            name: Set(req.name.map(|n| n.trim().to_string())),
            is_active: Set(req.is_active),
            starts_at: Set(req.starts_at),
            ends_at: Set(req.ends_at),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(&txn)
        .await
        .map_err(|e| ServiceError::remap_unique_violation(e, "Coupon code already exists"))?;

        let mut saved_rules = Vec::with_capacity(rules.len());
        for (slug, kind, value) in rules {
            let rule = coupon_rule::ActiveModel {
                id: Set(Uuid::new_v4()),
                coupon_id: Set(model.id),
                product_slug: Set(slug),
                kind: Set(kind),
                value: Set(value),
            }
            .insert(&txn)
            .await?;
            saved_rules.push(rule);
        }
        txn.commit().await?;

        Ok(CouponWithRules {
            coupon: model,
            rules: saved_rules,
        })
    }

    #[instrument(skip(self, req))]
    pub async fn update(
        &self,
        id: Uuid,
        req: UpdateCouponRequest,
    ) -> Result<CouponWithRules, ServiceError> {
        let found = coupon::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Coupon {} not found", id)))?;

        let mut starts_at = found.starts_at;
        let mut ends_at = found.ends_at;
        let mut active: coupon::ActiveModel = found.into();

        if let Some(raw_code) = &req.code {
            let code = normalize_coupon_code(raw_code).ok_or_else(|| {
                ServiceError::ValidationError(
                    "Invalid coupon code (3-32 chars, A-Z 0-9 _ -)".into(),
                )
            })?;
            let clash = coupon::Entity::find()
                .filter(coupon::Column::Code.eq(&code))
                .filter(coupon::Column::Id.ne(id))
                .one(self.db.as_ref())
                .await?;
            if clash.is_some() {
                return Err(ServiceError::ValidationError(
                    "Coupon code already exists".into(),
                ));
            }
            active.code = Set(code);
        }
        if let Some(name) = req.name {
            active.name = Set(name.map(|n| n.trim().to_string()));
        }
        if let Some(is_active) = req.is_active {
            active.is_active = Set(is_active);
        }
        if let Some(v) = req.starts_at {
            starts_at = v;
            active.starts_at = Set(v);
        }
        if let Some(v) = req.ends_at {
            ends_at = v;
            active.ends_at = Set(v);
        }
        check_window(starts_at, ends_at)?;

        let new_rules = match &req.rules {
            Some(rules) => Some(self.resolve_rules(rules).await?),
            None => None,
        };

        let txn = self.db.begin().await?;
        active.updated_at = Set(Some(Utc::now()));
        let model = active.update(&txn).await?;

        if let Some(rules) = new_rules {
            coupon_rule::Entity::delete_many()
                .filter(coupon_rule::Column::CouponId.eq(id))
                .exec(&txn)
                .await?;
            for (slug, kind, value) in rules {
                coupon_rule::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    coupon_id: Set(id),
                    product_slug: Set(slug),
                    kind: Set(kind),
                    value: Set(value),
                }
                .insert(&txn)
                .await?;
            }
        }
        txn.commit().await?;

        let rules = coupon_rule::Entity::find()
            .filter(coupon_rule::Column::CouponId.eq(id))
            .all(self.db.as_ref())
            .await?;
        Ok(CouponWithRules {
            coupon: model,
            rules,
        })
    }

    pub async fn get(&self, id: Uuid) -> Result<CouponWithRules, ServiceError> {
        let found = coupon::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Coupon {} not found", id)))?;
        let rules = found
            .find_related(coupon_rule::Entity)
            .all(self.db.as_ref())
            .await?;
        Ok(CouponWithRules {
            coupon: found,
            rules,
        })
    }

    #[instrument(skip(self))]
    pub async fn list(
        &self,
        page: u64,
        limit: u64,
        q: Option<&str>,
    ) -> Result<CouponListResponse, ServiceError> {
        let page = page.max(1);
        let limit = limit.clamp(1, 100);

        let mut query = coupon::Entity::find().order_by_desc(coupon::Column::CreatedAt);
        if let Some(q) = q.map(str::trim).filter(|q| !q.is_empty()) {
            query = query.filter(
                Condition::any()
                    .add(coupon::Column::Code.contains(q))
                    .add(coupon::Column::Name.contains(q)),
            );
        }

        let paginator = query.paginate(self.db.as_ref(), limit);
        let total = paginator.num_items().await?;
        let coupons = paginator.fetch_page(page - 1).await?;

        let mut out = Vec::with_capacity(coupons.len());
        for c in coupons {
            let rules = c
                .find_related(coupon_rule::Entity)
                .all(self.db.as_ref())
                .await?;
            out.push(CouponWithRules { coupon: c, rules });
        }

        Ok(CouponListResponse {
            coupons: out,
            total,
            page,
            limit,
        })
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        let res = coupon::Entity::delete_by_id(id).exec(self.db.as_ref()).await?;
        if res.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!("Coupon {} not found", id)));
        }
        Ok(())
    }

    /// Validates rule inputs against the active catalog: every slug must
    /// resolve to an active product, values must be in range, and no product
    /// may appear twice.
    async fn resolve_rules(
        &self,
        rules: &[CouponRuleInput],
    ) -> Result<Vec<(String, RuleKind, i64)>, ServiceError> {
        if rules.is_empty() {
            return Err(ServiceError::ValidationError(
                "At least one product rule is required".into(),
            ));
        }

        let mut seen = BTreeSet::new();
        let mut out = Vec::with_capacity(rules.len());
        for rule in rules {
            let slug = normalize_slug(&rule.product_slug);
            if slug.is_empty() {
                return Err(ServiceError::ValidationError(
                    "Rule product slug is required".into(),
                ));
            }
            let exists = product::Entity::find()
                .filter(product::Column::Slug.eq(&slug))
                .filter(product::Column::IsActive.eq(true))
                .one(self.db.as_ref())
                .await?;
            if exists.is_none() {
                return Err(ServiceError::ValidationError(format!(
                    "Unknown or inactive product in rule: {}",
                    slug
                )));
            }
            match rule.kind {
                RuleKind::Percent if rule.value <= 0 || rule.value > 100 => {
                    return Err(ServiceError::ValidationError(format!(
                        "Percent rule for {} must be between 1 and 100",
                        slug
                    )));
                }
                RuleKind::Fixed if rule.value <= 0 => {
                    return Err(ServiceError::ValidationError(format!(
                        "Fixed rule for {} must be a positive amount",
                        slug
                    )));
                }
                _ => {}
            }
            if !seen.insert(slug.clone()) {
                return Err(ServiceError::ValidationError(format!(
                    "Duplicate rule for product {}",
                    slug
                )));
            }
            out.push((slug, rule.kind, rule.value));
        }
        Ok(out)
    }
}

fn check_window(
    starts_at: Option<DateTime<Utc>>,
    ends_at: Option<DateTime<Utc>>,
) -> Result<(), ServiceError> {
    if let (Some(start), Some(end)) = (starts_at, ends_at) {
        if end < start {
            return Err(ServiceError::ValidationError(
                "ends_at must be on or after starts_at".into(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_rejects_end_before_start() {
        let start = Utc::now();
        let end = start - chrono::Duration::hours(1);
        assert!(check_window(Some(start), Some(end)).is_err());
        assert!(check_window(Some(start), Some(start)).is_ok());
        assert!(check_window(None, Some(end)).is_ok());
    }
}
