//! Pricing engine: turns a cart, a customer and an optional coupon into an
//! authoritative price breakdown.
//!
//! Everything here is deterministic and reads persisted state without ever
//! mutating it. Order creation re-runs this engine server-side so client
//! totals are never trusted.

use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::config::AppConfig;
use crate::entities::order::{self, DiscountType, OrderStatus};
use crate::entities::user::{self, CustomerType};
use crate::entities::{coupon_rule::RuleKind, product};
use crate::errors::ServiceError;
use crate::normalize::normalize_slug;
use crate::services::coupons::CouponService;

/// One requested cart line, keyed by product slug.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CartItem {
    #[validate(length(min = 1, message = "Product slug is required"))]
    pub product_slug: String,
    #[validate(range(min = 1, max = 999, message = "Quantity must be between 1 and 999"))]
    pub qty: i32,
}

/// Upper bound on a merged line quantity. Keeps arithmetic on quantities
/// far away from `i32` overflow.
pub const MAX_LINE_QTY: i32 = 999;

/// A priced line within a quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct QuoteLine {
    pub product_id: Uuid,
    pub product_slug: String,
    pub name: String,
    pub unit_price_cents: i64,
    pub qty: i32,
    pub line_total_cents: i64,
    /// Filled in once a coupon has been applied.
    pub coupon_discount_cents: i64,
}

/// Full price breakdown for a prospective order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Quote {
    pub lines: Vec<QuoteLine>,
    pub subtotal_cents: i64,
    pub global_discount_cents: i64,
    pub coupon_discount_cents: i64,
    pub discount_cents: i64,
    pub discount_label: Option<String>,
    pub discount_type: DiscountType,
    pub coupon_code_applied: Option<String>,
    pub shipping_cents: i64,
    pub total_cents: i64,
}

pub struct QuoteService {
    db: Arc<DatabaseConnection>,
    config: Arc<AppConfig>,
    coupons: CouponService,
}

impl QuoteService {
    pub fn new(db: Arc<DatabaseConnection>, config: Arc<AppConfig>) -> Self {
        let coupons = CouponService::new(db.clone());
        Self {
            db,
            config,
            coupons,
        }
    }

    /// Prices a cart for the given customer.
    ///
    /// Steps: normalize and merge the cart, resolve active products, stock
    /// pre-check, bundle price override, global discount + largest-remainder
    /// allocation, coupon on the per-line remainder, shipping, total.
    #[instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn compute_quote(
        &self,
        user: &user::Model,
        cart: &[CartItem],
        coupon_code: Option<&str>,
    ) -> Result<Quote, ServiceError> {
        let merged = merge_cart(cart)?;

        let slugs: Vec<String> = merged.iter().map(|(slug, _)| slug.clone()).collect();
        let products = product::Entity::find()
            .filter(product::Column::Slug.is_in(slugs.clone()))
            .filter(product::Column::IsActive.eq(true))
            .all(self.db.as_ref())
            .await?;
        let by_slug: BTreeMap<String, product::Model> = products
            .into_iter()
            .map(|p| (normalize_slug(&p.slug), p))
            .collect();

        let missing: Vec<&str> = merged
            .iter()
            .filter(|(slug, _)| !by_slug.contains_key(slug))
            .map(|(slug, _)| slug.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(ServiceError::NotFound(format!(
                "Unknown product: {}",
                missing.join(", ")
            )));
        }

        // Stock pre-check only; the actual reservation happens at order
        // creation with conditional decrements.
        let mut availability = BTreeMap::new();
        for (slug, qty) in &merged {
            let p = &by_slug[slug];
            if *qty > p.stock_qty {
                availability.insert(slug.clone(), p.stock_qty);
            }
        }
        if !availability.is_empty() {
            return Err(ServiceError::InsufficientStock { availability });
        }

        let sf = &self.config.storefront;
        let bundle_slug = normalize_slug(&sf.bundle_slug);

        let mut lines: Vec<QuoteLine> = Vec::with_capacity(merged.len());
        for (slug, qty) in &merged {
            let p = &by_slug[slug];
            let is_bundle = *slug == bundle_slug;
            let unit_price_cents = if is_bundle {
                match user.customer_type {
                    CustomerType::Piva => sf.bundle_price_piva_cents,
                    CustomerType::Private => sf.bundle_price_private_cents,
                }
            } else {
                p.price_cents
            };
            if unit_price_cents < 0 {
                return Err(ServiceError::InternalError(format!(
                    "Negative price for product {}",
                    slug
                )));
            }
            lines.push(QuoteLine {
                product_id: p.id,
                product_slug: p.slug.clone(),
                name: p.name.clone(),
                unit_price_cents,
                qty: *qty,
                line_total_cents: unit_price_cents * i64::from(*qty),
                coupon_discount_cents: 0,
            });
        }

        let subtotal_cents: i64 = lines.iter().map(|l| l.line_total_cents).sum();

        // Bundle lines are excluded from the global-discount base.
        let discount_base_cents: i64 = lines
            .iter()
            .filter(|l| normalize_slug(&l.product_slug) != bundle_slug)
            .map(|l| l.line_total_cents)
            .sum();

        let (discount_rate, mut discount_label, mut discount_type) = match user.customer_type {
            CustomerType::Piva => (
                sf.piva_discount_rate,
                Some(format!(
                    "Sconto P.IVA -{}%",
                    (sf.piva_discount_rate * 100.0).round() as i64
                )),
                DiscountType::Piva15,
            ),
            CustomerType::Private => {
                if self.user_has_prior_orders(user.id).await? {
                    (0.0, None, DiscountType::None)
                } else {
                    (
                        sf.first_order_discount_rate,
                        Some(format!(
                            "Primo acquisto -{}%",
                            (sf.first_order_discount_rate * 100.0).round() as i64
                        )),
                        DiscountType::First10,
                    )
                }
            }
        };

        let global_discount_cents = (discount_base_cents as f64 * discount_rate).round() as i64;
        if global_discount_cents == 0 {
            discount_label = None;
            discount_type = DiscountType::None;
        }

        let eligible: Vec<(usize, i64)> = lines
            .iter()
            .enumerate()
            .filter(|(_, l)| normalize_slug(&l.product_slug) != bundle_slug)
            .map(|(i, l)| (i, l.line_total_cents))
            .collect();
        let mut alloc = vec![0i64; lines.len()];
        if global_discount_cents > 0 {
            for (idx, share) in
                allocate_largest_remainder(&eligible, discount_rate, global_discount_cents)
            {
                alloc[idx] = share;
            }
        }

        let mut coupon_code_applied = None;
        let mut coupon_discount_cents = 0i64;
        if let Some(raw) = coupon_code.filter(|c| !c.trim().is_empty()) {
            let (coupon, rules) = self
                .coupons
                .find_active_by_code(raw)
                .await?
                .ok_or_else(|| {
                    ServiceError::ValidationError("Invalid or expired coupon".into())
                })?;

            let rule_map: BTreeMap<String, (RuleKind, i64)> = rules
                .into_iter()
                .map(|r| (normalize_slug(&r.product_slug), (r.kind, r.value)))
                .collect();

            for (i, line) in lines.iter_mut().enumerate() {
                let Some((kind, value)) = rule_map.get(&normalize_slug(&line.product_slug)) else {
                    continue;
                };
                let remaining = (line.line_total_cents - alloc[i]).max(0);
                let raw_discount = match kind {
                    RuleKind::Percent => {
                        if *value <= 0 || *value > 100 {
                            return Err(ServiceError::InternalError(format!(
                                "Misconfigured coupon rule for {}",
                                line.product_slug
                            )));
                        }
                        ((remaining as f64) * (*value as f64) / 100.0).round() as i64
                    }
                    RuleKind::Fixed => {
                        if *value <= 0 {
                            return Err(ServiceError::InternalError(format!(
                                "Misconfigured coupon rule for {}",
                                line.product_slug
                            )));
                        }
                        value * i64::from(line.qty)
                    }
                };
                let line_discount = raw_discount.min(remaining);
                line.coupon_discount_cents = line_discount;
                coupon_discount_cents += line_discount;
            }

            if coupon_discount_cents == 0 {
                return Err(ServiceError::CouponNotApplicable(
                    "Coupon does not apply to any item in the cart".into(),
                ));
            }
            coupon_code_applied = Some(coupon.code);
        }

        let discount_cents = global_discount_cents + coupon_discount_cents;

        let label = if discount_cents > 0 {
            let mut parts = Vec::new();
            if global_discount_cents > 0 {
                if let Some(l) = discount_label {
                    parts.push(l);
                }
            }
            if let Some(code) = &coupon_code_applied {
                parts.push(format!("Coupon {}", code));
            }
            (!parts.is_empty()).then(|| parts.join(" + "))
        } else {
            None
        };

        let discounted_total_cents = (subtotal_cents - discount_cents).max(0);
        let shipping_cents = if discounted_total_cents >= sf.free_shipping_threshold_cents {
            0
        } else {
            sf.shipping_fee_cents
        };

        Ok(Quote {
            lines,
            subtotal_cents,
            global_discount_cents,
            coupon_discount_cents,
            discount_cents,
            discount_label: label,
            discount_type,
            coupon_code_applied,
            shipping_cents,
            total_cents: discounted_total_cents + shipping_cents,
        })
    }

    /// True when the user already has an order in any non-void status.
    /// Cancelled orders do not count, so a cancelled first attempt keeps
    /// the first-purchase discount available.
    async fn user_has_prior_orders(&self, user_id: Uuid) -> Result<bool, ServiceError> {
        let count = order::Entity::find()
            .filter(order::Column::UserId.eq(user_id))
            .filter(order::Column::Status.ne(OrderStatus::Cancelled))
            .count(self.db.as_ref())
            .await?;
        Ok(count > 0)
    }
}

/// Merges duplicate cart lines by normalized slug, preserving first-seen
/// order, and validates quantities.
pub fn merge_cart(cart: &[CartItem]) -> Result<Vec<(String, i32)>, ServiceError> {
    if cart.is_empty() {
        return Err(ServiceError::ValidationError("Cart is empty".into()));
    }
    let mut merged: Vec<(String, i32)> = Vec::new();
    for item in cart {
        let slug = normalize_slug(&item.product_slug);
        if slug.is_empty() {
            return Err(ServiceError::ValidationError(
                "Product slug is required".into(),
            ));
        }
        if !(1..=MAX_LINE_QTY).contains(&item.qty) {
            return Err(ServiceError::ValidationError(format!(
                "Invalid quantity for {}",
                slug
            )));
        }
        match merged.iter_mut().find(|(s, _)| *s == slug) {
            Some((_, qty)) => {
                *qty = qty
                    .checked_add(item.qty)
                    .filter(|total| *total <= MAX_LINE_QTY)
                    .ok_or_else(|| {
                        ServiceError::ValidationError(format!("Quantity too large for {}", slug))
                    })?;
            }
            None => merged.push((slug, item.qty)),
        }
    }
    Ok(merged)
}

/// Splits `total` across the given `(index, line_total)` shares in proportion
/// to `rate`, using largest-remainder rounding: each line gets the floor of
/// its exact share, then leftover cents go one at a time to the lines with
/// the largest fractional part (ties broken by input order). Each line is
/// capped at its own total.
pub fn allocate_largest_remainder(
    shares: &[(usize, i64)],
    rate: f64,
    total: i64,
) -> Vec<(usize, i64)> {
    if total <= 0 || shares.is_empty() {
        return Vec::new();
    }

    let mut rows: Vec<(usize, i64, i64, f64)> = shares
        .iter()
        .map(|&(idx, line_total)| {
            let raw = line_total as f64 * rate;
            let floor = raw.floor() as i64;
            (idx, line_total, floor, raw - raw.floor())
        })
        .collect();

    let sum_floor: i64 = rows.iter().map(|r| r.2).sum();
    let mut remaining = total - sum_floor;

    // Stable sort keeps input order among equal fractions.
    rows.sort_by(|a, b| b.3.partial_cmp(&a.3).unwrap_or(std::cmp::Ordering::Equal));

    rows.into_iter()
        .map(|(idx, line_total, floor, _)| {
            let mut share = floor;
            if remaining > 0 {
                share += 1;
                remaining -= 1;
            }
            (idx, share.min(line_total))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use proptest::prelude::*;

    fn cart(items: &[(&str, i32)]) -> Vec<CartItem> {
        items
            .iter()
            .map(|(slug, qty)| CartItem {
                product_slug: slug.to_string(),
                qty: *qty,
            })
            .collect()
    }

    #[test]
    fn merge_cart_sums_duplicates_in_order() {
        let merged =
            merge_cart(&cart(&[("spray-100", 1), ("Serum", 2), ("SPRAY-100", 3)])).unwrap();
        assert_eq!(
            merged,
            vec![("spray-100".to_string(), 4), ("serum".to_string(), 2)]
        );
    }

    #[test]
    fn merge_cart_rejects_empty_and_bad_qty() {
        assert_matches!(merge_cart(&[]), Err(ServiceError::ValidationError(_)));
        assert_matches!(
            merge_cart(&cart(&[("x-1", 0)])),
            Err(ServiceError::ValidationError(_))
        );
    }

    #[test]
    fn merge_cart_caps_quantities_instead_of_overflowing() {
        assert_matches!(
            merge_cart(&cart(&[("x-1", i32::MAX)])),
            Err(ServiceError::ValidationError(_))
        );
        assert_matches!(
            merge_cart(&cart(&[("x-1", i32::MAX), ("x-1", 1)])),
            Err(ServiceError::ValidationError(_))
        );
        assert_matches!(
            merge_cart(&cart(&[("x-1", 999), ("x-1", 1)])),
            Err(ServiceError::ValidationError(_))
        );
        let merged = merge_cart(&cart(&[("x-1", 500), ("x-1", 499)])).unwrap();
        assert_eq!(merged, vec![("x-1".to_string(), 999)]);
    }

    #[test]
    fn allocation_sums_to_total_exactly() {
        let shares = vec![(0, 1790), (1, 1790)];
        let alloc = allocate_largest_remainder(&shares, 0.10, 358);
        let sum: i64 = alloc.iter().map(|(_, v)| v).sum();
        assert_eq!(sum, 358);
    }

    #[test]
    fn allocation_caps_each_line_at_its_total() {
        // Tiny line cannot absorb more than itself.
        let shares = vec![(0, 1), (1, 10_000)];
        let alloc = allocate_largest_remainder(&shares, 0.15, 1500);
        for (idx, share) in &alloc {
            let line = shares.iter().find(|(i, _)| i == idx).unwrap().1;
            assert!(*share <= line);
        }
    }

    #[test]
    fn allocation_breaks_fraction_ties_by_input_order() {
        // Equal lines, odd total: the extra cent lands on the first line.
        let shares = vec![(0, 1000), (1, 1000)];
        let alloc = allocate_largest_remainder(&shares, 0.0105, 21);
        assert_eq!(alloc, vec![(0, 11), (1, 10)]);
    }

    #[test]
    fn zero_total_allocates_nothing() {
        assert!(allocate_largest_remainder(&[(0, 500)], 0.10, 0).is_empty());
    }

    proptest! {
        #[test]
        fn allocation_never_over_or_under_allocates(
            lines in prop::collection::vec(1i64..50_000, 1..8),
            rate_pct in 1u32..40,
        ) {
            let rate = rate_pct as f64 / 100.0;
            let base: i64 = lines.iter().sum();
            let total = (base as f64 * rate).round() as i64;
            let shares: Vec<(usize, i64)> =
                lines.iter().copied().enumerate().collect();
            let alloc = allocate_largest_remainder(&shares, rate, total);
            let sum: i64 = alloc.iter().map(|(_, v)| v).sum();
            // Caps can only shave cents off, never add them.
            prop_assert!(sum <= total);
            // Without any cap hit the sum is exact; caps require a line
            // whose floor share plus one exceeds the line itself, which
            // cannot happen for rates below 100%.
            prop_assert_eq!(sum, total);
        }
    }
}
