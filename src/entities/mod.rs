//! SeaORM entities for the storefront schema.

pub mod address;
pub mod coupon;
pub mod coupon_rule;
pub mod order;
pub mod order_counter;
pub mod order_item;
pub mod product;
pub mod user;
