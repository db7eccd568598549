pub mod addresses;
pub mod auth;
pub mod common;
pub mod coupons;
pub mod orders;
pub mod payments;
pub mod products;
pub mod webhooks;

pub use crate::AppState;
