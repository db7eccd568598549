//! Domain services. Handlers stay thin; everything with business meaning
//! lives here.

pub mod addresses;
pub mod coupons;
pub mod order_status;
pub mod orders;
pub mod products;
pub mod quote;
pub mod stats;
