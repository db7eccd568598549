pub use sea_orm_migration::prelude::*;

mod m20240301_000001_create_users_table;
mod m20240301_000002_create_products_table;
mod m20240301_000003_create_coupons_tables;
mod m20240301_000004_create_addresses_table;
mod m20240301_000005_create_orders_tables;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240301_000001_create_users_table::Migration),
            Box::new(m20240301_000002_create_products_table::Migration),
            Box::new(m20240301_000003_create_coupons_tables::Migration),
            Box::new(m20240301_000004_create_addresses_table::Migration),
            Box::new(m20240301_000005_create_orders_tables::Migration),
        ]
    }
}
