use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Coupons::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Coupons::Id).uuid().primary_key().not_null())
                    .col(
                        ColumnDef::new(Coupons::Code)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Coupons::Name).string().null())
                    .col(
                        ColumnDef::new(Coupons::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(ColumnDef::new(Coupons::StartsAt).timestamp().null())
                    .col(ColumnDef::new(Coupons::EndsAt).timestamp().null())
                    .col(ColumnDef::new(Coupons::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(Coupons::UpdatedAt).timestamp().null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(CouponRules::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CouponRules::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(ColumnDef::new(CouponRules::CouponId).uuid().not_null())
                    .col(ColumnDef::new(CouponRules::ProductSlug).string().not_null())
                    .col(ColumnDef::new(CouponRules::Kind).string().not_null())
                    .col(
                        ColumnDef::new(CouponRules::Value)
                            .big_integer()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_coupon_rules_coupon")
                            .from(CouponRules::Table, CouponRules::CouponId)
                            .to(Coupons::Table, Coupons::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // One rule per product per coupon
        manager
            .create_index(
                Index::create()
                    .name("uq_coupon_rules_coupon_product")
                    .table(CouponRules::Table)
                    .col(CouponRules::CouponId)
                    .col(CouponRules::ProductSlug)
                    .unique()
                    .if_not_exists()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(CouponRules::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Coupons::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Coupons {
    Table,
    Id,
    Code,
    Name,
    IsActive,
    StartsAt,
    EndsAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum CouponRules {
    Table,
    Id,
    CouponId,
    ProductSlug,
    Kind,
    Value,
}
