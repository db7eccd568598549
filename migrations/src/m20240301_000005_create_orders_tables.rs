use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Orders::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Orders::Id).uuid().primary_key().not_null())
                    .col(
                        ColumnDef::new(Orders::PublicId)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Orders::UserId).uuid().not_null())
                    .col(
                        ColumnDef::new(Orders::Status)
                            .string()
                            .not_null()
                            .default("pending_payment"),
                    )
                    .col(
                        ColumnDef::new(Orders::SubtotalCents)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Orders::DiscountCents)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Orders::GlobalDiscountCents)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Orders::CouponDiscountCents)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Orders::CouponCodeApplied).string().null())
                    .col(ColumnDef::new(Orders::DiscountLabel).string().null())
                    .col(
                        ColumnDef::new(Orders::DiscountType)
                            .string()
                            .not_null()
                            .default("none"),
                    )
                    .col(
                        ColumnDef::new(Orders::ShippingCents)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Orders::TotalCents)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Orders::ShippingAddress).json().null())
                    .col(ColumnDef::new(Orders::ShippingAddressId).uuid().null())
                    .col(ColumnDef::new(Orders::CarrierName).string().null())
                    .col(ColumnDef::new(Orders::TrackingCode).string().null())
                    .col(ColumnDef::new(Orders::TrackingUrl).string().null())
                    .col(ColumnDef::new(Orders::ShippedAt).timestamp().null())
                    .col(
                        ColumnDef::new(Orders::ShipmentNotifiedAt)
                            .timestamp()
                            .null(),
                    )
                    .col(ColumnDef::new(Orders::PaymentProvider).string().null())
                    .col(
                        ColumnDef::new(Orders::StripeCheckoutSessionId)
                            .string()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Orders::StripePaymentIntentId)
                            .string()
                            .null(),
                    )
                    .col(ColumnDef::new(Orders::PaidAt).timestamp().null())
                    .col(ColumnDef::new(Orders::PaymentEmailSentAt).timestamp().null())
                    .col(ColumnDef::new(Orders::BankEmailSentAt).timestamp().null())
                    .col(
                        ColumnDef::new(Orders::BankEmailLastSentAt)
                            .timestamp()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Orders::BankEmailSendCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Orders::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(Orders::UpdatedAt).timestamp().null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_orders_user_status_created")
                    .table(Orders::Table)
                    .col(Orders::UserId)
                    .col(Orders::Status)
                    .col(Orders::CreatedAt)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(OrderItems::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OrderItems::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(ColumnDef::new(OrderItems::OrderId).uuid().not_null())
                    .col(ColumnDef::new(OrderItems::ProductId).uuid().null())
                    .col(ColumnDef::new(OrderItems::ProductSlug).string().not_null())
                    .col(ColumnDef::new(OrderItems::Name).string().not_null())
                    .col(
                        ColumnDef::new(OrderItems::UnitPriceCents)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(OrderItems::Qty).integer().not_null())
                    .col(
                        ColumnDef::new(OrderItems::LineTotalCents)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OrderItems::CouponDiscountCents)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_order_items_order")
                            .from(OrderItems::Table, OrderItems::OrderId)
                            .to(Orders::Table, Orders::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(OrderCounters::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OrderCounters::Year)
                            .integer()
                            .primary_key()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OrderCounters::Seq)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(OrderCounters::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(OrderItems::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Orders::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Orders {
    Table,
    Id,
    PublicId,
    UserId,
    Status,
    SubtotalCents,
    DiscountCents,
    GlobalDiscountCents,
    CouponDiscountCents,
    CouponCodeApplied,
    DiscountLabel,
    DiscountType,
    ShippingCents,
    TotalCents,
    ShippingAddress,
    ShippingAddressId,
    CarrierName,
    TrackingCode,
    TrackingUrl,
    ShippedAt,
    ShipmentNotifiedAt,
    PaymentProvider,
    StripeCheckoutSessionId,
    StripePaymentIntentId,
    PaidAt,
    PaymentEmailSentAt,
    BankEmailSentAt,
    BankEmailLastSentAt,
    BankEmailSendCount,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum OrderItems {
    Table,
    Id,
    OrderId,
    ProductId,
    ProductSlug,
    Name,
    UnitPriceCents,
    Qty,
    LineTotalCents,
    CouponDiscountCents,
}

#[derive(Iden)]
enum OrderCounters {
    Table,
    Year,
    Seq,
}
