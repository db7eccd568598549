use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "Bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront API",
        version = "0.3.0",
        description = r#"
Storefront backend: catalog, server-side cart pricing, orders with
atomic stock reservation, hosted card payments and manual bank
transfers, plus a small back office.

## Authentication

Shopper and admin endpoints require a JWT bearer token:

```
Authorization: Bearer <token>
```

Admin endpoints additionally require the `admin` role.

## Money

All monetary amounts are integer euro cents.
        "#
    ),
    servers(
        (url = "http://localhost:3000", description = "Local development")
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Accounts and sessions"),
        (name = "Products", description = "Public catalog"),
        (name = "Orders", description = "Quotes and orders"),
        (name = "Addresses", description = "Saved shipping addresses"),
        (name = "Payments", description = "Card checkout and bank transfers"),
        (name = "Webhooks", description = "Payment provider callbacks"),
        (name = "Admin", description = "Back office")
    ),
    paths(
        // Auth
        crate::handlers::auth::register,
        crate::handlers::auth::login,
        crate::handlers::auth::me,
        crate::handlers::auth::update_me,
        crate::handlers::auth::change_password,
        crate::handlers::auth::request_password_reset,
        crate::handlers::auth::confirm_password_reset,

        // Catalog
        crate::handlers::products::list_products,
        crate::handlers::products::get_product,
        crate::handlers::products::admin_list_products,
        crate::handlers::products::admin_get_product,
        crate::handlers::products::create_product,
        crate::handlers::products::update_product,
        crate::handlers::products::delete_product,

        // Coupons
        crate::handlers::coupons::list_coupons,
        crate::handlers::coupons::get_coupon,
        crate::handlers::coupons::create_coupon,
        crate::handlers::coupons::update_coupon,
        crate::handlers::coupons::delete_coupon,

        // Addresses
        crate::handlers::addresses::list_addresses,
        crate::handlers::addresses::create_address,
        crate::handlers::addresses::set_default_address,

        // Orders
        crate::handlers::orders::quote_cart,
        crate::handlers::orders::create_order,
        crate::handlers::orders::list_my_orders,
        crate::handlers::orders::get_my_order,
        crate::handlers::orders::admin_list_orders,
        crate::handlers::orders::admin_get_order,
        crate::handlers::orders::admin_set_status,
        crate::handlers::orders::admin_cancel_order,
        crate::handlers::orders::admin_stats,
        crate::handlers::orders::admin_order_years,

        // Payments
        crate::handlers::payments::create_checkout_session,
        crate::handlers::payments::send_bank_instructions,
        crate::handlers::webhooks::stripe_webhook,
    ),
    components(
        schemas(
            crate::errors::ErrorResponse,
            crate::entities::product::Model,
            crate::entities::coupon::Model,
            crate::entities::coupon_rule::Model,
            crate::entities::coupon_rule::RuleKind,
            crate::entities::address::Model,
            crate::entities::order::Model,
            crate::entities::order::OrderStatus,
            crate::entities::order::DiscountType,
            crate::entities::order_item::Model,
            crate::entities::user::CustomerType,
            crate::entities::user::UserRole,
            crate::handlers::auth::LoginRequest,
            crate::handlers::auth::ChangePasswordRequest,
            crate::handlers::auth::PasswordResetRequest,
            crate::handlers::auth::PasswordResetConfirm,
            crate::handlers::auth::UserProfile,
            crate::handlers::auth::AuthResponse,
            crate::auth::RegisterRequest,
            crate::auth::UpdateProfileRequest,
            crate::normalize::ShippingAddress,
            crate::services::quote::CartItem,
            crate::services::quote::QuoteLine,
            crate::services::quote::Quote,
            crate::services::products::CreateProductRequest,
            crate::services::products::UpdateProductRequest,
            crate::services::products::ProductListResponse,
            crate::services::coupons::CouponRuleInput,
            crate::services::coupons::CreateCouponRequest,
            crate::services::coupons::UpdateCouponRequest,
            crate::services::coupons::CouponWithRules,
            crate::services::coupons::CouponListResponse,
            crate::services::addresses::CreateAddressRequest,
            crate::services::orders::CreateOrderRequest,
            crate::services::orders::OrderWithItems,
            crate::services::orders::CreatedOrder,
            crate::services::orders::OrderListResponse,
            crate::services::order_status::ShipmentInput,
            crate::services::stats::StatsRange,
            crate::services::stats::DashboardStats,
            crate::services::stats::RevenueStats,
            crate::handlers::orders::QuoteRequest,
            crate::handlers::orders::SetStatusRequest,
            crate::payments::CheckoutSessionRequest,
            crate::payments::CheckoutSessionResponse,
            crate::payments::BankInstructionsRequest,
            crate::payments::BankInstructionsResponse,
        )
    )
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_document_generates() {
        let openapi = ApiDocV1::openapi();
        let json = serde_json::to_string(&openapi).unwrap();
        assert!(json.contains("Storefront API"));
        assert!(json.contains("/api/v1/orders/quote"));
    }
}
