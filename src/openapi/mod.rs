use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront API",
        version = "1.0.0",
        description = r#"
# Storefront Checkout API

Checkout pricing, coupon validation and order placement for the storefront.

## Authentication

Every route except `/health` and `/api/shipping-methods` requires a bearer token:

```
Authorization: Bearer <your-jwt-token>
```

Tokens carrying the `admin` role unlock the `/api/admin` routes.

## Money

Amounts are decimal strings with two fractional digits, e.g. `"110.00"`.

## Errors

```json
{
  "error": "Bad Request",
  "message": "Minimum purchase amount of 50.00 required",
  "code": "BELOW_MINIMUM",
  "requestId": "6f1c2a4e-0d5b-4b55-9d8e-3f3b1f6f0c11",
  "timestamp": "2026-10-16T10:30:00Z"
}
```

`code` is present on coupon rejections only.
        "#,
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "checkout", description = "Shipping methods and cart pricing"),
        (name = "coupons", description = "Coupon validation"),
        (name = "orders", description = "Order placement and history"),
        (name = "admin", description = "Coupon management and fulfilment"),
        (name = "health", description = "Health check endpoints")
    ),
    paths(
        crate::handlers::checkout::list_shipping_methods,
        crate::handlers::checkout::quote,

        crate::handlers::coupons::validate_coupon,
        crate::handlers::coupons::list_coupons,
        crate::handlers::coupons::create_coupon,
        crate::handlers::coupons::get_coupon,
        crate::handlers::coupons::update_coupon,
        crate::handlers::coupons::delete_coupon,

        crate::handlers::orders::create_order,
        crate::handlers::orders::list_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::update_order_status,
        crate::handlers::orders::list_all_orders,

        crate::handlers::health::health_check,
    ),
    components(
        schemas(
            crate::services::checkout::ShippingMethod,
            crate::services::checkout::ShippingAddress,
            crate::services::checkout::PaymentMethodSelection,
            crate::services::checkout::CartLineItem,
            crate::services::checkout::Totals,
            crate::services::checkout::OrderSubmission,
            crate::handlers::checkout::QuoteRequest,

            crate::entities::coupon::DiscountType,
            crate::services::coupons::ValidateCouponRequest,
            crate::services::coupons::ValidateCouponResponse,
            crate::services::coupons::CouponSummary,
            crate::services::coupons::CouponResponse,
            crate::services::coupons::CreateCouponRequest,
            crate::services::coupons::UpdateCouponRequest,

            crate::entities::order::OrderStatus,
            crate::services::orders::OrderResponse,
            crate::services::orders::OrderItemResponse,
            crate::services::orders::UpdateOrderStatusRequest,

            crate::handlers::health::HealthResponse,
            crate::handlers::health::ComponentStatus,
            crate::errors::ErrorResponse
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

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

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
