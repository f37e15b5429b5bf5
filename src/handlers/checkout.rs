use axum::{extract::State, response::Response};
use serde::Deserialize;
use utoipa::ToSchema;

use super::common::{success_response, AppJson};
use crate::{
    auth::AuthenticatedContext,
    errors::ServiceError,
    services::checkout::{shipping_methods, CartLineItem, ShippingMethod, Totals},
    AppState,
};

/// Cart to be priced by the server.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
    pub items: Vec<CartLineItem>,
    #[schema(example = "standard")]
    pub shipping_method: String,
    #[serde(default)]
    pub coupon_code: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/shipping-methods",
    summary = "List shipping methods",
    responses(
        (status = 200, description = "Available shipping methods", body = [ShippingMethod]),
    ),
    tag = "checkout"
)]
pub async fn list_shipping_methods() -> Response {
    success_response(shipping_methods())
}

/// Price a cart with the same rules order placement uses
#[utoipa::path(
    post,
    path = "/api/checkout/quote",
    summary = "Quote checkout totals",
    request_body = QuoteRequest,
    responses(
        (status = 200, description = "Derived totals", body = Totals),
        (status = 400, description = "Invalid cart or coupon rejected", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown coupon code", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "checkout"
)]
pub async fn quote(
    State(state): State<AppState>,
    _ctx: AuthenticatedContext,
    AppJson(request): AppJson<QuoteRequest>,
) -> Result<Response, ServiceError> {
    let totals = state
        .services
        .orders
        .quote(
            request.items,
            &request.shipping_method,
            request.coupon_code.as_deref(),
        )
        .await?;
    Ok(success_response(totals))
}
