use axum::{extract::State, response::Response};
use uuid::Uuid;

use super::common::{
    created_response, success_response, validate_input, AppJson, AppPath, AppQuery,
    PaginationParams,
};
use crate::{
    auth::AuthenticatedContext,
    errors::ServiceError,
    services::{
        checkout::OrderSubmission,
        orders::{OrderResponse, UpdateOrderStatusRequest},
    },
    AppState, PaginatedResponse,
};

/// Place an order from a finalized checkout
#[utoipa::path(
    post,
    path = "/api/orders",
    summary = "Create order",
    description = "Re-prices the submission on the server (coupon included) and persists it. Submitted figures that disagree with the server's are rejected.",
    request_body = OrderSubmission,
    responses(
        (status = 201, description = "Order created", body = OrderResponse,
            headers(("X-Request-Id" = String, description = "Unique request id"))
        ),
        (status = 400, description = "Invalid submission, totals mismatch or coupon rejected", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown coupon code", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order number could not be allocated", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    ctx: AuthenticatedContext,
    AppJson(submission): AppJson<OrderSubmission>,
) -> Result<Response, ServiceError> {
    let order = state.services.orders.create_order(&ctx, submission).await?;
    Ok(created_response(order))
}

#[utoipa::path(
    get,
    path = "/api/orders",
    summary = "List my orders",
    responses(
        (status = 200, description = "The caller's orders, newest first", body = [OrderResponse]),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    ctx: AuthenticatedContext,
) -> Result<Response, ServiceError> {
    let orders = state.services.orders.list_orders(&ctx).await?;
    Ok(success_response(orders))
}

#[utoipa::path(
    get,
    path = "/api/orders/{id}",
    summary = "Get order",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order", body = OrderResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Not the owner", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    ctx: AuthenticatedContext,
    AppPath(id): AppPath<Uuid>,
) -> Result<Response, ServiceError> {
    let order = state.services.orders.get_order(&ctx, id).await?;
    Ok(success_response(order))
}

#[utoipa::path(
    patch,
    path = "/api/admin/orders/{id}/status",
    summary = "Update order fulfilment",
    description = "Sets status and shipping details. Moving to `shipped` stamps `shippedAt` when none is given or stored.",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Updated order", body = OrderResponse),
        (status = 400, description = "Invalid fields", body = crate::errors::ErrorResponse),
        (status = 403, description = "Admin access required", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "admin"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    ctx: AuthenticatedContext,
    AppPath(id): AppPath<Uuid>,
    AppJson(patch): AppJson<UpdateOrderStatusRequest>,
) -> Result<Response, ServiceError> {
    validate_input(&patch)?;
    let order = state
        .services
        .orders
        .update_order_status(&ctx, id, patch)
        .await?;
    Ok(success_response(order))
}

#[utoipa::path(
    get,
    path = "/api/admin/orders",
    summary = "List all orders",
    params(PaginationParams),
    responses(
        (status = 200, description = "Page of orders, newest first", body = PaginatedResponse<OrderResponse>),
        (status = 403, description = "Admin access required", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "admin"
)]
pub async fn list_all_orders(
    State(state): State<AppState>,
    ctx: AuthenticatedContext,
    AppQuery(params): AppQuery<PaginationParams>,
) -> Result<Response, ServiceError> {
    let page = state
        .services
        .orders
        .list_all_orders(&ctx, params.page, params.limit)
        .await?;
    Ok(success_response(page))
}
