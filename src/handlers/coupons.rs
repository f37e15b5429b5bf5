use axum::{extract::State, response::Response};
use uuid::Uuid;

use super::common::{
    created_response, no_content_response, success_response, validate_input, AppJson, AppPath,
};
use crate::{
    auth::AuthenticatedContext,
    errors::ServiceError,
    services::coupons::{
        CouponResponse, CreateCouponRequest, UpdateCouponRequest, ValidateCouponRequest,
        ValidateCouponResponse,
    },
    AppState,
};

/// Check a coupon code against the current cart total
#[utoipa::path(
    post,
    path = "/api/cart/validate-coupon",
    summary = "Validate coupon",
    description = "Checks a coupon against the cart total and returns the discount it would grant. Does not consume a use.",
    request_body = ValidateCouponRequest,
    responses(
        (status = 200, description = "Coupon applies", body = ValidateCouponResponse),
        (status = 400, description = "Inactive, expired, exhausted or below minimum", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown coupon code", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "coupons"
)]
pub async fn validate_coupon(
    State(state): State<AppState>,
    _ctx: AuthenticatedContext,
    AppJson(request): AppJson<ValidateCouponRequest>,
) -> Result<Response, ServiceError> {
    let result = state
        .services
        .coupons
        .validate(&request.code, request.cart_total)
        .await?;
    Ok(success_response(result))
}

#[utoipa::path(
    get,
    path = "/api/admin/coupons",
    summary = "List coupons",
    responses(
        (status = 200, description = "All coupons, newest first", body = [CouponResponse]),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Admin access required", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "admin"
)]
pub async fn list_coupons(
    State(state): State<AppState>,
    ctx: AuthenticatedContext,
) -> Result<Response, ServiceError> {
    ctx.require_admin()?;
    let coupons = state.services.coupons.list().await?;
    Ok(success_response(coupons))
}

#[utoipa::path(
    post,
    path = "/api/admin/coupons",
    summary = "Create coupon",
    request_body = CreateCouponRequest,
    responses(
        (status = 201, description = "Coupon created", body = CouponResponse),
        (status = 400, description = "Invalid coupon fields", body = crate::errors::ErrorResponse),
        (status = 403, description = "Admin access required", body = crate::errors::ErrorResponse),
        (status = 409, description = "Coupon code already exists", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "admin"
)]
pub async fn create_coupon(
    State(state): State<AppState>,
    ctx: AuthenticatedContext,
    AppJson(request): AppJson<CreateCouponRequest>,
) -> Result<Response, ServiceError> {
    ctx.require_admin()?;
    validate_input(&request)?;
    let coupon = state.services.coupons.create(request).await?;
    Ok(created_response(coupon))
}

#[utoipa::path(
    get,
    path = "/api/admin/coupons/{id}",
    summary = "Get coupon",
    params(("id" = Uuid, Path, description = "Coupon ID")),
    responses(
        (status = 200, description = "Coupon", body = CouponResponse),
        (status = 403, description = "Admin access required", body = crate::errors::ErrorResponse),
        (status = 404, description = "Coupon not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "admin"
)]
pub async fn get_coupon(
    State(state): State<AppState>,
    ctx: AuthenticatedContext,
    AppPath(id): AppPath<Uuid>,
) -> Result<Response, ServiceError> {
    ctx.require_admin()?;
    let coupon = state.services.coupons.get(id).await?;
    Ok(success_response(coupon))
}

#[utoipa::path(
    patch,
    path = "/api/admin/coupons/{id}",
    summary = "Update coupon",
    params(("id" = Uuid, Path, description = "Coupon ID")),
    request_body = UpdateCouponRequest,
    responses(
        (status = 200, description = "Updated coupon", body = CouponResponse),
        (status = 400, description = "Invalid coupon fields", body = crate::errors::ErrorResponse),
        (status = 403, description = "Admin access required", body = crate::errors::ErrorResponse),
        (status = 404, description = "Coupon not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Coupon code already exists", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "admin"
)]
pub async fn update_coupon(
    State(state): State<AppState>,
    ctx: AuthenticatedContext,
    AppPath(id): AppPath<Uuid>,
    AppJson(patch): AppJson<UpdateCouponRequest>,
) -> Result<Response, ServiceError> {
    ctx.require_admin()?;
    validate_input(&patch)?;
    let coupon = state.services.coupons.update(id, patch).await?;
    Ok(success_response(coupon))
}

#[utoipa::path(
    delete,
    path = "/api/admin/coupons/{id}",
    summary = "Delete coupon",
    description = "Orders keep the code they were placed with.",
    params(("id" = Uuid, Path, description = "Coupon ID")),
    responses(
        (status = 204, description = "Coupon deleted"),
        (status = 403, description = "Admin access required", body = crate::errors::ErrorResponse),
        (status = 404, description = "Coupon not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "admin"
)]
pub async fn delete_coupon(
    State(state): State<AppState>,
    ctx: AuthenticatedContext,
    AppPath(id): AppPath<Uuid>,
) -> Result<Response, ServiceError> {
    ctx.require_admin()?;
    state.services.coupons.delete(id).await?;
    Ok(no_content_response())
}
