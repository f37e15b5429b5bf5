//! Storefront API Library
//!
//! Checkout pricing, coupon validation and order placement for the storefront.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod handlers;
pub mod migrator;
pub mod openapi;
pub mod services;
pub mod tracing;

use std::{sync::Arc, time::Duration};

use axum::{
    extract::FromRef,
    http::HeaderValue,
    middleware,
    routing::{get, patch, post},
    Router,
};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use utoipa::ToSchema;

use crate::auth::AuthService;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub auth: Arc<AuthService>,
    pub services: handlers::AppServices,
}

impl AppState {
    /// Wires services, auth and configuration around an open connection.
    pub fn new(db: Arc<DatabaseConnection>, config: config::AppConfig) -> Self {
        let auth = Arc::new(AuthService::new(auth::AuthConfig::from(&config)));
        let services = handlers::AppServices::new(db.clone(), config.tax_policy());
        Self {
            db,
            config,
            auth,
            services,
        }
    }
}

impl FromRef<AppState> for Arc<AuthService> {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

pub fn api_routes() -> Router<AppState> {
    let storefront = Router::new()
        .route("/shipping-methods", get(handlers::checkout::list_shipping_methods))
        .route("/checkout/quote", post(handlers::checkout::quote))
        .route("/cart/validate-coupon", post(handlers::coupons::validate_coupon))
        .route(
            "/orders",
            get(handlers::orders::list_orders).post(handlers::orders::create_order),
        )
        .route("/orders/:id", get(handlers::orders::get_order));

    let admin = Router::new()
        .route("/orders", get(handlers::orders::list_all_orders))
        .route(
            "/orders/:id/status",
            patch(handlers::orders::update_order_status),
        )
        .route(
            "/coupons",
            get(handlers::coupons::list_coupons).post(handlers::coupons::create_coupon),
        )
        .route(
            "/coupons/:id",
            get(handlers::coupons::get_coupon)
                .patch(handlers::coupons::update_coupon)
                .delete(handlers::coupons::delete_coupon),
        );

    storefront.nest("/admin", admin)
}

/// CORS from configured origins, falling back to permissive where allowed.
pub fn cors_layer(cfg: &config::AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = cfg
        .cors_origins()
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    if !origins.is_empty() {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    } else if cfg.should_allow_permissive_cors() {
        ::tracing::info!(
            environment = %cfg.environment,
            "Using permissive CORS because explicit origins were not configured"
        );
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
    }
}

/// Full application: API, health, Swagger UI and the HTTP middleware stack.
pub fn app_router(state: AppState) -> Router {
    let timeout = Duration::from_secs(state.config.request_timeout_secs);
    let cors = cors_layer(&state.config);

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .nest("/api", api_routes())
        .merge(openapi::swagger_ui())
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(TraceLayer::new_for_http().make_span_with(crate::tracing::RequestSpanMaker))
                .layer(middleware::from_fn(crate::tracing::request_id_scope))
                .layer(cors)
                .layer(TimeoutLayer::new(timeout))
                .layer(CompressionLayer::new()),
        )
        .with_state(state)
}
