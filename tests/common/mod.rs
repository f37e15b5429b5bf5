#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    response::Response,
    Router,
};
use http_body_util::BodyExt;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use storefront_api::{
    app_router,
    auth::ADMIN_ROLE,
    config::AppConfig,
    db,
    services::{
        order_numbers::{OrderNumberGenerator, RandomOrderNumbers},
        orders::OrderService,
    },
    AppState,
};
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

pub const TEST_JWT_SECRET: &str =
    "k7Qw2Zr9Lm4Xp8Vt1Ns6Hd3Jf0Gb5Yc7Ue2Ri9Oa4Sq8Wl1Tm6Pn3Kz0Xv5By7Cj2";

/// Hands out a fixed list of candidates, repeating the last one when exhausted.
pub struct ScriptedOrderNumbers {
    candidates: Mutex<VecDeque<String>>,
    last: Mutex<String>,
}

impl ScriptedOrderNumbers {
    pub fn new(candidates: &[&str]) -> Self {
        Self {
            candidates: Mutex::new(candidates.iter().map(|c| c.to_string()).collect()),
            last: Mutex::new(candidates.last().map(|c| c.to_string()).unwrap_or_default()),
        }
    }
}

impl OrderNumberGenerator for ScriptedOrderNumbers {
    fn next_candidate(&self) -> String {
        match self.candidates.lock().unwrap().pop_front() {
            Some(next) => {
                *self.last.lock().unwrap() = next.clone();
                next
            }
            None => self.last.lock().unwrap().clone(),
        }
    }
}

/// Router backed by a throwaway SQLite file with the schema migrated.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub customer_id: Uuid,
    customer_token: String,
    admin_token: String,
    _db_dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::build(|_| {}, Arc::new(RandomOrderNumbers)).await
    }

    pub async fn with_config(tweak: impl FnOnce(&mut AppConfig)) -> Self {
        Self::build(tweak, Arc::new(RandomOrderNumbers)).await
    }

    pub async fn with_order_numbers(generator: Arc<dyn OrderNumberGenerator>) -> Self {
        Self::build(|_| {}, generator).await
    }

    async fn build(
        tweak: impl FnOnce(&mut AppConfig),
        order_numbers: Arc<dyn OrderNumberGenerator>,
    ) -> Self {
        let db_dir = tempfile::tempdir().expect("create temp dir");
        let db_path = db_dir.path().join("storefront_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            TEST_JWT_SECRET.to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.cors_allow_any_origin = true;
        // One connection keeps SQLite writers from tripping over each other.
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        tweak(&mut cfg);

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let mut state = AppState::new(Arc::new(pool), cfg);
        let orders = OrderService::new(state.db.clone(), state.config.tax_policy())
            .with_order_numbers(order_numbers);
        state.services = state.services.clone().with_order_service(orders);

        let customer_id = Uuid::new_v4();
        let customer_token = state
            .auth
            .issue_token(customer_id, &["customer"])
            .expect("issue customer token");
        let admin_token = state
            .auth
            .issue_token(Uuid::new_v4(), &[ADMIN_ROLE])
            .expect("issue admin token");

        Self {
            router: app_router(state.clone()),
            state,
            customer_id,
            customer_token,
            admin_token,
            _db_dir: db_dir,
        }
    }

    pub fn customer_token(&self) -> &str {
        &self.customer_token
    }

    pub fn admin_token(&self) -> &str {
        &self.admin_token
    }

    /// Token for a fresh non-admin user.
    pub fn other_customer_token(&self) -> String {
        self.state
            .auth
            .issue_token(Uuid::new_v4(), &["customer"])
            .expect("issue token")
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    pub async fn as_customer(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        self.request(method, uri, body, Some(self.customer_token()))
            .await
    }

    pub async fn as_admin(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        self.request(method, uri, body, Some(self.admin_token())).await
    }

    /// Creates a coupon through the admin API and returns its JSON.
    pub async fn seed_coupon(&self, coupon: Value) -> Value {
        let response = self
            .as_admin(Method::POST, "/api/admin/coupons", Some(coupon))
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        body_json(response).await
    }
}

pub async fn body_json(response: Response) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("read response body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("response body is JSON")
}

/// Reads a money field that may be rendered as a string or a number.
pub fn money(value: &Value) -> Decimal {
    match value {
        Value::String(s) => s.parse().expect("decimal string"),
        Value::Number(n) => n.to_string().parse().expect("decimal number"),
        other => panic!("not a money value: {other}"),
    }
}

pub fn shipping_address() -> Value {
    json!({
        "fullName": "Ada Lovelace",
        "addressLine1": "12 St James's Square",
        "city": "London",
        "state": "LDN",
        "postalCode": "SW1Y 4JH",
        "country": "GB"
    })
}

/// Two lines, three units, summing to 120.00.
pub fn cart_items() -> Value {
    json!([
        {"productId": "sku-lamp", "productName": "Desk Lamp", "quantity": 2, "price": "35.00"},
        {"productId": "sku-mug", "productName": "Mug", "quantity": 1, "price": "50.00",
            "options": {"color": "teal"}}
    ])
}

/// The `SAVE10` coupon: 10 off orders of 50 or more.
pub fn save10() -> Value {
    json!({
        "code": "SAVE10",
        "discountType": "fixed",
        "discountValue": "10",
        "minPurchaseAmount": "50",
        "isActive": true
    })
}

pub fn order_submission(total: &str, coupon: Option<(&str, &str)>) -> Value {
    let mut body = json!({
        "shippingAddress": shipping_address(),
        "shippingMethod": "standard",
        "paymentMethod": {"type": "credit_card", "last4": "4242", "expiry": "12/29"},
        "subtotal": "120.00",
        "shippingCost": "0.00",
        "tax": "0.00",
        "total": total,
        "items": cart_items()
    });
    if let Some((code, discount)) = coupon {
        body["couponCode"] = json!(code);
        body["discountAmount"] = json!(discount);
    }
    body
}
