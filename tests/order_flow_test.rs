mod common;

use std::sync::Arc;

use axum::http::{Method, StatusCode};
use chrono::{DateTime, Utc};
use common::{
    body_json, cart_items, money, order_submission, save10, ScriptedOrderNumbers, TestApp,
};
use rust_decimal_macros::dec;
use serde_json::json;
use storefront_api::services::order_numbers::is_valid_order_number;

#[tokio::test]
async fn save10_scenario_places_a_discounted_order() {
    let app = TestApp::new().await;
    app.seed_coupon(save10()).await;

    let response = app
        .as_customer(
            Method::POST,
            "/api/orders",
            Some(order_submission("110.00", Some(("SAVE10", "10")))),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let order = body_json(response).await;
    assert!(is_valid_order_number(order["orderNumber"].as_str().unwrap()));
    assert_eq!(order["status"], json!("pending"));
    assert_eq!(order["paymentStatus"], json!("paid"));
    assert_eq!(order["userId"], json!(app.customer_id.to_string()));
    assert_eq!(order["shippingMethod"], json!("Standard Shipping"));
    assert_eq!(order["couponCode"], json!("SAVE10"));
    assert_eq!(money(&order["subtotal"]), dec!(120));
    assert_eq!(money(&order["shippingCost"]), dec!(0));
    assert_eq!(money(&order["tax"]), dec!(0));
    assert_eq!(money(&order["discountAmount"]), dec!(10));
    assert_eq!(money(&order["total"]), dec!(110));
    assert_eq!(
        order["paymentMethod"],
        json!({"type": "credit_card", "last4": "4242", "expiry": "12/29"})
    );
    assert_eq!(order["shippingAddress"]["fullName"], json!("Ada Lovelace"));

    let items = order["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    let mug = items.iter().find(|i| i["productId"] == "sku-mug").unwrap();
    assert_eq!(mug["options"], json!({"color": "teal"}));

    let coupons = body_json(app.as_admin(Method::GET, "/api/admin/coupons", None).await).await;
    assert_eq!(coupons[0]["usedCount"], json!(1));
}

#[tokio::test]
async fn order_without_coupon_keeps_full_total() {
    let app = TestApp::new().await;

    let response = app
        .as_customer(Method::POST, "/api/orders", Some(order_submission("120.00", None)))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let order = body_json(response).await;
    assert_eq!(money(&order["total"]), dec!(120));
    assert_eq!(money(&order["discountAmount"]), dec!(0));
    assert!(order["couponCode"].is_null());
}

#[tokio::test]
async fn mismatched_total_is_rejected_and_nothing_persists() {
    let app = TestApp::new().await;
    app.seed_coupon(save10()).await;

    // The discount was not subtracted client-side.
    let response = app
        .as_customer(
            Method::POST,
            "/api/orders",
            Some(order_submission("120.00", Some(("SAVE10", "10")))),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["message"].as_str().unwrap().contains("total"));

    let orders = body_json(app.as_customer(Method::GET, "/api/orders", None).await).await;
    assert_eq!(orders, json!([]));

    let coupons = body_json(app.as_admin(Method::GET, "/api/admin/coupons", None).await).await;
    assert_eq!(coupons[0]["usedCount"], json!(0));
}

#[tokio::test]
async fn rejected_coupon_blocks_the_order() {
    let app = TestApp::new().await;

    let response = app
        .as_customer(
            Method::POST,
            "/api/orders",
            Some(order_submission("110.00", Some(("GHOST", "10")))),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], json!("INVALID_CODE"));
}

#[tokio::test]
async fn invalid_submissions_are_bad_requests() {
    let app = TestApp::new().await;

    let mut bad_card = order_submission("120.00", None);
    bad_card["paymentMethod"] = json!({"type": "credit_card", "last4": "42", "expiry": "13/29"});

    let mut empty_cart = order_submission("0.00", None);
    empty_cart["items"] = json!([]);
    empty_cart["subtotal"] = json!("0.00");

    let mut unknown_method = order_submission("120.00", None);
    unknown_method["shippingMethod"] = json!("teleport");

    let mut blank_city = order_submission("120.00", None);
    blank_city["shippingAddress"]["city"] = json!("");

    for body in [bad_card, empty_cart, unknown_method, blank_city] {
        let response = app.as_customer(Method::POST, "/api/orders", Some(body)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

#[tokio::test]
async fn oversized_prices_are_rejected_with_a_json_error() {
    let app = TestApp::new().await;
    let huge_items = json!([
        {"productId": "sku-yacht", "productName": "Yacht", "quantity": 2,
            "price": "79228162514264337593543950335"}
    ]);

    let response = app
        .as_customer(
            Method::POST,
            "/api/checkout/quote",
            Some(json!({"items": huge_items, "shippingMethod": "standard"})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], json!("Bad Request"));

    let mut submission = order_submission("120.00", None);
    submission["items"] = huge_items;
    let response = app.as_customer(Method::POST, "/api/orders", Some(submission)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_json(response).await["message"].is_string());

    let orders = body_json(app.as_customer(Method::GET, "/api/orders", None).await).await;
    assert_eq!(orders.as_array().map(Vec::len), Some(0));
}

#[tokio::test]
async fn malformed_path_and_query_render_error_bodies() {
    let app = TestApp::new().await;

    let response = app.as_customer(Method::GET, "/api/orders/42", None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], json!("Bad Request"));
    assert!(body["requestId"].is_string());

    let response = app
        .as_admin(Method::GET, "/api/admin/orders?page=first", None)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_json(response).await["message"].is_string());
}

#[tokio::test]
async fn orders_are_private_to_their_owner() {
    let app = TestApp::new().await;
    let created = body_json(
        app.as_customer(Method::POST, "/api/orders", Some(order_submission("120.00", None)))
            .await,
    )
    .await;
    let uri = format!("/api/orders/{}", created["id"].as_str().unwrap());

    let response = app.as_customer(Method::GET, &uri, None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let stranger = app.other_customer_token();
    let response = app.request(Method::GET, &uri, None, Some(&stranger)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app.as_admin(Method::GET, &uri, None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .request(Method::GET, "/api/orders", None, Some(&stranger))
        .await;
    assert_eq!(body_json(response).await, json!([]));

    let missing = format!("/api/orders/{}", uuid::Uuid::new_v4());
    let response = app.as_customer(Method::GET, &missing, None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn order_numbers_skip_values_already_taken() {
    let generator = Arc::new(ScriptedOrderNumbers::new(&[
        "AG-000001",
        "AG-000001",
        "AG-000001",
        "AG-000002",
    ]));
    let app = TestApp::with_order_numbers(generator).await;

    let first = body_json(
        app.as_customer(Method::POST, "/api/orders", Some(order_submission("120.00", None)))
            .await,
    )
    .await;
    assert_eq!(first["orderNumber"], json!("AG-000001"));

    let second = body_json(
        app.as_customer(Method::POST, "/api/orders", Some(order_submission("120.00", None)))
            .await,
    )
    .await;
    assert_eq!(second["orderNumber"], json!("AG-000002"));

    // Only AG-000002 remains on offer and it is taken.
    let response = app
        .as_customer(Method::POST, "/api/orders", Some(order_submission("120.00", None)))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn admin_moves_an_order_through_fulfilment() {
    let app = TestApp::new().await;
    let created = body_json(
        app.as_customer(Method::POST, "/api/orders", Some(order_submission("120.00", None)))
            .await,
    )
    .await;
    let uri = format!("/api/admin/orders/{}/status", created["id"].as_str().unwrap());

    let response = app
        .as_customer(Method::PATCH, &uri, Some(json!({"status": "shipped"})))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .as_admin(
            Method::PATCH,
            &uri,
            Some(json!({
                "status": "shipped",
                "trackingNumber": "1Z999AA10123456784",
                "shippingCarrier": "UPS"
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let shipped = body_json(response).await;
    assert_eq!(shipped["status"], json!("shipped"));
    assert_eq!(shipped["trackingNumber"], json!("1Z999AA10123456784"));
    assert_eq!(shipped["shippingCarrier"], json!("UPS"));
    assert!(shipped["shippedAt"].is_string());
    assert_eq!(shipped["items"].as_array().map(Vec::len), Some(2));

    let response = app
        .as_admin(Method::PATCH, &uri, Some(json!({"status": "delivered"})))
        .await;
    let delivered = body_json(response).await;
    assert_eq!(delivered["status"], json!("delivered"));
    let first: DateTime<Utc> = serde_json::from_value(shipped["shippedAt"].clone()).unwrap();
    let kept: DateTime<Utc> = serde_json::from_value(delivered["shippedAt"].clone()).unwrap();
    assert!((kept - first).num_milliseconds().abs() < 1);
    assert_eq!(delivered["trackingNumber"], json!("1Z999AA10123456784"));

    let response = app
        .as_admin(Method::PATCH, &uri, Some(json!({"status": "lost"})))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn admin_lists_every_order_with_pagination() {
    let app = TestApp::new().await;
    for _ in 0..3 {
        let response = app
            .as_customer(Method::POST, "/api/orders", Some(order_submission("120.00", None)))
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }
    let stranger = app.other_customer_token();
    let response = app
        .request(
            Method::POST,
            "/api/orders",
            Some(order_submission("120.00", None)),
            Some(&stranger),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .as_customer(Method::GET, "/api/admin/orders", None)
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let page = body_json(
        app.as_admin(Method::GET, "/api/admin/orders?page=2&limit=3", None)
            .await,
    )
    .await;
    assert_eq!(page["total"], json!(4));
    assert_eq!(page["page"], json!(2));
    assert_eq!(page["limit"], json!(3));
    assert_eq!(page["totalPages"], json!(2));
    assert_eq!(page["items"].as_array().map(Vec::len), Some(1));

    let mine = body_json(app.as_customer(Method::GET, "/api/orders", None).await).await;
    assert_eq!(mine.as_array().map(Vec::len), Some(3));
}

#[tokio::test]
async fn quote_matches_what_order_placement_accepts() {
    let app = TestApp::with_config(|cfg| cfg.tax_rate = 0.08).await;
    app.seed_coupon(save10()).await;

    let response = app
        .as_customer(
            Method::POST,
            "/api/checkout/quote",
            Some(json!({
                "items": cart_items(),
                "shippingMethod": "express",
                "couponCode": "SAVE10"
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let quote = body_json(response).await;
    assert_eq!(money(&quote["subtotal"]), dec!(120.00));
    assert_eq!(money(&quote["shippingCost"]), dec!(9.99));
    assert_eq!(money(&quote["discountAmount"]), dec!(10.00));
    assert_eq!(money(&quote["tax"]), dec!(8.80));
    assert_eq!(money(&quote["total"]), dec!(128.79));

    let mut submission = order_submission("128.79", Some(("SAVE10", "10.00")));
    submission["shippingMethod"] = json!("express");
    submission["shippingCost"] = quote["shippingCost"].clone();
    submission["tax"] = quote["tax"].clone();
    let response = app.as_customer(Method::POST, "/api/orders", Some(submission)).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let order = body_json(response).await;
    assert_eq!(order["shippingMethod"], json!("Express Shipping"));
    assert_eq!(money(&order["total"]), dec!(128.79));
}

#[tokio::test]
async fn public_routes_need_no_token() {
    let app = TestApp::new().await;

    let response = app
        .request(Method::GET, "/api/shipping-methods", None, None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let methods = body_json(response).await;
    let ids: Vec<_> = methods
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(ids, ["standard", "express", "overnight"]);

    let response = app.request(Method::GET, "/health", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let health = body_json(response).await;
    assert_eq!(health["status"], json!("up"));
    assert_eq!(health["database"], json!("up"));
    assert!(health["version"].is_string());
}
