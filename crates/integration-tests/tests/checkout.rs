//! Cart to confirmation, with discount codes.

#![allow(clippy::unwrap_used)]

use axum::http::StatusCode;
use rust_decimal::Decimal;
use serde_json::json;

use timberline_core::order::Order;
use timberline_core::{Price, Table};
use timberline_integration_tests::{Browser, product, storefront_app};
use timberline_realtime::memory::MemoryBackend;

fn shop() -> MemoryBackend {
    let backend = MemoryBackend::new();
    backend
        .seed(Table::Products, [product(1, "Walnut Side Table", "Living Room", 499)])
        .unwrap();
    backend
        .seed(
            Table::DiscountCodes,
            [json!({ "id": 1, "code": "WELCOME10", "kind": "percentage", "value": "10" })],
        )
        .unwrap();
    backend
}

async fn cart_with_two_tables(backend: &MemoryBackend) -> Browser {
    let (app, _) = storefront_app(backend).await;
    let mut browser = Browser::new(app);
    let added = browser
        .post("/cart/add", &[("product_id", "1"), ("quantity", "2")])
        .await;
    assert_eq!(added.status, StatusCode::SEE_OTHER);
    assert_eq!(added.location(), Some("/cart"));
    browser
}

fn checkout_form(code: &str) -> Vec<(&str, &str)> {
    vec![
        ("email", "Ada@Example.com"),
        ("full_name", "Ada Lovelace"),
        ("phone", ""),
        ("shipping_address", "12 Analytical Way, London"),
        ("discount_code", code),
    ]
}

#[tokio::test]
async fn discounted_order_is_written_and_code_redeemed() {
    let backend = shop();
    let mut browser = cart_with_two_tables(&backend).await;

    let placed = browser.post("/checkout", &checkout_form(" welcome10 ")).await;
    assert_eq!(placed.status, StatusCode::SEE_OTHER, "{}", placed.body);
    assert_eq!(placed.location(), Some("/checkout/complete"));

    // 2 x 499 = 998 is under the free-shipping threshold.
    let orders: Vec<Order> = backend
        .rows(Table::Orders)
        .into_iter()
        .map(|row| serde_json::from_value(row).unwrap())
        .collect();
    assert_eq!(orders.len(), 1);
    let order = &orders[0];
    assert_eq!(order.subtotal, Price::dollars(998));
    assert_eq!(order.discount_total, Price::new(Decimal::new(9980, 2)));
    assert_eq!(order.shipping_total, Price::dollars(79));
    assert_eq!(order.total, Price::new(Decimal::new(97720, 2)));
    assert_eq!(order.email.as_str(), "ada@example.com");
    assert_eq!(order.discount_code.as_deref(), Some("WELCOME10"));

    let items = backend.rows(Table::OrderItems);
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["product_id"], 1);
    assert_eq!(items[0]["quantity"], 2);

    assert_eq!(backend.rows(Table::DiscountCodes)[0]["usage_count"], 1);
    assert_eq!(backend.rows(Table::Profiles).len(), 1);

    let complete = browser.get("/checkout/complete").await;
    assert_eq!(complete.status, StatusCode::OK);
    assert!(complete.body.contains("$977.20"));

    // The cart was emptied.
    let again = browser.get("/checkout").await;
    assert_eq!(again.location(), Some("/cart"));
}

#[tokio::test]
async fn unknown_code_rejects_without_writing() {
    let backend = shop();
    let mut browser = cart_with_two_tables(&backend).await;

    let page = browser.post("/checkout", &checkout_form("FREESOFA")).await;
    assert_eq!(page.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(page.body.contains("this code does not exist"));

    assert!(backend.rows(Table::Orders).is_empty());
    assert!(backend.rows(Table::OrderItems).is_empty());
    assert_eq!(backend.rows(Table::DiscountCodes)[0]["usage_count"], 0);

    // The cart survives, so the shopper can retry without a code.
    let placed = browser.post("/checkout", &checkout_form("")).await;
    assert_eq!(placed.status, StatusCode::SEE_OTHER);
    assert_eq!(backend.rows(Table::Orders).len(), 1);
}

#[tokio::test]
async fn confirmation_needs_an_order_from_this_session() {
    let backend = shop();
    let (app, _) = storefront_app(&backend).await;
    let mut browser = Browser::new(app);

    let page = browser.get("/checkout/complete").await;
    assert_eq!(page.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn code_used_up_mid_checkout_rerenders_the_form() {
    let backend = shop();
    // Another shopper claims the last use after this checkout evaluated the code.
    backend.register_rpc("redeem_discount_code", |_| Ok(json!(false)));
    let mut browser = cart_with_two_tables(&backend).await;

    let page = browser.post("/checkout", &checkout_form("WELCOME10")).await;
    assert_eq!(page.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(page.body.contains("this code has reached its usage limit"));
    assert!(backend.rows(Table::Orders).is_empty());
    assert!(backend.rows(Table::OrderItems).is_empty());
}
