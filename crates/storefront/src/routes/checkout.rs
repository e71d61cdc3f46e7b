//! Checkout: turn the session cart into an order.
//!
//! Placing an order upserts the shopper's profile by email and re-evaluates
//! the discount code against the server copy. The code is then redeemed
//! through `redeem_discount_code`, which bumps the usage count only while it
//! is under the limit, and only a successful redemption lets the order be
//! written. If `orders` or `order_items` cannot be written the partial order
//! is removed and the use is handed back through `release_discount_code`.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tower_sessions::Session;
use tracing::instrument;

use timberline_core::content::Customer;
use timberline_core::discount::{DiscountCode, DiscountRejection, normalize_code};
use timberline_core::order::{Order, OrderLine, OrderTotals};
use timberline_core::{Email, OrderId, OrderStatus, Price, Table};
use timberline_realtime::{BackendError, Query, TableClient, TableClientExt};

use crate::error::{AppError, Result, add_breadcrumb};
use crate::filters;
use crate::routes::cart::{Cart, CartLineView};
use crate::state::AppState;

/// Procedure that claims one use of a discount code.
pub const REDEEM_RPC: &str = "redeem_discount_code";

/// Procedure that hands a claimed use back.
pub const RELEASE_RPC: &str = "release_discount_code";

/// Session key holding the id of the order just placed.
pub const LAST_ORDER_KEY: &str = "last_order";

/// Checkout form data.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckoutForm {
    pub email: String,
    pub full_name: String,
    #[serde(default)]
    pub phone: String,
    pub shipping_address: String,
    #[serde(default)]
    pub discount_code: String,
}

/// Checkout page template.
#[derive(Template, WebTemplate)]
#[template(path = "checkout/show.html")]
pub struct CheckoutTemplate {
    pub lines: Vec<CartLineView>,
    pub totals: OrderTotals,
    pub form: CheckoutForm,
    pub error: Option<String>,
}

/// Order confirmation template.
#[derive(Template, WebTemplate)]
#[template(path = "checkout/complete.html")]
pub struct CompleteTemplate {
    pub order: Order,
}

/// A validated checkout.
#[derive(Debug, Clone)]
pub struct PlacedCheckout {
    pub email: Email,
    pub full_name: String,
    pub phone: Option<String>,
    pub shipping_address: String,
    pub discount_code: Option<String>,
}

impl CheckoutForm {
    /// Check required fields.
    ///
    /// # Errors
    ///
    /// Returns a message suitable for the shopper.
    pub fn validate(&self) -> std::result::Result<PlacedCheckout, String> {
        let email = Email::parse(&self.email).map_err(|e| e.to_string())?;
        let full_name = self.full_name.trim();
        if full_name.is_empty() {
            return Err("Please enter your name.".to_string());
        }
        let shipping_address = self.shipping_address.trim();
        if shipping_address.is_empty() {
            return Err("Please enter a shipping address.".to_string());
        }
        let phone = Some(self.phone.trim()).filter(|p| !p.is_empty()).map(String::from);
        let code = normalize_code(&self.discount_code);

        Ok(PlacedCheckout {
            email,
            full_name: full_name.to_string(),
            phone,
            shipping_address: shipping_address.to_string(),
            discount_code: (!code.is_empty()).then_some(code),
        })
    }
}

fn cart_views(lines: &[OrderLine], state: &AppState) -> Vec<CartLineView> {
    let catalog = state.catalog().snapshot();
    lines
        .iter()
        .map(|line| CartLineView {
            product_id: line.product_id,
            name: line.product_name.clone(),
            slug: catalog
                .iter()
                .find(|p| p.id == line.product_id)
                .map(|p| p.slug.clone())
                .unwrap_or_default(),
            unit_price: line.unit_price,
            quantity: line.quantity,
            line_total: line.line_total(),
        })
        .collect()
}

/// Show the checkout form.
///
/// # Errors
///
/// Returns an error if the session cannot be read.
#[instrument(skip(state, session))]
pub async fn show(State(state): State<AppState>, session: Session) -> Result<Response> {
    let cart = Cart::load(&session).await?;
    let lines = cart.lines(&state.catalog().snapshot());
    if lines.is_empty() {
        return Ok(Redirect::to("/cart").into_response());
    }

    Ok(CheckoutTemplate {
        lines: cart_views(&lines, &state),
        totals: OrderTotals::compute(&lines, Price::ZERO),
        form: CheckoutForm::default(),
        error: None,
    }
    .into_response())
}

/// Look up a discount code and evaluate it against `subtotal`.
///
/// # Errors
///
/// `Ok(Err(_))` carries a rejection to show the shopper; `Err(_)` is a backend failure.
pub async fn apply_discount(
    tables: &dyn TableClient,
    code: &str,
    subtotal: Price,
) -> std::result::Result<std::result::Result<Price, DiscountRejection>, BackendError> {
    let found: Vec<DiscountCode> = tables
        .fetch(Table::DiscountCodes, &Query::new().eq("code", code).limit(1))
        .await?;
    Ok(found
        .first()
        .ok_or(DiscountRejection::UnknownCode)
        .and_then(|discount| discount.evaluate(subtotal, Utc::now())))
}

/// Find the profile for `checkout.email`, creating or refreshing it.
///
/// # Errors
///
/// Returns the backend error.
pub async fn upsert_profile(
    tables: &dyn TableClient,
    checkout: &PlacedCheckout,
) -> std::result::Result<Customer, BackendError> {
    let by_email = Query::new().eq("email", checkout.email.as_str()).limit(1);
    let details = json!({
        "full_name": checkout.full_name,
        "phone": checkout.phone,
    });

    let existing: Vec<Customer> = tables.fetch(Table::Profiles, &by_email).await?;
    if let Some(customer) = existing.first() {
        return tables
            .modify(Table::Profiles, customer.id.into(), &details)
            .await;
    }

    let mut record = details;
    if let Some(fields) = record.as_object_mut() {
        fields.insert("email".to_string(), json!(checkout.email));
    }
    match tables.create(Table::Profiles, &record).await {
        // Another checkout created the same profile first
        Err(e) if e.is_conflict() => {
            let existing: Vec<Customer> = tables.fetch(Table::Profiles, &by_email).await?;
            existing.into_iter().next().ok_or(BackendError::NotFound)
        }
        other => other,
    }
}

/// Redeem the discount code, then write the order and its items.
///
/// `Ok(Err(_))` means the code ran out before this order could claim it;
/// nothing was written.
///
/// # Errors
///
/// Returns the backend error. No order or code use is left behind.
pub async fn place_order(
    tables: &dyn TableClient,
    checkout: &PlacedCheckout,
    customer: &Customer,
    lines: &[OrderLine],
    totals: &OrderTotals,
) -> std::result::Result<std::result::Result<Order, DiscountRejection>, BackendError> {
    let code = checkout.discount_code.as_deref();
    if let Some(code) = code {
        let redeemed = tables.rpc(REDEEM_RPC, json!({ "code": code })).await?;
        if redeemed != json!(true) {
            tracing::info!(%code, "discount code was used up before the order was placed");
            return Ok(Err(DiscountRejection::UsageLimitReached));
        }
    }

    match write_order(tables, checkout, customer, lines, totals).await {
        Ok(order) => Ok(Ok(order)),
        Err(e) => {
            if let Some(code) = code
                && let Err(release) = tables.rpc(RELEASE_RPC, json!({ "code": code })).await
            {
                tracing::error!(%code, error = %release, "failed to release discount code use");
            }
            Err(e)
        }
    }
}

async fn write_order(
    tables: &dyn TableClient,
    checkout: &PlacedCheckout,
    customer: &Customer,
    lines: &[OrderLine],
    totals: &OrderTotals,
) -> std::result::Result<Order, BackendError> {
    let order: Order = tables
        .create(
            Table::Orders,
            &json!({
                "customer_id": customer.id,
                "email": checkout.email,
                "status": OrderStatus::Pending,
                "subtotal": totals.subtotal,
                "discount_total": totals.discount,
                "shipping_total": totals.shipping,
                "total": totals.total,
                "discount_code": checkout.discount_code,
                "shipping_address": checkout.shipping_address,
            }),
        )
        .await?;

    for line in lines {
        let item = json!({
            "order_id": order.id,
            "product_id": line.product_id,
            "product_name": line.product_name,
            "unit_price": line.unit_price,
            "quantity": line.quantity,
        });
        if let Err(e) = tables.insert(Table::OrderItems, item).await {
            // Items already written go with the order (ON DELETE CASCADE).
            if let Err(cleanup) = tables.delete(Table::Orders, order.id.into()).await {
                tracing::error!(order_id = %order.id, error = %cleanup, "failed to remove partial order");
            }
            return Err(e);
        }
    }

    Ok(order)
}

/// Place the order.
///
/// Validation and discount problems re-render the form with a message.
///
/// # Errors
///
/// Returns an error if the session or the backend fails.
#[instrument(skip(state, session, form), fields(email = %form.email))]
pub async fn submit(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<CheckoutForm>,
) -> Result<Response> {
    let cart = Cart::load(&session).await?;
    let lines = cart.lines(&state.catalog().snapshot());
    if lines.is_empty() {
        return Ok(Redirect::to("/cart").into_response());
    }

    let reject = |form: CheckoutForm, message: String| {
        (
            StatusCode::UNPROCESSABLE_ENTITY,
            CheckoutTemplate {
                lines: cart_views(&lines, &state),
                totals: OrderTotals::compute(&lines, Price::ZERO),
                form,
                error: Some(message),
            },
        )
            .into_response()
    };

    let checkout = match form.validate() {
        Ok(checkout) => checkout,
        Err(message) => return Ok(reject(form, message)),
    };

    let subtotal = OrderTotals::compute(&lines, Price::ZERO).subtotal;
    let discount = match &checkout.discount_code {
        Some(code) => match apply_discount(state.tables(), code, subtotal).await? {
            Ok(amount) => amount,
            Err(rejection) => return Ok(reject(form, format!("Discount code {code}: {rejection}"))),
        },
        None => Price::ZERO,
    };
    let totals = OrderTotals::compute(&lines, discount);

    let customer = upsert_profile(state.tables(), &checkout).await?;
    let order = match place_order(state.tables(), &checkout, &customer, &lines, &totals).await? {
        Ok(order) => order,
        Err(rejection) => {
            let code = checkout.discount_code.as_deref().unwrap_or_default();
            return Ok(reject(form, format!("Discount code {code}: {rejection}")));
        }
    };

    Cart::default().save(&session).await?;
    session.insert(LAST_ORDER_KEY, order.id).await?;

    tracing::info!(order_id = %order.id, total = %order.total, "order placed");
    let order_id = order.id.to_string();
    add_breadcrumb("checkout", "Order placed", Some(&[("order_id", order_id.as_str())]));

    Ok(Redirect::to("/checkout/complete").into_response())
}

/// Confirmation for the order placed in this session.
///
/// # Errors
///
/// Returns 404 when this session has not placed an order.
#[instrument(skip(state, session))]
pub async fn complete(State(state): State<AppState>, session: Session) -> Result<impl IntoResponse> {
    let order_id: OrderId = session
        .get(LAST_ORDER_KEY)
        .await?
        .ok_or_else(|| AppError::NotFound("recent order".to_string()))?;
    let order: Order = state
        .tables()
        .fetch_by_id(Table::Orders, order_id.into())
        .await?;
    Ok(CompleteTemplate { order })
}
