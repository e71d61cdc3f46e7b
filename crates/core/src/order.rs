//! Orders, line items, and checkout totals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{CustomerId, Email, OrderId, OrderItemId, OrderStatus, Price, ProductId};

/// Orders at or above this subtotal ship free.
pub const FREE_SHIPPING_THRESHOLD: u32 = 999;

/// Flat white-glove delivery fee below the threshold.
pub const FLAT_SHIPPING: u32 = 79;

/// An order row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    #[serde(default)]
    pub customer_id: Option<CustomerId>,
    pub email: Email,
    pub status: OrderStatus,
    pub subtotal: Price,
    #[serde(default)]
    pub discount_total: Price,
    #[serde(default)]
    pub shipping_total: Price,
    pub total: Price,
    #[serde(default)]
    pub discount_code: Option<String>,
    #[serde(default)]
    pub shipping_address: String,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Move to `next`, enforcing the lifecycle.
    ///
    /// # Errors
    ///
    /// Returns `TransitionError` if the move is not allowed from the current status.
    pub fn transition(&mut self, next: OrderStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}

/// Rejected status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot move order from {from} to {to}")]
pub struct TransitionError {
    pub from: OrderStatus,
    pub to: OrderStatus,
}

/// An order line row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    #[serde(default)]
    pub product_id: Option<ProductId>,
    pub product_name: String,
    pub unit_price: Price,
    pub quantity: i32,
}

impl OrderItem {
    /// `unit_price * quantity`.
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.unit_price
            .times(u32::try_from(self.quantity).unwrap_or(0))
    }
}

/// A priced line before it is written to `order_items`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub product_name: String,
    pub unit_price: Price,
    pub quantity: u32,
}

impl OrderLine {
    /// `unit_price * quantity`.
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.unit_price.times(self.quantity)
    }
}

/// Money breakdown for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotals {
    pub subtotal: Price,
    pub discount: Price,
    pub shipping: Price,
    pub total: Price,
}

impl OrderTotals {
    /// Compute totals for `lines` with an already-evaluated `discount`.
    ///
    /// Shipping is decided on the pre-discount subtotal. An empty cart costs nothing.
    #[must_use]
    pub fn compute(lines: &[OrderLine], discount: Price) -> Self {
        let subtotal: Price = lines.iter().map(OrderLine::line_total).sum();
        let discount = discount.min(subtotal);
        let shipping = if subtotal.is_zero() || subtotal >= Price::dollars(FREE_SHIPPING_THRESHOLD)
        {
            Price::ZERO
        } else {
            Price::dollars(FLAT_SHIPPING)
        };

        Self {
            subtotal,
            discount,
            shipping,
            total: subtotal.saturating_sub(discount) + shipping,
        }
    }
}
