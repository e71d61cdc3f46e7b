//! Revenue summaries for the financials screen.

use std::collections::BTreeMap;

use chrono::Datelike;
use rust_decimal::Decimal;

use crate::order::Order;
use crate::types::{OrderStatus, Price};

/// Revenue for one calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthlyRevenue {
    pub year: i32,
    pub month: u32,
    pub revenue: Price,
    pub orders: usize,
}

/// Aggregate figures over non-cancelled orders.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FinancialSummary {
    pub gross_revenue: Price,
    pub discounts_given: Price,
    pub shipping_collected: Price,
    pub order_count: usize,
    pub cancelled_count: usize,
    pub average_order_value: Price,
    /// Oldest month first.
    pub by_month: Vec<MonthlyRevenue>,
}

impl FinancialSummary {
    /// Summarize `orders`. Cancelled orders are counted but contribute no revenue.
    #[must_use]
    pub fn from_orders(orders: &[Order]) -> Self {
        let mut summary = Self::default();
        let mut months: BTreeMap<(i32, u32), (Price, usize)> = BTreeMap::new();

        for order in orders {
            if order.status == OrderStatus::Cancelled {
                summary.cancelled_count += 1;
                continue;
            }
            summary.order_count += 1;
            summary.gross_revenue = summary.gross_revenue + order.total;
            summary.discounts_given = summary.discounts_given + order.discount_total;
            summary.shipping_collected = summary.shipping_collected + order.shipping_total;

            let key = (order.created_at.year(), order.created_at.month());
            let entry = months.entry(key).or_insert((Price::ZERO, 0));
            entry.0 = entry.0 + order.total;
            entry.1 += 1;
        }

        if summary.order_count > 0 {
            let average = summary.gross_revenue.amount() / Decimal::from(summary.order_count);
            summary.average_order_value = Price::new(average.round_dp(2));
        }

        summary.by_month = months
            .into_iter()
            .map(|((year, month), (revenue, orders))| MonthlyRevenue {
                year,
                month,
                revenue,
                orders,
            })
            .collect();

        summary
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::types::{Email, OrderId};

    fn order(id: i32, total: u32, status: OrderStatus, month: u32) -> Order {
        Order {
            id: OrderId::new(id),
            customer_id: None,
            email: Email::parse("buyer@shop.example").unwrap(),
            status,
            subtotal: Price::dollars(total),
            discount_total: Price::dollars(10),
            shipping_total: Price::ZERO,
            total: Price::dollars(total),
            discount_code: None,
            shipping_address: String::new(),
            created_at: Utc.with_ymd_and_hms(2026, month, 3, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_summary_excludes_cancelled() {
        let orders = vec![
            order(1, 1000, OrderStatus::Delivered, 1),
            order(2, 500, OrderStatus::Pending, 1),
            order(3, 9999, OrderStatus::Cancelled, 2),
            order(4, 300, OrderStatus::Shipped, 3),
        ];
        let summary = FinancialSummary::from_orders(&orders);
        assert_eq!(summary.gross_revenue, Price::dollars(1800));
        assert_eq!(summary.discounts_given, Price::dollars(30));
        assert_eq!(summary.order_count, 3);
        assert_eq!(summary.cancelled_count, 1);
        assert_eq!(summary.average_order_value, Price::dollars(600));
        assert_eq!(
            summary
                .by_month
                .iter()
                .map(|m| (m.month, m.orders))
                .collect::<Vec<_>>(),
            vec![(1, 2), (3, 1)]
        );
    }

    #[test]
    fn test_empty_summary() {
        let summary = FinancialSummary::from_orders(&[]);
        assert_eq!(summary, FinancialSummary::default());
    }
}
