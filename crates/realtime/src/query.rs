//! Row selection: filters, ordering, and limit.

use std::cmp::Ordering;

use serde_json::Value;

/// A single column predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `column = value` (`IS NULL` when the value is `null`).
    Eq(String, Value),
    /// `column >= value`
    Gte(String, Value),
    /// `column <= value`
    Lte(String, Value),
}

impl Filter {
    /// The column this predicate reads.
    #[must_use]
    pub fn column(&self) -> &str {
        match self {
            Self::Eq(column, _) | Self::Gte(column, _) | Self::Lte(column, _) => column,
        }
    }

    /// Evaluate against a JSON row. Missing columns read as `null`.
    #[must_use]
    pub fn matches(&self, row: &Value) -> bool {
        let actual = row.get(self.column()).unwrap_or(&Value::Null);
        match self {
            Self::Eq(_, expected) => compare(actual, expected) == Some(Ordering::Equal),
            Self::Gte(_, bound) => {
                matches!(compare(actual, bound), Some(Ordering::Greater | Ordering::Equal))
            }
            Self::Lte(_, bound) => {
                matches!(compare(actual, bound), Some(Ordering::Less | Ordering::Equal))
            }
        }
    }
}

/// Column ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub ascending: bool,
}

/// A selection over one table. `Query::new()` selects every row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order: Vec<OrderBy>,
    pub limit: Option<u32>,
}

impl Query {
    /// Select everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq(column.to_string(), value.into()));
        self
    }

    #[must_use]
    pub fn gte(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Gte(column.to_string(), value.into()));
        self
    }

    #[must_use]
    pub fn lte(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Lte(column.to_string(), value.into()));
        self
    }

    #[must_use]
    pub fn order_by(mut self, column: &str, ascending: bool) -> Self {
        self.order.push(OrderBy {
            column: column.to_string(),
            ascending,
        });
        self
    }

    #[must_use]
    pub const fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether `row` passes every filter.
    #[must_use]
    pub fn matches(&self, row: &Value) -> bool {
        self.filters.iter().all(|f| f.matches(row))
    }

    /// Apply filters, ordering, and limit to in-memory rows.
    ///
    /// Used by the memory backend; the `PostgreSQL` client pushes the same
    /// query down as SQL.
    #[must_use]
    pub fn apply(&self, rows: &[Value]) -> Vec<Value> {
        let mut selected: Vec<Value> = rows.iter().filter(|r| self.matches(r)).cloned().collect();

        if !self.order.is_empty() {
            selected.sort_by(|a, b| {
                for key in &self.order {
                    let left = a.get(&key.column).unwrap_or(&Value::Null);
                    let right = b.get(&key.column).unwrap_or(&Value::Null);
                    let ord = compare_for_sort(left, right);
                    let ord = if key.ascending { ord } else { ord.reverse() };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
        }

        if let Some(limit) = self.limit {
            selected.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        }
        selected
    }
}

/// Numeric strings (how decimals serialize) compare as numbers.
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse::<f64>().ok(),
        _ => None,
    }
}

/// SQL-ish comparison: `null` never compares.
fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::String(a), Value::String(b)) => match (as_number(left), as_number(right)) {
            (Some(x), Some(y)) => x.partial_cmp(&y),
            _ => Some(a.cmp(b)),
        },
        _ => match (as_number(left), as_number(right)) {
            (Some(x), Some(y)) => x.partial_cmp(&y),
            _ => (left == right).then_some(Ordering::Equal),
        },
    }
}

/// Nulls sort last, as in `PostgreSQL` ascending order.
fn compare_for_sort(left: &Value, right: &Value) -> Ordering {
    match (left.is_null(), right.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => compare(left, right).unwrap_or(Ordering::Equal),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn rows() -> Vec<Value> {
        vec![
            json!({"id": 1, "category": "Office", "price": "1299.00", "rating": 4.5}),
            json!({"id": 2, "category": "Living", "price": "999", "rating": null}),
            json!({"id": 3, "category": "Office", "price": 450, "rating": 3.9}),
        ]
    }

    #[test]
    fn test_filters_compare_decimal_strings_numerically() {
        let q = Query::new().eq("category", "Office").lte("price", "1000");
        let ids: Vec<_> = q.apply(&rows()).iter().map(|r| r["id"].clone()).collect();
        assert_eq!(ids, vec![json!(3)]);
    }

    #[test]
    fn test_null_never_matches_range() {
        let q = Query::new().gte("rating", 0);
        assert_eq!(q.apply(&rows()).len(), 2);
    }

    #[test]
    fn test_order_and_limit() {
        let q = Query::new().order_by("price", false).limit(2);
        let ids: Vec<_> = q.apply(&rows()).iter().map(|r| r["id"].clone()).collect();
        assert_eq!(ids, vec![json!(1), json!(2)]);

        let q = Query::new().order_by("rating", true);
        let ids: Vec<_> = q.apply(&rows()).iter().map(|r| r["id"].clone()).collect();
        assert_eq!(ids, vec![json!(3), json!(1), json!(2)]);
    }

    #[test]
    fn test_eq_null() {
        let q = Query::new().eq("rating", Value::Null);
        assert_eq!(q.apply(&rows()).len(), 1);
    }
}
