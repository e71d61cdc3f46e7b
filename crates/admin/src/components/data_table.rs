//! List-screen tables.
//!
//! A [`ListTable`] describes the header, the filter form and the empty row
//! rendered by the `partials/table_*.html` includes. Tables tied to a
//! [`LiveResource`] carry `data-live`, which the page script uses to open the
//! matching `/live/{resource}` stream.

use timberline_core::OrderStatus;

use crate::routes::live::LiveResource;

#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub key: &'static str,
    pub label: &'static str,
    /// Right-aligned.
    pub numeric: bool,
}

const fn col(key: &'static str, label: &'static str) -> Column {
    Column { key, label, numeric: false }
}

const fn num(key: &'static str, label: &'static str) -> Column {
    Column { key, label, numeric: true }
}

#[derive(Debug, Clone)]
pub struct FilterOption {
    pub value: String,
    pub label: String,
}

/// One control in the filter form. `key` is the query-string parameter.
#[derive(Debug, Clone)]
pub struct Filter {
    pub key: &'static str,
    pub label: &'static str,
    /// Search box hint. `None` for dropdowns.
    pub placeholder: Option<&'static str>,
    /// Dropdown choices. Empty for search boxes.
    pub options: Vec<FilterOption>,
}

impl Filter {
    #[must_use]
    pub const fn search(key: &'static str, label: &'static str, placeholder: &'static str) -> Self {
        Self { key, label, placeholder: Some(placeholder), options: Vec::new() }
    }

    #[must_use]
    pub fn choice<I, V, L>(key: &'static str, label: &'static str, options: I) -> Self
    where
        I: IntoIterator<Item = (V, L)>,
        V: Into<String>,
        L: Into<String>,
    {
        let options = options
            .into_iter()
            .map(|(value, label)| FilterOption { value: value.into(), label: label.into() })
            .collect();
        Self { key, label, placeholder: None, options }
    }

    #[must_use]
    pub const fn is_select(&self) -> bool {
        self.placeholder.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct ListTable {
    /// DOM id of the `<table>`.
    pub id: &'static str,
    pub columns: Vec<Column>,
    pub filters: Vec<Filter>,
    pub live: Option<LiveResource>,
    pub empty_title: &'static str,
    pub empty_hint: Option<&'static str>,
}

impl ListTable {
    fn new(id: &'static str, columns: &[Column]) -> Self {
        Self {
            id,
            columns: columns.to_vec(),
            filters: Vec::new(),
            live: None,
            empty_title: "Nothing here yet",
            empty_hint: None,
        }
    }

    fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    const fn live(mut self, resource: LiveResource) -> Self {
        self.live = Some(resource);
        self
    }

    const fn empty(mut self, title: &'static str, hint: Option<&'static str>) -> Self {
        self.empty_title = title;
        self.empty_hint = hint;
        self
    }

    /// `colspan` for the empty row.
    #[must_use]
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Products, filterable by the categories currently in the catalog.
    #[must_use]
    pub fn products(categories: &[String]) -> Self {
        Self::new(
            "products",
            &[
                col("name", "Product"),
                col("category", "Category"),
                num("price", "Price"),
                num("stock", "Stock"),
                col("flags", "Flags"),
                col("actions", ""),
            ],
        )
        .filter(Filter::search("q", "Search", "Name or slug..."))
        .filter(Filter::choice("category", "Category", categories.iter().map(|c| (c.clone(), c.clone()))))
        .live(LiveResource::Products)
        .empty("No products found", Some("Try adjusting your search or filters"))
    }

    #[must_use]
    pub fn orders() -> Self {
        Self::new(
            "orders",
            &[
                col("id", "Order"),
                col("email", "Customer"),
                col("status", "Status"),
                num("total", "Total"),
                col("created", "Placed"),
            ],
        )
        .filter(Filter::choice(
            "status",
            "Status",
            OrderStatus::ALL.iter().map(|s| (s.as_str(), s.label())),
        ))
        .live(LiveResource::Orders)
        .empty("No orders yet", None)
    }

    #[must_use]
    pub fn customers() -> Self {
        Self::new(
            "customers",
            &[
                col("name", "Customer"),
                col("email", "Email"),
                col("phone", "Phone"),
                col("created", "Joined"),
            ],
        )
        .filter(Filter::search("q", "Search", "Name or email..."))
        .live(LiveResource::Customers)
        .empty("No customers found", Some("Try adjusting your search"))
    }

    #[must_use]
    pub fn discounts() -> Self {
        Self::new(
            "discounts",
            &[
                col("code", "Code"),
                col("value", "Discount"),
                num("usage", "Used"),
                col("window", "Valid"),
                col("active", "Active"),
                col("actions", ""),
            ],
        )
        .live(LiveResource::Discounts)
        .empty("No discount codes", Some("Create one below"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_categories_become_choices() {
        let table = ListTable::products(&["Office".to_string(), "Dining".to_string()]);
        assert_eq!(table.live, Some(LiveResource::Products));

        let category = table.filters.iter().find(|f| f.key == "category").unwrap();
        assert!(category.is_select());
        let values: Vec<_> = category.options.iter().map(|o| o.value.as_str()).collect();
        assert_eq!(values, ["Office", "Dining"]);

        let search = table.filters.iter().find(|f| f.key == "q").unwrap();
        assert!(!search.is_select());
    }

    #[test]
    fn test_orders_offer_every_status() {
        let table = ListTable::orders();
        assert_eq!(table.filters.first().unwrap().options.len(), OrderStatus::ALL.len());
        assert_eq!(table.width(), 5);
        assert!(table.columns.iter().any(|c| c.key == "total" && c.numeric));
    }
}
