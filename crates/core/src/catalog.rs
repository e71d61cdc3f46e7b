//! Product catalog and listing derivation.
//!
//! The ShopAll and Bestsellers pages render a filtered, sorted view of the
//! mirrored product list. All filtering here is pure: the input slice is never
//! modified and the output keeps the input's relative order until a sort is
//! applied.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{Price, ProductId};

/// A product row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub description: String,
    pub category: String,
    pub price: Price,
    #[serde(default)]
    pub compare_at_price: Option<Price>,
    /// Average review score, 0.0 to 5.0.
    #[serde(default)]
    pub rating: Decimal,
    #[serde(default)]
    pub review_count: i32,
    #[serde(default)]
    pub stock: i32,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub bestseller: bool,
    #[serde(default)]
    pub featured: bool,
    pub created_at: DateTime<Utc>,
}

impl Product {
    /// The struck-through "was" price, if it is above the selling price.
    #[must_use]
    pub fn was_price(&self) -> Option<Price> {
        self.compare_at_price.filter(|was| *was > self.price)
    }

    /// `true` when stock is at or below `threshold`.
    #[must_use]
    pub const fn low_stock(&self, threshold: i32) -> bool {
        self.stock <= threshold
    }
}

/// Inclusive price bounds. A missing bound is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PriceRange {
    pub min: Option<Decimal>,
    pub max: Option<Decimal>,
}

impl PriceRange {
    /// A closed range.
    #[must_use]
    pub const fn between(min: Decimal, max: Decimal) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
        }
    }

    /// Whether `price` falls inside the range.
    #[must_use]
    pub fn contains(&self, price: Price) -> bool {
        let amount = price.amount();
        self.min.is_none_or(|min| amount >= min) && self.max.is_none_or(|max| amount <= max)
    }

    /// `true` if neither bound is set.
    #[must_use]
    pub const fn is_unbounded(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }
}

/// Conjunctive product filter. `ProductFilter::default()` matches everything.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProductFilter {
    pub category: Option<String>,
    pub price: PriceRange,
    pub min_rating: Option<Decimal>,
}

impl ProductFilter {
    /// Whether a single product satisfies every set predicate.
    #[must_use]
    pub fn matches(&self, product: &Product) -> bool {
        self.category
            .as_deref()
            .is_none_or(|category| product.category == category)
            && self.price.contains(product.price)
            && self.min_rating.is_none_or(|min| product.rating >= min)
    }

    /// The matching subset of `products`, in original relative order.
    #[must_use]
    pub fn apply<'a>(&self, products: &'a [Product]) -> Vec<&'a Product> {
        products.iter().filter(|p| self.matches(p)).collect()
    }

    /// `true` when no predicate is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.category.is_none() && self.price.is_unbounded() && self.min_rating.is_none()
    }

    /// Clear every predicate.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Listing sort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// Keep the backend order.
    #[default]
    Featured,
    PriceAsc,
    PriceDesc,
    Rating,
    Newest,
}

impl SortOrder {
    /// All orders with their labels, for the sort dropdown.
    pub const OPTIONS: [(Self, &'static str); 5] = [
        (Self::Featured, "Featured"),
        (Self::PriceAsc, "Price: Low to High"),
        (Self::PriceDesc, "Price: High to Low"),
        (Self::Rating, "Top Rated"),
        (Self::Newest, "Newest"),
    ];

    /// Query-string value.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Featured => "featured",
            Self::PriceAsc => "price_asc",
            Self::PriceDesc => "price_desc",
            Self::Rating => "rating",
            Self::Newest => "newest",
        }
    }

    /// Parse a query-string value, falling back to `Featured`.
    #[must_use]
    pub fn from_query(value: Option<&str>) -> Self {
        Self::OPTIONS
            .into_iter()
            .map(|(order, _)| order)
            .find(|order| Some(order.as_str()) == value)
            .unwrap_or_default()
    }

    /// Stable in-place sort.
    pub fn sort(&self, products: &mut [&Product]) {
        match self {
            Self::Featured => {}
            Self::PriceAsc => products.sort_by_key(|p| p.price),
            Self::PriceDesc => products.sort_by(|a, b| b.price.cmp(&a.price)),
            Self::Rating => products.sort_by(|a, b| b.rating.cmp(&a.rating)),
            Self::Newest => products.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
        }
    }
}

/// Filter + sort applied together.
#[must_use]
pub fn derive_listing<'a>(
    products: &'a [Product],
    filter: &ProductFilter,
    sort: SortOrder,
) -> Vec<&'a Product> {
    let mut listing = filter.apply(products);
    sort.sort(&mut listing);
    listing
}

/// Category counts and price bounds for the filter sidebar.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CatalogFacets {
    /// Category name to product count, alphabetical.
    pub categories: BTreeMap<String, usize>,
    pub min_price: Option<Price>,
    pub max_price: Option<Price>,
}

impl CatalogFacets {
    /// Compute facets over an unfiltered product list.
    #[must_use]
    pub fn from_products(products: &[Product]) -> Self {
        let mut categories = BTreeMap::new();
        for product in products {
            *categories.entry(product.category.clone()).or_insert(0) += 1;
        }

        Self {
            categories,
            min_price: products.iter().map(|p| p.price).min(),
            max_price: products.iter().map(|p| p.price).max(),
        }
    }
}

/// Up to `limit` other products in the same category.
#[must_use]
pub fn related<'a>(product: &Product, products: &'a [Product], limit: usize) -> Vec<&'a Product> {
    products
        .iter()
        .filter(|p| p.id != product.id && p.category == product.category)
        .take(limit)
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn product(id: i32, category: &str, price: u32, rating: i64) -> Product {
        Product {
            id: ProductId::new(id),
            name: format!("Item {id}"),
            slug: format!("item-{id}"),
            description: String::new(),
            category: category.to_string(),
            price: Price::dollars(price),
            compare_at_price: None,
            rating: Decimal::new(rating, 1),
            review_count: 0,
            stock: 10,
            image_url: None,
            bestseller: false,
            featured: false,
            created_at: DateTime::from_timestamp(1_700_000_000 + i64::from(id), 0).unwrap(),
        }
    }

    fn ids(products: &[&Product]) -> Vec<i32> {
        products.iter().map(|p| p.id.as_i32()).collect()
    }

    #[test]
    fn test_was_price_only_when_higher() {
        let mut item = product(1, "Office", 999, 40);
        assert_eq!(item.was_price(), None);
        item.compare_at_price = Some(Price::dollars(899));
        assert_eq!(item.was_price(), None);
        item.compare_at_price = Some(Price::dollars(1299));
        assert_eq!(item.was_price(), Some(Price::dollars(1299)));
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let products = vec![product(1, "Office", 999, 40), product(2, "Bedroom", 2999, 45)];
        let filter = ProductFilter::default();
        assert!(filter.is_empty());
        assert_eq!(ids(&filter.apply(&products)), vec![1, 2]);
    }

    #[test]
    fn test_predicates_are_conjunctive() {
        let products = vec![
            product(1, "Office", 999, 40),
            product(2, "Office", 2500, 48),
            product(3, "Dining", 1200, 49),
            product(4, "Office", 1500, 35),
        ];
        let filter = ProductFilter {
            category: Some("Office".to_string()),
            price: PriceRange::between(Decimal::ZERO, Decimal::from(2000)),
            min_rating: Some(Decimal::new(38, 1)),
        };
        assert_eq!(ids(&filter.apply(&products)), vec![1]);
    }

    #[test]
    fn test_price_bounds_are_inclusive() {
        let range = PriceRange::between(Decimal::from(999), Decimal::from(2000));
        assert!(range.contains(Price::dollars(999)));
        assert!(range.contains(Price::dollars(2000)));
        assert!(!range.contains(Price::from_cents(200_001)));
    }

    #[test]
    fn test_reset_restores_full_list() {
        let products = vec![product(1, "Office", 999, 40), product(2, "Bedroom", 2999, 45)];
        let mut filter = ProductFilter {
            category: Some("Bedroom".to_string()),
            ..ProductFilter::default()
        };
        assert_eq!(ids(&filter.apply(&products)), vec![2]);
        filter.reset();
        assert_eq!(filter.apply(&products), products.iter().collect::<Vec<_>>());
    }

    #[test]
    fn test_sort_orders() {
        let products = vec![
            product(1, "Office", 1500, 40),
            product(2, "Office", 999, 49),
            product(3, "Office", 2999, 45),
        ];
        let all = ProductFilter::default();
        assert_eq!(ids(&derive_listing(&products, &all, SortOrder::Featured)), vec![1, 2, 3]);
        assert_eq!(ids(&derive_listing(&products, &all, SortOrder::PriceAsc)), vec![2, 1, 3]);
        assert_eq!(ids(&derive_listing(&products, &all, SortOrder::PriceDesc)), vec![3, 1, 2]);
        assert_eq!(ids(&derive_listing(&products, &all, SortOrder::Rating)), vec![2, 3, 1]);
        assert_eq!(ids(&derive_listing(&products, &all, SortOrder::Newest)), vec![3, 2, 1]);
    }

    #[test]
    fn test_sort_from_query_falls_back() {
        assert_eq!(SortOrder::from_query(Some("price_desc")), SortOrder::PriceDesc);
        assert_eq!(SortOrder::from_query(Some("bogus")), SortOrder::Featured);
        assert_eq!(SortOrder::from_query(None), SortOrder::Featured);
    }

    #[test]
    fn test_facets() {
        let products = vec![
            product(1, "Office", 1500, 40),
            product(2, "Dining", 999, 49),
            product(3, "Office", 2999, 45),
        ];
        let facets = CatalogFacets::from_products(&products);
        assert_eq!(facets.categories.get("Office"), Some(&2));
        assert_eq!(facets.categories.get("Dining"), Some(&1));
        assert_eq!(facets.min_price, Some(Price::dollars(999)));
        assert_eq!(facets.max_price, Some(Price::dollars(2999)));
    }

    #[test]
    fn test_related_excludes_self() {
        let products = vec![
            product(1, "Office", 1500, 40),
            product(2, "Dining", 999, 49),
            product(3, "Office", 2999, 45),
        ];
        assert_eq!(ids(&related(&products[0], &products, 4)), vec![3]);
    }
}
