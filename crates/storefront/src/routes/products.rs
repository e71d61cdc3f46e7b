//! Catalog route handlers: shop-all, bestsellers, and product detail.
//!
//! All three render from the mirrored `products` snapshot, so they never wait
//! on the backend.

use std::str::FromStr;

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::instrument;

use timberline_core::catalog::{
    CatalogFacets, PriceRange, Product, ProductFilter, SortOrder, derive_listing, related,
};

use crate::error::{AppError, Result};
use crate::filters;
use crate::state::AppState;

/// Related products shown under a product.
const RELATED_COUNT: usize = 4;

/// Shown when the catalog has never loaded.
pub const CATALOG_UNAVAILABLE: &str =
    "We couldn't load the catalog just now. Please try again in a moment.";

/// Listing query string: `?category=&min_price=&max_price=&min_rating=&sort=`.
///
/// Values arrive from a GET form, so blanks mean "no constraint" and
/// unparseable numbers are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListingQuery {
    pub category: Option<String>,
    pub min_price: Option<String>,
    pub max_price: Option<String>,
    pub min_rating: Option<String>,
    pub sort: Option<String>,
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn decimal(value: Option<&str>) -> Option<Decimal> {
    non_blank(value).and_then(|v| Decimal::from_str(v).ok())
}

impl ListingQuery {
    /// The filter described by this query.
    #[must_use]
    pub fn filter(&self) -> ProductFilter {
        ProductFilter {
            category: non_blank(self.category.as_deref()).map(String::from),
            price: PriceRange {
                min: decimal(self.min_price.as_deref()),
                max: decimal(self.max_price.as_deref()),
            },
            min_rating: decimal(self.min_rating.as_deref()),
        }
    }

    #[must_use]
    pub fn sort(&self) -> SortOrder {
        SortOrder::from_query(non_blank(self.sort.as_deref()))
    }
}

/// Filter then sort `products` for a listing page.
#[must_use]
pub fn listing(products: &[Product], query: &ListingQuery) -> Vec<Product> {
    derive_listing(products, &query.filter(), query.sort())
        .into_iter()
        .cloned()
        .collect()
}

/// A `<select>` option.
#[derive(Clone)]
pub struct OptionView {
    pub value: String,
    pub label: String,
    pub selected: bool,
}

/// Listing page template (shop-all and bestsellers).
#[derive(Template, WebTemplate)]
#[template(path = "products/listing.html")]
pub struct ListingTemplate {
    pub title: String,
    pub path: String,
    pub products: Vec<Product>,
    /// Size of the page's unfiltered set
    pub total: usize,
    pub categories: Vec<OptionView>,
    pub sort_options: Vec<OptionView>,
    pub min_price: String,
    pub max_price: String,
    pub min_rating: String,
    pub price_hint: String,
    pub filtered: bool,
    pub notice: Option<String>,
}

impl ListingTemplate {
    fn build(title: &str, path: &str, base: &[Product], query: &ListingQuery, loaded: bool) -> Self {
        let filter = query.filter();
        let sort = query.sort();
        let facets = CatalogFacets::from_products(base);

        let categories = facets
            .categories
            .iter()
            .map(|(name, count)| OptionView {
                value: name.clone(),
                label: format!("{name} ({count})"),
                selected: filter.category.as_deref() == Some(name.as_str()),
            })
            .collect();

        let sort_options = SortOrder::OPTIONS
            .iter()
            .map(|(order, label)| OptionView {
                value: order.as_str().to_string(),
                label: (*label).to_string(),
                selected: *order == sort,
            })
            .collect();

        let price_hint = match (facets.min_price, facets.max_price) {
            (Some(lo), Some(hi)) => format!("{lo} to {hi}"),
            _ => String::new(),
        };

        Self {
            title: title.to_string(),
            path: path.to_string(),
            products: listing(base, query),
            total: base.len(),
            categories,
            sort_options,
            min_price: filter.price.min.map(|d| d.to_string()).unwrap_or_default(),
            max_price: filter.price.max.map(|d| d.to_string()).unwrap_or_default(),
            min_rating: filter.min_rating.map(|d| d.to_string()).unwrap_or_default(),
            price_hint,
            filtered: !filter.is_empty(),
            notice: (!loaded).then(|| CATALOG_UNAVAILABLE.to_string()),
        }
    }
}

/// Product detail template.
#[derive(Template, WebTemplate)]
#[template(path = "products/show.html")]
pub struct ProductShowTemplate {
    pub product: Product,
    pub related_products: Vec<Product>,
    pub in_stock: bool,
}

/// Every product.
#[instrument(skip(state))]
pub async fn shop(
    State(state): State<AppState>,
    Query(query): Query<ListingQuery>,
) -> impl IntoResponse {
    let catalog = state.catalog();
    let products = catalog.snapshot();
    ListingTemplate::build("Shop all", "/shop", &products, &query, catalog.version() > 0)
}

/// Products flagged as bestsellers, with the same filters as `/shop`.
#[instrument(skip(state))]
pub async fn bestsellers(
    State(state): State<AppState>,
    Query(query): Query<ListingQuery>,
) -> impl IntoResponse {
    let catalog = state.catalog();
    let bestsellers: Vec<Product> = catalog
        .snapshot()
        .iter()
        .filter(|p| p.bestseller)
        .cloned()
        .collect();
    ListingTemplate::build(
        "Bestsellers",
        "/bestsellers",
        &bestsellers,
        &query,
        catalog.version() > 0,
    )
}

/// Product detail by slug.
///
/// # Errors
///
/// Returns 404 if no product has that slug.
#[instrument(skip(state))]
pub async fn show(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse> {
    let products = state.catalog().snapshot();
    let product = products
        .iter()
        .find(|p| p.slug == slug)
        .ok_or_else(|| AppError::NotFound(format!("product {slug}")))?;

    Ok(ProductShowTemplate {
        related_products: related(product, &products, RELATED_COUNT)
            .into_iter()
            .cloned()
            .collect(),
        in_stock: product.stock > 0,
        product: product.clone(),
    })
}
