//! Product management route handlers.

use askama::Template;
use axum::{
    Form,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use timberline_core::catalog::Product;
use timberline_core::{Price, ProductId, Table};
use timberline_realtime::{BackendError, Query as TableQuery, TableClientExt};

use crate::components::ListTable;
use crate::error::{AppError, Result};
use crate::filters;
use crate::middleware::{Authorized, require};
use crate::routes::{
    LOAD_ERROR, LOW_STOCK_THRESHOLD, StaffView, non_blank, parse_price, render, slugify,
};
use crate::state::AppState;

/// `?q=&category=&notice=`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductListQuery {
    pub q: Option<String>,
    pub category: Option<String>,
    pub notice: Option<String>,
}

impl ProductListQuery {
    fn matches(&self, product: &Product) -> bool {
        let text = non_blank(self.q.as_deref()).map(str::to_lowercase);
        let text_ok = text.is_none_or(|q| {
            product.name.to_lowercase().contains(&q) || product.slug.contains(&q)
        });
        let category_ok =
            non_blank(self.category.as_deref()).is_none_or(|c| product.category == c);
        text_ok && category_ok
    }
}

/// Product list template.
#[derive(Template)]
#[template(path = "products/index.html")]
pub struct ProductsIndexTemplate {
    pub staff: StaffView,
    pub current_path: String,
    pub table: ListTable,
    pub products: Vec<Product>,
    pub query: ProductListQuery,
    pub low_stock_threshold: i32,
    pub error: Option<&'static str>,
}

impl ProductsIndexTemplate {
    /// Current value of a filter, for the filter bar.
    fn filter_value(&self, key: &str) -> &str {
        match key {
            "q" => self.query.q.as_deref(),
            "category" => self.query.category.as_deref(),
            _ => None,
        }
        .unwrap_or_default()
    }

    fn is_low_stock(&self, product: &Product) -> bool {
        product.low_stock(self.low_stock_threshold)
    }
}

/// Create/edit form fields as submitted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductForm {
    pub name: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub description: String,
    pub category: String,
    pub price: String,
    #[serde(default)]
    pub compare_at_price: String,
    #[serde(default)]
    pub stock: String,
    #[serde(default)]
    pub image_url: String,
    /// Checkboxes are absent when unticked.
    pub bestseller: Option<String>,
    pub featured: Option<String>,
}

impl From<&Product> for ProductForm {
    fn from(product: &Product) -> Self {
        Self {
            name: product.name.clone(),
            slug: product.slug.clone(),
            description: product.description.clone(),
            category: product.category.clone(),
            price: product.price.amount().to_string(),
            compare_at_price: product
                .compare_at_price
                .map(|p| p.amount().to_string())
                .unwrap_or_default(),
            stock: product.stock.to_string(),
            image_url: product.image_url.clone().unwrap_or_default(),
            bestseller: product.bestseller.then(|| "on".to_string()),
            featured: product.featured.then(|| "on".to_string()),
        }
    }
}

/// Validated product columns, used for both insert and update.
#[derive(Debug, Clone, Serialize)]
pub struct ProductRecord {
    pub name: String,
    pub slug: String,
    pub description: String,
    pub category: String,
    pub price: Price,
    pub compare_at_price: Option<Price>,
    pub stock: i32,
    pub image_url: Option<String>,
    pub bestseller: bool,
    pub featured: bool,
}

impl ProductForm {
    /// Validate into a record.
    ///
    /// # Errors
    ///
    /// Returns a message for the first invalid field.
    pub fn validate(&self) -> std::result::Result<ProductRecord, String> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err("Name is required.".to_string());
        }
        let category = self.category.trim();
        if category.is_empty() {
            return Err("Category is required.".to_string());
        }

        let slug = match non_blank(Some(&self.slug)) {
            Some(slug) => slugify(slug),
            None => slugify(name),
        };
        if slug.is_empty() {
            return Err("Slug must contain letters or digits.".to_string());
        }

        let price = parse_price(&self.price).ok_or("Price must be a positive amount.")?;
        let compare_at_price = match non_blank(Some(&self.compare_at_price)) {
            Some(raw) => Some(parse_price(raw).ok_or("Compare-at price must be a positive amount.")?),
            None => None,
        };

        let stock = match non_blank(Some(&self.stock)) {
            Some(raw) => raw
                .parse::<i32>()
                .ok()
                .filter(|s| *s >= 0)
                .ok_or("Stock must be a whole number, zero or more.")?,
            None => 0,
        };

        Ok(ProductRecord {
            name: name.to_string(),
            slug,
            description: self.description.trim().to_string(),
            category: category.to_string(),
            price,
            compare_at_price,
            stock,
            image_url: non_blank(Some(&self.image_url)).map(String::from),
            bestseller: self.bestseller.is_some(),
            featured: self.featured.is_some(),
        })
    }
}

/// New/edit product template.
#[derive(Template)]
#[template(path = "products/form.html")]
pub struct ProductFormTemplate {
    pub staff: StaffView,
    pub current_path: String,
    pub product_id: Option<ProductId>,
    pub form: ProductForm,
    pub error: Option<String>,
}

impl ProductFormTemplate {
    fn action(&self) -> String {
        self.product_id
            .map_or_else(|| "/products".to_string(), |id| format!("/products/{id}"))
    }
}

fn form_page(
    auth: &Authorized<require::ManageProducts>,
    product_id: Option<ProductId>,
    form: ProductForm,
    error: Option<String>,
) -> Html<String> {
    render(&ProductFormTemplate {
        staff: StaffView::new(&auth.staff, auth.role),
        current_path: "/products".to_string(),
        product_id,
        form,
        error,
    })
}

/// Rejected form: re-render with the message, keeping what was typed.
fn rejected(
    auth: &Authorized<require::ManageProducts>,
    product_id: Option<ProductId>,
    form: ProductForm,
    status: StatusCode,
    message: String,
) -> Response {
    (status, form_page(auth, product_id, form, Some(message))).into_response()
}

/// Product list page.
#[instrument(skip(auth, state))]
pub async fn index(
    auth: Authorized<require::ManageProducts>,
    State(state): State<AppState>,
    Query(query): Query<ProductListQuery>,
) -> Html<String> {
    let result = state
        .tables()
        .fetch::<Product>(Table::Products, &TableQuery::new().order_by("name", true))
        .await;

    let (all, error) = match result {
        Ok(products) => (products, None),
        Err(e) => {
            tracing::error!("Failed to fetch products: {e}");
            (vec![], Some(LOAD_ERROR))
        }
    };

    let mut categories: Vec<String> = all.iter().map(|p| p.category.clone()).collect();
    categories.sort();
    categories.dedup();

    let products = all.into_iter().filter(|p| query.matches(p)).collect();

    render(&ProductsIndexTemplate {
        staff: StaffView::new(&auth.staff, auth.role),
        current_path: "/products".to_string(),
        table: ListTable::products(&categories),
        products,
        query,
        low_stock_threshold: LOW_STOCK_THRESHOLD,
        error,
    })
}

/// Blank product form.
pub async fn new_page(auth: Authorized<require::ManageProducts>) -> Html<String> {
    form_page(&auth, None, ProductForm::default(), None)
}

/// Create a product.
///
/// # Errors
///
/// Returns an error if the backend write fails for a reason other than a
/// duplicate slug.
#[instrument(skip(auth, state, form), fields(staff_id = %auth.staff.id))]
pub async fn create(
    auth: Authorized<require::ManageProducts>,
    State(state): State<AppState>,
    Form(form): Form<ProductForm>,
) -> Result<Response> {
    let record = match form.validate() {
        Ok(record) => record,
        Err(message) => return Ok(rejected(&auth, None, form, StatusCode::UNPROCESSABLE_ENTITY, message)),
    };

    match state.tables().create::<Product, _>(Table::Products, &record).await {
        Ok(product) => {
            tracing::info!(product_id = %product.id, slug = %product.slug, "product created");
            Ok(Redirect::to("/products?notice=Product+created").into_response())
        }
        Err(BackendError::Conflict(_)) => Ok(rejected(
            &auth,
            None,
            form,
            StatusCode::CONFLICT,
            format!("Another product already uses the slug \"{}\".", record.slug),
        )),
        Err(e) => Err(e.into()),
    }
}

/// Edit form for an existing product.
///
/// # Errors
///
/// Returns `NotFound` for an unknown id.
pub async fn edit_page(
    auth: Authorized<require::ManageProducts>,
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
) -> Result<Html<String>> {
    let product: Product = state.tables().fetch_by_id(Table::Products, id.into()).await?;
    Ok(form_page(&auth, Some(id), ProductForm::from(&product), None))
}

/// Update a product.
///
/// # Errors
///
/// Returns `NotFound` for an unknown id, or the backend error.
#[instrument(skip(auth, state, form), fields(staff_id = %auth.staff.id))]
pub async fn update(
    auth: Authorized<require::ManageProducts>,
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
    Form(form): Form<ProductForm>,
) -> Result<Response> {
    let record = match form.validate() {
        Ok(record) => record,
        Err(message) => {
            return Ok(rejected(&auth, Some(id), form, StatusCode::UNPROCESSABLE_ENTITY, message));
        }
    };

    match state.tables().modify::<Product, _>(Table::Products, id.into(), &record).await {
        Ok(_) => {
            tracing::info!(product_id = %id, "product updated");
            Ok(Redirect::to("/products?notice=Product+saved").into_response())
        }
        Err(BackendError::Conflict(_)) => Ok(rejected(
            &auth,
            Some(id),
            form,
            StatusCode::CONFLICT,
            format!("Another product already uses the slug \"{}\".", record.slug),
        )),
        Err(e) => Err(e.into()),
    }
}

/// Delete a product.
///
/// Order lines keep their copied name and price; their `product_id` is
/// cleared by the foreign key.
///
/// # Errors
///
/// Returns `NotFound` for an unknown id.
#[instrument(skip(auth, state), fields(staff_id = %auth.staff.id))]
pub async fn delete(
    auth: Authorized<require::ManageProducts>,
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
) -> Result<Redirect> {
    state
        .tables()
        .delete(Table::Products, id.into())
        .await
        .map_err(|e| match e {
            BackendError::NotFound => AppError::NotFound(format!("product {id}")),
            other => other.into(),
        })?;
    tracing::info!(product_id = %id, "product deleted");
    Ok(Redirect::to("/products?notice=Product+deleted"))
}
