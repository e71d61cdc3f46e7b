//! Cart route handlers.
//!
//! The cart is a list of `(product_id, quantity)` pairs stored in the shopper's
//! session. Names and prices are always resolved against the current catalog
//! snapshot, so a price change or a deleted product shows up on the next view.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::State,
    response::{IntoResponse, Redirect},
};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::instrument;

use timberline_core::catalog::Product;
use timberline_core::order::{OrderLine, OrderTotals};
use timberline_core::{Price, ProductId};

use crate::error::{Result, add_breadcrumb};
use crate::filters;
use crate::state::AppState;

/// Session key holding the cart.
pub const CART_KEY: &str = "cart";

/// Per-line quantity cap.
pub const MAX_QUANTITY: u32 = 10;

/// One cart entry as stored in the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartEntry {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// Session cart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub entries: Vec<CartEntry>,
}

impl Cart {
    /// Load the cart from the session, empty if absent.
    ///
    /// # Errors
    ///
    /// Returns the session store error.
    pub async fn load(session: &Session) -> std::result::Result<Self, tower_sessions::session::Error> {
        Ok(session.get::<Self>(CART_KEY).await?.unwrap_or_default())
    }

    /// Write the cart back to the session.
    ///
    /// # Errors
    ///
    /// Returns the session store error.
    pub async fn save(&self, session: &Session) -> std::result::Result<(), tower_sessions::session::Error> {
        session.insert(CART_KEY, self).await
    }

    /// Add `quantity` of a product, merging with an existing line.
    pub fn add(&mut self, product_id: ProductId, quantity: u32) {
        let quantity = quantity.clamp(1, MAX_QUANTITY);
        match self.entries.iter_mut().find(|e| e.product_id == product_id) {
            Some(entry) => entry.quantity = (entry.quantity + quantity).min(MAX_QUANTITY),
            None => self.entries.push(CartEntry {
                product_id,
                quantity,
            }),
        }
    }

    /// Set a line's quantity; zero removes it.
    pub fn update(&mut self, product_id: ProductId, quantity: u32) {
        if quantity == 0 {
            self.remove(product_id);
        } else if let Some(entry) = self.entries.iter_mut().find(|e| e.product_id == product_id) {
            entry.quantity = quantity.min(MAX_QUANTITY);
        }
    }

    pub fn remove(&mut self, product_id: ProductId) {
        self.entries.retain(|e| e.product_id != product_id);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.entries.iter().map(|e| e.quantity).sum()
    }

    /// Priced lines for products still in the catalog.
    #[must_use]
    pub fn lines(&self, catalog: &[Product]) -> Vec<OrderLine> {
        self.entries
            .iter()
            .filter_map(|entry| {
                let product = catalog.iter().find(|p| p.id == entry.product_id)?;
                Some(OrderLine {
                    product_id: product.id,
                    product_name: product.name.clone(),
                    unit_price: product.price,
                    quantity: entry.quantity,
                })
            })
            .collect()
    }
}

/// Cart line display data.
#[derive(Clone)]
pub struct CartLineView {
    pub product_id: ProductId,
    pub name: String,
    pub slug: String,
    pub unit_price: Price,
    pub quantity: u32,
    pub line_total: Price,
}

/// Cart page template.
#[derive(Template, WebTemplate)]
#[template(path = "cart/show.html")]
pub struct CartShowTemplate {
    pub lines: Vec<CartLineView>,
    pub totals: OrderTotals,
    pub max_quantity: u32,
}

impl CartShowTemplate {
    fn build(cart: &Cart, catalog: &[Product]) -> Self {
        let lines = cart.lines(catalog);
        let totals = OrderTotals::compute(&lines, Price::ZERO);
        let lines = lines
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
            .collect();

        Self {
            lines,
            totals,
            max_quantity: MAX_QUANTITY,
        }
    }
}

/// Add to cart form data.
#[derive(Debug, Deserialize)]
pub struct AddToCartForm {
    pub product_id: ProductId,
    pub quantity: Option<u32>,
}

/// Update quantity form data.
#[derive(Debug, Deserialize)]
pub struct UpdateCartForm {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// Remove line form data.
#[derive(Debug, Deserialize)]
pub struct RemoveFromCartForm {
    pub product_id: ProductId,
}

/// Display the cart.
///
/// # Errors
///
/// Returns an error if the session cannot be read.
#[instrument(skip(state, session))]
pub async fn show(State(state): State<AppState>, session: Session) -> Result<impl IntoResponse> {
    let cart = Cart::load(&session).await?;
    Ok(CartShowTemplate::build(&cart, &state.catalog().snapshot()))
}

/// Add a product. Unknown products are ignored.
///
/// # Errors
///
/// Returns an error if the session cannot be read or written.
#[instrument(skip(state, session))]
pub async fn add(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<AddToCartForm>,
) -> Result<Redirect> {
    let known = state
        .catalog()
        .snapshot()
        .iter()
        .any(|p| p.id == form.product_id);
    if !known {
        tracing::warn!(product_id = %form.product_id, "add to cart for unknown product");
        return Ok(Redirect::to("/cart"));
    }

    let mut cart = Cart::load(&session).await?;
    cart.add(form.product_id, form.quantity.unwrap_or(1));
    cart.save(&session).await?;

    let product_id = form.product_id.to_string();
    add_breadcrumb("cart", "Added item", Some(&[("product_id", product_id.as_str())]));
    Ok(Redirect::to("/cart"))
}

/// Change a line's quantity.
///
/// # Errors
///
/// Returns an error if the session cannot be read or written.
#[instrument(skip(session))]
pub async fn update(session: Session, Form(form): Form<UpdateCartForm>) -> Result<Redirect> {
    let mut cart = Cart::load(&session).await?;
    cart.update(form.product_id, form.quantity);
    cart.save(&session).await?;
    Ok(Redirect::to("/cart"))
}

/// Remove a line.
///
/// # Errors
///
/// Returns an error if the session cannot be read or written.
#[instrument(skip(session))]
pub async fn remove(session: Session, Form(form): Form<RemoveFromCartForm>) -> Result<Redirect> {
    let mut cart = Cart::load(&session).await?;
    cart.remove(form.product_id);
    cart.save(&session).await?;
    Ok(Redirect::to("/cart"))
}
