//! Discount code management.
//!
//! Codes change what customers pay, so the whole screen sits behind
//! `access_financials` rather than `manage_products`.

use std::str::FromStr;

use askama::Template;
use axum::{
    Form,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::instrument;

use timberline_core::discount::{DiscountCode, normalize_code};
use timberline_core::{DiscountCodeId, DiscountKind, Price, Table};
use timberline_realtime::{BackendError, Query as TableQuery, TableClientExt};

use crate::components::ListTable;
use crate::error::{AppError, Result};
use crate::filters;
use crate::middleware::{Authorized, require};
use crate::routes::{LOAD_ERROR, Notice, StaffView, non_blank, parse_price, render};
use crate::state::AppState;

/// Discount list template, with the create form underneath.
#[derive(Template)]
#[template(path = "discounts/index.html")]
pub struct DiscountsIndexTemplate {
    pub staff: StaffView,
    pub current_path: String,
    pub table: ListTable,
    pub codes: Vec<DiscountCode>,
    pub form: DiscountForm,
    pub notice: Option<String>,
    pub error: Option<String>,
}

/// New code form as submitted. Dates are `YYYY-MM-DD`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiscountForm {
    pub code: String,
    pub kind: String,
    pub value: String,
    #[serde(default)]
    pub min_subtotal: String,
    #[serde(default)]
    pub usage_limit: String,
    #[serde(default)]
    pub starts_on: String,
    #[serde(default)]
    pub expires_on: String,
}

/// Validated discount columns.
#[derive(Debug, Clone, Serialize)]
pub struct DiscountRecord {
    pub code: String,
    pub kind: DiscountKind,
    pub value: Decimal,
    pub min_subtotal: Option<Price>,
    pub usage_limit: Option<i32>,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

fn parse_day(raw: &str, label: &str) -> std::result::Result<Option<DateTime<Utc>>, String> {
    non_blank(Some(raw))
        .map(|day| {
            NaiveDate::parse_from_str(day, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| dt.and_utc())
                .ok_or_else(|| format!("{label} must be a date like 2026-03-01."))
        })
        .transpose()
}

impl DiscountForm {
    /// Validate into a record.
    ///
    /// # Errors
    ///
    /// Returns a message for the first invalid field.
    pub fn validate(&self) -> std::result::Result<DiscountRecord, String> {
        let code = normalize_code(&self.code);
        if code.is_empty() || !code.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err("Code must be letters, digits, or dashes.".to_string());
        }

        let kind = DiscountKind::from_str(self.kind.trim()).map_err(|e| e.to_string())?;
        let value = Decimal::from_str(self.value.trim())
            .ok()
            .filter(|v| *v > Decimal::ZERO)
            .ok_or("Value must be a positive number.")?;
        if kind == DiscountKind::Percentage && value > Decimal::ONE_HUNDRED {
            return Err("A percentage cannot exceed 100.".to_string());
        }

        let min_subtotal = match non_blank(Some(&self.min_subtotal)) {
            Some(raw) => Some(parse_price(raw).ok_or("Minimum subtotal must be a positive amount.")?),
            None => None,
        };
        let usage_limit = match non_blank(Some(&self.usage_limit)) {
            Some(raw) => Some(
                raw.parse::<i32>()
                    .ok()
                    .filter(|n| *n > 0)
                    .ok_or("Usage limit must be a whole number above zero.")?,
            ),
            None => None,
        };

        let starts_at = parse_day(&self.starts_on, "Start date")?;
        let expires_at = parse_day(&self.expires_on, "Expiry date")?;
        if let (Some(start), Some(end)) = (starts_at, expires_at)
            && end <= start
        {
            return Err("Expiry must be after the start date.".to_string());
        }

        Ok(DiscountRecord {
            code,
            kind,
            value,
            min_subtotal,
            usage_limit,
            starts_at,
            expires_at,
        })
    }
}

async fn page(
    auth: &Authorized<require::AccessFinancials>,
    state: &AppState,
    form: DiscountForm,
    notice: Option<String>,
    error: Option<String>,
) -> Html<String> {
    let select = TableQuery::new().order_by("code", true);
    let (codes, load_error) = match state.tables().fetch::<DiscountCode>(Table::DiscountCodes, &select).await {
        Ok(codes) => (codes, None),
        Err(e) => {
            tracing::error!("Failed to fetch discount codes: {e}");
            (vec![], Some(LOAD_ERROR.to_string()))
        }
    };

    render(&DiscountsIndexTemplate {
        staff: StaffView::new(&auth.staff, auth.role),
        current_path: "/discounts".to_string(),
        table: ListTable::discounts(),
        codes,
        form,
        notice,
        error: error.or(load_error),
    })
}

/// Discount codes page.
#[instrument(skip(auth, state))]
pub async fn index(
    auth: Authorized<require::AccessFinancials>,
    State(state): State<AppState>,
    Query(notice): Query<Notice>,
) -> Html<String> {
    page(&auth, &state, DiscountForm::default(), notice.notice, None).await
}

/// Create a code.
///
/// # Errors
///
/// Returns the backend error for anything other than a duplicate code.
#[instrument(skip(auth, state, form), fields(staff_id = %auth.staff.id, code = %form.code))]
pub async fn create(
    auth: Authorized<require::AccessFinancials>,
    State(state): State<AppState>,
    Form(form): Form<DiscountForm>,
) -> Result<Response> {
    let record = match form.validate() {
        Ok(record) => record,
        Err(message) => {
            let body = page(&auth, &state, form, None, Some(message)).await;
            return Ok((StatusCode::UNPROCESSABLE_ENTITY, body).into_response());
        }
    };

    match state
        .tables()
        .create::<DiscountCode, _>(Table::DiscountCodes, &record)
        .await
    {
        Ok(code) => {
            tracing::info!(discount_id = %code.id, "discount code created");
            Ok(Redirect::to("/discounts?notice=Code+created").into_response())
        }
        Err(BackendError::Conflict(_)) => {
            let message = format!("The code {} already exists.", record.code);
            let body = page(&auth, &state, form, None, Some(message)).await;
            Ok((StatusCode::CONFLICT, body).into_response())
        }
        Err(e) => Err(e.into()),
    }
}

/// Flip a code between active and inactive.
///
/// # Errors
///
/// Returns `NotFound` for an unknown code.
#[instrument(skip(auth, state), fields(staff_id = %auth.staff.id))]
pub async fn toggle(
    auth: Authorized<require::AccessFinancials>,
    State(state): State<AppState>,
    Path(id): Path<DiscountCodeId>,
) -> Result<Redirect> {
    let tables = state.tables();
    let code: DiscountCode = tables.fetch_by_id(Table::DiscountCodes, id.into()).await?;
    let updated: DiscountCode = tables
        .modify(Table::DiscountCodes, id.into(), &json!({ "active": !code.active }))
        .await?;

    tracing::info!(discount_id = %id, active = updated.active, "discount code toggled");
    Ok(Redirect::to("/discounts"))
}

/// Delete a code. Orders keep the code text they were placed with.
///
/// # Errors
///
/// Returns `NotFound` for an unknown code.
#[instrument(skip(auth, state), fields(staff_id = %auth.staff.id))]
pub async fn delete(
    auth: Authorized<require::AccessFinancials>,
    State(state): State<AppState>,
    Path(id): Path<DiscountCodeId>,
) -> Result<Redirect> {
    state
        .tables()
        .delete(Table::DiscountCodes, id.into())
        .await
        .map_err(|e| match e {
            BackendError::NotFound => AppError::NotFound(format!("discount code {id}")),
            other => other.into(),
        })?;
    tracing::info!(discount_id = %id, "discount code deleted");
    Ok(Redirect::to("/discounts?notice=Code+deleted"))
}
