//! Timberline Core - Shared domain library.
//!
//! This crate provides the types and pure logic used across all Timberline components:
//! - `storefront` - Public furniture shop
//! - `admin` - Internal back office
//! - `cli` - Command-line tools for migrations, staff, and seeding
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no database access
//! and no HTTP clients. The one exception is [`env`], which reads process
//! environment variables for the service configs. Rows fetched from the backend deserialize straight
//! into the models defined here.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for IDs, prices, emails, statuses, and table names
//! - [`catalog`] - Products plus the listing filter/sort derivation
//! - [`discount`] - Discount code evaluation
//! - [`order`] - Orders, line items, totals, and status transitions
//! - [`authz`] - Staff capabilities and the role policy
//! - [`content`] - Customers, blog posts, FAQs, store locations, inbox messages
//! - [`finance`] - Revenue summaries over orders
//! - [`env`] - Environment variable parsing and secret checks

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod authz;
pub mod catalog;
pub mod content;
pub mod discount;
pub mod env;
pub mod finance;
pub mod order;
pub mod types;

pub use types::*;
