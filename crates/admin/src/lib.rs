//! Timberline Admin library.
//!
//! The staff back office: catalog, orders, discounts, reporting, content,
//! and staff accounts. Every page re-checks the signed-in staff member's
//! role against the backend before doing anything.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod components;
pub mod config;
pub mod error;
pub mod filters;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
