//! Timberline Storefront library.
//!
//! The public furniture shop: catalog browsing over a live mirror of the
//! `products` table, content pages, a session cart, and checkout.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod content;
pub mod error;
pub mod filters;
pub mod middleware;
pub mod routes;
pub mod state;
