//! Timberline Realtime - table access and live change mirroring.
//!
//! Both web services read and write the hosted `PostgreSQL` backend through two
//! narrow collaborators:
//!
//! - [`TableClient`] - `select`/`insert`/`update`/`delete`/`rpc` on named tables
//! - [`ChangeFeed`] - row change notifications per (channel, table, event)
//!
//! On top of those sits the live-table mirror:
//!
//! - [`MirroredCollection`] - a replaceable local snapshot of one table
//! - [`LiveTableMirror`] - registers interest in table changes and runs a
//!   handler (normally "refetch and replace") for every matching notification
//! - [`MirrorHandle`] - owns the subscriptions; dropping it tears them down
//!
//! # Implementations
//!
//! - [`postgres::PgTableClient`] / [`postgres::PgChangeFeed`] - sqlx against the
//!   real database, with `LISTEN timberline_changes` feeding the change hub
//! - [`memory::MemoryBackend`] - in-process tables for tests
//!
//! # Example
//!
//! ```rust,ignore
//! let products = MirroredCollection::<Product>::from_client(
//!     client.clone(),
//!     Table::Products,
//!     Query::new().order_by("id", true),
//! );
//! products.refresh().await?;
//!
//! let handle = LiveTableMirror::new(feed.clone())
//!     .channel("shop-catalog")
//!     .mirror(&products)
//!     .activate()
//!     .await?;
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod client;
pub mod collection;
pub mod error;
pub mod feed;
pub mod memory;
pub mod mirror;
pub mod postgres;
pub mod query;

pub use client::{TableClient, TableClientExt};
pub use collection::{MirroredCollection, RefreshOutcome, WeakCollection};
pub use error::BackendError;
pub use feed::{ChangeEvent, ChangeFeed, ChangeHub, ChangeNotification, EventFilter, Subscription};
pub use mirror::{DEFAULT_CHANNEL, LiveTableMirror, MirrorError, MirrorHandle, MirrorState, Toast};
pub use query::{Filter, Query};
