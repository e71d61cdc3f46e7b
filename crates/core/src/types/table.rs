//! Names of the backend tables.
//!
//! Table names are a closed set so they can be interpolated into SQL and
//! channel names without escaping.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// A table in the hosted backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Products,
    Orders,
    OrderItems,
    Profiles,
    DiscountCodes,
    BlogPosts,
    ContactSubmissions,
    NewsletterSubscribers,
    Faqs,
    StoreLocations,
    StaffUsers,
}

/// Error returned for a table name outside [`Table::ALL`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown table: {0}")]
pub struct UnknownTable(pub String);

impl Table {
    /// Every table, in migration order.
    pub const ALL: [Self; 11] = [
        Self::Products,
        Self::Orders,
        Self::OrderItems,
        Self::Profiles,
        Self::DiscountCodes,
        Self::BlogPosts,
        Self::ContactSubmissions,
        Self::NewsletterSubscribers,
        Self::Faqs,
        Self::StoreLocations,
        Self::StaffUsers,
    ];

    /// The SQL table name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Products => "products",
            Self::Orders => "orders",
            Self::OrderItems => "order_items",
            Self::Profiles => "profiles",
            Self::DiscountCodes => "discount_codes",
            Self::BlogPosts => "blog_posts",
            Self::ContactSubmissions => "contact_submissions",
            Self::NewsletterSubscribers => "newsletter_subscribers",
            Self::Faqs => "faqs",
            Self::StoreLocations => "store_locations",
            Self::StaffUsers => "staff_users",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Table {
    type Err = UnknownTable;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|table| table.as_str() == s)
            .ok_or_else(|| UnknownTable(s.to_string()))
    }
}
