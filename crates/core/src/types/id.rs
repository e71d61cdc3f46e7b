//! Row identifiers.
//!
//! Each table keys rows by a generated integer. Rows travel as JSON, so an ID
//! only needs to serialize as a bare number and parse from a path segment.

/// Declares an `i32` row ID newtype.
///
/// The type serializes transparently, parses with `FromStr` (surrounding
/// whitespace allowed) and widens to the `i64` the table client keys on.
///
/// # Example
///
/// ```rust
/// # use timberline_core::define_id;
/// define_id!(FaqId);
///
/// let id: FaqId = " 42 ".parse().unwrap();
/// assert_eq!(id.as_i32(), 42);
/// assert_eq!(i64::from(id), 42);
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(i32);

        impl $name {
            #[must_use]
            pub const fn new(id: i32) -> Self {
                Self(id)
            }

            #[must_use]
            pub const fn as_i32(&self) -> i32 {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                ::core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl ::core::str::FromStr for $name {
            type Err = ::core::num::ParseIntError;

            fn from_str(s: &str) -> ::core::result::Result<Self, Self::Err> {
                s.trim().parse::<i32>().map(Self)
            }
        }

        impl From<i32> for $name {
            fn from(id: i32) -> Self {
                Self(id)
            }
        }

        impl From<$name> for i32 {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                i64::from(id.0)
            }
        }
    };
}

// Catalog and sales
define_id!(ProductId);
define_id!(OrderId);
define_id!(OrderItemId);
define_id!(CustomerId);
define_id!(DiscountCodeId);

// Content and inbound messages
define_id!(BlogPostId);
define_id!(ContactSubmissionId);
define_id!(SubscriberId);
define_id!(FaqId);
define_id!(StoreLocationId);

// Back office
define_id!(StaffUserId);

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_widens_for_table_client() {
        assert_eq!(i64::from(StaffUserId::new(3)), 3);
        assert_eq!(ProductId::from(5).to_string(), "5");
    }

    #[test]
    fn test_parse_from_path_segment() {
        let id: ProductId = " 17 ".parse().unwrap();
        assert_eq!(id, ProductId::new(17));
        assert!("seventeen".parse::<ProductId>().is_err());
    }

    #[test]
    fn test_serializes_as_bare_integer() {
        let json = serde_json::to_string(&OrderId::new(9)).unwrap();
        assert_eq!(json, "9");
        let back: OrderId = serde_json::from_str("9").unwrap();
        assert_eq!(back.as_i32(), 9);
    }
}
