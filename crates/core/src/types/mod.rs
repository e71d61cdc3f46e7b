//! Value types shared by the storefront, the admin panel and the CLI.

pub mod email;
pub mod id;
pub mod price;
pub mod status;
pub mod table;

pub use email::{Email, EmailError};
pub use id::*;
pub use price::Price;
pub use status::*;
pub use table::{Table, UnknownTable};
