//! Reusable pieces shared by list templates.

pub mod data_table;

pub use data_table::{Column, Filter, FilterOption, ListTable};
