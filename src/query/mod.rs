//! Legacy-SQL query construction for the GitHub event archive.

pub mod options;
pub mod select;

pub use options::Options;
pub use select::{in_list, json_extract, like, not_in, not_like, select, select_all, Column, QueryError, SelectBuilder};
