//! Terminal output: color theme, status lines, and catalog tables.

pub mod output;
pub mod table;
pub mod theme;

pub use output::{binding, dim, error, info, section, success};
pub use table::{catalog_table, modules_table};
pub use theme::{theme, Theme};
