//! Substring search over the stored lines, and the filtered view built from it.

pub mod filter;
pub mod matcher;

pub use filter::{ActiveFilter, FilterView};
pub use matcher::{match_lines, SEARCH_BATCH_LINES};
