//! Utility functions for string formatting, comparison and parsing.

pub mod format;

// Re-export commonly used functions at module level
pub use format::{
    cmp_ignore_case, cmp_swedish, contains_ignore_case, format_date, format_phone, is_blank,
    parse_leading_int, parse_timestamp, truncate,
};
