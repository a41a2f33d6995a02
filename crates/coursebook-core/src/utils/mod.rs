//! Utility functions for presenting catalogue data as text.

pub mod format;

// Re-export commonly used functions at module level
pub use format::{
    category_icon, course_excerpt, format_price, progress_bar, rating_display,
    thumbnail_or_default, truncate,
};
