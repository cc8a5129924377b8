//! Utility helpers for run identifiers, timestamps and report slugs.
//!
//! This module provides:
//! - Time-ordered run identifiers
//! - Lexically sortable and human-readable timestamp formatting
//! - Stable filesystem-safe slugs for place names

mod ids;
mod slug;
pub mod timestamps;

pub use ids::RunId;
pub use slug::slugify;
pub use timestamps::{now_utc, sortable_stamp, Timestamp};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_id_is_v7() {
        let id = RunId::new();
        assert_eq!(id.as_uuid().get_version_num(), 7);
    }
}
