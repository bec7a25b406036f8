//! Search entry points.
//!
//! # Responsibility
//! - Expose the cross-kind lore autocomplete over SQLite `LIKE` matching.
//! - Keep hit labelling and merging inside core.

pub mod autocomplete;
