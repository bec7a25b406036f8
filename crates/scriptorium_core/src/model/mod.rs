//! Domain records for the writing-project hierarchy and its lore.
//!
//! # Invariants
//! - Every record carries a stable UUID that is never reused.
//! - Ownership is strictly nested; tag links are the only non-owning edge.

pub mod chapter;
pub mod hierarchy;
pub mod lore;
pub mod tag;
pub mod template;
pub mod text;

use chrono::Utc;

/// Current wall-clock time as epoch milliseconds.
pub fn now_epoch_ms() -> i64 {
    Utc::now().timestamp_millis()
}
