//! Caller-facing error classification.
//!
//! Every service and search error maps onto one of these kinds so the
//! surrounding transport layer can pick a status code without matching on
//! individual variants.

use serde::Serialize;

/// Coarse error category shared by all core operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CoreErrorKind {
    /// A referenced entity or parent does not exist. No effect was applied.
    NotFound,
    /// Input was rejected before any write was attempted.
    Validation,
    /// Stored state contradicts an ordering invariant. The operation was
    /// aborted without writes and should be investigated, not retried.
    InvariantViolation,
    /// The store rejected or lost the write batch. Nothing was applied; the
    /// caller may retry the whole logical operation.
    Storage,
}

impl CoreErrorKind {
    /// Stable snake_case label, suitable for log fields.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Validation => "validation",
            Self::InvariantViolation => "invariant_violation",
            Self::Storage => "storage",
        }
    }
}
