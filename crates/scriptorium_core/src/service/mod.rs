//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into use-case level APIs.
//! - Classify failures through `kind()` so transport layers stay thin.

pub mod chapter_service;
pub mod hierarchy_service;
pub mod lore_service;
