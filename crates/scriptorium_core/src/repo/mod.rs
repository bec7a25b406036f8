//! Repository layer abstractions and SQLite implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts.
//! - Isolate SQLite query details from service orchestration.
//!
//! # Invariants
//! - Repository writes validate entities before persistence.
//! - Every multi-row write runs in one `BEGIN IMMEDIATE` transaction; an
//!   error before commit leaves storage untouched.
//! - Repository APIs return semantic errors (`NotFound`, `Conflict`) in
//!   addition to DB transport errors.

pub mod chapter_repo;
pub mod error;
pub mod hierarchy_repo;
pub mod lore_repo;
pub mod tag_repo;

pub use chapter_repo::{ChapterRepository, MoveOutcome, RemovalOutcome, SqliteChapterRepository};
pub use error::{RepoError, RepoResult};
pub use hierarchy_repo::{HierarchyRepository, SqliteHierarchyRepository};
pub use lore_repo::{LoreRepository, SqliteLoreRepository};
pub use tag_repo::{SqliteTagRepository, TagRepository};
