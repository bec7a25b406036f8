//! Core domain logic for Scriptorium, a writing-project organiser.
//! This crate is the single source of truth for ordering, tagging and
//! hierarchy invariants.

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod model;
pub mod ordering;
pub mod repo;
pub mod search;
pub mod service;
pub mod tagging;

pub use config::{ConfigError, CoreConfig};
pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use error::CoreErrorKind;
pub use logging::{init_logging, init_logging_from_config, logging_status, LogLevel, LoggingError};
pub use model::chapter::{Chapter, ChapterId, ChapterPatch, ChapterSummary, NewChapter};
pub use model::hierarchy::{
    CollectionId, HierarchyLevel, HierarchyRecord, ProjectId, SagaId, TomeId, TreeNode,
};
pub use model::lore::{Character, EntityKind, Event, Item, LoreValidationError, Place};
pub use model::tag::{NewTag, Tag, TagId, TagPatch};
pub use repo::{
    ChapterRepository, HierarchyRepository, LoreRepository, RepoError, RepoResult,
    SqliteChapterRepository, SqliteHierarchyRepository, SqliteLoreRepository,
    SqliteTagRepository, TagRepository,
};
pub use search::autocomplete::{
    autocomplete, AutocompleteHit, AutocompleteQuery, SearchError, SearchResult,
};
pub use service::chapter_service::{ChapterService, ChapterServiceError};
pub use service::hierarchy_service::{build_project_tree, HierarchyService, HierarchyServiceError};
pub use service::lore_service::{
    CharacterDraft, EventDraft, EventWindow, ItemDraft, LoreListQuery, LoreService,
    LoreServiceError, PlaceDraft,
};
pub use tagging::filter::{filter_tagged, EntityFilter, MatchMode, TagFilter};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
