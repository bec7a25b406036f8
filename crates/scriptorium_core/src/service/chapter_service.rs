//! Chapter use-case service.
//!
//! # Responsibility
//! - Provide chapter create/get/list/update/delete APIs.
//! - Drive append, remove and move through the position sequencer.
//! - Classify ordering failures for callers and log them for investigation.
//!
//! # Invariants
//! - After every successful call the tome's positions are exactly `1..=N`.
//! - A detected density violation aborts the call without writes; it is
//!   logged at error level and never repaired silently.
//! - Nothing is retried here; callers re-issue the whole operation.

use crate::error::CoreErrorKind;
use crate::model::chapter::{Chapter, ChapterId, ChapterPatch, ChapterSummary, NewChapter};
use crate::model::hierarchy::{CollectionId, TomeId};
use crate::model::text::normalize_label;
use crate::ordering::position::PositionError;
use crate::repo::chapter_repo::{ChapterRepository, RemovalOutcome};
use crate::repo::error::RepoError;
use log::{error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// Errors from chapter service operations.
#[derive(Debug)]
pub enum ChapterServiceError {
    /// Title is blank after trim.
    InvalidTitle,
    /// Target position is negative (moves) or below 1 (removals).
    InvalidPosition(i64),
    TomeNotFound(TomeId),
    ChapterNotFound(ChapterId),
    /// No chapter of the tome occupies the requested position.
    PositionNotFound { tome_id: TomeId, position: i64 },
    /// Stored positions contradict the density invariant.
    InvariantViolation(String),
    /// Repository-level failure.
    Repo(RepoError),
}

impl ChapterServiceError {
    pub fn kind(&self) -> CoreErrorKind {
        match self {
            Self::InvalidTitle | Self::InvalidPosition(_) => CoreErrorKind::Validation,
            Self::TomeNotFound(_) | Self::ChapterNotFound(_) | Self::PositionNotFound { .. } => {
                CoreErrorKind::NotFound
            }
            Self::InvariantViolation(_) => CoreErrorKind::InvariantViolation,
            Self::Repo(err) => err.kind(),
        }
    }
}

impl Display for ChapterServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidTitle => write!(f, "chapter title must not be blank"),
            Self::InvalidPosition(value) => write!(f, "invalid chapter position: {value}"),
            Self::TomeNotFound(id) => write!(f, "tome not found: {id}"),
            Self::ChapterNotFound(id) => write!(f, "chapter not found: {id}"),
            Self::PositionNotFound { tome_id, position } => {
                write!(f, "no chapter at position {position} in tome {tome_id}")
            }
            Self::InvariantViolation(details) => {
                write!(f, "chapter ordering invariant violated: {details}")
            }
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ChapterServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for ChapterServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound {
                entity: "tome",
                id,
            } => Self::TomeNotFound(id),
            RepoError::NotFound {
                entity: "chapter",
                id,
            } => Self::ChapterNotFound(id),
            RepoError::Ordering(PositionError::NegativeTarget(value)) => {
                Self::InvalidPosition(value)
            }
            RepoError::Ordering(
                err @ (PositionError::NotDense { .. } | PositionError::ChapterNotInTome(_)),
            ) => Self::InvariantViolation(err.to_string()),
            other => Self::Repo(other),
        }
    }
}

/// Chapter service facade.
pub struct ChapterService<R: ChapterRepository> {
    repo: R,
}

impl<R: ChapterRepository> ChapterService<R> {
    /// Creates service from repository implementation.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Appends a chapter at the end of its tome.
    pub fn create_chapter(
        &self,
        tome_id: TomeId,
        chapter: NewChapter,
    ) -> Result<Chapter, ChapterServiceError> {
        let title = normalize_label(&chapter.title).ok_or(ChapterServiceError::InvalidTitle)?;
        let chapter = NewChapter { title, ..chapter };

        let created = self
            .repo
            .append_chapter(tome_id, &chapter)
            .map_err(|err| self.logged("chapter_append", tome_id, err.into()))?;
        info!(
            "event=chapter_append module=chapter status=ok tome={tome_id} chapter={} position={}",
            created.id, created.position
        );
        Ok(created)
    }

    pub fn get_chapter(&self, id: ChapterId) -> Result<Option<Chapter>, ChapterServiceError> {
        Ok(self.repo.get_chapter(id)?)
    }

    /// Lists chapter summaries ordered by position.
    pub fn list_chapters(
        &self,
        tome_id: TomeId,
    ) -> Result<Vec<ChapterSummary>, ChapterServiceError> {
        if !self.repo.tome_exists(tome_id)? {
            return Err(ChapterServiceError::TomeNotFound(tome_id));
        }
        Ok(self.repo.list_chapters(tome_id)?)
    }

    /// Applies a partial content update. Positions are not patchable.
    pub fn update_chapter(
        &self,
        id: ChapterId,
        mut patch: ChapterPatch,
    ) -> Result<Chapter, ChapterServiceError> {
        if let Some(title) = patch.title.take() {
            patch.title =
                Some(normalize_label(&title).ok_or(ChapterServiceError::InvalidTitle)?);
        }
        if patch.is_empty() {
            return self
                .repo
                .get_chapter(id)?
                .ok_or(ChapterServiceError::ChapterNotFound(id));
        }
        Ok(self.repo.update_chapter(id, &patch)?)
    }

    /// Deletes one chapter and closes the gap it leaves.
    pub fn delete_chapter(&self, id: ChapterId) -> Result<RemovalOutcome, ChapterServiceError> {
        let outcome = self.repo.delete_chapter(id).map_err(|err| {
            self.logged("chapter_delete", id, ChapterServiceError::from(err))
        })?;
        log_removal(&outcome);
        Ok(outcome)
    }

    /// Deletes the chapter at `position` and closes the gap it leaves.
    pub fn remove_at(
        &self,
        tome_id: TomeId,
        position: i64,
    ) -> Result<RemovalOutcome, ChapterServiceError> {
        if position < 1 {
            return Err(ChapterServiceError::InvalidPosition(position));
        }
        let outcome = self
            .repo
            .remove_at(tome_id, position)
            .map_err(|err| match err {
                RepoError::Ordering(PositionError::PositionNotFound(position)) => {
                    ChapterServiceError::PositionNotFound { tome_id, position }
                }
                other => self.logged("chapter_remove", tome_id, other.into()),
            })?;
        log_removal(&outcome);
        Ok(outcome)
    }

    /// Moves one chapter and returns the fresh ordering of its tome.
    ///
    /// Targets outside `1..=N` are clamped; negative targets are rejected.
    pub fn move_chapter(
        &self,
        id: ChapterId,
        to: i64,
    ) -> Result<Vec<ChapterSummary>, ChapterServiceError> {
        if to < 0 {
            return Err(ChapterServiceError::InvalidPosition(to));
        }

        let started_at = Instant::now();
        let outcome = self
            .repo
            .move_chapter(id, to)
            .map_err(|err| self.logged("chapter_move", id, err.into()))?;
        let status = if outcome.plan.is_noop() { "noop" } else { "ok" };
        info!(
            "event=chapter_move module=chapter status={status} tome={} chapter={id} from={} to={} requested={to} shifted={} duration_ms={}",
            outcome.tome_id,
            outcome.plan.from,
            outcome.plan.to,
            outcome.plan.shifted(),
            started_at.elapsed().as_millis()
        );
        Ok(outcome.chapters)
    }

    /// Collection that owns the chapter (Chapter → Tome → Saga → Collection).
    pub fn chapter_collection(&self, id: ChapterId) -> Result<CollectionId, ChapterServiceError> {
        self.repo
            .chapter_collection(id)?
            .ok_or(ChapterServiceError::ChapterNotFound(id))
    }

    fn logged(
        &self,
        event: &'static str,
        subject: uuid::Uuid,
        err: ChapterServiceError,
    ) -> ChapterServiceError {
        match err.kind() {
            CoreErrorKind::InvariantViolation => error!(
                "event={event} module=chapter status=error kind={} subject={subject} error={err}",
                err.kind().as_str()
            ),
            CoreErrorKind::Storage => warn!(
                "event={event} module=chapter status=error kind={} subject={subject} error={err}",
                err.kind().as_str()
            ),
            CoreErrorKind::NotFound | CoreErrorKind::Validation => {}
        }
        err
    }
}

fn log_removal(outcome: &RemovalOutcome) {
    info!(
        "event=chapter_remove module=chapter status=ok tome={} chapter={} position={} shifted={}",
        outcome.tome_id, outcome.chapter_id, outcome.removed_position, outcome.shifted
    );
}
