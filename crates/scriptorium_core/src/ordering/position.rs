//! Dense chapter position planning.
//!
//! # Responsibility
//! - Compute the position a newly appended chapter receives.
//! - Compute the minimal set of position rewrites for a removal or a move.
//!
//! # Invariants
//! - Input snapshots must already be dense (`1..=N`); anything else is
//!   reported as [`PositionError::NotDense`] and nothing is planned.
//! - Applying a returned plan to its snapshot yields a dense sequence again.
//! - Planning is pure. Callers apply plans atomically, against the same
//!   snapshot they planned from.

use crate::model::chapter::ChapterId;
use std::cmp::Ordering;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// One chapter's place in a tome snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionSlot {
    pub chapter_id: ChapterId,
    pub position: i64,
    /// Tie-break for equal positions when sorting.
    pub created_at: i64,
}

/// Single position rewrite inside a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionUpdate {
    pub chapter_id: ChapterId,
    pub from: i64,
    pub to: i64,
}

/// Planned move of one chapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovePlan {
    pub chapter_id: ChapterId,
    pub from: i64,
    /// Target after clamping into `1..=N`.
    pub to: i64,
    /// Shifted neighbours followed by the moved chapter; empty for a no-op.
    pub updates: Vec<PositionUpdate>,
}

impl MovePlan {
    pub fn is_noop(&self) -> bool {
        self.updates.is_empty()
    }

    /// Number of neighbours the move shifts.
    pub fn shifted(&self) -> usize {
        self.updates.len().saturating_sub(1)
    }
}

/// Planning failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PositionError {
    /// Requested target is negative; rejected before any shift is computed.
    NegativeTarget(i64),
    /// The chapter is not part of the snapshot.
    ChapterNotInTome(ChapterId),
    /// No chapter occupies the position being removed.
    PositionNotFound(i64),
    /// Snapshot positions are not exactly `1..=count`.
    NotDense { count: usize, positions: Vec<i64> },
}

impl Display for PositionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NegativeTarget(value) => {
                write!(f, "target position must not be negative, got {value}")
            }
            Self::ChapterNotInTome(id) => write!(f, "chapter {id} is not part of the tome"),
            Self::PositionNotFound(position) => {
                write!(f, "no chapter occupies position {position}")
            }
            Self::NotDense { count, positions } => write!(
                f,
                "positions {positions:?} do not form the dense range 1..={count}"
            ),
        }
    }
}

impl Error for PositionError {}

/// Canonical chapter order: position, then creation time, then id.
pub fn compare_slots(left: &PositionSlot, right: &PositionSlot) -> Ordering {
    left.position
        .cmp(&right.position)
        .then(left.created_at.cmp(&right.created_at))
        .then(left.chapter_id.cmp(&right.chapter_id))
}

/// Position for a chapter appended to the snapshot: `max + 1`, or `1`.
pub fn next_position(slots: &[PositionSlot]) -> i64 {
    slots
        .iter()
        .map(|slot| slot.position)
        .max()
        .map_or(1, |max| max + 1)
}

/// Clamps a requested target into `1..=count`.
pub fn clamp_target(requested: i64, count: usize) -> i64 {
    let upper = i64::try_from(count).unwrap_or(i64::MAX).max(1);
    requested.clamp(1, upper)
}

/// Verifies that the snapshot occupies exactly `1..=len`.
pub fn ensure_dense(slots: &[PositionSlot]) -> Result<(), PositionError> {
    let mut positions: Vec<i64> = slots.iter().map(|slot| slot.position).collect();
    positions.sort_unstable();
    let dense = positions
        .iter()
        .zip(1_i64..)
        .all(|(position, expected)| *position == expected);
    if dense {
        Ok(())
    } else {
        Err(PositionError::NotDense {
            count: slots.len(),
            positions,
        })
    }
}

/// Plans the renumbering after the chapter at `removed_position` leaves.
///
/// `slots` is the snapshot *including* the removed chapter. Every chapter
/// after it moves one step left.
pub fn plan_remove(
    slots: &[PositionSlot],
    removed_position: i64,
) -> Result<Vec<PositionUpdate>, PositionError> {
    ensure_dense(slots)?;
    if !slots.iter().any(|slot| slot.position == removed_position) {
        return Err(PositionError::PositionNotFound(removed_position));
    }

    let mut updates: Vec<PositionUpdate> = slots
        .iter()
        .filter(|slot| slot.position > removed_position)
        .map(|slot| PositionUpdate {
            chapter_id: slot.chapter_id,
            from: slot.position,
            to: slot.position - 1,
        })
        .collect();
    updates.sort_by_key(|update| update.from);
    Ok(updates)
}

/// Plans moving `chapter_id` to `requested_to`.
///
/// The target is clamped into `1..=N`. Moving right shifts `(from, to]` one
/// step left; moving left shifts `[to, from)` one step right. A clamped
/// target equal to the current position yields an empty plan.
pub fn plan_move(
    slots: &[PositionSlot],
    chapter_id: ChapterId,
    requested_to: i64,
) -> Result<MovePlan, PositionError> {
    if requested_to < 0 {
        return Err(PositionError::NegativeTarget(requested_to));
    }
    ensure_dense(slots)?;

    let from = slots
        .iter()
        .find(|slot| slot.chapter_id == chapter_id)
        .map(|slot| slot.position)
        .ok_or(PositionError::ChapterNotInTome(chapter_id))?;
    let to = clamp_target(requested_to, slots.len());

    if to == from {
        return Ok(MovePlan {
            chapter_id,
            from,
            to,
            updates: Vec::new(),
        });
    }

    let mut ordered: Vec<&PositionSlot> = slots
        .iter()
        .filter(|slot| slot.chapter_id != chapter_id)
        .collect();
    ordered.sort_by(|left, right| compare_slots(left, right));

    let mut updates = Vec::with_capacity(ordered.len() + 1);
    for slot in ordered {
        let shifted = if to > from && slot.position > from && slot.position <= to {
            Some(slot.position - 1)
        } else if to < from && slot.position >= to && slot.position < from {
            Some(slot.position + 1)
        } else {
            None
        };
        if let Some(new_position) = shifted {
            updates.push(PositionUpdate {
                chapter_id: slot.chapter_id,
                from: slot.position,
                to: new_position,
            });
        }
    }
    updates.push(PositionUpdate {
        chapter_id,
        from,
        to,
    });

    Ok(MovePlan {
        chapter_id,
        from,
        to,
        updates,
    })
}

/// Applies a plan to an in-memory snapshot and re-sorts it.
pub fn apply_updates(slots: &mut Vec<PositionSlot>, updates: &[PositionUpdate]) {
    for update in updates {
        if let Some(slot) = slots
            .iter_mut()
            .find(|slot| slot.chapter_id == update.chapter_id)
        {
            slot.position = update.to;
        }
    }
    slots.sort_by(compare_slots);
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn tome(count: usize) -> Vec<PositionSlot> {
        (1..=count)
            .map(|index| PositionSlot {
                chapter_id: Uuid::new_v4(),
                position: index as i64,
                created_at: index as i64 * 10,
            })
            .collect()
    }

    fn order(slots: &[PositionSlot]) -> Vec<ChapterId> {
        let mut sorted = slots.to_vec();
        sorted.sort_by(compare_slots);
        sorted.into_iter().map(|slot| slot.chapter_id).collect()
    }

    fn positions(slots: &[PositionSlot]) -> Vec<i64> {
        let mut values: Vec<i64> = slots.iter().map(|slot| slot.position).collect();
        values.sort_unstable();
        values
    }

    #[test]
    fn next_position_starts_at_one_and_follows_max() {
        assert_eq!(next_position(&[]), 1);
        assert_eq!(next_position(&tome(3)), 4);
    }

    #[test]
    fn move_last_to_second_shifts_the_middle_right() {
        let mut slots = tome(4);
        let ids: Vec<ChapterId> = slots.iter().map(|slot| slot.chapter_id).collect();
        let (a, b, c, d) = (ids[0], ids[1], ids[2], ids[3]);

        let plan = plan_move(&slots, d, 2).unwrap();
        assert_eq!((plan.from, plan.to), (4, 2));
        assert_eq!(plan.shifted(), 2);
        apply_updates(&mut slots, &plan.updates);

        assert_eq!(order(&slots), vec![a, d, b, c]);
        assert_eq!(positions(&slots), vec![1, 2, 3, 4]);
    }

    #[test]
    fn move_first_to_last_shifts_the_rest_left() {
        let mut slots = tome(4);
        let ids: Vec<ChapterId> = slots.iter().map(|slot| slot.chapter_id).collect();

        let plan = plan_move(&slots, ids[0], 4).unwrap();
        apply_updates(&mut slots, &plan.updates);

        assert_eq!(order(&slots), vec![ids[1], ids[2], ids[3], ids[0]]);
        assert_eq!(positions(&slots), vec![1, 2, 3, 4]);
    }

    #[test]
    fn move_to_current_position_is_noop() {
        let slots = tome(3);
        let plan = plan_move(&slots, slots[1].chapter_id, 2).unwrap();
        assert!(plan.is_noop());
    }

    #[test]
    fn single_chapter_move_is_always_noop() {
        let slots = tome(1);
        for target in [0, 1, 2, 500] {
            assert!(plan_move(&slots, slots[0].chapter_id, target)
                .unwrap()
                .is_noop());
        }
    }

    #[test]
    fn out_of_range_targets_behave_like_the_nearest_boundary() {
        let slots = tome(5);
        let moving = slots[2].chapter_id;

        let low = plan_move(&slots, moving, 0).unwrap();
        let first = plan_move(&slots, moving, 1).unwrap();
        assert_eq!(low, first);

        let high = plan_move(&slots, moving, 105).unwrap();
        let last = plan_move(&slots, moving, 5).unwrap();
        assert_eq!(high, last);
    }

    #[test]
    fn negative_target_is_rejected() {
        let slots = tome(2);
        assert_eq!(
            plan_move(&slots, slots[0].chapter_id, -1),
            Err(PositionError::NegativeTarget(-1))
        );
    }

    #[test]
    fn repeated_move_to_same_target_is_idempotent() {
        let mut slots = tome(6);
        let moving = slots[4].chapter_id;

        let plan = plan_move(&slots, moving, 2).unwrap();
        apply_updates(&mut slots, &plan.updates);
        let after_first = order(&slots);

        let second = plan_move(&slots, moving, 2).unwrap();
        assert!(second.is_noop());
        apply_updates(&mut slots, &second.updates);
        assert_eq!(order(&slots), after_first);
    }

    #[test]
    fn plan_remove_decrements_only_later_chapters() {
        let slots = tome(4);
        let updates = plan_remove(&slots, 2).unwrap();
        let moved: Vec<(i64, i64)> = updates.iter().map(|u| (u.from, u.to)).collect();
        assert_eq!(moved, vec![(3, 2), (4, 3)]);

        let mut remaining: Vec<PositionSlot> = slots
            .iter()
            .copied()
            .filter(|slot| slot.position != 2)
            .collect();
        apply_updates(&mut remaining, &updates);
        assert_eq!(positions(&remaining), vec![1, 2, 3]);
    }

    #[test]
    fn gapped_snapshot_is_reported_not_repaired() {
        let mut slots = tome(3);
        slots[2].position = 5;
        assert!(matches!(
            plan_move(&slots, slots[0].chapter_id, 2),
            Err(PositionError::NotDense { count: 3, .. })
        ));
        assert!(matches!(
            plan_remove(&slots, 1),
            Err(PositionError::NotDense { .. })
        ));
    }

    #[test]
    fn unknown_chapter_or_position_is_reported() {
        let slots = tome(2);
        let stranger = Uuid::new_v4();
        assert_eq!(
            plan_move(&slots, stranger, 1),
            Err(PositionError::ChapterNotInTome(stranger))
        );
        assert_eq!(plan_remove(&slots, 7), Err(PositionError::PositionNotFound(7)));
    }

    #[test]
    fn random_walk_keeps_positions_dense() {
        let mut slots = tome(7);
        let mut seed: u64 = 0x5eed;
        for _ in 0..200 {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let index = (seed >> 33) as usize % slots.len();
            let target = ((seed >> 13) % 12) as i64;
            let plan = plan_move(&slots, slots[index].chapter_id, target).unwrap();
            apply_updates(&mut slots, &plan.updates);
            assert!(ensure_dense(&slots).is_ok());
        }
    }
}
