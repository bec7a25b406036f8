//! Scoped tag resolution.
//!
//! Given candidate tag records loaded for a requested id list, keep exactly
//! those that belong to the target collection and carry the target scope.
//! Unknown, foreign and mis-scoped ids are dropped silently.

use crate::model::hierarchy::CollectionId;
use crate::model::lore::EntityKind;
use crate::model::tag::{Tag, TagId};
use std::collections::BTreeSet;

/// Deduplicates requested ids; order is irrelevant for tag sets.
pub fn requested_set(tag_ids: &[TagId]) -> BTreeSet<TagId> {
    tag_ids.iter().copied().collect()
}

/// Filters `candidates` down to tags attachable to a `kind` entity of
/// `collection_id` and requested by the caller.
pub fn retain_in_scope(
    candidates: Vec<Tag>,
    collection_id: CollectionId,
    kind: EntityKind,
    requested: &BTreeSet<TagId>,
) -> Vec<Tag> {
    let mut resolved: Vec<Tag> = candidates
        .into_iter()
        .filter(|tag| {
            requested.contains(&tag.id) && tag.collection_id == collection_id && tag.scope == kind
        })
        .collect();
    resolved.sort_by(|left, right| left.id.cmp(&right.id));
    resolved.dedup_by(|left, right| left.id == right.id);
    resolved
}

#[cfg(test)]
mod tests {
    use super::{requested_set, retain_in_scope};
    use crate::model::lore::EntityKind;
    use crate::model::tag::Tag;
    use uuid::Uuid;

    fn tag(collection_id: Uuid, scope: EntityKind) -> Tag {
        Tag {
            id: Uuid::new_v4(),
            collection_id,
            name: format!("{}-tag", scope.as_str()),
            color: None,
            note: None,
            scope,
            created_at: 0,
            updated_at: None,
        }
    }

    #[test]
    fn mis_scoped_tag_is_dropped_even_when_requested() {
        let collection = Uuid::new_v4();
        let hero = tag(collection, EntityKind::Character);
        let castle = tag(collection, EntityKind::Place);
        let requested = requested_set(&[hero.id, castle.id]);

        let resolved = retain_in_scope(
            vec![hero.clone(), castle],
            collection,
            EntityKind::Character,
            &requested,
        );
        assert_eq!(resolved, vec![hero]);
    }

    #[test]
    fn foreign_collection_and_unrequested_tags_are_dropped() {
        let collection = Uuid::new_v4();
        let foreign = tag(Uuid::new_v4(), EntityKind::Item);
        let unrequested = tag(collection, EntityKind::Item);
        let requested = requested_set(&[foreign.id, Uuid::new_v4()]);

        let resolved = retain_in_scope(
            vec![foreign, unrequested],
            collection,
            EntityKind::Item,
            &requested,
        );
        assert!(resolved.is_empty());
    }
}
