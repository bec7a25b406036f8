use rusqlite::Connection;
use scriptorium_core::db::open_db_in_memory;
use scriptorium_core::{
    CharacterDraft, CollectionId, CoreErrorKind, EntityKind, EventDraft, EventWindow,
    HierarchyService, ItemDraft, LoreListQuery, LoreService, LoreServiceError, MatchMode, NewTag,
    PlaceDraft, SqliteHierarchyRepository, SqliteLoreRepository, SqliteTagRepository, Tag,
    TagId, TagPatch,
};
use serde_json::json;
use std::collections::BTreeSet;

type Service<'conn> = LoreService<SqliteLoreRepository<'conn>, SqliteTagRepository<'conn>>;

fn lore(conn: &Connection) -> Service<'_> {
    LoreService::new(
        SqliteLoreRepository::try_new(conn).unwrap(),
        SqliteTagRepository::try_new(conn).unwrap(),
    )
}

fn create_collection(conn: &Connection, name: &str) -> CollectionId {
    let hierarchy = HierarchyService::new(SqliteHierarchyRepository::try_new(conn).unwrap());
    let project = hierarchy.create_project(format!("{name} project")).unwrap();
    hierarchy.create_collection(project.id, name).unwrap().id
}

fn tag(service: &Service<'_>, collection_id: CollectionId, name: &str, scope: EntityKind) -> Tag {
    service
        .create_tag(
            collection_id,
            NewTag {
                name: name.to_string(),
                color: None,
                note: None,
                scope,
            },
        )
        .unwrap()
}

fn character(firstname: &str, lastname: &str, tag_ids: Vec<TagId>) -> CharacterDraft {
    CharacterDraft {
        firstname: Some(firstname.to_string()),
        lastname: Some(lastname.to_string()),
        tag_ids: Some(tag_ids),
        ..CharacterDraft::default()
    }
}

fn event(name: &str, start: &str, end: Option<&str>) -> EventDraft {
    EventDraft {
        name: Some(name.to_string()),
        start_date: Some(start.to_string()),
        end_date: end.map(str::to_string),
        ..EventDraft::default()
    }
}

fn ids(values: &[TagId]) -> BTreeSet<TagId> {
    values.iter().copied().collect()
}

#[test]
fn tags_of_another_scope_or_collection_are_dropped() {
    let conn = open_db_in_memory().unwrap();
    let collection = create_collection(&conn, "Main");
    let other = create_collection(&conn, "Other");
    let service = lore(&conn);

    let hero = tag(&service, collection, "Hero", EntityKind::Character);
    let capital = tag(&service, collection, "Capital", EntityKind::Place);
    let foreign = tag(&service, other, "Hero", EntityKind::Character);

    let created = service
        .create_character(
            collection,
            character(
                "Ada",
                "Vance",
                vec![hero.id, capital.id, foreign.id, TagId::new_v4()],
            ),
        )
        .unwrap();
    assert_eq!(created.tag_ids, ids(&[hero.id]));

    let stored = service.get_character(created.id).unwrap().unwrap();
    assert_eq!(stored.tag_ids, ids(&[hero.id]));

    let resolved = service
        .resolve_tags(collection, EntityKind::Place, &[hero.id, capital.id])
        .unwrap();
    let resolved_ids: Vec<TagId> = resolved.iter().map(|tag| tag.id).collect();
    assert_eq!(resolved_ids, vec![capital.id]);
}

#[test]
fn set_entity_tags_replaces_the_whole_set() {
    let conn = open_db_in_memory().unwrap();
    let collection = create_collection(&conn, "Main");
    let service = lore(&conn);
    let ancient = tag(&service, collection, "Ancient", EntityKind::Place);
    let ruined = tag(&service, collection, "Ruined", EntityKind::Place);

    let place = service
        .create_place(
            collection,
            PlaceDraft {
                name: Some("Old Keep".to_string()),
                tag_ids: Some(vec![ancient.id]),
                ..PlaceDraft::default()
            },
        )
        .unwrap();

    let attached = service
        .set_entity_tags(EntityKind::Place, place.id, &[ruined.id, ruined.id])
        .unwrap();
    assert_eq!(attached, ids(&[ruined.id]));
    assert_eq!(
        service.get_place(place.id).unwrap().unwrap().tag_ids,
        ids(&[ruined.id])
    );

    let cleared = service
        .set_entity_tags(EntityKind::Place, place.id, &[])
        .unwrap();
    assert!(cleared.is_empty());

    let missing = uuid::Uuid::new_v4();
    let err = service
        .set_entity_tags(EntityKind::Place, missing, &[ruined.id])
        .unwrap_err();
    assert!(matches!(
        err,
        LoreServiceError::EntityNotFound { kind: EntityKind::Place, id } if id == missing
    ));
}

#[test]
fn character_lists_filter_by_tags_and_text_and_sort_by_name() {
    let conn = open_db_in_memory().unwrap();
    let collection = create_collection(&conn, "Main");
    let service = lore(&conn);
    let noble = tag(&service, collection, "Noble", EntityKind::Character);
    let exile = tag(&service, collection, "Exile", EntityKind::Character);

    service
        .create_character(collection, character("Mira", "zale", vec![noble.id, exile.id]))
        .unwrap();
    service
        .create_character(collection, character("Oren", "Adler", vec![noble.id]))
        .unwrap();
    service
        .create_character(collection, character("Tess", "Brook", vec![exile.id]))
        .unwrap();
    service
        .create_character(collection, character("Quill", "Marsh", vec![]))
        .unwrap();

    let lastnames = |query: &LoreListQuery| -> Vec<String> {
        service
            .list_characters(collection, query)
            .unwrap()
            .into_iter()
            .map(|character| character.lastname)
            .collect()
    };

    assert_eq!(
        lastnames(&LoreListQuery::default()),
        vec!["Adler", "Brook", "Marsh", "zale"]
    );
    assert_eq!(
        lastnames(&LoreListQuery {
            tag_ids: vec![noble.id, exile.id],
            mode: MatchMode::Any,
            ..LoreListQuery::default()
        }),
        vec!["Adler", "Brook", "zale"]
    );
    assert_eq!(
        lastnames(&LoreListQuery {
            tag_ids: vec![noble.id, exile.id],
            mode: MatchMode::All,
            ..LoreListQuery::default()
        }),
        vec!["zale"]
    );
    assert_eq!(
        lastnames(&LoreListQuery {
            text: Some("RO".to_string()),
            tag_ids: vec![exile.id],
            mode: MatchMode::Any,
        }),
        vec!["Brook"]
    );
}

#[test]
fn character_patch_leaves_unset_fields_and_clears_blank_ones() {
    let conn = open_db_in_memory().unwrap();
    let collection = create_collection(&conn, "Main");
    let service = lore(&conn);

    let created = service
        .create_character(
            collection,
            CharacterDraft {
                age: Some(Some(41)),
                birthdate: Some("1163-02-01T00:00:00Z".to_string()),
                avatar_url: Some("https://example.org/ada.png".to_string()),
                content: Some(json!({"bio": "Cartographer"})),
                ..character("Ada", "Vance", vec![])
            },
        )
        .unwrap();
    assert_eq!(created.birthdate.unwrap().to_string(), "1163-02-01");

    let updated = service
        .update_character(
            created.id,
            CharacterDraft {
                avatar_url: Some("  ".to_string()),
                age: Some(None),
                ..CharacterDraft::default()
            },
        )
        .unwrap();
    assert_eq!(updated.firstname, "Ada");
    assert_eq!(updated.avatar_url, None);
    assert_eq!(updated.age, None);
    assert_eq!(updated.content, json!({"bio": "Cartographer"}));
    assert!(updated.updated_at.is_some());
}

#[test]
fn character_without_lastname_is_rejected() {
    let conn = open_db_in_memory().unwrap();
    let collection = create_collection(&conn, "Main");
    let service = lore(&conn);

    let err = service
        .create_character(collection, character("Ada", "  ", vec![]))
        .unwrap_err();
    assert!(matches!(err, LoreServiceError::Validation(_)));
    assert_eq!(err.kind(), CoreErrorKind::Validation);
    assert!(service
        .list_characters(collection, &LoreListQuery::default())
        .unwrap()
        .is_empty());
}

#[test]
fn item_with_blank_name_gets_the_default() {
    let conn = open_db_in_memory().unwrap();
    let collection = create_collection(&conn, "Main");
    let service = lore(&conn);

    let item = service
        .create_item(
            collection,
            ItemDraft {
                name: Some("   ".to_string()),
                category: Some("weapon".to_string()),
                ..ItemDraft::default()
            },
        )
        .unwrap();
    assert_eq!(item.name, "New item");
    assert_eq!(item.category.as_deref(), Some("weapon"));
}

#[test]
fn events_are_windowed_and_ordered_by_start_date() {
    let conn = open_db_in_memory().unwrap();
    let collection = create_collection(&conn, "Main");
    let service = lore(&conn);

    service
        .create_event(collection, event("Coronation", "1210-05-01", None))
        .unwrap();
    service
        .create_event(collection, event("Long war", "1190-01-01", Some("1205-12-31")))
        .unwrap();
    service
        .create_event(collection, event("Famine", "1180-03-01", Some("1181-01-01")))
        .unwrap();
    service
        .create_event(collection, event("alliance", "1190-01-01", None))
        .unwrap();

    let names = |window: EventWindow| -> Vec<String> {
        service
            .list_events(collection, &LoreListQuery::default(), &window)
            .unwrap()
            .into_iter()
            .map(|event| event.name)
            .collect()
    };

    assert_eq!(
        names(EventWindow::default()),
        vec!["Famine", "alliance", "Long war", "Coronation"]
    );
    assert_eq!(
        names(EventWindow {
            from: Some("1200-01-01".to_string()),
            to: Some("1209-12-31".to_string()),
        }),
        vec!["alliance", "Long war"]
    );

    let err = service
        .list_events(
            collection,
            &LoreListQuery::default(),
            &EventWindow {
                from: Some("01/01/1200".to_string()),
                to: None,
            },
        )
        .unwrap_err();
    assert_eq!(err.kind(), CoreErrorKind::Validation);
}

#[test]
fn event_ending_before_it_starts_is_rejected() {
    let conn = open_db_in_memory().unwrap();
    let collection = create_collection(&conn, "Main");
    let service = lore(&conn);

    let err = service
        .create_event(collection, event("Backwards", "1200-01-02", Some("1200-01-01")))
        .unwrap_err();
    assert!(matches!(err, LoreServiceError::Validation(_)));

    let err = service
        .create_event(collection, EventDraft::default())
        .unwrap_err();
    assert_eq!(err.kind(), CoreErrorKind::Validation);
}

#[test]
fn changing_tag_scope_drops_existing_links() {
    let conn = open_db_in_memory().unwrap();
    let collection = create_collection(&conn, "Main");
    let service = lore(&conn);
    let cursed = tag(&service, collection, "Cursed", EntityKind::Item);

    let item = service
        .create_item(
            collection,
            ItemDraft {
                name: Some("Ring".to_string()),
                tag_ids: Some(vec![cursed.id]),
                ..ItemDraft::default()
            },
        )
        .unwrap();
    assert_eq!(item.tag_ids, ids(&[cursed.id]));

    let updated = service
        .update_tag(
            cursed.id,
            TagPatch {
                scope: Some(EntityKind::Place),
                ..TagPatch::default()
            },
        )
        .unwrap();
    assert_eq!(updated.scope, EntityKind::Place);
    assert!(service.get_item(item.id).unwrap().unwrap().tag_ids.is_empty());
}

#[test]
fn deleting_a_tag_or_entity_removes_links() {
    let conn = open_db_in_memory().unwrap();
    let collection = create_collection(&conn, "Main");
    let service = lore(&conn);
    let wanted = tag(&service, collection, "Wanted", EntityKind::Character);

    let created = service
        .create_character(collection, character("Ada", "Vance", vec![wanted.id]))
        .unwrap();
    service.delete_tag(wanted.id).unwrap();
    assert!(service
        .get_character(created.id)
        .unwrap()
        .unwrap()
        .tag_ids
        .is_empty());
    assert!(matches!(
        service.delete_tag(wanted.id),
        Err(LoreServiceError::TagNotFound(_))
    ));

    service
        .delete_entity(EntityKind::Character, created.id)
        .unwrap();
    assert!(service.get_character(created.id).unwrap().is_none());
    let err = service
        .delete_entity(EntityKind::Character, created.id)
        .unwrap_err();
    assert_eq!(err.kind(), CoreErrorKind::NotFound);
}

#[test]
fn tag_lists_are_sorted_and_scope_filtered() {
    let conn = open_db_in_memory().unwrap();
    let collection = create_collection(&conn, "Main");
    let service = lore(&conn);
    tag(&service, collection, "ruins", EntityKind::Place);
    tag(&service, collection, "Allies", EntityKind::Character);
    tag(&service, collection, "Borders", EntityKind::Place);

    let names = |scope: Option<EntityKind>| -> Vec<String> {
        service
            .list_tags(collection, scope)
            .unwrap()
            .into_iter()
            .map(|tag| tag.name)
            .collect()
    };
    assert_eq!(names(None), vec!["Allies", "Borders", "ruins"]);
    assert_eq!(names(Some(EntityKind::Place)), vec!["Borders", "ruins"]);

    let err = service
        .create_tag(
            collection,
            NewTag {
                name: " ".to_string(),
                color: None,
                note: None,
                scope: EntityKind::Item,
            },
        )
        .unwrap_err();
    assert!(matches!(err, LoreServiceError::InvalidTagName));
}

#[test]
fn character_template_defaults_until_one_is_stored() {
    let conn = open_db_in_memory().unwrap();
    let collection = create_collection(&conn, "Main");
    let service = lore(&conn);

    let default = service.character_template(collection).unwrap();
    assert_eq!(default["version"], json!(1));

    let custom = json!({
        "version": 2,
        "fields": [{"id": "oath", "type": "text", "label": "Oath"}]
    });
    service
        .put_character_template(collection, custom.clone())
        .unwrap();
    assert_eq!(service.character_template(collection).unwrap(), custom);

    let err = service
        .put_character_template(collection, json!({"fields": "nope"}))
        .unwrap_err();
    assert_eq!(err.kind(), CoreErrorKind::Validation);
    assert_eq!(service.character_template(collection).unwrap(), custom);

    let missing = CollectionId::new_v4();
    assert!(matches!(
        service.character_template(missing),
        Err(LoreServiceError::CollectionNotFound(id)) if id == missing
    ));
}

#[test]
fn lists_for_unknown_collection_are_not_found() {
    let conn = open_db_in_memory().unwrap();
    let service = lore(&conn);
    let missing = CollectionId::new_v4();

    let err = service
        .list_places(missing, &LoreListQuery::default())
        .unwrap_err();
    assert!(matches!(err, LoreServiceError::CollectionNotFound(id) if id == missing));

    let err = service
        .create_place(
            missing,
            PlaceDraft {
                name: Some("Nowhere".to_string()),
                ..PlaceDraft::default()
            },
        )
        .unwrap_err();
    assert_eq!(err.kind(), CoreErrorKind::NotFound);
}
