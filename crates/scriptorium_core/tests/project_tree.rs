use rusqlite::Connection;
use scriptorium_core::db::open_db_in_memory;
use scriptorium_core::{
    CoreErrorKind, HierarchyLevel, HierarchyService, HierarchyServiceError,
    SqliteHierarchyRepository, TreeNode,
};
use uuid::Uuid;

fn service(conn: &Connection) -> HierarchyService<SqliteHierarchyRepository<'_>> {
    HierarchyService::new(SqliteHierarchyRepository::try_new(conn).unwrap())
}

fn backdate(conn: &Connection, table: &str, id: Uuid, created_at: i64) {
    conn.execute(
        &format!("UPDATE {table} SET created_at = ?1 WHERE id = ?2;"),
        rusqlite::params![created_at, id.to_string()],
    )
    .unwrap();
}

fn titles(nodes: &[TreeNode]) -> Vec<&str> {
    nodes.iter().map(|node| node.title.as_str()).collect()
}

#[test]
fn tree_orders_siblings_by_creation_time() {
    let conn = open_db_in_memory().unwrap();
    let hierarchy = service(&conn);
    let project = hierarchy.create_project("Chronicles").unwrap();
    let collection = hierarchy.create_collection(project.id, "Cycle").unwrap();

    let third = hierarchy.create_saga(collection.id, "Third").unwrap();
    let first = hierarchy.create_saga(collection.id, "First").unwrap();
    let second = hierarchy.create_saga(collection.id, "Second").unwrap();
    backdate(&conn, "sagas", first.id, 1_000);
    backdate(&conn, "sagas", second.id, 2_000);
    backdate(&conn, "sagas", third.id, 3_000);

    let tome = hierarchy.create_tome(second.id, "Book").unwrap();

    let tree = hierarchy.build_tree(project.id).unwrap();
    assert_eq!(tree.len(), 1);
    assert_eq!(tree[0].id, collection.id);
    assert_eq!(tree[0].level, HierarchyLevel::Collection);

    let sagas = &tree[0].children;
    assert_eq!(titles(sagas), vec!["First", "Second", "Third"]);
    assert_eq!(sagas[1].children.len(), 1);
    assert_eq!(sagas[1].children[0].id, tome.id);
    assert_eq!(sagas[1].children[0].level, HierarchyLevel::Tome);
    assert!(sagas[1].children[0].children.is_empty());
    assert!(sagas[0].children.is_empty());
}

#[test]
fn tree_of_empty_project_is_empty() {
    let conn = open_db_in_memory().unwrap();
    let hierarchy = service(&conn);
    let project = hierarchy.create_project("Blank").unwrap();

    assert!(hierarchy.build_tree(project.id).unwrap().is_empty());
}

#[test]
fn tree_of_unknown_project_is_not_found() {
    let conn = open_db_in_memory().unwrap();
    let missing = Uuid::new_v4();

    let err = service(&conn).build_tree(missing).unwrap_err();
    assert!(matches!(
        err,
        HierarchyServiceError::NodeNotFound {
            level: HierarchyLevel::Project,
            id,
        } if id == missing
    ));
    assert_eq!(err.kind(), CoreErrorKind::NotFound);
}

#[test]
fn names_are_trimmed_and_blank_names_rejected() {
    let conn = open_db_in_memory().unwrap();
    let hierarchy = service(&conn);

    let project = hierarchy.create_project("  Long   Title ").unwrap();
    assert_eq!(project.name, "Long Title");
    assert_eq!(project.parent_id, None);

    let err = hierarchy.create_collection(project.id, "   ").unwrap_err();
    assert!(matches!(err, HierarchyServiceError::InvalidName));
    assert_eq!(err.kind(), CoreErrorKind::Validation);

    let err = hierarchy.rename_node(HierarchyLevel::Project, project.id, "").unwrap_err();
    assert!(matches!(err, HierarchyServiceError::InvalidName));
}

#[test]
fn creating_under_missing_parent_is_not_found() {
    let conn = open_db_in_memory().unwrap();
    let missing = Uuid::new_v4();

    let err = service(&conn).create_saga(missing, "Orphan").unwrap_err();
    assert!(matches!(
        err,
        HierarchyServiceError::ParentNotFound {
            level: HierarchyLevel::Collection,
            ..
        }
    ));
    assert_eq!(err.kind(), CoreErrorKind::NotFound);
}

#[test]
fn rename_and_summary_update_the_record() {
    let conn = open_db_in_memory().unwrap();
    let hierarchy = service(&conn);
    let project = hierarchy.create_project("P").unwrap();
    let collection = hierarchy.create_collection(project.id, "C").unwrap();
    let saga = hierarchy.create_saga(collection.id, "S").unwrap();
    let tome = hierarchy.create_tome(saga.id, "T").unwrap();

    let renamed = hierarchy
        .rename_node(HierarchyLevel::Saga, saga.id, "Renamed saga")
        .unwrap();
    assert_eq!(renamed.name, "Renamed saga");
    assert!(renamed.updated_at.is_some());

    let summarised = hierarchy
        .set_tome_summary(tome.id, Some("A long winter."))
        .unwrap();
    assert_eq!(summarised.summary.as_deref(), Some("A long winter."));

    let cleared = hierarchy.set_tome_summary(tome.id, Some("  ")).unwrap();
    assert_eq!(cleared.summary, None);
}

#[test]
fn list_children_checks_parent_and_orders_by_creation() {
    let conn = open_db_in_memory().unwrap();
    let hierarchy = service(&conn);
    let project = hierarchy.create_project("P").unwrap();
    let late = hierarchy.create_collection(project.id, "Late").unwrap();
    let early = hierarchy.create_collection(project.id, "Early").unwrap();
    backdate(&conn, "collections", early.id, 10);
    backdate(&conn, "collections", late.id, 20);

    let children = hierarchy
        .list_children(HierarchyLevel::Collection, project.id)
        .unwrap();
    let names: Vec<&str> = children.iter().map(|node| node.name.as_str()).collect();
    assert_eq!(names, vec!["Early", "Late"]);

    assert!(matches!(
        hierarchy.list_children(HierarchyLevel::Saga, Uuid::new_v4()),
        Err(HierarchyServiceError::ParentNotFound {
            level: HierarchyLevel::Collection,
            ..
        })
    ));
}

#[test]
fn deleting_a_collection_cascades_to_descendants() {
    let conn = open_db_in_memory().unwrap();
    let hierarchy = service(&conn);
    let project = hierarchy.create_project("P").unwrap();
    let collection = hierarchy.create_collection(project.id, "C").unwrap();
    let saga = hierarchy.create_saga(collection.id, "S").unwrap();
    let tome = hierarchy.create_tome(saga.id, "T").unwrap();

    hierarchy
        .delete_node(HierarchyLevel::Collection, collection.id)
        .unwrap();

    assert!(hierarchy.get_node(HierarchyLevel::Saga, saga.id).unwrap().is_none());
    assert!(hierarchy.get_node(HierarchyLevel::Tome, tome.id).unwrap().is_none());
    assert!(hierarchy.build_tree(project.id).unwrap().is_empty());

    assert!(matches!(
        hierarchy.delete_node(HierarchyLevel::Collection, collection.id),
        Err(HierarchyServiceError::NodeNotFound { .. })
    ));
}
