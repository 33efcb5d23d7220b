use rusqlite::Connection;
use uuid::Uuid;

use super::run_fsck;
use crate::db;
use crate::domain::field::{FieldType, RelationFieldDefinition};
use crate::domain::item::{Item, ItemRelation, RelatedItem, RelationValue};
use crate::domain::schema::AppSchema;
use crate::domain::task::Task;

fn unique_db_path() -> String {
    std::env::temp_dir()
        .join(format!("schemata-fsck-{}.sqlite", Uuid::now_v7()))
        .display()
        .to_string()
}

fn cleanup_db_files(path: &str) {
    for suffix in ["", "-wal", "-shm"] {
        let _ = std::fs::remove_file(format!("{path}{suffix}"));
    }
}

fn schema(id: &str, relates_to: Option<&str>) -> AppSchema {
    AppSchema {
        id: id.to_string(),
        name: format!("Schema {id}"),
        icon_id: None,
        workspace_id: "W-1".to_string(),
        fields: Vec::new(),
        relation_fields: relates_to
            .map(|target| RelationFieldDefinition {
                id: "F-rel".to_string(),
                name: "Link".to_string(),
                derived_property_name: "link".to_string(),
                field_type: FieldType::ItemRelation,
                related_schema_id: target.to_string(),
                related_schema_name: format!("Schema {target}"),
            })
            .into_iter()
            .collect(),
        item_ids: Vec::new(),
        created_at: "2026-01-01T00:00:00Z".to_string(),
        updated_at: "2026-01-01T00:00:00Z".to_string(),
    }
}

fn item(schema: &AppSchema, id: &str, targets: &[&str]) -> Item {
    Item {
        id: id.to_string(),
        schema_id: schema.id.clone(),
        descriptive_name: format!("Item {id}"),
        field_values: Vec::new(),
        relation_values: schema
            .relation_fields
            .iter()
            .map(|relation| RelationValue {
                relation_field_id: relation.id.clone(),
                name: relation.name.clone(),
                derived_property_name: relation.derived_property_name.clone(),
                field_type: FieldType::ItemRelation,
                edge: ItemRelation {
                    related_schema_id: relation.related_schema_id.clone(),
                    related_schema_name: relation.related_schema_name.clone(),
                    related_items: targets
                        .iter()
                        .map(|target| RelatedItem {
                            related_item_id: target.to_string(),
                            related_item_name: format!("Item {target}"),
                        })
                        .collect(),
                },
            })
            .collect(),
        relations: Vec::new(),
        version: 1,
        created_at: "2026-01-01T00:00:00Z".to_string(),
        updated_at: "2026-01-01T00:00:00Z".to_string(),
    }
}

fn store(conn: &Connection, mut schema: AppSchema, items: &[Item]) {
    schema.item_ids = items.iter().map(|item| item.id.clone()).collect();
    db::create_collection(conn, &schema.id).expect("collection should be created");
    db::insert_schema(conn, &schema).expect("schema should insert");
    db::link_workspace_app(conn, &schema.workspace_id, &schema.id)
        .expect("workspace link should insert");
    for item in items {
        db::insert_item(conn, item).expect("item should insert");
    }
}

#[test]
fn clean_store_passes() {
    let path = unique_db_path();
    let conn = db::open_connection(&path, db::DEFAULT_BUSY_TIMEOUT).expect("db should open");
    store(&conn, schema("S-a", None), &[]);

    let report = run_fsck(&conn, false).expect("fsck should run");
    assert!(report.ok());
    assert_eq!(report.schemas_scanned, 1);
    assert_eq!(report.items_scanned, 0);

    drop(conn);
    cleanup_db_files(&path);
}

#[test]
fn dangling_edges_are_dropped_on_repair() {
    let path = unique_db_path();
    let conn = db::open_connection(&path, db::DEFAULT_BUSY_TIMEOUT).expect("db should open");
    let targets = schema("S-t", None);
    let sources = schema("S-s", Some("S-t"));
    let mut kept = item(&targets, "I-t1", &[]);
    kept.relations.push(ItemRelation {
        related_schema_id: "S-s".to_string(),
        related_schema_name: "Schema S-s".to_string(),
        related_items: vec![
            RelatedItem {
                related_item_id: "I-s1".to_string(),
                related_item_name: "Item I-s1".to_string(),
            },
            RelatedItem {
                related_item_id: "I-gone".to_string(),
                related_item_name: "Item I-gone".to_string(),
            },
        ],
    });
    let source = item(&sources, "I-s1", &["I-t1", "I-t9"]);
    store(&conn, targets, &[kept]);
    store(&conn, sources.clone(), &[source]);

    let report = run_fsck(&conn, false).expect("fsck should run");
    let messages: Vec<&str> = report
        .issues
        .iter()
        .map(|found| found.message.as_str())
        .collect();
    assert_eq!(report.issues.len(), 2, "{messages:?}");
    assert!(messages.iter().any(|m| m.contains("missing item S-t/I-t9")));
    assert!(messages.iter().any(|m| m.contains("S-s/I-gone")));

    let repaired = run_fsck(&conn, true).expect("repair should run");
    assert!(repaired.ok());
    assert_eq!(repaired.repaired, 2);

    let source = db::get_item(&conn, "S-s", "I-s1")
        .expect("item should load")
        .expect("item should exist");
    assert_eq!(
        source.outbound_targets(),
        vec![("S-t".to_string(), "I-t1".to_string())]
    );
    assert_eq!(source.version, 2);
    let target = db::get_item(&conn, "S-t", "I-t1")
        .expect("item should load")
        .expect("item should exist");
    assert_eq!(
        target.inbound_sources(),
        vec![("S-s".to_string(), "I-s1".to_string())]
    );
    assert!(run_fsck(&conn, false).expect("fsck should run").ok());

    drop(conn);
    cleanup_db_files(&path);
}

#[test]
fn missing_collections_links_and_orphan_tasks_are_repaired() {
    let path = unique_db_path();
    let conn = db::open_connection(&path, db::DEFAULT_BUSY_TIMEOUT).expect("db should open");
    store(&conn, schema("S-a", None), &[]);
    db::drop_collection(&conn, "S-a").expect("collection should drop");
    db::unlink_workspace_app(&conn, "S-a").expect("link should be removed");
    db::link_workspace_app(&conn, "W-1", "S-ghost").expect("link should insert");
    db::insert_task(
        &conn,
        &Task {
            id: "T-1".to_string(),
            environment_id: "E-1".to_string(),
            workspace_id: Some("W-1".to_string()),
            app_id: Some("S-ghost".to_string()),
            item_id: None,
            created_by: "alice".to_string(),
            assigned_user_id: "bob".to_string(),
            information: String::new(),
            due_date: None,
            finished: false,
            created_on: 1_700_000_040,
        },
    )
    .expect("task should insert");

    let report = run_fsck(&conn, false).expect("fsck should run");
    assert_eq!(report.issues.len(), 4);
    assert!(report.issues.iter().all(|found| found.repairable));

    let repaired = run_fsck(&conn, true).expect("repair should run");
    assert!(repaired.ok());
    assert!(db::collection_exists(&conn, "S-a").expect("probe should succeed"));
    assert!(db::get_task(&conn, "T-1").expect("lookup should run").is_none());
    assert_eq!(
        db::workspace_apps(&conn, "W-1").expect("links should list"),
        vec!["S-a".to_string()]
    );
    assert!(run_fsck(&conn, false).expect("fsck should run").ok());

    drop(conn);
    cleanup_db_files(&path);
}

#[test]
fn orphan_collections_are_reported_but_kept() {
    let path = unique_db_path();
    let conn = db::open_connection(&path, db::DEFAULT_BUSY_TIMEOUT).expect("db should open");
    db::create_collection(&conn, "S-lost").expect("collection should be created");

    let repaired = run_fsck(&conn, true).expect("repair should run");
    assert_eq!(repaired.issues.len(), 1);
    assert!(!repaired.issues[0].repairable);
    assert_eq!(repaired.issues[0].path, "table items_s_lost");
    assert!(db::collection_exists(&conn, "S-lost").expect("probe should succeed"));

    drop(conn);
    cleanup_db_files(&path);
}

#[test]
fn unreadable_collections_keep_the_edges_and_tasks_pointing_into_them() {
    let path = unique_db_path();
    let conn = db::open_connection(&path, db::DEFAULT_BUSY_TIMEOUT).expect("db should open");
    let targets = schema("S-t", None);
    let sources = schema("S-s", Some("S-t"));
    let mut acme = item(&targets, "I-t1", &[]);
    acme.relations.push(ItemRelation {
        related_schema_id: "S-s".to_string(),
        related_schema_name: "Schema S-s".to_string(),
        related_items: vec![RelatedItem {
            related_item_id: "I-s1".to_string(),
            related_item_name: "Item I-s1".to_string(),
        }],
    });
    let broken = item(&targets, "I-t2", &[]);
    store(&conn, targets, &[acme, broken]);
    store(&conn, sources, &[item(&schema("S-s", Some("S-t")), "I-s1", &["I-t1"])]);
    conn.execute(
        "UPDATE items_s_t SET field_values = '{broken' WHERE id = 'I-t2'",
        [],
    )
    .expect("row should be corrupted");
    db::insert_task(
        &conn,
        &Task {
            id: "T-1".to_string(),
            environment_id: "E-1".to_string(),
            workspace_id: Some("W-1".to_string()),
            app_id: Some("S-t".to_string()),
            item_id: Some("I-t1".to_string()),
            created_by: "alice".to_string(),
            assigned_user_id: "bob".to_string(),
            information: String::new(),
            due_date: None,
            finished: false,
            created_on: 1_700_000_040,
        },
    )
    .expect("task should insert");

    let report = run_fsck(&conn, true).expect("repair should run");
    assert_eq!(report.repaired, 0);
    assert_eq!(report.issues.len(), 1, "{:?}", report.issues);
    assert_eq!(report.issues[0].path, "schema S-t");
    assert!(!report.issues[0].repairable);

    let source = db::get_item(&conn, "S-s", "I-s1")
        .expect("item should load")
        .expect("item should exist");
    assert_eq!(
        source.outbound_targets(),
        vec![("S-t".to_string(), "I-t1".to_string())]
    );
    assert_eq!(source.version, 1);
    assert!(db::get_task(&conn, "T-1").expect("lookup should run").is_some());

    drop(conn);
    cleanup_db_files(&path);
}
