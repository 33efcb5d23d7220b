use super::tests::{
    cleanup_db_files, clients_and_invoices, new_client, new_invoice, open_engine,
    unique_db_path, WORKSPACE,
};
use super::EngineError;
use crate::db;
use crate::domain::task::{TaskDraft, TaskScope};

fn task_on(app_id: &str, item_id: Option<&str>) -> TaskDraft {
    TaskDraft {
        environment_id: "E-1".to_string(),
        assigned_user_id: "bob".to_string(),
        workspace_id: Some(WORKSPACE.to_string()),
        app_id: Some(app_id.to_string()),
        item_id: item_id.map(str::to_string),
        information: "Check the numbers".to_string(),
        ..TaskDraft::default()
    }
}

#[test]
fn deleting_an_item_strips_it_from_every_neighbor() {
    let path = unique_db_path();
    let engine = open_engine(&path);
    let (clients, invoices) = clients_and_invoices(&engine);
    let acme = new_client(&engine, &clients, "Acme");
    let globex = new_client(&engine, &clients, "Globex");
    let first = new_invoice(&engine, &invoices, "First", &[&acme.id, &globex.id]);
    let second = new_invoice(&engine, &invoices, "Second", &[&acme.id]);
    let task = engine
        .create_task(&task_on(&clients.id, Some(&acme.id)))
        .expect("task should be created");

    engine
        .delete_item(&clients.id, &acme.id)
        .expect("delete should succeed");

    assert!(matches!(
        engine.get_item(&clients.id, &acme.id),
        Err(EngineError::NotFound { .. })
    ));
    for invoice in [&first, &second] {
        let reloaded = engine
            .get_item(&invoices.id, &invoice.id)
            .expect("invoice should survive");
        assert!(!reloaded.references(&acme.id));
        assert_eq!(reloaded.version, invoice.version + 1);
    }
    let first = engine
        .get_item(&invoices.id, &first.id)
        .expect("invoice should load");
    assert!(first.references(&globex.id));

    assert!(matches!(
        engine.get_task(&task.id),
        Err(EngineError::NotFound { .. })
    ));
    assert!(db::list_activity(engine.connection(), &acme.id)
        .expect("activity should list")
        .is_empty());
    let index = engine
        .get_schema(&clients.id)
        .expect("schema should load")
        .item_ids;
    assert_eq!(index, vec![globex.id.clone()]);
    assert!(engine.fsck(false).expect("fsck should run").ok());

    drop(engine);
    cleanup_db_files(&path);
}

#[test]
fn bulk_delete_reports_missing_ids() {
    let path = unique_db_path();
    let engine = open_engine(&path);
    let (clients, invoices) = clients_and_invoices(&engine);
    let acme = new_client(&engine, &clients, "Acme");
    let globex = new_client(&engine, &clients, "Globex");
    let initech = new_client(&engine, &clients, "Initech");
    let invoice = new_invoice(&engine, &invoices, "Shared", &[&acme.id, &globex.id]);

    let summary = engine
        .bulk_delete_items(
            &clients.id,
            &[
                acme.id.clone(),
                "I-missing".to_string(),
                globex.id.clone(),
                acme.id.clone(),
            ],
        )
        .expect("bulk delete should succeed");
    assert_eq!(summary.deleted, vec![acme.id.clone(), globex.id.clone()]);
    assert_eq!(summary.missing, vec!["I-missing".to_string()]);
    assert_eq!(summary.neighbors_updated, 2);

    let remaining = engine
        .list_items(&clients.id)
        .expect("items should list");
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, initech.id);
    let invoice = engine
        .get_item(&invoices.id, &invoice.id)
        .expect("invoice should load");
    assert!(invoice.outbound_targets().is_empty());
    assert_eq!(invoice.version, 2, "both removals land in one write");
    assert!(engine.fsck(false).expect("fsck should run").ok());

    drop(engine);
    cleanup_db_files(&path);
}

#[test]
fn deleting_a_schema_cascades_to_neighbors_and_tasks() {
    let path = unique_db_path();
    let engine = open_engine(&path);
    let (clients, invoices) = clients_and_invoices(&engine);
    let acme = new_client(&engine, &clients, "Acme");
    let invoice = new_invoice(&engine, &invoices, "Invoice 1", &[&acme.id]);
    engine
        .create_task(&task_on(&clients.id, None))
        .expect("app task should be created");
    let kept = engine
        .create_task(&task_on(&invoices.id, Some(&invoice.id)))
        .expect("invoice task should be created");

    let summary = engine
        .delete_schema(&clients.id)
        .expect("schema delete should succeed");
    assert_eq!(summary.items_deleted, 1);
    assert_eq!(summary.neighbors_updated, 1);
    assert_eq!(summary.tasks_deleted, 1);

    assert!(matches!(
        engine.get_schema(&clients.id),
        Err(EngineError::NotFound { .. })
    ));
    assert!(!db::collection_exists(engine.connection(), &clients.id)
        .expect("probe should succeed"));
    assert!(engine
        .tasks_referencing(TaskScope::App(&clients.id))
        .expect("tasks should list")
        .is_empty());
    assert_eq!(
        engine
            .tasks_referencing(TaskScope::Item(&invoice.id))
            .expect("tasks should list"),
        vec![kept.id.clone()]
    );
    let invoice = engine
        .get_item(&invoices.id, &invoice.id)
        .expect("invoice should survive");
    assert!(!invoice.references(&acme.id));

    // The Invoices relation field still names the deleted schema; that is
    // reported but cannot be repaired automatically.
    let report = engine.fsck(false).expect("fsck should run");
    assert_eq!(report.issues.len(), 1);
    assert!(!report.issues[0].repairable);
    assert!(report.issues[0].message.contains(&clients.id));

    drop(engine);
    cleanup_db_files(&path);
}

#[test]
fn purging_a_workspace_removes_its_schemas_and_tasks() {
    let path = unique_db_path();
    let engine = open_engine(&path);
    let (clients, invoices) = clients_and_invoices(&engine);
    let acme = new_client(&engine, &clients, "Acme");
    new_invoice(&engine, &invoices, "Invoice 1", &[&acme.id]);
    engine
        .create_task(&TaskDraft {
            environment_id: "E-1".to_string(),
            assigned_user_id: "bob".to_string(),
            workspace_id: Some(WORKSPACE.to_string()),
            information: "Quarterly review".to_string(),
            ..TaskDraft::default()
        })
        .expect("workspace task should be created");
    let unrelated = engine
        .create_task(&TaskDraft {
            environment_id: "E-1".to_string(),
            assigned_user_id: "bob".to_string(),
            ..TaskDraft::default()
        })
        .expect("environment task should be created");

    let summary = engine
        .purge_workspace(WORKSPACE)
        .expect("purge should succeed");
    assert_eq!(summary.schemas.len(), 2);
    assert_eq!(
        summary
            .schemas
            .iter()
            .map(|deleted| deleted.items_deleted)
            .sum::<usize>(),
        2
    );
    assert_eq!(summary.tasks_deleted, 1);

    assert!(engine
        .list_schemas(None)
        .expect("schemas should list")
        .is_empty());
    assert!(db::list_collection_tables(engine.connection())
        .expect("tables should list")
        .is_empty());
    assert!(db::workspace_apps(engine.connection(), WORKSPACE)
        .expect("links should list")
        .is_empty());
    assert_eq!(
        engine.get_task(&unrelated.id).expect("task should remain"),
        unrelated
    );
    assert!(engine.fsck(false).expect("fsck should run").ok());

    drop(engine);
    cleanup_db_files(&path);
}

#[test]
fn revoking_environment_access_drops_the_users_tasks() {
    let path = unique_db_path();
    let engine = open_engine(&path);
    let (clients, _) = clients_and_invoices(&engine);
    let assigned = engine
        .create_task(&task_on(&clients.id, None))
        .expect("task should be created");
    let mut other_env = task_on(&clients.id, None);
    other_env.environment_id = "E-2".to_string();
    other_env.workspace_id = None;
    other_env.app_id = None;
    let elsewhere = engine
        .create_task(&other_env)
        .expect("task should be created");

    let removed = engine
        .revoke_environment_access("bob", "E-1")
        .expect("revoke should succeed");
    assert_eq!(removed, 1);
    assert!(matches!(
        engine.get_task(&assigned.id),
        Err(EngineError::NotFound { .. })
    ));
    assert_eq!(
        engine
            .tasks_for_user("bob", None)
            .expect("tasks should list"),
        vec![elsewhere]
    );

    drop(engine);
    cleanup_db_files(&path);
}

#[test]
fn fsck_repairs_one_sided_edges_and_stale_index_entries() {
    let path = unique_db_path();
    let engine = open_engine(&path);
    let (clients, invoices) = clients_and_invoices(&engine);
    let acme = new_client(&engine, &clients, "Acme");
    let invoice = new_invoice(&engine, &invoices, "Invoice 1", &[&acme.id]);

    let conn = engine.connection();
    let mut client = db::get_item(conn, &clients.id, &acme.id)
        .expect("client should load")
        .expect("client should exist");
    client.relations.clear();
    db::replace_item(conn, &client).expect("client should be rewritten");
    let mut schema = db::get_schema(conn, &clients.id)
        .expect("schema should load")
        .expect("schema should exist");
    schema.item_ids.push("I-ghost".to_string());
    db::replace_schema(conn, &schema).expect("schema should be rewritten");

    let report = engine.fsck(false).expect("fsck should run");
    assert!(!report.ok());
    assert_eq!(report.issues.len(), 2);
    assert!(report.issues.iter().all(|found| found.repairable));

    let repaired = engine.fsck(true).expect("repair should run");
    assert!(repaired.ok());
    assert_eq!(repaired.repaired, 2);
    assert!(engine.fsck(false).expect("fsck should run").ok());

    let client = engine
        .get_item(&clients.id, &acme.id)
        .expect("client should load");
    assert!(client
        .inbound(&invoices.id)
        .is_some_and(|group| group.contains(&invoice.id)));
    assert_eq!(
        engine
            .get_schema(&clients.id)
            .expect("schema should load")
            .item_ids,
        vec![acme.id.clone()]
    );

    drop(engine);
    cleanup_db_files(&path);
}
