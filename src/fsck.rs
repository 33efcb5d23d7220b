use std::collections::{BTreeMap, BTreeSet, HashSet};

use rusqlite::Connection;
use serde::Serialize;

use crate::db;
use crate::domain::item::{Item, RelatedItem};
use crate::domain::schema::AppSchema;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FsckIssue {
    pub path: String,
    pub message: String,
    pub repairable: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FsckReport {
    pub schemas_scanned: u64,
    pub items_scanned: u64,
    pub issues: Vec<FsckIssue>,
    pub repaired: u64,
}

impl FsckReport {
    pub fn ok(&self) -> bool {
        self.issues.is_empty()
    }
}

fn issue(path: String, message: String, repairable: bool) -> FsckIssue {
    FsckIssue {
        path,
        message,
        repairable,
    }
}

fn item_path(schema_id: &str, item_id: &str) -> String {
    format!("item {schema_id}/{item_id}")
}

type ItemKey = (String, String);

/// Whole-store snapshot the checks run against. Repairs mutate it and the
/// changed parts are written back at the end.
struct Snapshot {
    schemas: BTreeMap<String, AppSchema>,
    items: BTreeMap<ItemKey, Item>,
    collection_ids: BTreeMap<String, Vec<String>>,
    changed_items: BTreeSet<ItemKey>,
    changed_schemas: BTreeSet<String>,
    /// Schemas whose collection could not be decoded. Their items are
    /// unknown, not missing, so nothing pointing into them is dropped.
    unreadable: BTreeSet<String>,
}

impl Snapshot {
    fn load(conn: &Connection, issues: &mut Vec<FsckIssue>) -> rusqlite::Result<Self> {
        let mut snapshot = Snapshot {
            schemas: BTreeMap::new(),
            items: BTreeMap::new(),
            collection_ids: BTreeMap::new(),
            changed_items: BTreeSet::new(),
            changed_schemas: BTreeSet::new(),
            unreadable: BTreeSet::new(),
        };
        for schema in db::list_schemas(conn, None)? {
            if db::collection_exists(conn, &schema.id)? {
                match db::list_items(conn, &schema.id) {
                    Ok(items) => {
                        let ids = items.iter().map(|item| item.id.clone()).collect();
                        snapshot.collection_ids.insert(schema.id.clone(), ids);
                        for item in items {
                            snapshot
                                .items
                                .insert((schema.id.clone(), item.id.clone()), item);
                        }
                    }
                    Err(err) => {
                        issues.push(issue(
                            format!("schema {}", schema.id),
                            format!("collection has unreadable items: {err}"),
                            false,
                        ));
                        snapshot.unreadable.insert(schema.id.clone());
                    }
                }
            }
            snapshot.schemas.insert(schema.id.clone(), schema);
        }
        Ok(snapshot)
    }

    fn contains(&self, schema_id: &str, item_id: &str) -> bool {
        self.items
            .contains_key(&(schema_id.to_string(), item_id.to_string()))
    }

    fn readable(&self, schema_id: &str) -> bool {
        !self.unreadable.contains(schema_id)
    }
}

/// Checks the store. With `repair`, fixes what can be derived from the
/// outbound side and the collections, then writes the result back; the
/// caller owns the surrounding transaction.
pub fn run_fsck(conn: &Connection, repair: bool) -> rusqlite::Result<FsckReport> {
    let mut issues = Vec::new();
    let mut snapshot = Snapshot::load(conn, &mut issues)?;
    let mut repaired = 0u64;

    check_collections(conn, &mut snapshot, &mut issues, repair, &mut repaired)?;
    check_index(&mut snapshot, &mut issues, repair, &mut repaired);
    check_conformance(&snapshot, &mut issues);
    check_outbound(&mut snapshot, &mut issues, repair, &mut repaired);
    check_inbound(&mut snapshot, &mut issues, repair, &mut repaired);
    check_workspace_links(conn, &snapshot, &mut issues, repair, &mut repaired)?;
    check_tasks(conn, &snapshot, &mut issues, repair, &mut repaired)?;

    if repair {
        let now = db::now_utc_rfc3339();
        for item_key in &snapshot.changed_items {
            if let Some(item) = snapshot.items.get_mut(item_key) {
                item.version += 1;
                item.updated_at = now.clone();
                db::replace_item(conn, item)?;
            }
        }
        for schema_id in &snapshot.changed_schemas {
            if let Some(schema) = snapshot.schemas.get_mut(schema_id) {
                schema.updated_at = now.clone();
                db::replace_schema(conn, schema)?;
            }
        }
        if repaired > 0 {
            tracing::info!(repaired, "fsck repairs applied");
        }
    }

    let items_scanned = snapshot.items.len() as u64;
    Ok(FsckReport {
        schemas_scanned: snapshot.schemas.len() as u64,
        items_scanned,
        issues: if repair {
            issues.into_iter().filter(|found| !found.repairable).collect()
        } else {
            issues
        },
        repaired,
    })
}

fn check_collections(
    conn: &Connection,
    snapshot: &mut Snapshot,
    issues: &mut Vec<FsckIssue>,
    repair: bool,
    repaired: &mut u64,
) -> rusqlite::Result<()> {
    let mut expected_tables = HashSet::new();
    for schema_id in snapshot.schemas.keys() {
        expected_tables.insert(db::collection_table(schema_id));
        if db::collection_exists(conn, schema_id)? {
            continue;
        }
        issues.push(issue(
            format!("schema {schema_id}"),
            "item collection is missing".to_string(),
            true,
        ));
        if repair {
            db::create_collection(conn, schema_id)?;
            snapshot
                .collection_ids
                .insert(schema_id.clone(), Vec::new());
            *repaired += 1;
        }
    }
    for table in db::list_collection_tables(conn)? {
        if !expected_tables.contains(&table) {
            issues.push(issue(
                format!("table {table}"),
                "collection has no schema record".to_string(),
                false,
            ));
        }
    }
    Ok(())
}

fn check_index(
    snapshot: &mut Snapshot,
    issues: &mut Vec<FsckIssue>,
    repair: bool,
    repaired: &mut u64,
) {
    for (schema_id, schema) in snapshot.schemas.iter_mut() {
        let Some(actual) = snapshot.collection_ids.get(schema_id) else {
            continue;
        };
        let actual_set: BTreeSet<&String> = actual.iter().collect();
        let mut seen = BTreeSet::new();
        let mut problems = Vec::new();
        for id in &schema.item_ids {
            if !seen.insert(id) {
                problems.push(format!("index lists {id} more than once"));
            } else if !actual_set.contains(id) {
                problems.push(format!("index lists {id} but the collection does not"));
            }
        }
        for id in actual {
            if !seen.contains(id) {
                problems.push(format!("collection holds {id} but the index does not"));
            }
        }
        if problems.is_empty() {
            continue;
        }
        for message in problems {
            issues.push(issue(format!("schema {schema_id}"), message, true));
        }
        if repair {
            let mut rebuilt: Vec<String> = Vec::with_capacity(actual.len());
            for id in schema.item_ids.iter().chain(actual.iter()) {
                if actual_set.contains(id) && !rebuilt.contains(id) {
                    rebuilt.push(id.clone());
                }
            }
            schema.item_ids = rebuilt;
            snapshot.changed_schemas.insert(schema_id.clone());
            *repaired += 1;
        }
    }
}

fn check_conformance(snapshot: &Snapshot, issues: &mut Vec<FsckIssue>) {
    for ((schema_id, item_id), item) in &snapshot.items {
        let Some(schema) = snapshot.schemas.get(schema_id) else {
            continue;
        };
        let expected: BTreeSet<_> = schema
            .fields
            .iter()
            .map(|field| (&field.name, field.field_type.as_str(), &field.derived_property_name))
            .collect();
        let actual: BTreeSet<_> = item
            .field_values
            .iter()
            .map(|value| (&value.name, value.field_type.as_str(), &value.derived_property_name))
            .collect();
        if expected != actual || item.field_values.len() != schema.fields.len() {
            issues.push(issue(
                item_path(schema_id, item_id),
                "field values do not match the schema fields".to_string(),
                false,
            ));
        }
        let expected: BTreeSet<_> = schema
            .relation_fields
            .iter()
            .map(|field| (&field.name, &field.derived_property_name, &field.related_schema_id))
            .collect();
        let actual: BTreeSet<_> = item
            .relation_values
            .iter()
            .map(|value| (&value.name, &value.derived_property_name, &value.edge.related_schema_id))
            .collect();
        if expected != actual || item.relation_values.len() != schema.relation_fields.len() {
            issues.push(issue(
                item_path(schema_id, item_id),
                "relation values do not match the schema relation fields".to_string(),
                false,
            ));
        }
    }
    for (schema_id, schema) in &snapshot.schemas {
        for relation in &schema.relation_fields {
            if !snapshot.schemas.contains_key(&relation.related_schema_id) {
                issues.push(issue(
                    format!("schema {schema_id}"),
                    format!(
                        "relation field '{}' targets missing schema {}",
                        relation.name, relation.related_schema_id
                    ),
                    false,
                ));
            }
        }
    }
}

enum EdgeFix {
    DropOutbound {
        holder: ItemKey,
        target: ItemKey,
    },
    AddInbound {
        holder: ItemKey,
        source_schema_name: String,
        source: RelatedItem,
        source_schema_id: String,
    },
    DropInbound {
        holder: ItemKey,
        source: ItemKey,
    },
}

fn apply(snapshot: &mut Snapshot, fix: EdgeFix) {
    let holder = match &fix {
        EdgeFix::DropOutbound { holder, .. }
        | EdgeFix::AddInbound { holder, .. }
        | EdgeFix::DropInbound { holder, .. } => holder.clone(),
    };
    let Some(item) = snapshot.items.get_mut(&holder) else {
        return;
    };
    let changed = match fix {
        EdgeFix::DropOutbound { target, .. } => item.unlink_outbound(&target.0, &target.1),
        EdgeFix::AddInbound {
            source_schema_name,
            source,
            source_schema_id,
            ..
        } => item.link_inbound(&source_schema_id, &source_schema_name, source),
        EdgeFix::DropInbound { source, .. } => item.unlink_inbound(&source.0, &source.1),
    };
    if changed {
        snapshot.changed_items.insert(holder);
    }
}

fn check_outbound(
    snapshot: &mut Snapshot,
    issues: &mut Vec<FsckIssue>,
    repair: bool,
    repaired: &mut u64,
) {
    let mut fixes = Vec::new();
    for ((schema_id, item_id), item) in &snapshot.items {
        let holder = (schema_id.clone(), item_id.clone());
        for (target_schema, target_id) in item.outbound_targets() {
            let target_key = (target_schema.clone(), target_id.clone());
            match snapshot.items.get(&target_key) {
                None if !snapshot.readable(&target_schema) => {}
                None => {
                    issues.push(issue(
                        item_path(schema_id, item_id),
                        format!("points at missing item {target_schema}/{target_id}"),
                        true,
                    ));
                    fixes.push(EdgeFix::DropOutbound {
                        holder: holder.clone(),
                        target: target_key,
                    });
                }
                Some(target) => {
                    let mirrored = target
                        .inbound(schema_id)
                        .is_some_and(|group| group.contains(item_id));
                    if !mirrored {
                        issues.push(issue(
                            item_path(&target_schema, &target_id),
                            format!("missing reverse entry for {schema_id}/{item_id}"),
                            true,
                        ));
                        fixes.push(EdgeFix::AddInbound {
                            holder: target_key,
                            source_schema_name: snapshot
                                .schemas
                                .get(schema_id)
                                .map(|schema| schema.name.clone())
                                .unwrap_or_default(),
                            source: RelatedItem {
                                related_item_id: item_id.clone(),
                                related_item_name: item.descriptive_name.clone(),
                            },
                            source_schema_id: schema_id.clone(),
                        });
                    }
                }
            }
        }
    }
    if repair {
        for fix in fixes {
            apply(snapshot, fix);
            *repaired += 1;
        }
    }
}

fn check_inbound(
    snapshot: &mut Snapshot,
    issues: &mut Vec<FsckIssue>,
    repair: bool,
    repaired: &mut u64,
) {
    let mut fixes = Vec::new();
    for ((schema_id, item_id), item) in &snapshot.items {
        for (source_schema, source_id) in item.inbound_sources() {
            let message = match snapshot
                .items
                .get(&(source_schema.clone(), source_id.clone()))
            {
                None if !snapshot.readable(&source_schema) => None,
                None => Some(format!(
                    "reverse entry names missing item {source_schema}/{source_id}"
                )),
                Some(source) if !source.outbound(schema_id).is_some_and(|e| e.contains(item_id)) => {
                    Some(format!(
                        "reverse entry for {source_schema}/{source_id} has no outbound edge"
                    ))
                }
                Some(_) => None,
            };
            if let Some(message) = message {
                issues.push(issue(item_path(schema_id, item_id), message, true));
                fixes.push(EdgeFix::DropInbound {
                    holder: (schema_id.clone(), item_id.clone()),
                    source: (source_schema, source_id),
                });
            }
        }
    }
    if repair {
        for fix in fixes {
            apply(snapshot, fix);
            *repaired += 1;
        }
    }
}

fn check_workspace_links(
    conn: &Connection,
    snapshot: &Snapshot,
    issues: &mut Vec<FsckIssue>,
    repair: bool,
    repaired: &mut u64,
) -> rusqlite::Result<()> {
    for (schema_id, schema) in &snapshot.schemas {
        if !db::app_in_workspace(conn, &schema.workspace_id, schema_id)? {
            issues.push(issue(
                format!("schema {schema_id}"),
                format!("not linked to workspace {}", schema.workspace_id),
                true,
            ));
            if repair {
                db::link_workspace_app(conn, &schema.workspace_id, schema_id)?;
                *repaired += 1;
            }
        }
    }
    let mut stmt = conn.prepare("SELECT workspace_id, app_id FROM workspace_app ORDER BY app_id")?;
    let links = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    for (workspace_id, app_id) in links {
        if !snapshot.schemas.contains_key(&app_id) {
            issues.push(issue(
                format!("workspace {workspace_id}"),
                format!("links missing app {app_id}"),
                true,
            ));
            if repair {
                db::unlink_workspace_app(conn, &app_id)?;
                *repaired += 1;
            }
        }
    }
    Ok(())
}

fn check_tasks(
    conn: &Connection,
    snapshot: &Snapshot,
    issues: &mut Vec<FsckIssue>,
    repair: bool,
    repaired: &mut u64,
) -> rusqlite::Result<()> {
    for task in db::list_tasks(conn)? {
        let dangling = match (task.app_id.as_deref(), task.item_id.as_deref()) {
            (Some(app_id), _) if !snapshot.schemas.contains_key(app_id) => {
                Some(format!("references missing app {app_id}"))
            }
            (Some(app_id), Some(_)) if !snapshot.readable(app_id) => None,
            (Some(app_id), Some(item_id)) if !snapshot.contains(app_id, item_id) => {
                Some(format!("references missing item {item_id}"))
            }
            _ => None,
        };
        if let Some(message) = dangling {
            issues.push(issue(format!("task {}", task.id), message, true));
            if repair {
                db::delete_task(conn, &task.id)?;
                *repaired += 1;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "fsck_tests_ext.rs"]
mod tests;
