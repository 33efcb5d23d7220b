use std::time::Duration;

use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, DatabaseName, OptionalExtension, Result, Row};
use serde::de::DeserializeOwned;
use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::domain::item::Item;
use crate::domain::schema::AppSchema;

mod activity;
mod tasks;

pub use activity::{
    delete_activity_for_app, delete_activity_for_item, insert_activity, list_activity, ActivityEntry,
};
pub use tasks::{
    delete_task, delete_tasks_for_user_in_environment, delete_tasks_referencing, get_task,
    insert_task, list_tasks, set_task_finished, task_ids_referencing, tasks_for_user,
};

pub const CURRENT_SCHEMA_VERSION: i64 = 2;
#[cfg(test)]
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: [Migration; 2] = [
    Migration {
        version: 1,
        name: "baseline_store_v1",
        sql: r#"
CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS app_schema (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    icon_id TEXT,
    workspace_id TEXT NOT NULL,
    fields_json TEXT NOT NULL,
    relation_fields_json TEXT NOT NULL,
    item_ids_json TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS workspace_app (
    workspace_id TEXT NOT NULL,
    app_id TEXT NOT NULL,
    PRIMARY KEY (workspace_id, app_id)
);

CREATE TABLE IF NOT EXISTS task (
    id TEXT PRIMARY KEY,
    environment_id TEXT NOT NULL,
    workspace_id TEXT,
    app_id TEXT,
    item_id TEXT,
    created_by TEXT NOT NULL,
    assigned_user_id TEXT NOT NULL,
    information TEXT NOT NULL,
    due_date INTEGER,
    finished INTEGER NOT NULL DEFAULT 0,
    created_on INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_app_schema_workspace ON app_schema(workspace_id);
CREATE INDEX IF NOT EXISTS idx_workspace_app_app ON workspace_app(app_id);
CREATE INDEX IF NOT EXISTS idx_task_workspace ON task(workspace_id);
CREATE INDEX IF NOT EXISTS idx_task_app ON task(app_id);
CREATE INDEX IF NOT EXISTS idx_task_item ON task(item_id);
CREATE INDEX IF NOT EXISTS idx_task_environment ON task(environment_id);
"#,
    },
    Migration {
        version: 2,
        name: "item_activity_v1",
        sql: r#"
CREATE TABLE IF NOT EXISTS item_activity (
    id TEXT PRIMARY KEY,
    item_id TEXT NOT NULL,
    app_id TEXT NOT NULL,
    creator_id TEXT NOT NULL,
    created_on INTEGER NOT NULL,
    text TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_item_activity_item ON item_activity(item_id, created_on);
CREATE INDEX IF NOT EXISTS idx_item_activity_app ON item_activity(app_id);
"#,
    },
];

pub fn open_connection(path: &str, busy_timeout: Duration) -> Result<Connection> {
    let mut conn = Connection::open(path)?;
    configure_for_speed(&conn, busy_timeout)?;
    apply_migrations(&mut conn)?;
    Ok(conn)
}

fn configure_for_speed(conn: &Connection, busy_timeout: Duration) -> Result<()> {
    let busy_ms = i64::try_from(busy_timeout.as_millis()).unwrap_or(i64::MAX);
    conn.pragma_update(None::<DatabaseName>, "journal_mode", "WAL")?;
    conn.pragma_update(None::<DatabaseName>, "synchronous", "NORMAL")?;
    conn.pragma_update(None::<DatabaseName>, "foreign_keys", "ON")?;
    conn.pragma_update(None::<DatabaseName>, "temp_store", "MEMORY")?;
    conn.pragma_update(None::<DatabaseName>, "busy_timeout", busy_ms)?;
    conn.busy_timeout(busy_timeout)?;
    Ok(())
}

fn apply_migrations(conn: &mut Connection) -> Result<()> {
    let tx = conn.transaction()?;
    tx.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at TEXT NOT NULL
);
"#,
    )?;

    for migration in MIGRATIONS {
        let already_applied: Option<i64> = tx
            .query_row(
                "SELECT version FROM schema_migrations WHERE version = ?1",
                params![migration.version],
                |row| row.get(0),
            )
            .optional()?;

        if already_applied.is_some() {
            continue;
        }

        tx.execute_batch(migration.sql)?;
        tx.execute(
            "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
            params![migration.version, migration.name, now_utc_rfc3339()],
        )?;
    }

    tx.execute(
        r#"
INSERT INTO meta (key, value)
VALUES ('schema_version', ?1)
ON CONFLICT(key) DO UPDATE SET value = excluded.value
"#,
        params![CURRENT_SCHEMA_VERSION.to_string()],
    )?;

    tx.commit()
}

pub fn now_utc_rfc3339() -> String {
    let now = OffsetDateTime::now_utc();
    now.format(&Rfc3339)
        .unwrap_or_else(|_| now.unix_timestamp().to_string())
}

pub fn now_unix() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

#[cfg(test)]
pub fn get_meta(conn: &Connection, key: &str) -> Result<Option<String>> {
    conn.query_row(
        "SELECT value FROM meta WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|err| rusqlite::Error::ToSqlConversionFailure(Box::new(err)))
}

fn from_json<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err)))
}

const SCHEMA_COLUMNS: &str = "id, name, icon_id, workspace_id, fields_json, relation_fields_json, item_ids_json, created_at, updated_at";

fn schema_from_row(row: &Row<'_>) -> Result<AppSchema> {
    Ok(AppSchema {
        id: row.get(0)?,
        name: row.get(1)?,
        icon_id: row.get(2)?,
        workspace_id: row.get(3)?,
        fields: from_json(row, 4)?,
        relation_fields: from_json(row, 5)?,
        item_ids: from_json(row, 6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

pub fn insert_schema(conn: &Connection, schema: &AppSchema) -> Result<()> {
    conn.execute(
        &format!("INSERT INTO app_schema ({SCHEMA_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"),
        params![
            schema.id,
            schema.name,
            schema.icon_id,
            schema.workspace_id,
            to_json(&schema.fields)?,
            to_json(&schema.relation_fields)?,
            to_json(&schema.item_ids)?,
            schema.created_at,
            schema.updated_at
        ],
    )?;
    Ok(())
}

/// Rewrites the whole schema record, item-id index included.
pub fn replace_schema(conn: &Connection, schema: &AppSchema) -> Result<usize> {
    conn.execute(
        r#"
UPDATE app_schema SET
    name = ?2,
    icon_id = ?3,
    workspace_id = ?4,
    fields_json = ?5,
    relation_fields_json = ?6,
    item_ids_json = ?7,
    updated_at = ?8
WHERE id = ?1
"#,
        params![
            schema.id,
            schema.name,
            schema.icon_id,
            schema.workspace_id,
            to_json(&schema.fields)?,
            to_json(&schema.relation_fields)?,
            to_json(&schema.item_ids)?,
            schema.updated_at
        ],
    )
}

pub fn get_schema(conn: &Connection, id: &str) -> Result<Option<AppSchema>> {
    conn.query_row(
        &format!("SELECT {SCHEMA_COLUMNS} FROM app_schema WHERE id = ?1"),
        params![id],
        schema_from_row,
    )
    .optional()
}

pub fn list_schemas(conn: &Connection, workspace_id: Option<&str>) -> Result<Vec<AppSchema>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SCHEMA_COLUMNS} FROM app_schema WHERE ?1 IS NULL OR workspace_id = ?1 ORDER BY id ASC"
    ))?;
    let mut rows = stmt.query(params![workspace_id])?;
    let mut result = Vec::new();
    while let Some(row) = rows.next()? {
        result.push(schema_from_row(row)?);
    }
    Ok(result)
}

pub fn delete_schema(conn: &Connection, id: &str) -> Result<bool> {
    let removed = conn.execute("DELETE FROM app_schema WHERE id = ?1", params![id])?;
    Ok(removed > 0)
}

pub fn link_workspace_app(conn: &Connection, workspace_id: &str, app_id: &str) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO workspace_app (workspace_id, app_id) VALUES (?1, ?2)",
        params![workspace_id, app_id],
    )?;
    Ok(())
}

pub fn unlink_workspace_app(conn: &Connection, app_id: &str) -> Result<usize> {
    conn.execute("DELETE FROM workspace_app WHERE app_id = ?1", params![app_id])
}

pub fn workspace_apps(conn: &Connection, workspace_id: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT app_id FROM workspace_app WHERE workspace_id = ?1 ORDER BY app_id ASC",
    )?;
    let rows = stmt.query_map(params![workspace_id], |row| row.get(0))?;
    rows.collect()
}

pub fn app_in_workspace(conn: &Connection, workspace_id: &str, app_id: &str) -> Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM workspace_app WHERE workspace_id = ?1 AND app_id = ?2)",
        params![workspace_id, app_id],
        |row| row.get(0),
    )
}

/// Physical table that holds the items of one schema.
pub fn collection_table(schema_id: &str) -> String {
    let suffix: String = schema_id
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() {
                ch.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("items_{suffix}")
}

pub fn collection_exists(conn: &Connection, schema_id: &str) -> Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
        params![collection_table(schema_id)],
        |row| row.get(0),
    )
}

pub fn create_collection(conn: &Connection, schema_id: &str) -> Result<()> {
    conn.execute_batch(&format!(
        r#"
CREATE TABLE "{table}" (
    id TEXT PRIMARY KEY,
    descriptive_name TEXT NOT NULL,
    field_values TEXT NOT NULL,
    relation_values TEXT NOT NULL,
    relations TEXT NOT NULL,
    version INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#,
        table = collection_table(schema_id)
    ))
}

pub fn drop_collection(conn: &Connection, schema_id: &str) -> Result<()> {
    conn.execute_batch(&format!(
        "DROP TABLE IF EXISTS \"{}\";",
        collection_table(schema_id)
    ))
}

/// Every `items_*` table present in the store.
pub fn list_collection_tables(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name LIKE 'items\\_%' ESCAPE '\\' ORDER BY name",
    )?;
    let rows = stmt.query_map([], |row| row.get(0))?;
    rows.collect()
}

const ITEM_COLUMNS: &str =
    "id, descriptive_name, field_values, relation_values, relations, version, created_at, updated_at";

fn item_from_row(schema_id: &str, row: &Row<'_>) -> Result<Item> {
    Ok(Item {
        id: row.get(0)?,
        schema_id: schema_id.to_string(),
        descriptive_name: row.get(1)?,
        field_values: from_json(row, 2)?,
        relation_values: from_json(row, 3)?,
        relations: from_json(row, 4)?,
        version: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn query_items(
    conn: &Connection,
    schema_id: &str,
    sql: &str,
    args: impl rusqlite::Params,
) -> Result<Vec<Item>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(args)?;
    let mut result = Vec::new();
    while let Some(row) = rows.next()? {
        result.push(item_from_row(schema_id, row)?);
    }
    Ok(result)
}

pub fn insert_item(conn: &Connection, item: &Item) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO \"{}\" ({ITEM_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            collection_table(&item.schema_id)
        ),
        params![
            item.id,
            item.descriptive_name,
            to_json(&item.field_values)?,
            to_json(&item.relation_values)?,
            to_json(&item.relations)?,
            item.version,
            item.created_at,
            item.updated_at
        ],
    )?;
    Ok(())
}

pub fn replace_item(conn: &Connection, item: &Item) -> Result<usize> {
    conn.execute(
        &format!(
            r#"
UPDATE "{}" SET
    descriptive_name = ?2,
    field_values = ?3,
    relation_values = ?4,
    relations = ?5,
    version = ?6,
    updated_at = ?7
WHERE id = ?1
"#,
            collection_table(&item.schema_id)
        ),
        params![
            item.id,
            item.descriptive_name,
            to_json(&item.field_values)?,
            to_json(&item.relation_values)?,
            to_json(&item.relations)?,
            item.version,
            item.updated_at
        ],
    )
}

pub fn get_item(conn: &Connection, schema_id: &str, item_id: &str) -> Result<Option<Item>> {
    conn.query_row(
        &format!(
            "SELECT {ITEM_COLUMNS} FROM \"{}\" WHERE id = ?1",
            collection_table(schema_id)
        ),
        params![item_id],
        |row| item_from_row(schema_id, row),
    )
    .optional()
}

pub fn list_items(conn: &Connection, schema_id: &str) -> Result<Vec<Item>> {
    query_items(
        conn,
        schema_id,
        &format!(
            "SELECT {ITEM_COLUMNS} FROM \"{}\" ORDER BY id ASC",
            collection_table(schema_id)
        ),
        [],
    )
}

#[cfg(test)]
pub fn list_item_ids(conn: &Connection, schema_id: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id FROM \"{}\" ORDER BY id ASC",
        collection_table(schema_id)
    ))?;
    let rows = stmt.query_map([], |row| row.get(0))?;
    rows.collect()
}

/// Items whose descriptive name contains `needle`. The case-insensitive
/// match folds Unicode case, which SQLite's `lower()` does not.
pub fn find_items_by_name(
    conn: &Connection,
    schema_id: &str,
    needle: &str,
    case_insensitive: bool,
) -> Result<Vec<Item>> {
    if case_insensitive {
        let needle = needle.to_lowercase();
        let items = list_items(conn, schema_id)?;
        return Ok(items
            .into_iter()
            .filter(|item| item.descriptive_name.to_lowercase().contains(&needle))
            .collect());
    }
    query_items(
        conn,
        schema_id,
        &format!(
            "SELECT {ITEM_COLUMNS} FROM \"{}\" WHERE instr(descriptive_name, ?1) > 0 ORDER BY id ASC",
            collection_table(schema_id)
        ),
        params![needle],
    )
}

pub fn page_items(
    conn: &Connection,
    schema_id: &str,
    offset: u32,
    limit: u32,
    ascending: bool,
) -> Result<Vec<Item>> {
    let direction = if ascending { "ASC" } else { "DESC" };
    query_items(
        conn,
        schema_id,
        &format!(
            "SELECT {ITEM_COLUMNS} FROM \"{}\" ORDER BY id {direction} LIMIT ?1 OFFSET ?2",
            collection_table(schema_id)
        ),
        params![i64::from(limit), i64::from(offset)],
    )
}

pub fn count_items(conn: &Connection, schema_id: &str) -> Result<i64> {
    conn.query_row(
        &format!("SELECT COUNT(*) FROM \"{}\"", collection_table(schema_id)),
        [],
        |row| row.get(0),
    )
}

pub fn delete_item(conn: &Connection, schema_id: &str, item_id: &str) -> Result<bool> {
    let removed = conn.execute(
        &format!("DELETE FROM \"{}\" WHERE id = ?1", collection_table(schema_id)),
        params![item_id],
    )?;
    Ok(removed > 0)
}

/// One multi-id delete.
pub fn delete_items(conn: &Connection, schema_id: &str, item_ids: &[String]) -> Result<usize> {
    if item_ids.is_empty() {
        return Ok(0);
    }
    let placeholders = (1..=item_ids.len())
        .map(|idx| format!("?{idx}"))
        .collect::<Vec<_>>()
        .join(", ");
    conn.execute(
        &format!(
            "DELETE FROM \"{}\" WHERE id IN ({placeholders})",
            collection_table(schema_id)
        ),
        params_from_iter(item_ids.iter()),
    )
}
