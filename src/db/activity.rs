use rusqlite::{params, Connection, Result};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    pub id: String,
    pub item_id: String,
    pub app_id: String,
    pub creator_id: String,
    pub created_on: i64,
    pub text: String,
}

pub fn insert_activity(conn: &Connection, entry: &ActivityEntry) -> Result<()> {
    conn.execute(
        r#"
INSERT INTO item_activity (id, item_id, app_id, creator_id, created_on, text)
VALUES (?1, ?2, ?3, ?4, ?5, ?6)
"#,
        params![
            entry.id,
            entry.item_id,
            entry.app_id,
            entry.creator_id,
            entry.created_on,
            entry.text
        ],
    )?;
    Ok(())
}

/// Oldest first.
pub fn list_activity(conn: &Connection, item_id: &str) -> Result<Vec<ActivityEntry>> {
    let mut stmt = conn.prepare(
        r#"
SELECT id, item_id, app_id, creator_id, created_on, text
FROM item_activity
WHERE item_id = ?1
ORDER BY created_on ASC, rowid ASC
"#,
    )?;
    let rows = stmt.query_map(params![item_id], |row| {
        Ok(ActivityEntry {
            id: row.get(0)?,
            item_id: row.get(1)?,
            app_id: row.get(2)?,
            creator_id: row.get(3)?,
            created_on: row.get(4)?,
            text: row.get(5)?,
        })
    })?;
    rows.collect()
}

pub fn delete_activity_for_item(conn: &Connection, item_id: &str) -> Result<usize> {
    conn.execute(
        "DELETE FROM item_activity WHERE item_id = ?1",
        params![item_id],
    )
}

pub fn delete_activity_for_app(conn: &Connection, app_id: &str) -> Result<usize> {
    conn.execute("DELETE FROM item_activity WHERE app_id = ?1", params![app_id])
}
