use rusqlite::{params, Connection, OptionalExtension, Result, Row};

use crate::domain::task::{Task, TaskScope};

const TASK_COLUMNS: &str = "id, environment_id, workspace_id, app_id, item_id, created_by, assigned_user_id, information, due_date, finished, created_on";

fn task_from_row(row: &Row<'_>) -> Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        environment_id: row.get(1)?,
        workspace_id: row.get(2)?,
        app_id: row.get(3)?,
        item_id: row.get(4)?,
        created_by: row.get(5)?,
        assigned_user_id: row.get(6)?,
        information: row.get(7)?,
        due_date: row.get(8)?,
        finished: row.get(9)?,
        created_on: row.get(10)?,
    })
}

fn query_tasks(conn: &Connection, sql: &str, args: impl rusqlite::Params) -> Result<Vec<Task>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(args)?;
    let mut result = Vec::new();
    while let Some(row) = rows.next()? {
        result.push(task_from_row(row)?);
    }
    Ok(result)
}

pub fn insert_task(conn: &Connection, task: &Task) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO task ({TASK_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
        ),
        params![
            task.id,
            task.environment_id,
            task.workspace_id,
            task.app_id,
            task.item_id,
            task.created_by,
            task.assigned_user_id,
            task.information,
            task.due_date,
            task.finished,
            task.created_on
        ],
    )?;
    Ok(())
}

pub fn get_task(conn: &Connection, id: &str) -> Result<Option<Task>> {
    conn.query_row(
        &format!("SELECT {TASK_COLUMNS} FROM task WHERE id = ?1"),
        params![id],
        task_from_row,
    )
    .optional()
}

pub fn list_tasks(conn: &Connection) -> Result<Vec<Task>> {
    query_tasks(
        conn,
        &format!("SELECT {TASK_COLUMNS} FROM task ORDER BY created_on ASC, rowid ASC"),
        [],
    )
}

/// Tasks the user created or was assigned, optionally within one environment.
pub fn tasks_for_user(
    conn: &Connection,
    user_id: &str,
    environment_id: Option<&str>,
) -> Result<Vec<Task>> {
    query_tasks(
        conn,
        &format!(
            r#"
SELECT {TASK_COLUMNS} FROM task
WHERE (created_by = ?1 OR assigned_user_id = ?1)
  AND (?2 IS NULL OR environment_id = ?2)
ORDER BY created_on ASC, rowid ASC
"#
        ),
        params![user_id, environment_id],
    )
}

pub fn set_task_finished(conn: &Connection, id: &str, finished: bool) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE task SET finished = ?2 WHERE id = ?1",
        params![id, finished],
    )?;
    Ok(changed > 0)
}

pub fn delete_task(conn: &Connection, id: &str) -> Result<bool> {
    let removed = conn.execute("DELETE FROM task WHERE id = ?1", params![id])?;
    Ok(removed > 0)
}

pub fn task_ids_referencing(conn: &Connection, scope: TaskScope<'_>) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id FROM task WHERE {} = ?1 ORDER BY id",
        scope.column()
    ))?;
    let rows = stmt.query_map(params![scope.id()], |row| row.get(0))?;
    rows.collect()
}

pub fn delete_tasks_referencing(conn: &Connection, scope: TaskScope<'_>) -> Result<usize> {
    conn.execute(
        &format!("DELETE FROM task WHERE {} = ?1", scope.column()),
        params![scope.id()],
    )
}

pub fn delete_tasks_for_user_in_environment(
    conn: &Connection,
    user_id: &str,
    environment_id: &str,
) -> Result<usize> {
    conn.execute(
        "DELETE FROM task WHERE environment_id = ?2 AND (created_by = ?1 OR assigned_user_id = ?1)",
        params![user_id, environment_id],
    )
}
