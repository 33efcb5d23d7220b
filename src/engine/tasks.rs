use rusqlite::Connection;

use super::{Engine, EngineError};
use crate::access::AccessError;
use crate::db;
use crate::domain::task::{round_down_to_minute, Task, TaskDraft, TaskScope};
use crate::ids::IdKind;

fn non_blank(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

impl Engine {
    /// Creates a task on behalf of the actor. References must form a chain
    /// (item needs app, app needs workspace) and must exist.
    pub fn create_task(&self, draft: &TaskDraft) -> Result<Task, EngineError> {
        draft.validate_chain().map_err(EngineError::InvalidArgument)?;
        let environment_id = draft.environment_id.trim();
        let workspace_id = non_blank(&draft.workspace_id);
        let app_id = non_blank(&draft.app_id);
        let item_id = non_blank(&draft.item_id);

        self.access
            .assert_can_access_environment(&self.actor, environment_id)?;
        self.access
            .assert_can_access_environment(&draft.assigned_user_id, environment_id)?;
        if let Some(workspace_id) = workspace_id {
            if let Some(owner) = self.access.workspace_environment(workspace_id) {
                if owner != environment_id {
                    return Err(EngineError::InvalidArgument(format!(
                        "workspace {workspace_id} belongs to environment {owner}, not {environment_id}"
                    )));
                }
            }
            self.access
                .assert_can_access_workspace(&self.actor, workspace_id)?;
            self.access
                .assert_can_access_workspace(&draft.assigned_user_id, workspace_id)?;
        }

        self.write("create_task", |tx| {
            if let (Some(workspace_id), Some(app_id)) = (workspace_id, app_id) {
                let schema = self.load_schema(tx, app_id)?;
                let linked = db::app_in_workspace(tx, workspace_id, app_id)?
                    || schema.workspace_id == workspace_id;
                if !linked {
                    return Err(EngineError::InvalidArgument(format!(
                        "app {app_id} does not belong to workspace {workspace_id}"
                    )));
                }
                if let Some(item_id) = item_id {
                    if db::get_item(tx, app_id, item_id)?.is_none() {
                        return Err(EngineError::not_found(IdKind::Item, item_id));
                    }
                }
            }

            let task = Task {
                id: self.allocate(IdKind::Task),
                environment_id: environment_id.to_string(),
                workspace_id: workspace_id.map(str::to_string),
                app_id: app_id.map(str::to_string),
                item_id: item_id.map(str::to_string),
                created_by: self.actor.clone(),
                assigned_user_id: draft.assigned_user_id.trim().to_string(),
                information: draft.information.clone(),
                due_date: draft.due_date,
                finished: draft.finished,
                created_on: round_down_to_minute(db::now_unix()),
            };
            db::insert_task(tx, &task)?;
            tracing::info!(task = %task.id, assigned = %task.assigned_user_id, "task created");
            Ok(task)
        })
    }

    pub fn get_task(&self, task_id: &str) -> Result<Task, EngineError> {
        let task = db::get_task(&self.conn, task_id)?
            .ok_or_else(|| EngineError::not_found(IdKind::Task, task_id))?;
        self.access
            .assert_can_access_environment(&self.actor, &task.environment_id)?;
        Ok(task)
    }

    /// Tasks created by or assigned to `user_id`.
    pub fn tasks_for_user(
        &self,
        user_id: &str,
        environment_id: Option<&str>,
    ) -> Result<Vec<Task>, EngineError> {
        if let Some(environment_id) = environment_id {
            self.access
                .assert_can_access_environment(&self.actor, environment_id)?;
        }
        Ok(db::tasks_for_user(&self.conn, user_id, environment_id)?)
    }

    fn check_task_party(&self, task: &Task) -> Result<(), EngineError> {
        if task.created_by == self.actor || task.assigned_user_id == self.actor {
            return Ok(());
        }
        self.access
            .assert_can_administer_environment(&self.actor, &task.environment_id)
            .map_err(|_| {
                EngineError::AccessDenied(AccessError::NoAccess {
                    user_id: self.actor.clone(),
                    scope: "task",
                    id: task.id.clone(),
                })
            })
    }

    pub fn set_task_finished(&self, task_id: &str, finished: bool) -> Result<Task, EngineError> {
        self.write("set_task_finished", |tx| {
            let mut task = db::get_task(tx, task_id)?
                .ok_or_else(|| EngineError::not_found(IdKind::Task, task_id))?;
            self.check_task_party(&task)?;
            db::set_task_finished(tx, task_id, finished)?;
            task.finished = finished;
            Ok(task)
        })
    }

    pub fn delete_task(&self, task_id: &str) -> Result<(), EngineError> {
        self.write("delete_task", |tx| {
            let task = db::get_task(tx, task_id)?
                .ok_or_else(|| EngineError::not_found(IdKind::Task, task_id))?;
            self.check_task_party(&task)?;
            db::delete_task(tx, task_id)?;
            tracing::info!(task = %task_id, "task deleted");
            Ok(())
        })
    }

    /// Workspace scopes need a workspace admin. App and item scopes need
    /// modify rights on the owning schema; when that schema is gone, each
    /// referencing task's workspace (or environment) decides.
    fn check_task_scope(&self, conn: &Connection, scope: TaskScope<'_>) -> Result<(), EngineError> {
        if let TaskScope::Workspace(workspace_id) = scope {
            self.access
                .assert_can_administer_workspace(&self.actor, workspace_id)?;
            return Ok(());
        }
        if let TaskScope::App(app_id) = scope {
            if let Some(schema) = db::get_schema(conn, app_id)? {
                return self.check_modify(&schema);
            }
        }
        for task_id in db::task_ids_referencing(conn, scope)? {
            let Some(task) = db::get_task(conn, &task_id)? else {
                continue;
            };
            let owner = match task.app_id.as_deref() {
                Some(app_id) => db::get_schema(conn, app_id)?,
                None => None,
            };
            match (owner, task.workspace_id.as_deref()) {
                (Some(schema), _) => self.check_modify(&schema)?,
                (None, Some(workspace_id)) => self
                    .access
                    .assert_can_administer_workspace(&self.actor, workspace_id)?,
                (None, None) => self
                    .access
                    .assert_can_administer_environment(&self.actor, &task.environment_id)?,
            }
        }
        Ok(())
    }

    /// Removes every task that references the given workspace, app or item.
    pub fn delete_tasks_referencing(&self, scope: TaskScope<'_>) -> Result<usize, EngineError> {
        self.write("delete_tasks_referencing", |tx| {
            self.check_task_scope(tx, scope)?;
            let removed = db::delete_tasks_referencing(tx, scope)?;
            tracing::debug!(column = scope.column(), id = scope.id(), removed, "tasks cascaded");
            Ok(removed)
        })
    }

    pub fn tasks_referencing(&self, scope: TaskScope<'_>) -> Result<Vec<String>, EngineError> {
        self.check_task_scope(&self.conn, scope)?;
        Ok(db::task_ids_referencing(&self.conn, scope)?)
    }

    /// Called when a user leaves an environment: their tasks there go away.
    pub fn revoke_environment_access(
        &self,
        user_id: &str,
        environment_id: &str,
    ) -> Result<usize, EngineError> {
        self.access
            .assert_can_administer_environment(&self.actor, environment_id)?;
        self.write("revoke_environment_access", |tx| {
            let removed = db::delete_tasks_for_user_in_environment(tx, user_id, environment_id)?;
            tracing::info!(user = %user_id, environment = %environment_id, removed, "environment access revoked");
            Ok(removed)
        })
    }
}
