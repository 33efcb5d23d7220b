use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub environment_id: String,
    pub workspace_id: Option<String>,
    pub app_id: Option<String>,
    pub item_id: Option<String>,
    pub created_by: String,
    pub assigned_user_id: String,
    pub information: String,
    pub due_date: Option<i64>,
    pub finished: bool,
    pub created_on: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskDraft {
    pub environment_id: String,
    pub assigned_user_id: String,
    #[serde(default)]
    pub workspace_id: Option<String>,
    #[serde(default)]
    pub app_id: Option<String>,
    #[serde(default)]
    pub item_id: Option<String>,
    #[serde(default)]
    pub information: String,
    #[serde(default)]
    pub due_date: Option<i64>,
    #[serde(default)]
    pub finished: bool,
}

/// The referent whose deletion removes a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskScope<'a> {
    Workspace(&'a str),
    App(&'a str),
    Item(&'a str),
}

impl TaskScope<'_> {
    pub fn column(&self) -> &'static str {
        match self {
            TaskScope::Workspace(_) => "workspace_id",
            TaskScope::App(_) => "app_id",
            TaskScope::Item(_) => "item_id",
        }
    }

    pub fn id(&self) -> &str {
        match self {
            TaskScope::Workspace(id) | TaskScope::App(id) | TaskScope::Item(id) => id,
        }
    }
}

fn present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|id| !id.trim().is_empty())
}

impl TaskDraft {
    /// An item needs its app, and an app needs its workspace.
    pub fn validate_chain(&self) -> Result<(), String> {
        if self.environment_id.trim().is_empty() {
            return Err("task needs an environment".to_string());
        }
        if self.assigned_user_id.trim().is_empty() {
            return Err("task needs an assigned user".to_string());
        }
        if present(&self.item_id) && !present(&self.app_id) {
            return Err("a task referencing an item must also reference its app".to_string());
        }
        if present(&self.app_id) && !present(&self.workspace_id) {
            return Err("a task referencing an app must also reference its workspace".to_string());
        }
        Ok(())
    }
}

pub fn round_down_to_minute(unix_seconds: i64) -> i64 {
    unix_seconds - unix_seconds.rem_euclid(60)
}
