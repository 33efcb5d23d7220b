use rusqlite::Connection;
use serde::Serialize;

use super::relations::{self, key, Workset};
use super::{Engine, EngineError};
use crate::db;
use crate::domain::field::RelationFieldDefinition;
use crate::domain::schema::{define_fields, AppSchema, SchemaDraft};
use crate::domain::task::TaskScope;
use crate::ids::IdKind;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SchemaDeleteSummary {
    pub schema_id: String,
    pub items_deleted: usize,
    pub neighbors_updated: usize,
    pub tasks_deleted: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PurgeSummary {
    pub workspace_id: String,
    pub schemas: Vec<SchemaDeleteSummary>,
    pub tasks_deleted: usize,
}

fn same_structure(schema: &AppSchema, draft: &SchemaDraft) -> bool {
    let fields_match = schema.fields.len() == draft.fields.len()
        && schema
            .fields
            .iter()
            .zip(&draft.fields)
            .all(|(current, wanted)| {
                current.name == wanted.name && current.field_type == wanted.field_type
            });
    let relations_match = schema.relation_fields.len() == draft.relation_fields.len()
        && schema
            .relation_fields
            .iter()
            .zip(&draft.relation_fields)
            .all(|(current, wanted)| {
                current.name == wanted.name
                    && current.related_schema_id == wanted.related_schema_id.trim()
            });
    fields_match && relations_match
}

impl Engine {
    /// Fills in `relatedSchemaName` for every relation field. A schema may
    /// only relate to itself once it exists, so `own` is accepted as a target.
    fn resolve_relation_targets(
        &self,
        conn: &Connection,
        relation_fields: &mut [RelationFieldDefinition],
        own: Option<(&str, &str)>,
    ) -> Result<(), EngineError> {
        for relation in relation_fields {
            if let Some((own_id, own_name)) = own {
                if relation.related_schema_id == own_id {
                    relation.related_schema_name = own_name.to_string();
                    continue;
                }
            }
            let target = self.load_schema(conn, &relation.related_schema_id)?;
            self.check_access(&target)?;
            relation.related_schema_name = target.name;
        }
        Ok(())
    }

    /// Defines a schema and provisions its item collection. An existing
    /// collection for the new id is reused with a warning.
    pub fn create_schema(
        &self,
        workspace_id: &str,
        draft: &SchemaDraft,
    ) -> Result<AppSchema, EngineError> {
        if workspace_id.trim().is_empty() {
            return Err(EngineError::InvalidArgument(
                "a schema needs an owning workspace".to_string(),
            ));
        }
        self.access
            .assert_can_administer_workspace(&self.actor, workspace_id)?;

        self.write("create_schema", |tx| {
            let mut defined = define_fields(draft, || self.allocate(IdKind::Field))?;
            self.resolve_relation_targets(tx, &mut defined.relation_fields, None)?;

            let now = db::now_utc_rfc3339();
            let schema = AppSchema {
                id: self.allocate(IdKind::Schema),
                name: draft.name.trim().to_string(),
                icon_id: draft.icon_id.clone(),
                workspace_id: workspace_id.to_string(),
                fields: defined.fields,
                relation_fields: defined.relation_fields,
                item_ids: Vec::new(),
                created_at: now.clone(),
                updated_at: now,
            };

            if db::collection_exists(tx, &schema.id)? {
                tracing::warn!(schema = %schema.id, "collection already exists; skipping provisioning");
            } else {
                db::create_collection(tx, &schema.id)?;
            }
            db::insert_schema(tx, &schema)?;
            db::link_workspace_app(tx, workspace_id, &schema.id)?;
            tracing::info!(schema = %schema.id, name = %schema.name, "schema created");
            Ok(schema)
        })
    }

    pub fn get_schema(&self, schema_id: &str) -> Result<AppSchema, EngineError> {
        let schema = self.load_schema(&self.conn, schema_id)?;
        self.check_access(&schema)?;
        Ok(schema)
    }

    /// Schemas the actor may read, optionally limited to one workspace.
    pub fn list_schemas(&self, workspace_id: Option<&str>) -> Result<Vec<AppSchema>, EngineError> {
        let schemas = db::list_schemas(&self.conn, workspace_id)?;
        Ok(schemas
            .into_iter()
            .filter(|schema| self.check_access(schema).is_ok())
            .collect())
    }

    pub fn rename_schema(&self, schema_id: &str, name: &str) -> Result<AppSchema, EngineError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(EngineError::InvalidArgument(
                "schema name cannot be empty".to_string(),
            ));
        }
        self.write("rename_schema", |tx| {
            let mut schema = self.load_schema(tx, schema_id)?;
            self.check_modify(&schema)?;
            schema.name = name.to_string();
            schema.updated_at = db::now_utc_rfc3339();
            db::replace_schema(tx, &schema)?;
            tracing::info!(schema = %schema_id, name, "schema renamed");
            Ok(schema)
        })
    }

    /// Full update. Name and icon may always change; the field structure
    /// only while the schema holds no items.
    pub fn update_schema(
        &self,
        schema_id: &str,
        draft: &SchemaDraft,
    ) -> Result<AppSchema, EngineError> {
        self.write("update_schema", |tx| {
            let mut schema = self.load_schema(tx, schema_id)?;
            self.check_modify(&schema)?;
            let name = draft.name.trim();
            if name.is_empty() {
                return Err(EngineError::InvalidArgument(
                    "schema name cannot be empty".to_string(),
                ));
            }

            if !same_structure(&schema, draft) {
                if schema.has_items() || db::count_items(tx, schema_id)? > 0 {
                    return Err(EngineError::InvalidArgument(format!(
                        "schema {schema_id} has items; its fields can no longer change"
                    )));
                }
                let mut defined = define_fields(draft, || self.allocate(IdKind::Field))?;
                self.resolve_relation_targets(
                    tx,
                    &mut defined.relation_fields,
                    Some((schema_id, name)),
                )?;
                schema.fields = defined.fields;
                schema.relation_fields = defined.relation_fields;
            }

            schema.name = name.to_string();
            schema.icon_id = draft.icon_id.clone();
            schema.updated_at = db::now_utc_rfc3339();
            db::replace_schema(tx, &schema)?;
            tracing::info!(schema = %schema_id, "schema updated");
            Ok(schema)
        })
    }

    pub fn delete_schema(&self, schema_id: &str) -> Result<SchemaDeleteSummary, EngineError> {
        self.write("delete_schema", |tx| {
            let schema = self.load_schema(tx, schema_id)?;
            self.check_modify(&schema)?;
            delete_schema_in(tx, &schema)
        })
    }

    /// Deletes every schema of a workspace, then every task that references
    /// the workspace.
    pub fn purge_workspace(&self, workspace_id: &str) -> Result<PurgeSummary, EngineError> {
        self.access
            .assert_can_administer_workspace(&self.actor, workspace_id)?;
        self.write("purge_workspace", |tx| {
            let mut schema_ids = db::workspace_apps(tx, workspace_id)?;
            for schema in db::list_schemas(tx, Some(workspace_id))? {
                if !schema_ids.contains(&schema.id) {
                    schema_ids.push(schema.id);
                }
            }

            let mut schemas = Vec::new();
            for schema_id in &schema_ids {
                match db::get_schema(tx, schema_id)? {
                    Some(schema) => schemas.push(delete_schema_in(tx, &schema)?),
                    None => {
                        db::unlink_workspace_app(tx, schema_id)?;
                    }
                }
            }
            let tasks_deleted =
                db::delete_tasks_referencing(tx, TaskScope::Workspace(workspace_id))?;
            tracing::info!(workspace = %workspace_id, schemas = schemas.len(), tasks_deleted, "workspace purged");
            Ok(PurgeSummary {
                workspace_id: workspace_id.to_string(),
                schemas,
                tasks_deleted,
            })
        })
    }
}

/// Strips every edge between this schema's items and the rest of the store,
/// drops the collection, the record and the workspace link, and deletes the
/// tasks and activity that reference the schema.
fn delete_schema_in(
    conn: &Connection,
    schema: &AppSchema,
) -> Result<SchemaDeleteSummary, EngineError> {
    let items = db::list_items(conn, &schema.id)?;
    let mut ws = Workset::new(conn);
    for item in &items {
        ws.forget(key(&schema.id, &item.id));
    }
    let mut neighbors_updated = 0;
    for item in &items {
        neighbors_updated += relations::strip(&mut ws, item)?;
    }
    ws.flush()?;

    db::drop_collection(conn, &schema.id)?;
    db::delete_schema(conn, &schema.id)?;
    db::unlink_workspace_app(conn, &schema.id)?;
    let tasks_deleted = db::delete_tasks_referencing(conn, TaskScope::App(&schema.id))?;
    db::delete_activity_for_app(conn, &schema.id)?;
    tracing::info!(
        schema = %schema.id,
        items = items.len(),
        neighbors_updated,
        tasks_deleted,
        "schema deleted"
    );
    Ok(SchemaDeleteSummary {
        schema_id: schema.id.clone(),
        items_deleted: items.len(),
        neighbors_updated,
        tasks_deleted,
    })
}
