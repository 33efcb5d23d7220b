use std::collections::BTreeSet;

use rusqlite::Connection;
use serde::Serialize;

use super::relations::{self, key, Workset};
use super::{Engine, EngineError};
use crate::db;
use crate::domain::item::{Item, ItemDraft, ItemRelation, RelationValue};
use crate::domain::schema::AppSchema;
use crate::domain::task::TaskScope;
use crate::ids::IdKind;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BulkDeleteSummary {
    pub deleted: Vec<String>,
    pub missing: Vec<String>,
    pub neighbors_updated: usize,
    pub tasks_deleted: usize,
}

fn remove_from_index(
    conn: &Connection,
    schema: &mut AppSchema,
    item_ids: &BTreeSet<String>,
    now: &str,
) -> Result<(), EngineError> {
    schema.item_ids.retain(|id| !item_ids.contains(id));
    schema.updated_at = now.to_string();
    db::replace_schema(conn, schema)?;
    Ok(())
}

impl Engine {
    pub fn create_item(&self, schema_id: &str, draft: &ItemDraft) -> Result<Item, EngineError> {
        self.write("create_item", |tx| {
            let mut schema = self.load_schema(tx, schema_id)?;
            self.check_access(&schema)?;
            let conformed = schema.conform(draft)?;

            let mut ws = Workset::new(tx);
            let item = Item {
                id: self.allocate(IdKind::Item),
                schema_id: schema.id.clone(),
                descriptive_name: conformed.descriptive_name.clone(),
                field_values: conformed.field_values.clone(),
                relation_values: conformed.relation_values.clone(),
                relations: Vec::new(),
                version: 1,
                created_at: ws.now().to_string(),
                updated_at: ws.now().to_string(),
            };
            let item_key = ws.insert_new(item);
            for (target_schema_id, targets) in &conformed.requested_edges {
                for target_id in targets {
                    relations::link(&mut ws, &item_key, target_schema_id, target_id)?;
                }
            }
            ws.flush()?;

            schema.item_ids.push(item_key.1.clone());
            schema.updated_at = ws.now().to_string();
            db::replace_schema(tx, &schema)?;

            let created = ws
                .into_item(&item_key)
                .ok_or_else(|| EngineError::not_found(IdKind::Item, &item_key.1))?;
            self.record_activity(tx, &created, "Item created")?;
            tracing::info!(schema = %schema.id, item = %created.id, "item created");
            Ok(created)
        })
    }

    pub fn get_item(&self, schema_id: &str, item_id: &str) -> Result<Item, EngineError> {
        let schema = self.load_schema(&self.conn, schema_id)?;
        self.check_access(&schema)?;
        db::get_item(&self.conn, schema_id, item_id)?
            .ok_or_else(|| EngineError::not_found(IdKind::Item, item_id))
    }

    pub fn list_items(&self, schema_id: &str) -> Result<Vec<Item>, EngineError> {
        let schema = self.load_schema(&self.conn, schema_id)?;
        self.check_access(&schema)?;
        Ok(db::list_items(&self.conn, schema_id)?)
    }

    /// One page of items sorted by id, `page_size` items per page.
    pub fn page_items(
        &self,
        schema_id: &str,
        offset: u32,
        ascending: bool,
    ) -> Result<Vec<Item>, EngineError> {
        let schema = self.load_schema(&self.conn, schema_id)?;
        self.check_access(&schema)?;
        Ok(db::page_items(
            &self.conn,
            schema_id,
            offset,
            self.page_size,
            ascending,
        )?)
    }

    pub fn find_items(
        &self,
        schema_id: &str,
        needle: &str,
        case_insensitive: bool,
    ) -> Result<Vec<Item>, EngineError> {
        let schema = self.load_schema(&self.conn, schema_id)?;
        self.check_access(&schema)?;
        Ok(db::find_items_by_name(
            &self.conn,
            schema_id,
            needle,
            case_insensitive,
        )?)
    }

    /// Replaces an item. Relation edges are diffed per relation field so
    /// only added or removed targets touch their neighbors. Inbound
    /// `relations` are owned by the engine and never taken from the draft.
    pub fn update_item(
        &self,
        schema_id: &str,
        item_id: &str,
        draft: &ItemDraft,
        if_match: Option<i64>,
    ) -> Result<Item, EngineError> {
        self.write("update_item", |tx| {
            let schema = self.load_schema(tx, schema_id)?;
            self.check_access(&schema)?;

            let mut ws = Workset::new(tx);
            ws.require(schema_id, item_id)?;
            let item_key = key(schema_id, item_id);
            let current = ws
                .get(&item_key)
                .cloned()
                .ok_or_else(|| EngineError::not_found(IdKind::Item, item_id))?;
            if let Some(expected) = if_match {
                if expected != current.version {
                    return Err(EngineError::Conflict {
                        id: item_id.to_string(),
                        expected,
                        actual: current.version,
                    });
                }
            }
            let conformed = schema.conform(draft)?;

            let relation_values: Vec<RelationValue> = conformed
                .relation_values
                .iter()
                .map(|value| {
                    let stored = current
                        .outbound(&value.edge.related_schema_id)
                        .cloned()
                        .unwrap_or_else(|| {
                            ItemRelation::new(
                                &value.edge.related_schema_id,
                                &value.edge.related_schema_name,
                            )
                        });
                    RelationValue {
                        edge: stored,
                        ..value.clone()
                    }
                })
                .collect();
            ws.update(&item_key, |item| {
                item.descriptive_name = conformed.descriptive_name.clone();
                item.field_values = conformed.field_values.clone();
                item.relation_values = relation_values;
            });

            for (target_schema_id, incoming) in &conformed.requested_edges {
                let stored: Vec<String> = current
                    .outbound(target_schema_id)
                    .map(|edge| {
                        edge.related_items
                            .iter()
                            .map(|related| related.related_item_id.clone())
                            .collect()
                    })
                    .unwrap_or_default();
                for gone in stored.iter().filter(|id| !incoming.contains(id)) {
                    relations::unlink(&mut ws, &item_key, target_schema_id, gone)?;
                }
                for added in incoming.iter().filter(|id| !stored.contains(id)) {
                    relations::link(&mut ws, &item_key, target_schema_id, added)?;
                }
            }
            ws.flush()?;

            let updated = ws
                .into_item(&item_key)
                .ok_or_else(|| EngineError::not_found(IdKind::Item, item_id))?;
            self.record_activity(tx, &updated, "Item updated")?;
            tracing::info!(schema = %schema_id, item = %item_id, version = updated.version, "item updated");
            Ok(updated)
        })
    }

    /// Deletes an item after stripping it from every neighbor, then drops it
    /// from the schema index and removes tasks and activity that refer to it.
    pub fn delete_item(&self, schema_id: &str, item_id: &str) -> Result<(), EngineError> {
        self.write("delete_item", |tx| {
            let mut schema = self.load_schema(tx, schema_id)?;
            self.check_access(&schema)?;
            let item = db::get_item(tx, schema_id, item_id)?
                .ok_or_else(|| EngineError::not_found(IdKind::Item, item_id))?;

            let mut ws = Workset::new(tx);
            ws.forget(key(schema_id, item_id));
            let neighbors = relations::strip(&mut ws, &item)?;
            ws.flush()?;

            db::delete_item(tx, schema_id, item_id)?;
            let gone = BTreeSet::from([item_id.to_string()]);
            remove_from_index(tx, &mut schema, &gone, ws.now())?;
            let tasks = db::delete_tasks_referencing(tx, TaskScope::Item(item_id))?;
            db::delete_activity_for_item(tx, item_id)?;
            tracing::info!(schema = %schema_id, item = %item_id, neighbors, tasks, "item deleted");
            Ok(())
        })
    }

    /// Deletes several items of one schema with a single multi-id delete.
    /// Ids that do not exist are reported, not treated as errors.
    pub fn bulk_delete_items(
        &self,
        schema_id: &str,
        item_ids: &[String],
    ) -> Result<BulkDeleteSummary, EngineError> {
        self.write("bulk_delete_items", |tx| {
            let mut schema = self.load_schema(tx, schema_id)?;
            self.check_access(&schema)?;

            let mut doomed = Vec::new();
            let mut missing = Vec::new();
            let mut seen = BTreeSet::new();
            for item_id in item_ids {
                if !seen.insert(item_id.clone()) {
                    continue;
                }
                match db::get_item(tx, schema_id, item_id)? {
                    Some(item) => doomed.push(item),
                    None => {
                        tracing::warn!(item = %item_id, "bulk delete skipped missing item");
                        missing.push(item_id.clone());
                    }
                }
            }

            let mut ws = Workset::new(tx);
            for item in &doomed {
                ws.forget(key(schema_id, &item.id));
            }
            let mut neighbors_updated = 0;
            for item in &doomed {
                neighbors_updated += relations::strip(&mut ws, item)?;
            }
            ws.flush()?;

            let deleted: Vec<String> = doomed.iter().map(|item| item.id.clone()).collect();
            db::delete_items(tx, schema_id, &deleted)?;
            let gone: BTreeSet<String> = deleted.iter().cloned().collect();
            remove_from_index(tx, &mut schema, &gone, ws.now())?;
            let mut tasks_deleted = 0;
            for item_id in &deleted {
                tasks_deleted += db::delete_tasks_referencing(tx, TaskScope::Item(item_id))?;
                db::delete_activity_for_item(tx, item_id)?;
            }
            tracing::info!(schema = %schema_id, deleted = deleted.len(), "items bulk deleted");
            Ok(BulkDeleteSummary {
                deleted,
                missing,
                neighbors_updated,
                tasks_deleted,
            })
        })
    }

    pub fn add_edge(
        &self,
        schema_id: &str,
        item_id: &str,
        target_schema_id: &str,
        target_item_id: &str,
    ) -> Result<bool, EngineError> {
        self.write("add_edge", |tx| {
            let schema = self.load_schema(tx, schema_id)?;
            self.check_access(&schema)?;
            let target_schema = self.load_schema(tx, target_schema_id)?;
            self.check_access(&target_schema)?;
            let mut ws = Workset::new(tx);
            let changed = relations::link(
                &mut ws,
                &key(schema_id, item_id),
                target_schema_id,
                target_item_id,
            )?;
            ws.flush()?;
            Ok(changed)
        })
    }

    pub fn remove_edge(
        &self,
        schema_id: &str,
        item_id: &str,
        target_schema_id: &str,
        target_item_id: &str,
    ) -> Result<bool, EngineError> {
        self.write("remove_edge", |tx| {
            let schema = self.load_schema(tx, schema_id)?;
            self.check_access(&schema)?;
            let mut ws = Workset::new(tx);
            let changed = relations::unlink(
                &mut ws,
                &key(schema_id, item_id),
                target_schema_id,
                target_item_id,
            )?;
            ws.flush()?;
            Ok(changed)
        })
    }
}
