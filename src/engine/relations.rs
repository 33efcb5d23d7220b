use std::collections::{BTreeMap, BTreeSet, HashMap};

use rusqlite::Connection;

use super::EngineError;
use crate::db;
use crate::domain::item::{Item, RelatedItem};
use crate::domain::schema::AppSchema;
use crate::ids::IdKind;

pub(crate) type ItemKey = (String, String);

pub(crate) fn key(schema_id: &str, item_id: &str) -> ItemKey {
    (schema_id.to_string(), item_id.to_string())
}

/// Items touched by one logical operation. Both sides of every edge change
/// here first and are written back together by [`Workset::flush`], so a
/// neighbor that did not change is never rewritten.
pub(crate) struct Workset<'c> {
    conn: &'c Connection,
    schemas: HashMap<String, Option<AppSchema>>,
    items: BTreeMap<ItemKey, Item>,
    fresh: BTreeSet<ItemKey>,
    dirty: BTreeSet<ItemKey>,
    removed: BTreeSet<ItemKey>,
    now: String,
}

impl<'c> Workset<'c> {
    pub(crate) fn new(conn: &'c Connection) -> Self {
        Self {
            conn,
            schemas: HashMap::new(),
            items: BTreeMap::new(),
            fresh: BTreeSet::new(),
            dirty: BTreeSet::new(),
            removed: BTreeSet::new(),
            now: db::now_utc_rfc3339(),
        }
    }

    pub(crate) fn now(&self) -> &str {
        &self.now
    }

    pub(crate) fn schema(&mut self, schema_id: &str) -> Result<Option<&AppSchema>, EngineError> {
        if !self.schemas.contains_key(schema_id) {
            let loaded = db::get_schema(self.conn, schema_id)?;
            self.schemas.insert(schema_id.to_string(), loaded);
        }
        Ok(self.schemas.get(schema_id).and_then(Option::as_ref))
    }

    /// Loads an item into the set. Returns false when the item, or its
    /// schema, does not exist or was removed earlier in this operation.
    pub(crate) fn load(&mut self, schema_id: &str, item_id: &str) -> Result<bool, EngineError> {
        let item_key = key(schema_id, item_id);
        if self.removed.contains(&item_key) {
            return Ok(false);
        }
        if self.items.contains_key(&item_key) {
            return Ok(true);
        }
        if self.schema(schema_id)?.is_none() {
            return Ok(false);
        }
        match db::get_item(self.conn, schema_id, item_id)? {
            Some(item) => {
                self.items.insert(item_key, item);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub(crate) fn require(&mut self, schema_id: &str, item_id: &str) -> Result<(), EngineError> {
        if self.load(schema_id, item_id)? {
            Ok(())
        } else {
            Err(EngineError::not_found(IdKind::Item, item_id))
        }
    }

    pub(crate) fn get(&self, item_key: &ItemKey) -> Option<&Item> {
        self.items.get(item_key)
    }

    /// Mutates a loaded item and marks it for write-back.
    pub(crate) fn update<T>(
        &mut self,
        item_key: &ItemKey,
        change: impl FnOnce(&mut Item) -> T,
    ) -> Option<T> {
        let item = self.items.get_mut(item_key)?;
        let result = change(item);
        self.dirty.insert(item_key.clone());
        Some(result)
    }

    pub(crate) fn insert_new(&mut self, item: Item) -> ItemKey {
        let item_key = key(&item.schema_id, &item.id);
        self.fresh.insert(item_key.clone());
        self.items.insert(item_key.clone(), item);
        item_key
    }

    /// Marks an item as going away. Later loads treat it as missing and
    /// flush skips it; deleting the record is the caller's job.
    pub(crate) fn forget(&mut self, item_key: ItemKey) {
        self.items.remove(&item_key);
        self.dirty.remove(&item_key);
        self.fresh.remove(&item_key);
        self.removed.insert(item_key);
    }

    /// Writes back fresh and changed items. Changed items get a new version.
    pub(crate) fn flush(&mut self) -> Result<usize, EngineError> {
        let conn = self.conn;
        let mut written = 0;
        for item_key in &self.fresh {
            if let Some(item) = self.items.get(item_key) {
                db::insert_item(conn, item)?;
                written += 1;
            }
        }
        for item_key in std::mem::take(&mut self.dirty) {
            if self.fresh.contains(&item_key) {
                continue;
            }
            let Some(item) = self.items.get_mut(&item_key) else {
                continue;
            };
            item.version += 1;
            item.updated_at = self.now.clone();
            db::replace_item(conn, item)?;
            written += 1;
        }
        self.fresh.clear();
        Ok(written)
    }

    pub(crate) fn into_item(mut self, item_key: &ItemKey) -> Option<Item> {
        self.items.remove(item_key)
    }
}

/// Adds the edge `source -> target` on both sides. Returns whether anything
/// changed; linking an existing edge is a no-op.
pub(crate) fn link(
    ws: &mut Workset<'_>,
    source: &ItemKey,
    target_schema_id: &str,
    target_item_id: &str,
) -> Result<bool, EngineError> {
    ws.require(&source.0, &source.1)?;
    let has_field = ws
        .get(source)
        .is_some_and(|item| item.has_outbound_field(target_schema_id));
    if !has_field {
        return Err(EngineError::SchemaMismatch(format!(
            "item {} has no relation field for schema {}",
            source.1, target_schema_id
        )));
    }
    if ws.schema(target_schema_id)?.is_none() {
        return Err(EngineError::not_found(IdKind::Schema, target_schema_id));
    }
    ws.require(target_schema_id, target_item_id)?;

    let source_schema_name = ws
        .schema(&source.0)?
        .map(|schema| schema.name.clone())
        .unwrap_or_default();
    let source_name = ws
        .get(source)
        .map(|item| item.descriptive_name.clone())
        .unwrap_or_default();
    let target_key = key(target_schema_id, target_item_id);
    let target_name = ws
        .get(&target_key)
        .map(|item| item.descriptive_name.clone())
        .unwrap_or_default();

    let outbound_added = ws
        .get(source)
        .and_then(|item| item.outbound(target_schema_id))
        .is_some_and(|edge| !edge.contains(target_item_id));
    if outbound_added {
        ws.update(source, |item| {
            item.link_outbound(
                target_schema_id,
                RelatedItem {
                    related_item_id: target_item_id.to_string(),
                    related_item_name: target_name,
                },
            )
        });
    }

    let inbound_added = ws
        .get(&target_key)
        .is_some_and(|item| !item.inbound(&source.0).is_some_and(|g| g.contains(&source.1)));
    if inbound_added {
        ws.update(&target_key, |item| {
            item.link_inbound(
                &source.0,
                &source_schema_name,
                RelatedItem {
                    related_item_id: source.1.clone(),
                    related_item_name: source_name,
                },
            )
        });
    }

    if outbound_added || inbound_added {
        tracing::debug!(
            source = %source.1,
            target = %target_item_id,
            "linked items"
        );
    }
    Ok(outbound_added || inbound_added)
}

/// Removes the edge `source -> target` from both sides. A target that no
/// longer exists is skipped so an interrupted cleanup can be re-run.
pub(crate) fn unlink(
    ws: &mut Workset<'_>,
    source: &ItemKey,
    target_schema_id: &str,
    target_item_id: &str,
) -> Result<bool, EngineError> {
    ws.require(&source.0, &source.1)?;
    let has_field = ws
        .get(source)
        .is_some_and(|item| item.has_outbound_field(target_schema_id));
    if !has_field {
        return Err(EngineError::SchemaMismatch(format!(
            "item {} has no relation field for schema {}",
            source.1, target_schema_id
        )));
    }

    let outbound_removed = ws
        .get(source)
        .and_then(|item| item.outbound(target_schema_id))
        .is_some_and(|edge| edge.contains(target_item_id));
    if outbound_removed {
        ws.update(source, |item| {
            item.unlink_outbound(target_schema_id, target_item_id)
        });
    }

    let inbound_removed = if ws.load(target_schema_id, target_item_id)? {
        detach_inbound(ws, &key(target_schema_id, target_item_id), source)
    } else {
        tracing::warn!(
            target = %target_item_id,
            "edge target is missing; removing outbound side only"
        );
        false
    };

    if outbound_removed || inbound_removed {
        tracing::debug!(source = %source.1, target = %target_item_id, "unlinked items");
    }
    Ok(outbound_removed || inbound_removed)
}

fn detach_inbound(ws: &mut Workset<'_>, holder: &ItemKey, source: &ItemKey) -> bool {
    let present = ws
        .get(holder)
        .and_then(|item| item.inbound(&source.0))
        .is_some_and(|group| group.contains(&source.1));
    if present {
        ws.update(holder, |item| item.unlink_inbound(&source.0, &source.1));
    }
    present
}

fn detach_outbound(ws: &mut Workset<'_>, holder: &ItemKey, target: &ItemKey) -> bool {
    let present = ws
        .get(holder)
        .and_then(|item| item.outbound(&target.0))
        .is_some_and(|edge| edge.contains(&target.1));
    if present {
        ws.update(holder, |item| item.unlink_outbound(&target.0, &target.1));
    }
    present
}

/// Strips every edge that references `item` from its neighbors. The item
/// itself is expected to be forgotten already. Missing neighbors are skipped,
/// so stripping twice is harmless.
pub(crate) fn strip(ws: &mut Workset<'_>, item: &Item) -> Result<usize, EngineError> {
    let own_key = key(&item.schema_id, &item.id);
    let mut touched = 0;
    for (schema_id, neighbor_id) in item.outbound_targets() {
        if ws.load(&schema_id, &neighbor_id)? {
            if detach_inbound(ws, &key(&schema_id, &neighbor_id), &own_key) {
                touched += 1;
            }
        } else {
            tracing::debug!(neighbor = %neighbor_id, "neighbor already gone");
        }
    }
    for (schema_id, neighbor_id) in item.inbound_sources() {
        if ws.load(&schema_id, &neighbor_id)? {
            if detach_outbound(ws, &key(&schema_id, &neighbor_id), &own_key) {
                touched += 1;
            }
        } else {
            tracing::debug!(neighbor = %neighbor_id, "neighbor already gone");
        }
    }
    Ok(touched)
}
